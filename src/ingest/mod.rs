//! Ingestion: turning input files into submitted documents.

pub mod pipeline;
pub mod scheduler;

pub use pipeline::{to_source, Pipeline};
pub use scheduler::{run_batch, run_single, BatchOptions, BatchReport, Task};

//! Content-addressed storage for attachment payloads.

pub mod attachments;

pub use attachments::{AttachmentStore, StoreOutcome, StoreStats};

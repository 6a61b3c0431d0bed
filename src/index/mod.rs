//! Search-index submission.
//!
//! The ingest code only sees the two traits below. [`elastic::ElasticClient`]
//! talks to Elasticsearch directly; [`bulk::BulkIndexer`] batches documents
//! on top of it for the worker pool.

pub mod bulk;
pub mod elastic;
pub mod schema;

use serde_json::Value;

use crate::error::Result;

pub use bulk::{BulkIndexer, BulkStats, BulkTransport};
pub use elastic::ElasticClient;

/// Buffered, batched submission shared by all batch workers.
pub trait BulkSink: Sync {
    /// Queue `source` under `id` (empty: let the index assign one). May flush.
    fn add(&self, id: &str, source: Value) -> Result<()>;

    /// Submit everything queued so far.
    fn flush(&self) -> Result<()>;
}

/// One synchronous request per document.
pub trait DocumentIndex {
    fn index(&self, id: &str, source: &Value) -> Result<()>;
}

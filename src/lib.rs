//! `mailindexer` turns raw MIME email into search-index documents.
//!
//! Every message is parsed into a MIME tree, its headers are normalized,
//! its parts are decoded into text where possible and the rest is stored
//! in a content-addressed attachment directory. The resulting documents
//! are submitted to Elasticsearch, one at a time or through a bulk indexer
//! driven by a worker pool.

pub mod config;
pub mod decode;
pub mod error;
pub mod index;
pub mod ingest;
pub mod model;
pub mod parser;
pub mod store;
pub mod transform;

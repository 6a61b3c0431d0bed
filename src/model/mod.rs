//! Core data model types: header maps, parsed MIME nodes, and index documents.

pub mod document;
pub mod headers;
pub mod node;

pub use document::{Content, Document};
pub use headers::Headers;
pub use node::MessageNode;

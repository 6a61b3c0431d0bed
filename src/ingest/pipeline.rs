//! Parse, transform and serialize a single message.

use std::io::Read;
use std::path::Path;

use serde_json::Value;
use tracing::info_span;

use crate::decode::DecodeContext;
use crate::error::Result;
use crate::model::Document;
use crate::parser::{eml, mime};
use crate::store::AttachmentStore;
use crate::transform::Transformer;

/// Everything a worker needs to turn raw bytes into a document.
///
/// Cheap to copy and safe to share between threads.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline<'a> {
    ctx: &'a DecodeContext,
    store: &'a AttachmentStore,
}

impl<'a> Pipeline<'a> {
    pub fn new(ctx: &'a DecodeContext, store: &'a AttachmentStore) -> Self {
        Self { ctx, store }
    }

    pub fn store(&self) -> &AttachmentStore {
        self.store
    }

    pub fn process_bytes(&self, raw: &[u8]) -> Result<Document> {
        let node = mime::parse_message(raw)?;
        Ok(Transformer::new(self.ctx, self.store).transform(node))
    }

    pub fn process_file(&self, path: &Path) -> Result<Document> {
        let span = info_span!("message", source = %path.display());
        let _enter = span.enter();

        let node = eml::read_message(path)?;
        Ok(Transformer::new(self.ctx, self.store).transform(node))
    }

    pub fn process_reader(&self, reader: impl Read) -> Result<Document> {
        let span = info_span!("message", source = "<stdin>");
        let _enter = span.enter();

        let node = eml::read_message_from(reader)?;
        Ok(Transformer::new(self.ctx, self.store).transform(node))
    }
}

/// The `_source` body for `doc`.
///
/// The top-level `_id` is index metadata and travels separately, so it is
/// left out here. Nested documents keep theirs.
pub fn to_source(doc: &Document) -> Result<Value> {
    let mut source = serde_json::to_value(doc)?;
    if let Value::Object(fields) = &mut source {
        fields.remove("_id");
    }
    Ok(source)
}

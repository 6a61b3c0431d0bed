//! Batching bulk indexer shared by the batch workers.
//!
//! Documents are appended to an NDJSON buffer as `index` action + source
//! line pairs. The buffer is submitted when it reaches the action or byte
//! threshold, on [`BulkSink::flush`], and on [`BulkIndexer::close`].
//! Submission happens on the calling thread while the buffer lock is held,
//! so a full buffer applies backpressure to every worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};
use tracing::{debug, error, warn};

use super::elastic::BulkResponse;
use super::BulkSink;
use crate::config::IndexConfig;
use crate::error::Result;

/// Where a bulk body is sent. Implemented by the Elasticsearch client.
pub trait BulkTransport: Sync {
    fn index_name(&self) -> &str;
    fn send_bulk(&self, body: Vec<u8>) -> Result<BulkResponse>;
}

/// Totals reported when the indexer is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkStats {
    /// Documents the index accepted.
    pub submitted: u64,
    /// Documents rejected by the index or lost with a failed request.
    pub failed: u64,
    /// Bulk requests sent.
    pub requests: u64,
}

#[derive(Debug, Default)]
struct Buffer {
    body: Vec<u8>,
    actions: usize,
}

#[derive(Debug)]
pub struct BulkIndexer<T> {
    transport: T,
    max_actions: usize,
    max_bytes: usize,
    buffer: Mutex<Buffer>,
    submitted: AtomicU64,
    failed: AtomicU64,
    requests: AtomicU64,
}

impl<T: BulkTransport> BulkIndexer<T> {
    pub fn new(transport: T, max_actions: usize, max_bytes: usize) -> Self {
        Self {
            transport,
            max_actions: max_actions.max(1),
            max_bytes,
            buffer: Mutex::new(Buffer::default()),
            submitted: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            requests: AtomicU64::new(0),
        }
    }

    pub fn from_config(transport: T, config: &IndexConfig) -> Self {
        Self::new(transport, config.bulk_actions, config.bulk_bytes)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn stats(&self) -> BulkStats {
        BulkStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
        }
    }

    /// Submit whatever is still buffered and return the final totals.
    ///
    /// A failing last request is logged and counted, not returned.
    pub fn close(self) -> BulkStats {
        if let Err(e) = self.flush() {
            error!(error = %e, "Final bulk request failed");
        }
        self.stats()
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Action and source lines for one document.
    fn encode(&self, id: &str, source: &Value) -> Result<Vec<u8>> {
        let action = if id.is_empty() {
            json!({ "index": { "_index": self.transport.index_name() } })
        } else {
            json!({ "index": { "_index": self.transport.index_name(), "_id": id } })
        };
        let mut lines = serde_json::to_vec(&action)?;
        lines.push(b'\n');
        serde_json::to_writer(&mut lines, source)?;
        lines.push(b'\n');
        Ok(lines)
    }

    fn submit(&self, buffer: &mut Buffer) -> Result<()> {
        if buffer.actions == 0 {
            return Ok(());
        }
        let body = std::mem::take(&mut buffer.body);
        let actions = std::mem::take(&mut buffer.actions);
        self.requests.fetch_add(1, Ordering::Relaxed);
        debug!(actions = actions, bytes = body.len(), "Sending bulk request");

        let response = match self.transport.send_bulk(body) {
            Ok(response) => response,
            Err(e) => {
                self.failed.fetch_add(actions as u64, Ordering::Relaxed);
                return Err(e);
            }
        };

        let mut accepted = 0u64;
        let mut rejected = 0u64;
        for item in response.items.iter().flat_map(|item| item.values()) {
            if item.is_success() {
                accepted += 1;
            } else {
                rejected += 1;
                warn!(
                    id = item.id.as_deref().unwrap_or(""),
                    status = item.status,
                    reason = %item.reason(),
                    "Document rejected by index"
                );
            }
        }
        // Items the response does not account for are not known to be indexed.
        let missing = (actions as u64).saturating_sub(accepted + rejected);
        if missing > 0 {
            warn!(missing = missing, "Bulk response is missing items");
        }

        self.submitted.fetch_add(accepted, Ordering::Relaxed);
        self.failed.fetch_add(rejected + missing, Ordering::Relaxed);
        Ok(())
    }
}

impl<T: BulkTransport> BulkSink for BulkIndexer<T> {
    fn add(&self, id: &str, source: Value) -> Result<()> {
        let lines = self.encode(id, &source)?;

        let mut buffer = self.lock();
        buffer.body.extend_from_slice(&lines);
        buffer.actions += 1;
        if buffer.actions >= self.max_actions || buffer.body.len() >= self.max_bytes {
            self.submit(&mut buffer)?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut buffer = self.lock();
        self.submit(&mut buffer)
    }
}

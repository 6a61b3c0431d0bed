//! Minimal Elasticsearch REST client.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::bulk::BulkTransport;
use super::DocumentIndex;
use crate::config::IndexConfig;
use crate::error::{IngestError, Result};

/// Longest error body quoted in an [`IngestError::Index`] when it is not JSON.
const MAX_REASON_LEN: usize = 512;

#[derive(Debug, Clone)]
pub struct ElasticClient {
    http: Client,
    base_url: Url,
    index: String,
    credentials: Option<(String, Option<String>)>,
}

impl ElasticClient {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| IngestError::Config(format!("invalid index URL '{}': {e}", config.url)))?;
        if base_url.cannot_be_a_base() {
            return Err(IngestError::Config(format!(
                "invalid index URL '{}': not a base URL",
                config.url
            )));
        }

        let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
        let http = Client::builder()
            .user_agent(concat!("mailindexer/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            index: config.name.clone(),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// Create the index with the given settings and mappings.
    ///
    /// Fails if the index already exists.
    pub fn create_index(&self, settings: &Value) -> Result<Value> {
        let url = self.endpoint(&[&self.index])?;
        self.send(self.http.put(url).json(settings))
    }

    /// Index one document. An empty `id` lets the index assign one.
    pub fn index_document(&self, id: &str, source: &Value) -> Result<Value> {
        let request = if id.is_empty() {
            self.http.post(self.endpoint(&[&self.index, "_doc"])?)
        } else {
            self.http.put(self.endpoint(&[&self.index, "_doc", id])?)
        };
        self.send(request.json(source))
    }

    /// Submit an NDJSON bulk body.
    pub fn bulk(&self, body: Vec<u8>) -> Result<BulkResponse> {
        let url = self.endpoint(&["_bulk"])?;
        let response = self.send(
            self.http
                .post(url)
                .header(CONTENT_TYPE, "application/x-ndjson")
                .body(body),
        )?;
        Ok(serde_json::from_value(response)?)
    }

    /// `base_url` with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| IngestError::Config(format!("invalid index URL '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn send(&self, request: RequestBuilder) -> Result<Value> {
        let request = match &self.credentials {
            Some((user, password)) => request.basic_auth(user, password.as_deref()),
            None => request,
        };

        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;
        debug!(status = status.as_u16(), bytes = body.len(), "Index response");

        if !status.is_success() {
            return Err(IngestError::Index {
                status: status.as_u16(),
                reason: error_reason(&body),
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

impl DocumentIndex for ElasticClient {
    fn index(&self, id: &str, source: &Value) -> Result<()> {
        self.index_document(id, source).map(|_| ())
    }
}

impl BulkTransport for ElasticClient {
    fn index_name(&self) -> &str {
        &self.index
    }

    fn send_bulk(&self, body: Vec<u8>) -> Result<BulkResponse> {
        self.bulk(body)
    }
}

/// Response of `POST /_bulk`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    /// One entry per action, keyed by the action name (`index`, `create`, ...).
    #[serde(default)]
    pub items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkItem {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    pub status: u16,
    #[serde(default)]
    pub error: Option<Value>,
}

impl BulkItem {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }

    /// Human-readable failure reason.
    pub fn reason(&self) -> String {
        match &self.error {
            Some(error) => describe_error(error),
            None => format!("status {}", self.status),
        }
    }
}

/// Extract `error.reason` (or the whole `error`) from an error response body.
fn error_reason(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => match value.get("error") {
            Some(error) => describe_error(error),
            None => value.to_string(),
        },
        Err(_) => {
            let mut reason = body.trim().to_string();
            if reason.len() > MAX_REASON_LEN {
                let mut cut = MAX_REASON_LEN;
                while !reason.is_char_boundary(cut) {
                    cut -= 1;
                }
                reason.truncate(cut);
            }
            reason
        }
    }
}

fn describe_error(error: &Value) -> String {
    match error {
        Value::String(reason) => reason.clone(),
        _ => {
            let kind = error.get("type").and_then(Value::as_str);
            let reason = error.get("reason").and_then(Value::as_str);
            match (kind, reason) {
                (Some(kind), Some(reason)) => format!("{kind}: {reason}"),
                (None, Some(reason)) => reason.to_string(),
                _ => error.to_string(),
            }
        }
    }
}

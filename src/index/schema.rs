//! Index mapping for mail documents.

use serde_json::{json, Value};

/// `Date` after comment stripping, e.g. `Thu, 13 Feb 1969 23:32:00 -0330`.
pub const DATE_FORMAT: &str = "EEE, dd MMM yyyy HH:mm:ss Z";

/// Body of the index creation request.
///
/// Only top-level fields are mapped; nested parts and forwarded messages
/// fall back to dynamic mapping.
pub fn index_settings() -> Value {
    let keyword = json!({ "type": "keyword" });
    let unindexed = json!({ "type": "text", "index": false });

    json!({
        "mappings": {
            "properties": {
                "h": {
                    "properties": {
                        "Date": { "type": "date", "format": DATE_FORMAT },
                        "Subject": { "type": "text" },
                        "Message-Id": keyword,
                        "From": keyword,
                        "To": keyword,
                        "Cc": keyword,
                        "Bcc": keyword,
                        "Return-Path": keyword,
                        "Delivered-To": keyword,
                        "Dkim-Signature": unindexed,
                        "X-Google-Dkim-Signature": unindexed,
                    }
                },
                "a": keyword,
                "t": { "type": "text" },
            }
        }
    })
}

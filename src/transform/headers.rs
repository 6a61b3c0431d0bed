//! Header normalization for indexing.
//!
//! RFC 5322 allows comments and folding whitespace almost everywhere and
//! encodes non-ASCII text as encoded words; the index wants plain values.

use std::borrow::Cow;

use tracing::warn;

use crate::decode::encoded_word::decode_encoded_words;
use crate::decode::DecodeContext;
use crate::model::Headers;

/// Fields holding address lists, split into one value per address.
pub const ADDRESS_FIELDS: [&str; 6] = ["From", "To", "Cc", "Bcc", "Return-Path", "Delivered-To"];

/// Cleans up a node's raw headers. Never fails; undecodable values are kept raw.
#[derive(Debug, Clone, Copy)]
pub struct HeaderNormalizer<'c> {
    ctx: &'c DecodeContext,
}

impl<'c> HeaderNormalizer<'c> {
    pub fn new(ctx: &'c DecodeContext) -> Self {
        Self { ctx }
    }

    /// Returns the node's `Message-Id` (empty if absent) and the normalized headers,
    /// with `Message-Id` removed.
    pub fn normalize(&self, mut headers: Headers, location: &str) -> (String, Headers) {
        let id = headers
            .remove("Message-Id")
            .and_then(|values| values.into_iter().next())
            .map(|value| value.trim().to_string())
            .unwrap_or_default();

        // Split before decoding: a decoded display name may contain commas.
        for field in ADDRESS_FIELDS {
            let values = headers.get_all(field);
            if !values.is_empty() {
                let mut split = self.split_addresses(values);
                // A blank field like `Cc:` stays, with one empty value.
                if split.is_empty() {
                    split.push(String::new());
                }
                headers.set(field, split);
            }
        }

        for (name, values) in headers.iter_mut() {
            for (index, value) in values.iter_mut().enumerate() {
                let decoded = match decode_encoded_words(self.ctx, value) {
                    Ok(Cow::Owned(decoded)) => Some(decoded),
                    Ok(Cow::Borrowed(_)) => None,
                    Err(e) => {
                        warn!(
                            part = location,
                            field = name,
                            index = index,
                            value = value.as_str(),
                            error = %e,
                            "Could not decode header, keeping raw value"
                        );
                        None
                    }
                };
                if let Some(decoded) = decoded {
                    *value = decoded;
                }
            }
        }

        let dates = headers.get_all("Date");
        if !dates.is_empty() {
            let stripped = dates.iter().map(|d| self.strip_comments(d)).collect();
            headers.set("Date", stripped);
        }

        (id, headers)
    }

    /// Remove parenthesized comments and collapse whitespace runs to one space.
    ///
    /// `" Thu, 13 Feb 1969 23:32 -0330 (Newfoundland Time)"` → `"Thu, 13 Feb 1969 23:32 -0330"`
    pub fn strip_comments(&self, value: &str) -> String {
        let patterns = &self.ctx.patterns;
        let without_comments = patterns.comment.replace_all(value, "");
        patterns
            .whitespace
            .replace_all(&without_comments, " ")
            .trim()
            .to_string()
    }

    /// Split address-list values on commas, one string per entry.
    pub fn split_addresses(&self, values: &[String]) -> Vec<String> {
        values
            .iter()
            .flat_map(|value| self.ctx.patterns.address_separator.split(value))
            .filter(|address| !address.is_empty())
            .map(str::to_string)
            .collect()
    }
}

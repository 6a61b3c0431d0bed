//! Content decoding: transfer encodings, charsets, and RFC 2047 encoded words.
//!
//! Decoding a part happens in two stages: the transfer encoding is undone
//! first ([`transfer`]), then the bytes of readable text parts are decoded
//! from their charset ([`charset`]). Either stage can give up, in which case
//! the part is handed back as opaque bytes together with the reason
//! ([`Decoded::Opaque`]) so the caller can store it as an attachment.

pub mod charset;
pub mod encoded_word;
pub mod transfer;

use std::borrow::Cow;
use std::fmt;

use regex::Regex;
use thiserror::Error;
use tracing::info;

use crate::model::Headers;
use crate::parser::header::{disposition_type, MediaType};

pub use charset::DetectMode;
pub use transfer::TransferEncoding;

/// A soft decoding failure. These are logged and degraded, never propagated.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The charset label is not in the registry.
    #[error("unknown charset '{0}'")]
    UnknownCharset(String),

    /// The label is known but no decoder exists for it.
    #[error("no decoder for charset '{0}'")]
    NoDecoder(String),

    /// Strict mode only: the bytes are not valid in the charset.
    #[error("malformed {charset} content")]
    Malformed { charset: String },

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid quoted-printable: {0}")]
    QuotedPrintable(String),
}

/// Compiled patterns shared by every decoding and normalization step.
#[derive(Debug)]
pub struct Patterns {
    /// Parenthesized header comment.
    pub comment: Regex,
    /// Any whitespace run, newlines included.
    pub whitespace: Regex,
    /// Comma with optional surrounding whitespace.
    pub address_separator: Regex,
    /// `<meta charset=...>` or `<meta http-equiv ... charset=...>`.
    pub html_charset: Regex,
}

impl Patterns {
    fn new() -> Self {
        Self {
            comment: Regex::new(r"\([^)]*\)").expect("valid pattern"),
            whitespace: Regex::new(r"\s+").expect("valid pattern"),
            address_separator: Regex::new(r"\s*,\s*").expect("valid pattern"),
            html_charset: Regex::new(r#"(?i)<meta[^>]*?charset\s*=\s*["']?\s*([a-z0-9_:.\-]+)"#)
                .expect("valid pattern"),
        }
    }
}

/// Immutable decoding context, built once and shared by every worker.
#[derive(Debug)]
pub struct DecodeContext {
    pub patterns: Patterns,
    /// Treat malformed charset sequences as a failure instead of replacing them.
    pub strict_charset: bool,
}

impl Default for DecodeContext {
    fn default() -> Self {
        Self::new(false)
    }
}

impl DecodeContext {
    pub fn new(strict_charset: bool) -> Self {
        Self {
            patterns: Patterns::new(),
            strict_charset,
        }
    }
}

/// What the decoder needs to know about one part, taken from its headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    pub media_type: MediaType,
    pub transfer_encoding: TransferEncoding,
    /// `Content-Disposition: attachment`.
    pub is_attachment: bool,
}

impl PartInfo {
    /// Build from normalized headers.
    ///
    /// A missing `Content-Type` means `text/plain`. An unparseable one that
    /// still starts with `text` is taken as `text/html` or `text/plain`
    /// depending on whether it mentions html.
    pub fn from_headers(headers: &Headers) -> Self {
        let media_type = match headers.get("Content-Type") {
            None => MediaType::text_plain(),
            Some(value) => match MediaType::parse(value) {
                Ok(media_type) => media_type,
                Err(e) if value.trim_start().to_ascii_lowercase().starts_with("text") => {
                    let sub = if value.to_ascii_lowercase().contains("html") {
                        "html"
                    } else {
                        "plain"
                    };
                    info!(
                        content_type = value,
                        error = %e,
                        "Unreadable Content-Type, assuming text/{}",
                        sub
                    );
                    MediaType {
                        main: "text".into(),
                        sub: sub.into(),
                        params: Vec::new(),
                    }
                }
                Err(e) => {
                    info!(content_type = value, error = %e, "Unreadable Content-Type");
                    MediaType {
                        main: "application".into(),
                        sub: "octet-stream".into(),
                        params: Vec::new(),
                    }
                }
            },
        };

        Self {
            media_type,
            transfer_encoding: TransferEncoding::from_header(
                headers.get("Content-Transfer-Encoding"),
            ),
            is_attachment: headers
                .get("Content-Disposition")
                .is_some_and(|d| disposition_type(d) == "attachment"),
        }
    }
}

/// Outcome of decoding one part's body.
#[derive(Debug)]
pub enum Decoded<'a> {
    /// Readable text.
    Text(String),
    /// Bytes to keep as an attachment, with the reason text was not produced.
    Opaque {
        bytes: Cow<'a, [u8]>,
        reason: Fallback,
    },
}

/// Why a part ended up as opaque bytes.
#[derive(Debug)]
pub enum Fallback {
    /// Not a `text/*` part.
    NotText,
    /// A text part explicitly marked as an attachment.
    AttachmentDisposition,
    /// Undoing the transfer encoding failed; the bytes are returned untouched.
    TransferEncoding(DecodeError),
    /// Charset resolution or decoding failed; the bytes are transfer-decoded.
    Charset { charset: String, error: DecodeError },
}

impl Fallback {
    /// Whether this fallback is the result of a decoding failure rather than
    /// the part simply not being text.
    pub fn is_failure(&self) -> bool {
        matches!(self, Fallback::TransferEncoding(_) | Fallback::Charset { .. })
    }
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fallback::NotText => write!(f, "not a text part"),
            Fallback::AttachmentDisposition => write!(f, "text part marked as attachment"),
            Fallback::TransferEncoding(e) => write!(f, "transfer decoding failed: {e}"),
            Fallback::Charset { charset, error } => {
                write!(f, "charset decoding failed ({charset}): {error}")
            }
        }
    }
}

/// Two-stage part decoder.
#[derive(Debug, Clone, Copy)]
pub struct ContentDecoder<'c> {
    ctx: &'c DecodeContext,
}

impl<'c> ContentDecoder<'c> {
    pub fn new(ctx: &'c DecodeContext) -> Self {
        Self { ctx }
    }

    /// Decode `body` according to `info`. `location` names the part in logs.
    pub fn decode<'b>(&self, info: &PartInfo, body: &'b [u8], location: &str) -> Decoded<'b> {
        let bytes = match transfer::decode_transfer(&info.transfer_encoding, body) {
            Ok(bytes) => bytes,
            Err(error) => {
                return Decoded::Opaque {
                    bytes: Cow::Borrowed(body),
                    reason: Fallback::TransferEncoding(error),
                }
            }
        };

        if !info.media_type.is_text() {
            return Decoded::Opaque {
                bytes,
                reason: Fallback::NotText,
            };
        }
        if info.is_attachment {
            return Decoded::Opaque {
                bytes,
                reason: Fallback::AttachmentDisposition,
            };
        }

        let mode = if info.media_type.is_html() {
            DetectMode::Html
        } else {
            DetectMode::Text
        };
        let charset = self
            .ctx
            .resolve_charset(info.media_type.param("charset"), &bytes, mode, location);
        match self.ctx.decode_charset(&charset, &bytes) {
            Ok(text) => Decoded::Text(text),
            Err(error) => Decoded::Opaque {
                bytes,
                reason: Fallback::Charset { charset, error },
            },
        }
    }
}

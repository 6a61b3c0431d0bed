//! RFC 5322 header block parsing: byte decoding, folding, and the
//! structured `Content-Type` / `Content-Disposition` values.

use tracing::debug;

use crate::error::{IngestError, Result};
use crate::model::Headers;

/// Parse a raw header block (everything before the first empty line).
pub fn parse_header_block(raw_headers: &[u8]) -> Headers {
    let text = decode_header_bytes(raw_headers);
    unfold_headers(&text).into_iter().collect()
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns `(name, raw_value)` pairs in input order, names as written.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                if !last.1.is_empty() {
                    last.1.push(' ');
                }
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                debug!(line = line, "Skipping malformed header line");
                continue;
            }
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name.to_string(), value));
        } else if !line.trim().is_empty() {
            debug!(line = line, "Skipping header line without a colon");
        }
    }

    result
}

/// A parsed `type/subtype; name=value` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    /// Lower-case top-level type, e.g. `text`.
    pub main: String,
    /// Lower-case subtype, e.g. `plain`.
    pub sub: String,
    /// Parameters with lower-case names, values unquoted.
    pub params: Vec<(String, String)>,
}

impl MediaType {
    /// RFC 2045 default for parts without a `Content-Type`.
    pub fn text_plain() -> Self {
        Self {
            main: "text".to_string(),
            sub: "plain".to_string(),
            params: Vec::new(),
        }
    }

    /// Parse a `Content-Type` value.
    pub fn parse(value: &str) -> Result<Self> {
        let (essence, rest) = match value.find(';') {
            Some(pos) => (&value[..pos], &value[pos + 1..]),
            None => (value, ""),
        };
        let essence = essence.trim();
        let (main, sub) = essence
            .split_once('/')
            .ok_or_else(|| IngestError::Parse(format!("no subtype in media type '{value}'")))?;
        let (main, sub) = (main.trim(), sub.trim());
        if !is_token(main) || !is_token(sub) {
            return Err(IngestError::Parse(format!(
                "invalid media type '{essence}'"
            )));
        }

        Ok(Self {
            main: main.to_ascii_lowercase(),
            sub: sub.to_ascii_lowercase(),
            params: parse_params(rest)?,
        })
    }

    /// Value of parameter `name` (case-insensitive).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_text(&self) -> bool {
        self.main == "text"
    }

    pub fn is_html(&self) -> bool {
        self.sub.contains("html")
    }

    pub fn is_multipart(&self) -> bool {
        self.main == "multipart"
    }

    /// `message/rfc822` and its internationalized sibling.
    pub fn is_embedded_message(&self) -> bool {
        self.main == "message" && (self.sub == "rfc822" || self.sub == "global")
    }
}

/// Lower-case disposition type of a `Content-Disposition` value
/// (`inline`, `attachment`, ...).
pub fn disposition_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b)
        })
}

/// Parse `; name=value; name="quoted value"` parameter lists.
fn parse_params(input: &str) -> Result<Vec<(String, String)>> {
    let mut params = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start_matches(|c: char| c == ';' || c.is_whitespace());
        if rest.is_empty() {
            break;
        }
        let eq = rest
            .find('=')
            .ok_or_else(|| IngestError::Parse(format!("parameter without value: '{rest}'")))?;
        let name = rest[..eq].trim().to_ascii_lowercase();
        if name.is_empty() || name.contains(';') {
            return Err(IngestError::Parse(format!("invalid parameter: '{rest}'")));
        }
        rest = rest[eq + 1..].trim_start();

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            let (value, consumed) = unquote(quoted)?;
            rest = &quoted[consumed..];
            value
        } else {
            let end = rest.find(';').unwrap_or(rest.len());
            let value = rest[..end].trim().to_string();
            rest = &rest[end..];
            value
        };

        match name.strip_suffix('*') {
            Some(base) if !base.contains('*') => {
                params.push((base.to_string(), decode_extended_value(&value)));
            }
            _ => params.push((name, value)),
        }
    }

    Ok(params)
}

/// Read a quoted string body (after the opening quote).
///
/// Returns the unescaped value and the number of bytes consumed, closing quote included.
fn unquote(input: &str) -> Result<(String, usize)> {
    let mut value = String::new();
    let mut chars = input.char_indices();
    while let Some((i, ch)) = chars.next() {
        match ch {
            '"' => return Ok((value, i + 1)),
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    value.push(escaped);
                }
            }
            _ => value.push(ch),
        }
    }
    Err(IngestError::Parse(format!("unterminated quoted string: '{input}'")))
}

/// RFC 2231 extended value: `charset'language'percent-encoded`.
///
/// Only the value is kept; non-UTF-8 charsets are decoded through `encoding_rs`.
fn decode_extended_value(value: &str) -> String {
    let mut pieces = value.splitn(3, '\'');
    let (charset, _lang, encoded) = match (pieces.next(), pieces.next(), pieces.next()) {
        (Some(c), Some(l), Some(e)) => (c, l, e),
        _ => return value.to_string(),
    };

    let mut bytes = Vec::with_capacity(encoded.len());
    let raw = encoded.as_bytes();
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' && i + 2 < raw.len() {
            let hex = std::str::from_utf8(&raw[i + 1..i + 3]).unwrap_or("");
            if let Ok(byte) = u8::from_str_radix(hex, 16) {
                bytes.push(byte);
                i += 3;
                continue;
            }
        }
        bytes.push(raw[i]);
        i += 1;
    }

    match encoding_rs::Encoding::for_label(charset.trim().as_bytes()) {
        Some(encoding) => encoding.decode_without_bom_handling(&bytes).0.into_owned(),
        None => String::from_utf8_lossy(&bytes).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfold_headers() {
        let text = "Subject: This is a long\n\tsubject line\nFrom: user@example.com\n";
        let headers = unfold_headers(text);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].0, "Subject");
        assert_eq!(headers[0].1, "This is a long subject line");
    }

    #[test]
    fn test_parse_header_block_repeated_fields() {
        let raw = b"Received: one\r\nReceived: two\r\n  continued\r\nMessage-ID: <x@y>\r\n";
        let headers = parse_header_block(raw);
        assert_eq!(headers.get_all("Received"), ["one", "two continued"]);
        assert_eq!(headers.get("Message-Id"), Some("<x@y>"));
    }

    #[test]
    fn test_parse_header_block_latin1_fallback() {
        let raw = b"Subject: caf\xe9\n";
        let headers = parse_header_block(raw);
        assert_eq!(headers.get("Subject"), Some("café"));
    }

    #[test]
    fn test_media_type_with_params() {
        let mt = MediaType::parse("Text/HTML; charset=\"ISO-8859-1\"; format=flowed").unwrap();
        assert_eq!(mt.main, "text");
        assert_eq!(mt.sub, "html");
        assert!(mt.is_text());
        assert!(mt.is_html());
        assert_eq!(mt.param("CHARSET"), Some("ISO-8859-1"));
        assert_eq!(mt.param("format"), Some("flowed"));
    }

    #[test]
    fn test_media_type_boundary_with_escapes() {
        let mt = MediaType::parse("multipart/mixed;\n boundary=\"a\\\"b;c\"").unwrap();
        assert!(mt.is_multipart());
        assert_eq!(mt.param("boundary"), Some("a\"b;c"));
    }

    #[test]
    fn test_media_type_rfc2231_charset() {
        let mt = MediaType::parse("text/plain; charset*=us-ascii'en'utf%2D8").unwrap();
        assert_eq!(mt.param("charset"), Some("utf-8"));
    }

    #[test]
    fn test_media_type_invalid() {
        assert!(MediaType::parse("text").is_err());
        assert!(MediaType::parse("text/plain; charset").is_err());
        assert!(MediaType::parse("text/plain; charset=\"open").is_err());
    }

    #[test]
    fn test_media_type_trailing_semicolon() {
        let mt = MediaType::parse("text/plain;").unwrap();
        assert!(mt.params.is_empty());
    }

    #[test]
    fn test_disposition_type() {
        assert_eq!(disposition_type("Attachment; filename=\"a.pdf\""), "attachment");
        assert_eq!(disposition_type("inline"), "inline");
    }
}

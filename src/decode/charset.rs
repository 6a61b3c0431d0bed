//! Charset resolution, autodetection, and decoding to UTF-8.

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use tracing::{debug, info};

use super::{DecodeContext, DecodeError};

/// How much of an HTML document is searched for a `<meta>` charset declaration.
const HTML_SNIFF_LEN: usize = 4096;

/// Which detector to run when no charset is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectMode {
    Text,
    /// Honors `<meta>` charset declarations before guessing.
    Html,
}

impl DecodeContext {
    /// Pick the charset label to decode `bytes` with.
    ///
    /// The declared label wins. Otherwise the content is inspected; when
    /// nothing confident comes out of it, UTF-8 is assumed.
    pub fn resolve_charset(
        &self,
        declared: Option<&str>,
        bytes: &[u8],
        mode: DetectMode,
        location: &str,
    ) -> String {
        if let Some(declared) = declared.map(str::trim).filter(|c| !c.is_empty()) {
            return declared.to_string();
        }

        match self.detect_charset(bytes, mode) {
            Some(detected) => {
                info!(
                    part = location,
                    detected = detected,
                    "No charset declared, using detected charset"
                );
                detected.to_string()
            }
            None => {
                debug!(part = location, "No charset declared, assuming UTF-8");
                "utf-8".to_string()
            }
        }
    }

    /// Best-effort guess of the charset of `bytes`.
    ///
    /// Returns `None` for empty or pure-ASCII content, where any guess is as
    /// good as UTF-8, and when the detector's guess is likely wrong.
    pub fn detect_charset(&self, bytes: &[u8], mode: DetectMode) -> Option<&'static str> {
        if mode == DetectMode::Html {
            if let Some(declared) = self.sniff_html_charset(bytes) {
                return Some(declared.name());
            }
        }
        if bytes.is_ascii() {
            return None;
        }
        if std::str::from_utf8(bytes).is_ok() {
            return Some(encoding_rs::UTF_8.name());
        }

        let mut detector = EncodingDetector::new();
        detector.feed(bytes, true);
        confident(detector.guess_assess(None, false))
    }

    /// Look for a known charset in a `<meta>` tag near the start of an HTML document.
    fn sniff_html_charset(&self, bytes: &[u8]) -> Option<&'static Encoding> {
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(HTML_SNIFF_LEN)]);
        let captures = self.patterns.html_charset.captures(&head)?;
        let label = captures.get(1)?.as_str();
        Encoding::for_label(label.as_bytes())
    }

    /// Decode `bytes` from the charset named `label`.
    pub fn decode_charset(&self, label: &str, bytes: &[u8]) -> Result<String, DecodeError> {
        let encoding = Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| DecodeError::UnknownCharset(label.to_string()))?;
        if encoding == encoding_rs::REPLACEMENT {
            return Err(DecodeError::NoDecoder(label.to_string()));
        }

        if self.strict_charset {
            return encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned())
                .ok_or_else(|| DecodeError::Malformed {
                    charset: encoding.name().to_string(),
                });
        }

        let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
        if had_errors {
            debug!(charset = encoding.name(), "Replaced malformed sequences");
        }
        Ok(text.into_owned())
    }
}

/// Keep a detector guess only when it outscored at least one other candidate.
fn confident((encoding, likely): (&'static Encoding, bool)) -> Option<&'static str> {
    likely.then(|| encoding.name())
}

//! Content-Transfer-Encoding decoding.

use std::borrow::Cow;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use tracing::debug;

use super::DecodeError;

/// Standard alphabet, padding optional, stray trailing bits accepted.
pub(crate) const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Declared `Content-Transfer-Encoding` of a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEncoding {
    /// `7bit`, `8bit`, `binary`, or no header at all.
    Identity,
    QuotedPrintable,
    Base64,
    /// Anything else; passed through untouched.
    Unknown(String),
}

impl TransferEncoding {
    pub fn from_header(value: Option<&str>) -> Self {
        let value = match value {
            Some(v) => v.trim().to_ascii_lowercase(),
            None => return Self::Identity,
        };
        match value.as_str() {
            "" | "7bit" | "8bit" | "binary" => Self::Identity,
            "quoted-printable" => Self::QuotedPrintable,
            "base64" => Self::Base64,
            _ => Self::Unknown(value),
        }
    }
}

/// Undo the transfer encoding of `body`.
pub fn decode_transfer<'a>(
    encoding: &TransferEncoding,
    body: &'a [u8],
) -> Result<Cow<'a, [u8]>, DecodeError> {
    match encoding {
        TransferEncoding::Identity => Ok(Cow::Borrowed(body)),
        TransferEncoding::QuotedPrintable => decode_quoted_printable(body).map(Cow::Owned),
        TransferEncoding::Base64 => {
            let normalized = normalize_base64(body);
            Ok(Cow::Owned(LENIENT_BASE64.decode(normalized)?))
        }
        TransferEncoding::Unknown(name) => {
            debug!(encoding = name.as_str(), "Unknown transfer encoding, passing through");
            Ok(Cow::Borrowed(body))
        }
    }
}

/// Quoted-printable decoding that keeps each hard line break as it was
/// written (`\n` or `\r\n`). Soft breaks (`=` at end of line) are removed.
fn decode_quoted_printable(body: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut decoded = Vec::with_capacity(body.len());
    for line in body.split_inclusive(|&b| b == b'\n') {
        let (content, line_break) = split_line_break(line);
        let content = content.trim_ascii_end();
        match content.strip_suffix(b"=") {
            Some(soft) => decoded.extend(decode_qp_line(soft)?),
            None => {
                decoded.extend(decode_qp_line(content)?);
                decoded.extend_from_slice(line_break);
            }
        }
    }
    Ok(decoded)
}

/// The crate only adds CRLF between lines, so a single line decodes as is.
fn decode_qp_line(line: &[u8]) -> Result<Vec<u8>, DecodeError> {
    quoted_printable::decode(line, quoted_printable::ParseMode::Robust)
        .map_err(|e| DecodeError::QuotedPrintable(e.to_string()))
}

fn split_line_break(line: &[u8]) -> (&[u8], &[u8]) {
    let len = if line.ends_with(b"\r\n") {
        2
    } else if line.ends_with(b"\n") {
        1
    } else {
        0
    };
    line.split_at(line.len() - len)
}

/// Map URL-safe look-alikes onto the standard alphabet and drop everything
/// else that is not base64 (line breaks, separators, stray punctuation).
fn normalize_base64(body: &[u8]) -> Vec<u8> {
    body.iter()
        .filter_map(|&b| match b {
            b'-' => Some(b'+'),
            b'_' => Some(b'/'),
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/' | b'=' => Some(b),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_header() {
        assert_eq!(TransferEncoding::from_header(None), TransferEncoding::Identity);
        assert_eq!(
            TransferEncoding::from_header(Some(" Base64 ")),
            TransferEncoding::Base64
        );
        assert_eq!(
            TransferEncoding::from_header(Some("Quoted-Printable")),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(
            TransferEncoding::from_header(Some("8BIT")),
            TransferEncoding::Identity
        );
        assert_eq!(
            TransferEncoding::from_header(Some("x-uuencode")),
            TransferEncoding::Unknown("x-uuencode".into())
        );
    }

    #[test]
    fn test_identity_borrows() {
        let body = b"as is";
        let decoded = decode_transfer(&TransferEncoding::Identity, body).unwrap();
        assert!(matches!(decoded, Cow::Borrowed(_)));
    }

    #[test]
    fn test_quoted_printable() {
        let decoded = decode_transfer(
            &TransferEncoding::QuotedPrintable,
            b"caf=C3=A9 au l=\r\nait",
        )
        .unwrap();
        assert_eq!(&*decoded, "café au lait".as_bytes());
    }

    #[test]
    fn test_quoted_printable_keeps_lf_line_breaks() {
        let decoded = decode_transfer(&TransferEncoding::QuotedPrintable, b"caf=E9\n").unwrap();
        assert_eq!(&*decoded, b"caf\xe9\n");

        let decoded = decode_transfer(
            &TransferEncoding::QuotedPrintable,
            b"one=\ntwo  \nthree\n\nfour",
        )
        .unwrap();
        assert_eq!(&*decoded, b"onetwo\nthree\n\nfour");
    }

    #[test]
    fn test_quoted_printable_keeps_crlf_line_breaks() {
        let decoded = decode_transfer(
            &TransferEncoding::QuotedPrintable,
            b"a=3Db=\r\nc\r\nd=20\r\n",
        )
        .unwrap();
        assert_eq!(&*decoded, b"a=bc\r\nd \r\n");
    }

    #[test]
    fn test_quoted_printable_soft_break_with_trailing_space() {
        let decoded =
            decode_transfer(&TransferEncoding::QuotedPrintable, b"soft= \nbreak\n").unwrap();
        assert_eq!(&*decoded, b"softbreak\n");
    }

    #[test]
    fn test_base64_with_line_breaks_and_separators() {
        let decoded =
            decode_transfer(&TransferEncoding::Base64, b"aGVs\r\nbG8g\n d29y\tbGQ=\r\n").unwrap();
        assert_eq!(&*decoded, b"hello world");
    }

    #[test]
    fn test_base64_confusables() {
        // 0xfb 0xff encodes as "-_8" in the URL-safe alphabet and "+/8" in the standard one.
        let decoded = decode_transfer(&TransferEncoding::Base64, b"-_8=").unwrap();
        assert_eq!(&*decoded, &[0xfb, 0xff]);
    }

    #[test]
    fn test_base64_missing_padding() {
        let decoded = decode_transfer(&TransferEncoding::Base64, b"aGk").unwrap();
        assert_eq!(&*decoded, b"hi");
    }

    #[test]
    fn test_base64_garbage_fails() {
        assert!(decode_transfer(&TransferEncoding::Base64, b"a").is_err());
    }

    #[test]
    fn test_normalize_base64() {
        assert_eq!(normalize_base64(b"ab\r\n-_ %*=="), b"ab+/==");
    }
}

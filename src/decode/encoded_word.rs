//! RFC 2047 encoded-word decoding for header values.

use std::borrow::Cow;

use base64::Engine as _;

use super::charset::DetectMode;
use super::transfer::LENIENT_BASE64;
use super::{DecodeContext, DecodeError};

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Text that only looks like an encoded word is kept literally. A
/// well-formed word that cannot be decoded (unknown charset, bad base64)
/// fails the whole value, so the caller can keep the raw value.
pub fn decode_encoded_words<'v>(
    ctx: &DecodeContext,
    input: &'v str,
) -> Result<Cow<'v, str>, DecodeError> {
    if !input.contains("=?") {
        return Ok(Cow::Borrowed(input));
    }

    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // If the gap between two encoded words is only whitespace, skip it (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        match split_word(after_start) {
            Some(word) => {
                result.push_str(&decode_word(ctx, &word)?);
                remaining = &after_start[word.consumed..];
                last_was_encoded = true;
            }
            None => {
                result.push_str("=?");
                remaining = after_start;
                last_was_encoded = false;
            }
        }
    }

    result.push_str(remaining);
    Ok(Cow::Owned(result))
}

struct EncodedWord<'a> {
    charset: &'a str,
    encoding: &'a str,
    text: &'a str,
    consumed: usize, // bytes consumed from the string *after* the initial "=?"
}

/// Split `charset?encoding?encoded_text?=` into its pieces.
fn split_word(s: &str) -> Option<EncodedWord<'_>> {
    let first_q = s.find('?')?;
    let charset = &s[..first_q];

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let text = &rest2[..end];

    let is_atom = |part: &str| !part.chars().any(char::is_whitespace);
    if charset.is_empty() || !is_atom(charset) || !is_atom(text) {
        return None;
    }
    if !encoding.eq_ignore_ascii_case("B") && !encoding.eq_ignore_ascii_case("Q") {
        return None;
    }

    Some(EncodedWord {
        charset,
        encoding,
        text,
        consumed: first_q + 1 + second_q + 1 + end + 2,
    })
}

fn decode_word(ctx: &DecodeContext, word: &EncodedWord<'_>) -> Result<String, DecodeError> {
    let bytes = if word.encoding.eq_ignore_ascii_case("B") {
        LENIENT_BASE64.decode(word.text)?
    } else {
        decode_q_encoding(word.text)
    };

    // RFC 2231 allows a language suffix: `charset*lang`.
    let declared = word.charset.split('*').next().unwrap_or(word.charset);
    let charset = ctx.resolve_charset(Some(declared), &bytes, DetectMode::Text, "header");
    ctx.decode_charset(&charset, &bytes)
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(
                    std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("zz"),
                    16,
                ) {
                    result.push(byte);
                    i += 3;
                } else {
                    result.push(b'=');
                    i += 1;
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(input: &str) -> Result<String, DecodeError> {
        let ctx = DecodeContext::default();
        decode_encoded_words(&ctx, input).map(Cow::into_owned)
    }

    #[test]
    fn test_decode_base64_encoded_word() {
        assert_eq!(decode("=?UTF-8?B?SG9sYSBtdW5kbw==?=").unwrap(), "Hola mundo");
    }

    #[test]
    fn test_decode_q_encoded_word() {
        assert_eq!(decode("=?ISO-8859-1?Q?caf=E9?=").unwrap(), "café");
    }

    #[test]
    fn test_decode_multiple_encoded_words() {
        let input = "=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=";
        assert_eq!(decode(input).unwrap(), "Hola mundo");
    }

    #[test]
    fn test_decode_mixed_plain_and_encoded() {
        let input = "Re: =?UTF-8?B?SG9sYQ==?= there";
        assert_eq!(decode(input).unwrap(), "Re: Hola there");
    }

    #[test]
    fn test_decode_utf8_base64_japanese() {
        // 山田太郎
        assert_eq!(decode("=?UTF-8?B?5bGx55Sw5aSq6YOO?=").unwrap(), "山田太郎");
    }

    #[test]
    fn test_decode_windows1252_encoded_word() {
        assert_eq!(decode("=?Windows-1252?Q?M=FCller?=").unwrap(), "Müller");
    }

    #[test]
    fn test_decode_language_suffix() {
        assert_eq!(decode("=?ISO-8859-1*fr?Q?R=E9sum=E9?=").unwrap(), "Résumé");
    }

    #[test]
    fn test_plain_value_is_unchanged_and_borrowed() {
        let ctx = DecodeContext::default();
        let value = "Normal subject (with comment), a=b?";
        let decoded = decode_encoded_words(&ctx, value).unwrap();
        assert!(matches!(decoded, Cow::Borrowed(_)));
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_malformed_word_is_literal() {
        assert_eq!(decode("price =? 5 ?= today").unwrap(), "price =? 5 ?= today");
        assert_eq!(decode("=?utf-8?X?abc?=").unwrap(), "=?utf-8?X?abc?=");
        assert_eq!(decode("=?utf-8?Q?unterminated").unwrap(), "=?utf-8?Q?unterminated");
    }

    #[test]
    fn test_unknown_charset_is_error() {
        assert!(matches!(
            decode("=?x-unknown?Q?abc?="),
            Err(DecodeError::UnknownCharset(_))
        ));
    }

    #[test]
    fn test_bad_base64_is_error() {
        assert!(matches!(decode("=?utf-8?B?a?="), Err(DecodeError::Base64(_))));
    }
}

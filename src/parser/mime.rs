//! MIME envelope parsing: header/body split, multipart delimiters, and
//! embedded messages, producing an owned [`MessageNode`] tree.
//!
//! Bodies are kept exactly as they appear in the input (still
//! transfer-encoded); decoding happens later, per part.

use memchr::memmem;
use tracing::{debug, warn};

use crate::error::{IngestError, Result};
use crate::model::MessageNode;
use crate::parser::header::{parse_header_block, MediaType};

/// Maximum nesting depth that is descended into (to prevent stack overflow on adversarial input).
/// Deeper containers are kept as opaque leaves.
const MAX_DEPTH: usize = 32;

/// Parse a complete raw message (headers + body) into a node tree.
///
/// Fails only when the input holds no message at all: empty input, or no
/// header field before the body.
pub fn parse_message(raw_message: &[u8]) -> Result<MessageNode> {
    let message_bytes = skip_from_line(raw_message);
    if is_blank(message_bytes) {
        return Err(IngestError::Parse("empty message".into()));
    }

    let (header_bytes, body) = split_header_body(message_bytes);
    let headers = parse_header_block(header_bytes);
    if headers.is_empty() {
        return Err(IngestError::Parse("no header fields found".into()));
    }

    Ok(build_node(MessageNode::leaf(headers, body), 0))
}

/// Parse one body part. Parts may legitimately have no headers at all.
fn parse_part(data: &[u8], depth: usize) -> Option<MessageNode> {
    if is_blank(data) {
        return None;
    }
    let (header_bytes, body) = split_header_body(data);
    let headers = parse_header_block(header_bytes);
    Some(build_node(MessageNode::leaf(headers, body), depth))
}

/// Descend into multipart and embedded-message containers.
fn build_node(mut node: MessageNode, depth: usize) -> MessageNode {
    let media = match node.headers.get("Content-Type") {
        Some(value) => MediaType::parse(value).ok(),
        None => None,
    };
    let media = match media {
        Some(media) => media,
        None => return node,
    };

    if depth >= MAX_DEPTH && (media.is_multipart() || media.is_embedded_message()) {
        warn!(depth = depth, "MIME nesting too deep, keeping part opaque");
        return node;
    }

    if media.is_multipart() {
        let boundary = media.param("boundary").unwrap_or("");
        if boundary.is_empty() {
            debug!("multipart without boundary, keeping part as a leaf");
            return node;
        }
        match split_multipart(&node.body, boundary) {
            Some(multipart) => {
                node.preamble = multipart.preamble.to_vec();
                node.epilogue = multipart.epilogue.to_vec();
                node.parts = multipart
                    .parts
                    .iter()
                    .map(|part| {
                        let parsed = parse_part(part, depth + 1);
                        if parsed.is_none() {
                            debug!(boundary = boundary, "Skipping blank multipart segment");
                        }
                        parsed
                    })
                    .collect();
                node.body = Vec::new();
            }
            None => {
                debug!(boundary = boundary, "No multipart delimiter found, keeping part as a leaf");
            }
        }
    } else if media.is_embedded_message() {
        let embedded = parse_part(&node.body, depth + 1).filter(|sub| !sub.headers.is_empty());
        match embedded {
            Some(sub) => {
                node.sub_message = Some(Box::new(sub));
                node.body = Vec::new();
            }
            None => debug!("Embedded message has no headers, keeping part as a leaf"),
        }
    }

    node
}

/// The pieces of a multipart body.
struct Multipart<'a> {
    preamble: &'a [u8],
    parts: Vec<&'a [u8]>,
    epilogue: &'a [u8],
}

/// A delimiter line found in a multipart body.
struct Delimiter {
    /// Start of the delimiter, including the line break that precedes it.
    start: usize,
    /// First byte after the delimiter line.
    after: usize,
    closing: bool,
}

/// Split `body` on `--boundary` delimiter lines.
///
/// Returns `None` when no delimiter occurs at all. A missing close delimiter
/// is tolerated: the last part then runs to the end of the body.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Option<Multipart<'a>> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let first = find_delimiter(body, delimiter, 0)?;
    let preamble = &body[..first.start];
    let mut parts = Vec::new();
    let mut current = first;

    while !current.closing {
        match find_delimiter(body, delimiter, current.after) {
            Some(next) => {
                parts.push(&body[current.after..next.start]);
                current = next;
            }
            None => {
                debug!("Missing close delimiter");
                parts.push(&body[current.after..]);
                return Some(Multipart {
                    preamble,
                    parts,
                    epilogue: &[],
                });
            }
        }
    }

    Some(Multipart {
        preamble,
        parts,
        epilogue: &body[current.after..],
    })
}

/// Find the next delimiter line at or after `from`.
fn find_delimiter(body: &[u8], delimiter: &[u8], from: usize) -> Option<Delimiter> {
    for found in memmem::find_iter(&body[from..], delimiter) {
        let pos = from + found;
        let at_line_start = pos == from || body[pos - 1] == b'\n';
        if !at_line_start {
            continue;
        }

        let rest = &body[pos + delimiter.len()..];
        let closing = rest.starts_with(b"--");
        let line_end = rest
            .iter()
            .position(|&b| b == b'\n')
            .unwrap_or(rest.len());
        if !closing && !rest[..line_end].iter().all(|b| b.is_ascii_whitespace()) {
            // A longer boundary that merely starts with ours.
            continue;
        }

        let start = if pos == from {
            pos
        } else if pos >= from + 2 && body[pos - 2] == b'\r' {
            pos - 2
        } else {
            pos - 1
        };
        let after = (pos + delimiter.len() + line_end + 1).min(body.len());

        return Some(Delimiter {
            start,
            after,
            closing,
        });
    }
    None
}

/// Split a message or part into its header block and body.
fn split_header_body(data: &[u8]) -> (&[u8], &[u8]) {
    // A part starting with an empty line has no headers.
    if data.starts_with(b"\r\n") {
        return (&[], &data[2..]);
    }
    if data.starts_with(b"\n") {
        return (&[], &data[1..]);
    }

    match find_header_end(data) {
        Some((header_end, body_start)) => (&data[..header_end], &data[body_start..]),
        None if looks_like_header(data) => (data, &[]),
        None => (&[], data),
    }
}

/// Find where headers end: returns the end of the header block and the start of the body.
fn find_header_end(data: &[u8]) -> Option<(usize, usize)> {
    // Look for \n\n or \r\n\r\n
    for i in 0..data.len().saturating_sub(1) {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return Some((i, i + 2));
        }
        if i + 3 < data.len()
            && data[i] == b'\r'
            && data[i + 1] == b'\n'
            && data[i + 2] == b'\r'
            && data[i + 3] == b'\n'
        {
            return Some((i, i + 4));
        }
    }
    None
}

/// Whether the first line reads like `Name: value`.
fn looks_like_header(data: &[u8]) -> bool {
    let line_end = data.iter().position(|&b| b == b'\n').unwrap_or(data.len());
    let line = &data[..line_end];
    match line.iter().position(|&b| b == b':') {
        Some(colon) => colon > 0 && !line[..colon].iter().any(|b| b.is_ascii_whitespace()),
        None => false,
    }
}

fn is_blank(data: &[u8]) -> bool {
    data.iter().all(|b| b.is_ascii_whitespace())
}

/// Skip a UTF-8 BOM and the `From ` separator line at the start of MBOX messages.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    };

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

//! Parsed MIME tree, as produced by [`crate::parser::mime`].

use super::headers::Headers;

/// One node of a parsed message.
///
/// The tree mirrors MIME nesting: each node owns its child parts and its
/// optional embedded message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageNode {
    pub headers: Headers,

    /// Raw body bytes, still transfer-encoded. Empty for containers.
    pub body: Vec<u8>,

    /// Bytes before the first multipart delimiter.
    pub preamble: Vec<u8>,

    /// Bytes after the closing multipart delimiter.
    pub epilogue: Vec<u8>,

    /// Child parts in input order. `None` marks a segment between two
    /// delimiters that did not hold a usable part.
    pub parts: Vec<Option<MessageNode>>,

    /// Embedded `message/rfc822` message.
    pub sub_message: Option<Box<MessageNode>>,
}

impl MessageNode {
    /// A leaf node with the given headers and body.
    pub fn leaf(headers: Headers, body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers,
            body: body.into(),
            ..Self::default()
        }
    }
}

//! Index document, one per MIME part.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::headers::Headers;

/// What a node's own body resolved to.
///
/// Text and attachment are exclusive by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Content {
    /// Nothing to index: a pure container or a zero-length body.
    #[default]
    Empty,
    /// Decoded, readable text.
    Text(String),
    /// Opaque bytes, published in the attachment store at this path.
    Attachment(PathBuf),
}

/// One node of the output tree.
///
/// Serializes to the wire shape expected by the index mapping:
/// `_id`, `h`, `pre`, `epi`, `p`, `sub`, `t`, `a`, each omitted when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    /// This node's own `Message-Id`; usually empty below the top level.
    pub id: String,
    pub headers: Headers,
    pub preamble: Vec<u8>,
    pub epilogue: Vec<u8>,
    pub parts: Vec<Document>,
    pub sub_message: Option<Box<Document>>,
    pub content: Content,
}

impl Document {
    pub fn text_body(&self) -> Option<&str> {
        match &self.content {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn attachment_path(&self) -> Option<&Path> {
        match &self.content {
            Content::Attachment(path) => Some(path),
            _ => None,
        }
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let b64 = &base64::engine::general_purpose::STANDARD;
        let mut map = serializer.serialize_map(None)?;
        if !self.id.is_empty() {
            map.serialize_entry("_id", &self.id)?;
        }
        if !self.headers.is_empty() {
            map.serialize_entry("h", &self.headers)?;
        }
        if !self.preamble.is_empty() {
            map.serialize_entry("pre", &b64.encode(&self.preamble))?;
        }
        if !self.epilogue.is_empty() {
            map.serialize_entry("epi", &b64.encode(&self.epilogue))?;
        }
        if !self.parts.is_empty() {
            map.serialize_entry("p", &self.parts)?;
        }
        if let Some(sub) = &self.sub_message {
            map.serialize_entry("sub", sub)?;
        }
        match &self.content {
            Content::Text(text) if !text.is_empty() => map.serialize_entry("t", text)?,
            Content::Attachment(path) => {
                map.serialize_entry("a", &path.to_string_lossy())?
            }
            _ => {}
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_fields_are_omitted() {
        let doc = Document::default();
        assert_eq!(serde_json::to_string(&doc).unwrap(), "{}");
    }

    #[test]
    fn test_wire_shape() {
        let doc = Document {
            id: "<abc@example.com>".into(),
            headers: [("Subject", "Hi")].into_iter().collect(),
            preamble: b"pre".to_vec(),
            parts: vec![
                Document {
                    content: Content::Text("hello".into()),
                    ..Document::default()
                },
                Document {
                    content: Content::Attachment(PathBuf::from("files/00ff")),
                    ..Document::default()
                },
            ],
            ..Document::default()
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["_id"], "<abc@example.com>");
        assert_eq!(value["h"]["Subject"][0], "Hi");
        assert_eq!(value["pre"], "cHJl");
        assert!(value.get("epi").is_none());
        assert_eq!(value["p"][0]["t"], "hello");
        assert!(value["p"][0].get("a").is_none());
        assert_eq!(value["p"][1]["a"], "files/00ff");
        assert!(value["p"][1].get("t").is_none());
        assert!(value.get("sub").is_none());
    }
}

//! Turns a parsed MIME tree into the document tree that gets indexed.
//!
//! Every node becomes one [`Document`]: headers are normalized, children are
//! transformed in order, and the node's own body is resolved to text or to a
//! stored attachment. Nothing in here fails; decoding problems are logged and
//! the affected body degrades to an attachment.

pub mod headers;

use tracing::{debug, warn};

use crate::decode::{ContentDecoder, DecodeContext, Decoded, PartInfo};
use crate::error::IngestError;
use crate::model::{Content, Document, Headers, MessageNode};
use crate::store::AttachmentStore;

pub use headers::HeaderNormalizer;

/// Location label of the top-level node in log records.
const ROOT: &str = "root";

#[derive(Debug, Clone, Copy)]
pub struct Transformer<'a> {
    ctx: &'a DecodeContext,
    store: &'a AttachmentStore,
}

impl<'a> Transformer<'a> {
    pub fn new(ctx: &'a DecodeContext, store: &'a AttachmentStore) -> Self {
        Self { ctx, store }
    }

    pub fn transform(&self, node: MessageNode) -> Document {
        self.transform_node(node, ROOT)
    }

    fn transform_node(&self, node: MessageNode, location: &str) -> Document {
        let MessageNode {
            headers,
            body,
            preamble,
            epilogue,
            parts,
            sub_message,
        } = node;

        let (id, headers) = HeaderNormalizer::new(self.ctx).normalize(headers, location);

        let sub_message = sub_message.map(|sub| {
            Box::new(self.transform_node(*sub, &child_location(location, "sub")))
        });

        let parts = parts
            .into_iter()
            .enumerate()
            .filter_map(|(i, part)| {
                let part = part?;
                Some(self.transform_node(part, &child_location(location, &(i + 1).to_string())))
            })
            .collect();

        let content = self.resolve_body(&headers, &body, location);

        Document {
            id,
            headers,
            preamble,
            epilogue,
            parts,
            sub_message,
            content,
        }
    }

    /// Decode the node's own body, storing it when it cannot be indexed as text.
    fn resolve_body(&self, headers: &Headers, body: &[u8], location: &str) -> Content {
        let info = PartInfo::from_headers(headers);
        let (bytes, reason) = match ContentDecoder::new(self.ctx).decode(&info, body, location) {
            Decoded::Text(text) => return Content::Text(text),
            Decoded::Opaque { bytes, reason } => (bytes, reason),
        };

        if bytes.is_empty() {
            return Content::Empty;
        }
        if reason.is_failure() {
            warn!(part = location, reason = %reason, "Storing body as attachment");
        } else {
            debug!(part = location, reason = %reason, "Storing body as attachment");
        }

        match self.store.put(&bytes) {
            Ok((path, _)) => Content::Attachment(path),
            // The document still points at where the attachment should be.
            Err(IngestError::Store { path, source }) => {
                warn!(
                    part = location,
                    path = %path.display(),
                    error = %source,
                    "Could not store attachment"
                );
                Content::Attachment(path)
            }
            Err(e) => {
                warn!(part = location, error = %e, "Could not store attachment");
                Content::Attachment(self.store.path_for(&bytes))
            }
        }
    }
}

/// `root` + `2` → `2`, `2` + `sub` → `2.sub`
fn child_location(parent: &str, segment: &str) -> String {
    if parent == ROOT {
        segment.to_string()
    } else {
        format!("{parent}.{segment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::mime::parse_message;
    use crate::store::attachments::content_digest;
    use std::fs;

    fn transform(raw: &[u8], store: &AttachmentStore) -> Document {
        let ctx = DecodeContext::default();
        let node = parse_message(raw).unwrap();
        Transformer::new(&ctx, store).transform(node)
    }

    #[test]
    fn test_child_location() {
        assert_eq!(child_location(ROOT, "1"), "1");
        assert_eq!(child_location("1", "2"), "1.2");
        assert_eq!(child_location("1.2", "sub"), "1.2.sub");
    }

    #[test]
    fn test_simple_text_message() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::open(dir.path()).unwrap();
        let raw = b"Message-ID: <m1@example.com>\r\n\
Subject: =?UTF-8?Q?Caf=C3=A9?=\r\n\
From: Alice <a@example.com>, Bob <b@example.com>\r\n\
Date: Thu, 13 Feb 1969 23:32 -0330 (Newfoundland Time)\r\n\
\r\n\
Hello there.\r\n";

        let doc = transform(raw, &store);
        assert_eq!(doc.id, "<m1@example.com>");
        assert_eq!(doc.headers.get("Subject"), Some("Café"));
        assert_eq!(
            doc.headers.get_all("From"),
            ["Alice <a@example.com>", "Bob <b@example.com>"]
        );
        assert_eq!(doc.headers.get("Date"), Some("Thu, 13 Feb 1969 23:32 -0330"));
        assert_eq!(doc.text_body(), Some("Hello there.\r\n"));
        assert!(doc.parts.is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_multipart_with_attachment_and_forward() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::open(dir.path()).unwrap();
        let raw = b"Message-ID: <outer@example.com>\r\n\
Content-Type: multipart/mixed; boundary=XYZ\r\n\
\r\n\
preamble text\r\n\
--XYZ\r\n\
Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
caf=E9\r\n\
--XYZ\r\n\
Content-Type: application/octet-stream\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
AAECAw==\r\n\
--XYZ\r\n\
Content-Type: message/rfc822\r\n\
\r\n\
Message-ID: <inner@example.com>\r\n\
Subject: forwarded\r\n\
\r\n\
inner body\r\n\
--XYZ--\r\n";

        let doc = transform(raw, &store);
        assert_eq!(doc.id, "<outer@example.com>");
        assert_eq!(doc.preamble, b"preamble text");
        assert_eq!(doc.content, Content::Empty);
        assert_eq!(doc.parts.len(), 3);

        assert_eq!(doc.parts[0].text_body(), Some("café"));
        assert!(doc.parts[0].id.is_empty());

        let attachment = doc.parts[1].attachment_path().unwrap();
        assert_eq!(attachment, dir.path().join(content_digest(&[0, 1, 2, 3])));
        assert_eq!(fs::read(attachment).unwrap(), [0, 1, 2, 3]);

        let forwarded = doc.parts[2].sub_message.as_ref().unwrap();
        assert_eq!(forwarded.id, "<inner@example.com>");
        assert_eq!(forwarded.headers.get("Subject"), Some("forwarded"));
        assert_eq!(forwarded.text_body(), Some("inner body"));
        assert_eq!(doc.parts[2].content, Content::Empty);
    }

    #[test]
    fn test_unknown_charset_becomes_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::open(dir.path()).unwrap();
        let raw = b"Content-Type: text/plain; charset=x-martian\r\n\r\nzork\r\n";

        let doc = transform(raw, &store);
        let path = doc.attachment_path().unwrap();
        assert_eq!(fs::read(path).unwrap(), b"zork\r\n");
        assert!(doc.text_body().is_none());
    }

    #[test]
    fn test_empty_opaque_body_is_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::open(dir.path()).unwrap();
        let raw = b"Content-Type: image/png\r\n\r\n";

        let doc = transform(raw, &store);
        assert_eq!(doc.content, Content::Empty);
        assert_eq!(store.stats().written, 0);
    }

    #[test]
    fn test_identical_attachments_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::open(dir.path()).unwrap();
        let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\
\r\n\
--b\r\n\
Content-Type: application/zip\r\n\
\r\n\
same\r\n\
--b\r\n\
Content-Type: application/zip\r\n\
\r\n\
same\r\n\
--b--\r\n";

        let doc = transform(raw, &store);
        assert_eq!(doc.parts[0].attachment_path(), doc.parts[1].attachment_path());
        assert_eq!(store.stats().written, 1);
        assert_eq!(store.stats().deduplicated, 1);
    }

    #[test]
    fn test_store_failure_records_intended_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::open(dir.path().join("files")).unwrap();
        fs::remove_dir(store.base_dir()).unwrap();
        let raw = b"Content-Type: application/pdf\r\n\r\n%PDF-1.4\r\n";

        let doc = transform(raw, &store);
        assert_eq!(
            doc.attachment_path(),
            Some(store.path_for(b"%PDF-1.4\r\n").as_path())
        );
        assert_eq!(store.stats().failed, 1);
    }
}

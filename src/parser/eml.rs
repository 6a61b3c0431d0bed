//! Reading individual `.eml` messages from files or streams.

use std::io::Read;
use std::path::Path;

use crate::error::{IngestError, Result};
use crate::model::MessageNode;
use crate::parser::mime;

/// Read and parse a single message file.
///
/// An EML file is a bare RFC 5322 message; a leading mbox `From ` line is tolerated.
pub fn read_message(path: impl AsRef<Path>) -> Result<MessageNode> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            IngestError::FileNotFound(path.to_path_buf())
        } else {
            IngestError::io(path, e)
        }
    })?;

    mime::parse_message(&data)
}

/// Read a whole message from `reader` (typically standard input) and parse it.
pub fn read_message_from(mut reader: impl Read) -> Result<MessageNode> {
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .map_err(|e| IngestError::io("<stdin>", e))?;

    mime::parse_message(&data)
}

//! Email parsing: envelope splitting into a MIME tree, header unfolding, and
//! structured header values.

pub mod eml;
pub mod header;
pub mod mime;

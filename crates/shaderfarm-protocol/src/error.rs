//! Protocol error taxonomy.

use std::io;

/// Errors raised while decoding a request or moving frames on the wire.
///
/// Protocol errors are never fatal to the server: they are serialized into a
/// compressed error payload and returned to the offending client.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to parse request XML: {0}")]
    ParseXml(String),

    #[error("failed to extract first element")]
    NoRootElement,

    #[error("request is missing required attribute 'Platform'")]
    MissingPlatform,

    #[error("request is missing required attribute 'JobType'")]
    MissingJobType,

    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("connection closed mid-frame after {got} of {want} bytes")]
    TruncatedFrame { got: usize, want: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

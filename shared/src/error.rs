use thiserror::Error;

/// Reasons an inbound frame is dropped.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("unknown message tag {0:#04x}")]
    UnknownTag(u8),

    #[error("message tag {0:#04x} is not valid in this direction")]
    UnexpectedTag(u8),

    #[error("binary payload: {0}")]
    Binary(#[from] bincode::Error),

    #[error("control payload: {0}")]
    Control(#[from] serde_json::Error),

    #[error("malformed command: {0}")]
    MalformedCommand(&'static str),
}

impl ProtocolError {
    /// Whether the byte stream is still aligned on a frame boundary after
    /// this error. Only an oversized length prefix breaks alignment.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ProtocolError::FrameTooLarge { .. })
    }
}

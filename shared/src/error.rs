use thiserror::Error;

/// Reasons an inbound frame could not be turned into a message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,

    #[error("message of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid map id {0:?}")]
    InvalidMapId(String),
}

use thiserror::Error;

/// Every failure a session can hit. All of them are fatal to the session.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("malformed handshake input: {0}")]
    MalformedHandshakeInput(String),

    #[error("malformed record: length prefix {length} is shorter than the 16-byte tag")]
    MalformedRecord { length: u32 },

    #[error("record length {length} exceeds the configured maximum of {max} bytes")]
    RecordTooLarge { length: u32, max: u32 },

    #[error("payload of {0} bytes does not fit in a single record")]
    PayloadTooLarge(usize),

    #[error("stream ended while reading {0}")]
    TruncatedRecord(&'static str),

    #[error("record authentication failed")]
    AuthenticationFailure,

    #[error("{0} nonce sequence exhausted")]
    NonceExhausted(&'static str),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("invalid field parameters: {0}")]
    InvalidParameters(String),

    #[error("value needs {needed} bytes but the fixed width is {width}")]
    ValueTooWide { needed: usize, width: usize },

    #[error("i/o failure: {0}")]
    IoFailure(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

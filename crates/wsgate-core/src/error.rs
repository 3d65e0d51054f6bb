use thiserror::Error;

/// Errors produced by the gateway protocol layer.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("malformed handshake: {0}")]
    Malformed(String),

    /// Carries the received identity bytes, hex-encoded.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("upstream connect to {destination} failed: {reason}")]
    UpstreamConnect { destination: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timeout")]
    Timeout,

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl GateError {
    /// True for failures raised while parsing the handshake frame.
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            GateError::Malformed(_) | GateError::InvalidIdentity(_) | GateError::InvalidAddress(_)
        )
    }
}

pub type GateResult<T> = Result<T, GateError>;

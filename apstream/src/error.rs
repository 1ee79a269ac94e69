use aptrust::AptrustError;
use thiserror::Error;

/// All errors produced by the apstream transport layer.
#[derive(Debug, Error)]
pub enum ApStreamError {
    #[error("access point resolution failed: {0}")]
    Resolution(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("empty frame")]
    EmptyFrame,

    #[error("frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("operation timed out")]
    Timeout,

    #[error("handshake failed: {0}")]
    Handshake(AptrustError),

    #[error("authentication declined (reason code {reason_code})")]
    AuthDeclined { reason_code: u32 },

    #[error("frame failed integrity verification")]
    Integrity,

    #[error("unknown command byte: 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ApStreamError {
    /// True when a fresh attempt against another endpoint may succeed.
    ///
    /// Resolution and transport-level failures are retryable. Declines,
    /// integrity failures, handshake mismatches and state errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApStreamError::Resolution(_)
                | ApStreamError::Io(_)
                | ApStreamError::ConnectionClosed
                | ApStreamError::ShortRead { .. }
                | ApStreamError::Timeout
        )
    }
}

impl From<AptrustError> for ApStreamError {
    fn from(err: AptrustError) -> Self {
        match err {
            AptrustError::AuthDeclined { reason_code } => ApStreamError::AuthDeclined { reason_code },
            AptrustError::Integrity => ApStreamError::Integrity,
            AptrustError::InvalidStateTransition { from, to } => {
                ApStreamError::InvalidStateTransition { from, to }
            }
            AptrustError::PayloadTooLarge { size, max } => ApStreamError::FrameTooLarge { size, max },
            other => ApStreamError::Handshake(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApStreamError>;

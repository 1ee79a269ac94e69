// aptrust error types

use thiserror::Error;

/// Top-level error type for the aptrust crate.
#[derive(Debug, Error)]
pub enum AptrustError {
    // ── Handshake errors ────────────────────────────────────────────────
    #[error("malformed handshake message: {0}")]
    MalformedMessage(String),

    #[error("unexpected command byte: 0x{0:02x}")]
    UnexpectedCommand(u8),

    #[error("cryptographic mismatch: {0}")]
    CryptoMismatch(String),

    #[error("authentication declined (reason code {reason_code})")]
    AuthDeclined { reason_code: u32 },

    #[error("invalid handshake state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    // ── Channel errors ──────────────────────────────────────────────────
    #[error("authentication tag verification failed")]
    Integrity,

    #[error("nonce counter exhausted")]
    NonceExhausted,

    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    // ── Key material ────────────────────────────────────────────────────
    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, AptrustError>;

//! apstream -- session transport for aplink access points.
//!
//! Resolves an access point, carries the login handshake over plain
//! length-prefixed frames, then upgrades the connection to authenticated,
//! encrypted command frames:
//! - **AccessPointResolver**: override or first entry of the resolver list
//! - **PlainTransport**: handshake-only framing
//! - **EncryptedTransport**: per-direction nonces, verify-then-decrypt
//! - **SessionController**: lifecycle and keepalive hook

pub mod config;
pub mod encrypted;
pub mod error;
pub mod frame;
pub mod plain;
pub mod resolver;
pub mod session;

// Re-export key public types at crate root.
pub use aptrust::{Command, CredentialKind, Credentials};
pub use config::SessionConfig;
pub use encrypted::{EncryptedTransport, FrameReader, FrameWriter};
pub use error::{ApStreamError, Result};
pub use frame::Frame;
pub use plain::PlainTransport;
pub use resolver::{AccessPointResolver, Endpoint};
pub use session::{KeepalivePolicy, SessionController, SessionState, TimeoutAction, TimeoutPolicy};

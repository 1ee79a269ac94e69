// aptrust: access point login handshake and session cryptography
//
// Sans-IO: key exchange, key schedule, directional stream cipher, handshake
// message codecs and state machines. Sockets live in `apstream`.

pub mod command;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod handshake;

// Re-export key types at crate root for convenience.
pub use command::Command;
pub use credentials::{CredentialKind, Credentials};
pub use crypto::cipher::{DirectionalCipher, Sealed, MAX_PAYLOAD, TAG_LEN};
pub use crypto::signing::{ApSigningKey, ApVerifyingKey};
pub use crypto::x25519::X25519KeyPair;
pub use error::{AptrustError, Result};
pub use handshake::{
    decline_reason_label, ClientInfo, HandshakeOutcome, HandshakeState, Initiator, Responder,
    ResponderOutcome, Welcome,
};

// Client-side handshake state machine.

use crate::crypto::cipher::DirectionalCipher;
use crate::crypto::kdf::SessionKeys;
use crate::crypto::x25519::X25519KeyPair;

/// Progress of one login handshake, as seen by the client.
///
/// Transitions only move forward. Any error while processing a message lands
/// in `Failed`, which is terminal.
#[derive(Debug)]
pub enum HandshakeState {
    /// Nothing sent yet.
    Init,

    /// Client hello sent, waiting for the peer response.
    HelloSent {
        /// Ephemeral keypair whose public value went out in the hello.
        ephemeral: X25519KeyPair,
        /// Exact hello bytes, first half of the transcript.
        hello: Vec<u8>,
    },

    /// Peer response accepted and session keys derived.
    PeerResponseReceived {
        keys: SessionKeys,
        /// hello || peer response.
        transcript: Vec<u8>,
    },

    /// Login request sealed at send nonce 0, waiting for the reply.
    LoginSent {
        send: DirectionalCipher,
        recv: DirectionalCipher,
    },

    /// Login accepted. The ciphers have been handed to the caller.
    Authenticated,

    /// Handshake aborted.
    Failed { reason: String },
}

impl HandshakeState {
    /// Human-readable label for the current state (used in error messages).
    pub fn label(&self) -> &'static str {
        match self {
            HandshakeState::Init => "Init",
            HandshakeState::HelloSent { .. } => "HelloSent",
            HandshakeState::PeerResponseReceived { .. } => "PeerResponseReceived",
            HandshakeState::LoginSent { .. } => "LoginSent",
            HandshakeState::Authenticated => "Authenticated",
            HandshakeState::Failed { .. } => "Failed",
        }
    }

    /// True once the handshake can make no further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandshakeState::Authenticated | HandshakeState::Failed { .. }
        )
    }
}

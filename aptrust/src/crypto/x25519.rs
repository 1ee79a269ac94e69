// X25519 Diffie-Hellman key exchange for the login handshake.

use std::fmt;

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{AptrustError, Result};

/// Ephemeral X25519 keypair. One per handshake attempt, never reused.
pub struct X25519KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl X25519KeyPair {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Keypair from fixed scalar bytes, for golden-vector tests and benches.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public value as carried in the hello and the peer response.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// Perform Diffie-Hellman with a peer's public key, returning the 32-byte
    /// shared secret.
    ///
    /// A low-order peer value yields a non-contributory secret and is refused.
    pub fn diffie_hellman(&self, peer_public: &[u8; 32]) -> Result<[u8; 32]> {
        let peer_pk = PublicKey::from(*peer_public);
        let shared = self.secret.diffie_hellman(&peer_pk);
        if !shared.was_contributory() {
            return Err(AptrustError::CryptoMismatch(
                "peer public value is of low order".into(),
            ));
        }
        Ok(*shared.as_bytes())
    }
}

impl fmt::Debug for X25519KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X25519KeyPair")
            .field("public", &self.public.as_bytes())
            .finish_non_exhaustive()
    }
}

// Ed25519 keys used to pin an access point's identity.
//
// The access point signs its X25519 public value; a client that holds the
// matching verifying key refuses any peer response without a valid signature.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::{AptrustError, Result};

/// Length of a detached Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

/// Access-point signing key (server side).
pub struct ApSigningKey {
    signing_key: SigningKey,
}

impl ApSigningKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstruct from a 32-byte secret seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// The key a client pins to trust this access point.
    pub fn verifying_key(&self) -> ApVerifyingKey {
        ApVerifyingKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    pub fn sign(&self, data: &[u8]) -> [u8; SIGNATURE_LEN] {
        let sig: Signature = self.signing_key.sign(data);
        sig.to_bytes()
    }
}

impl fmt::Debug for ApSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApSigningKey")
            .field("verifying_key", &self.signing_key.verifying_key().as_bytes())
            .finish_non_exhaustive()
    }
}

/// Pinned access-point verifying key (client side).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApVerifyingKey {
    verifying_key: VerifyingKey,
}

impl ApVerifyingKey {
    /// Parse a raw 32-byte Ed25519 public key.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let verifying_key = VerifyingKey::from_bytes(bytes)
            .map_err(|e| AptrustError::InvalidKey(format!("ed25519 public key: {e}")))?;
        Ok(Self { verifying_key })
    }

    /// Parse a hex-encoded (64 character) Ed25519 public key.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim();
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AptrustError::InvalidKey(format!(
                "expected 64 hex characters, got {:?}",
                hex
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|e| AptrustError::InvalidKey(format!("hex digit: {e}")))?;
        }
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Check a signature over `data`.
    ///
    /// Any failure, including a signature of the wrong length, is reported as
    /// a crypto mismatch.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        let sig = Signature::from_slice(signature)
            .map_err(|_| AptrustError::CryptoMismatch("malformed access point signature".into()))?;
        self.verifying_key
            .verify(data, &sig)
            .map_err(|_| AptrustError::CryptoMismatch("access point signature rejected".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify() {
        let key = ApSigningKey::generate();
        let sig = key.sign(b"server public value");
        key.verifying_key().verify(b"server public value", &sig).unwrap();
    }

    #[test]
    fn wrong_message_rejected() {
        let key = ApSigningKey::from_seed(&[7u8; 32]);
        let sig = key.sign(b"correct");
        let result = key.verifying_key().verify(b"wrong", &sig);
        assert!(matches!(result, Err(AptrustError::CryptoMismatch(_))));
    }

    #[test]
    fn short_signature_rejected() {
        let key = ApSigningKey::from_seed(&[7u8; 32]);
        let sig = key.sign(b"data");
        assert!(key.verifying_key().verify(b"data", &sig[..32]).is_err());
    }

    #[test]
    fn hex_roundtrip() {
        let key = ApSigningKey::from_seed(&[9u8; 32]);
        let vk = key.verifying_key();
        let hex: String = vk.to_bytes().iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(ApVerifyingKey::from_hex(&hex).unwrap(), vk);
        assert_eq!(ApVerifyingKey::from_hex(&hex.to_uppercase()).unwrap(), vk);
    }

    #[test]
    fn bad_hex_rejected() {
        assert!(ApVerifyingKey::from_hex("abcd").is_err());
        assert!(ApVerifyingKey::from_hex(&"zz".repeat(32)).is_err());
    }
}

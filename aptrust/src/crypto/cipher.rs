// Directional stream cipher with per-frame authentication.
//
// Each direction of the channel owns one `DirectionalCipher`. A frame at
// nonce `n` is
//
//   ciphertext = ChaCha20(cipher_key, nonce = 0^8 || n_be32) XOR payload
//   tag        = HMAC-SHA256(mac_key, n_be32 || command || len_be16 || ciphertext)[..16]
//
// The nonce is used once and then advanced by exactly one. Tags are checked
// before any decryption happens; a failed check poisons the cipher.

use std::fmt;

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use hmac::Mac;

use crate::crypto::hash::{keyed_mac, HmacSha256};
use crate::crypto::kdf::DirectionKeys;
use crate::error::{AptrustError, Result};

/// Size of the truncated authentication tag trailing every frame.
pub const TAG_LEN: usize = 16;

/// Largest payload a single frame can carry (16-bit length field).
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Ciphertext plus its authentication tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

impl Sealed {
    /// `ciphertext || tag`.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = self.ciphertext;
        out.extend_from_slice(&self.tag);
        out
    }

    /// Split `ciphertext || tag` back into its parts.
    pub fn split(data: &[u8]) -> Result<(&[u8], &[u8])> {
        if data.len() < TAG_LEN {
            return Err(AptrustError::MalformedMessage(format!(
                "sealed body shorter than tag: {} bytes",
                data.len()
            )));
        }
        Ok(data.split_at(data.len() - TAG_LEN))
    }
}

/// One direction of the encrypted channel: keys plus its nonce counter.
pub struct DirectionalCipher {
    keys: DirectionKeys,
    nonce: u32,
    exhausted: bool,
    poisoned: bool,
}

impl DirectionalCipher {
    /// Fresh cipher with its nonce counter at zero.
    pub fn new(keys: DirectionKeys) -> Self {
        Self {
            keys,
            nonce: 0,
            exhausted: false,
            poisoned: false,
        }
    }

    /// Nonce the next frame in this direction will use.
    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    /// True once a tag check has failed; the cipher refuses all further work.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Encrypt and authenticate one frame body, consuming one nonce.
    pub fn seal(&mut self, command: u8, plaintext: &[u8]) -> Result<Sealed> {
        self.ensure_usable()?;
        if plaintext.len() > MAX_PAYLOAD {
            return Err(AptrustError::PayloadTooLarge {
                size: plaintext.len(),
                max: MAX_PAYLOAD,
            });
        }

        let mut ciphertext = plaintext.to_vec();
        self.keystream(self.nonce)?.apply_keystream(&mut ciphertext);

        let full = self
            .tag_state(self.nonce, command, &ciphertext)?
            .finalize()
            .into_bytes();
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&full[..TAG_LEN]);

        self.advance();
        Ok(Sealed { ciphertext, tag })
    }

    /// Verify and decrypt one frame body, consuming one nonce.
    ///
    /// Nothing is decrypted unless the tag verifies. On mismatch the cipher is
    /// poisoned and the nonce does not move.
    pub fn open(&mut self, command: u8, ciphertext: &[u8], tag: &[u8]) -> Result<Vec<u8>> {
        self.ensure_usable()?;
        if ciphertext.len() > MAX_PAYLOAD || tag.len() != TAG_LEN {
            self.poisoned = true;
            return Err(AptrustError::Integrity);
        }

        let verified = self
            .tag_state(self.nonce, command, ciphertext)?
            .verify_truncated_left(tag);
        if verified.is_err() {
            self.poisoned = true;
            tracing::debug!(nonce = self.nonce, command, "frame tag mismatch");
            return Err(AptrustError::Integrity);
        }

        let mut plaintext = ciphertext.to_vec();
        self.keystream(self.nonce)?.apply_keystream(&mut plaintext);
        self.advance();
        Ok(plaintext)
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(AptrustError::Integrity);
        }
        if self.exhausted {
            return Err(AptrustError::NonceExhausted);
        }
        Ok(())
    }

    fn advance(&mut self) {
        match self.nonce.checked_add(1) {
            Some(next) => self.nonce = next,
            None => self.exhausted = true,
        }
    }

    fn keystream(&self, nonce: u32) -> Result<ChaCha20> {
        let mut iv = [0u8; 12];
        iv[8..].copy_from_slice(&nonce.to_be_bytes());
        ChaCha20::new_from_slices(&self.keys.cipher_key, &iv)
            .map_err(|e| AptrustError::InvalidKey(format!("chacha20 init: {e}")))
    }

    fn tag_state(&self, nonce: u32, command: u8, ciphertext: &[u8]) -> Result<HmacSha256> {
        // Length fits: callers reject anything above MAX_PAYLOAD first.
        let len = ciphertext.len() as u16;
        keyed_mac(
            &self.keys.mac_key,
            &[&nonce.to_be_bytes(), &[command], &len.to_be_bytes(), ciphertext],
        )
    }
}

impl fmt::Debug for DirectionalCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectionalCipher")
            .field("nonce", &self.nonce)
            .field("exhausted", &self.exhausted)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(seed: u8) -> DirectionKeys {
        DirectionKeys {
            cipher_key: [seed; 32],
            mac_key: [seed.wrapping_add(1); 32],
        }
    }

    fn pair(seed: u8) -> (DirectionalCipher, DirectionalCipher) {
        (DirectionalCipher::new(keys(seed)), DirectionalCipher::new(keys(seed)))
    }

    #[test]
    fn roundtrip_advances_both_counters() {
        let (mut tx, mut rx) = pair(0x42);
        let sealed = tx.seal(0x04, b"ping").unwrap();
        assert_ne!(sealed.ciphertext, b"ping");
        let pt = rx.open(0x04, &sealed.ciphertext, &sealed.tag).unwrap();
        assert_eq!(pt, b"ping");
        assert_eq!(tx.nonce(), 1);
        assert_eq!(rx.nonce(), 1);
    }

    #[test]
    fn same_payload_differs_per_nonce() {
        let (mut tx, _) = pair(0x10);
        let a = tx.seal(0x04, b"same").unwrap();
        let b = tx.seal(0x04, b"same").unwrap();
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_ne!(a.tag, b.tag);
    }

    #[test]
    fn command_byte_is_authenticated() {
        let (mut tx, mut rx) = pair(0x11);
        let sealed = tx.seal(0x04, b"data").unwrap();
        assert!(matches!(
            rx.open(0x49, &sealed.ciphertext, &sealed.tag),
            Err(AptrustError::Integrity)
        ));
    }

    #[test]
    fn failed_open_poisons_and_keeps_nonce() {
        let (mut tx, mut rx) = pair(0x12);
        let mut sealed = tx.seal(0x04, b"data").unwrap();
        sealed.tag[3] ^= 0x80;
        assert!(rx.open(0x04, &sealed.ciphertext, &sealed.tag).is_err());
        assert!(rx.is_poisoned());
        assert_eq!(rx.nonce(), 0);

        // Even the genuine frame is refused afterwards.
        sealed.tag[3] ^= 0x80;
        assert!(matches!(
            rx.open(0x04, &sealed.ciphertext, &sealed.tag),
            Err(AptrustError::Integrity)
        ));
    }

    #[test]
    fn short_tag_rejected() {
        let (mut tx, mut rx) = pair(0x13);
        let sealed = tx.seal(0x04, b"data").unwrap();
        assert!(rx.open(0x04, &sealed.ciphertext, &sealed.tag[..8]).is_err());
    }

    #[test]
    fn oversized_payload_rejected() {
        let (mut tx, _) = pair(0x14);
        let big = vec![0u8; MAX_PAYLOAD + 1];
        assert!(matches!(
            tx.seal(0x08, &big),
            Err(AptrustError::PayloadTooLarge { .. })
        ));
        assert_eq!(tx.nonce(), 0);
    }

    #[test]
    fn sealed_split_roundtrip() {
        let (mut tx, _) = pair(0x15);
        let sealed = tx.seal(0x04, b"abc").unwrap();
        let bytes = sealed.clone().into_bytes();
        let (ct, tag) = Sealed::split(&bytes).unwrap();
        assert_eq!(ct, &sealed.ciphertext[..]);
        assert_eq!(tag, &sealed.tag[..]);
        assert!(Sealed::split(&bytes[..4]).is_err());
    }

    #[test]
    fn counter_wrap_exhausts_cipher() {
        let (mut tx, _) = pair(0x16);
        tx.nonce = u32::MAX;
        tx.seal(0x04, b"last").unwrap();
        assert!(matches!(
            tx.seal(0x04, b"one more"),
            Err(AptrustError::NonceExhausted)
        ));
    }
}

// Session key schedule: HKDF-SHA256 over the X25519 shared secret, bound to
// the exact handshake transcript.
//
//   PRK       = HKDF-Extract(salt = server_salt, ikm = shared_secret)
//   OKM[160]  = HKDF-Expand(PRK, "aplink session keys" || SHA-256(transcript))
//
//   OKM = challenge_key | c2s_cipher | c2s_mac | s2c_cipher | s2c_mac   (32 B each)

use std::fmt;

use hkdf::Hkdf;
use hmac::Mac;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::hash::{hash_sha256, hmac_sha256, keyed_mac};
use crate::error::{AptrustError, Result};

/// HKDF info label prefix.
pub const SESSION_KEY_LABEL: &[u8] = b"aplink session keys";

/// Length of the challenge response carried in the login request.
pub const CHALLENGE_RESPONSE_LEN: usize = 32;

const KEY_LEN: usize = 32;
const OKM_LEN: usize = KEY_LEN * 5;

/// Cipher key and MAC key for one direction of the channel.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DirectionKeys {
    pub cipher_key: [u8; 32],
    pub mac_key: [u8; 32],
}

/// Everything derived from one handshake.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Keys the challenge response.
    pub challenge_key: [u8; 32],
    /// Client -> access point.
    pub client_to_server: DirectionKeys,
    /// Access point -> client.
    pub server_to_client: DirectionKeys,
}

impl fmt::Debug for DirectionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DirectionKeys(<redacted>)")
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKeys(<redacted>)")
    }
}

/// Derive the session keys from a shared secret, the server salt and the
/// bytes exchanged so far.
pub fn derive_session_keys(
    shared_secret: &[u8; 32],
    salt: &[u8],
    transcript: &[u8],
) -> Result<SessionKeys> {
    let hk = Hkdf::<Sha256>::new(Some(salt), shared_secret);

    let mut info = Vec::with_capacity(SESSION_KEY_LABEL.len() + 32);
    info.extend_from_slice(SESSION_KEY_LABEL);
    info.extend_from_slice(&hash_sha256(transcript));

    let mut okm = [0u8; OKM_LEN];
    hk.expand(&info, &mut okm)
        .map_err(|e| AptrustError::InvalidKey(format!("HKDF expand error: {e}")))?;

    let take = |index: usize| -> [u8; 32] {
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&okm[index * KEY_LEN..(index + 1) * KEY_LEN]);
        key
    };

    let keys = SessionKeys {
        challenge_key: take(0),
        client_to_server: DirectionKeys {
            cipher_key: take(1),
            mac_key: take(2),
        },
        server_to_client: DirectionKeys {
            cipher_key: take(3),
            mac_key: take(4),
        },
    };
    okm.zeroize();
    Ok(keys)
}

/// Challenge response: HMAC-SHA256 over the transcript under the challenge key.
pub fn compute_challenge_response(
    challenge_key: &[u8; 32],
    transcript: &[u8],
) -> Result<[u8; CHALLENGE_RESPONSE_LEN]> {
    hmac_sha256(challenge_key, &[transcript])
}

/// Constant-time check of a received challenge response.
pub fn verify_challenge_response(
    challenge_key: &[u8; 32],
    transcript: &[u8],
    response: &[u8],
) -> Result<()> {
    keyed_mac(challenge_key, &[transcript])?
        .verify_slice(response)
        .map_err(|_| AptrustError::CryptoMismatch("challenge response mismatch".into()))
}

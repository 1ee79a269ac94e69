// Handshake messages exchanged while logging in to an access point.
//
//   Client                              Access point
//     |--- ClientHello ------------------>|   plain frame
//     |<-- PeerResponse ------------------|   plain frame
//     |--- LoginRequest (0xAB) ---------->|   plain frame, sealed body
//     |<-- LoginReply (0xAC / 0xAD) ------|   plain frame, sealed body
//     |==== encrypted command frames =====|
//
// All integers are big-endian. Variable fields carry a u16 length prefix.

use std::fmt;

use bytes::{Buf, BufMut};
use zeroize::Zeroize;

use crate::command::Command;
use crate::credentials::{CredentialKind, Credentials};
use crate::crypto::cipher::TAG_LEN;
use crate::crypto::kdf::CHALLENGE_RESPONSE_LEN;
use crate::crypto::signing::SIGNATURE_LEN;
use crate::error::{AptrustError, Result};

/// Leading bytes of every client hello.
pub const HELLO_MAGIC: [u8; 2] = [0x00, 0x04];
/// Size of the client nonce carried in the hello.
pub const CLIENT_NONCE_LEN: usize = 16;
/// X25519 public value length.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Server salt length.
pub const SALT_LEN: usize = 16;
/// Encoded size of a client hello.
pub const HELLO_LEN: usize = 2 + 1 + 1 + 4 + CLIENT_NONCE_LEN + 2 + PUBLIC_KEY_LEN;

// ── Field reader ─────────────────────────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
    what: &'static str,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], what: &'static str) -> Self {
        Self { buf, what }
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(AptrustError::MalformedMessage(format!(
                "{}: need {} more bytes, have {}",
                self.what,
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.u16()? as usize;
        self.take(len)
    }

    fn prefixed_string(&mut self, field: &str) -> Result<String> {
        let raw = self.prefixed()?;
        String::from_utf8(raw.to_vec()).map_err(|_| {
            AptrustError::MalformedMessage(format!("{}: {field} is not valid UTF-8", self.what))
        })
    }

    fn rest(self) -> &'a [u8] {
        self.buf
    }

    fn finish(self) -> Result<()> {
        if !self.buf.is_empty() {
            return Err(AptrustError::MalformedMessage(format!(
                "{}: {} trailing bytes",
                self.what,
                self.buf.len()
            )));
        }
        Ok(())
    }
}

fn put_prefixed(buf: &mut Vec<u8>, field: &str, data: &[u8]) -> Result<()> {
    let len = u16::try_from(data.len()).map_err(|_| AptrustError::PayloadTooLarge {
        size: data.len(),
        max: u16::MAX as usize,
    })?;
    tracing::trace!(field, len, "encoding length-prefixed field");
    buf.put_u16(len);
    buf.put_slice(data);
    Ok(())
}

// ── Client hello ─────────────────────────────────────────────────────────

/// Product, platform and version announced by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInfo {
    pub product: u8,
    pub platform: u8,
    pub version: u32,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            product: 0,
            platform: 0,
            version: 1,
        }
    }
}

/// Message 1: client -> access point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub info: ClientInfo,
    /// Fresh random nonce.
    pub nonce: [u8; CLIENT_NONCE_LEN],
    /// Client ephemeral X25519 public value.
    pub public_key: [u8; PUBLIC_KEY_LEN],
}

impl ClientHello {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HELLO_LEN);
        buf.put_slice(&HELLO_MAGIC);
        buf.put_u8(self.info.product);
        buf.put_u8(self.info.platform);
        buf.put_u32(self.info.version);
        buf.put_slice(&self.nonce);
        buf.put_u16(PUBLIC_KEY_LEN as u16);
        buf.put_slice(&self.public_key);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data, "client hello");
        let magic: [u8; 2] = r.array()?;
        if magic != HELLO_MAGIC {
            return Err(AptrustError::MalformedMessage(format!(
                "client hello: bad magic {:02x}{:02x}",
                magic[0], magic[1]
            )));
        }
        let info = ClientInfo {
            product: r.u8()?,
            platform: r.u8()?,
            version: r.u32()?,
        };
        let nonce = r.array()?;
        let key_len = r.u16()? as usize;
        if key_len != PUBLIC_KEY_LEN {
            return Err(AptrustError::MalformedMessage(format!(
                "client hello: public value length {key_len}"
            )));
        }
        let public_key = r.array()?;
        r.finish()?;
        Ok(Self {
            info,
            nonce,
            public_key,
        })
    }
}

// ── Peer response ────────────────────────────────────────────────────────

/// Message 2: access point -> client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerResponse {
    /// Access point ephemeral X25519 public value.
    pub public_key: [u8; PUBLIC_KEY_LEN],
    /// Salt for the key schedule.
    pub salt: [u8; SALT_LEN],
    /// Ed25519 signature over `public_key`, when the access point signs.
    pub signature: Option<[u8; SIGNATURE_LEN]>,
}

impl PeerResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + PUBLIC_KEY_LEN + 2 + SALT_LEN + 2 + SIGNATURE_LEN);
        buf.put_u16(PUBLIC_KEY_LEN as u16);
        buf.put_slice(&self.public_key);
        buf.put_u16(SALT_LEN as u16);
        buf.put_slice(&self.salt);
        match &self.signature {
            Some(sig) => {
                buf.put_u16(SIGNATURE_LEN as u16);
                buf.put_slice(sig);
            }
            None => buf.put_u16(0),
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data, "peer response");

        let key = r.prefixed()?;
        let public_key: [u8; PUBLIC_KEY_LEN] = key.try_into().map_err(|_| {
            AptrustError::MalformedMessage(format!("peer response: public value length {}", key.len()))
        })?;

        let salt = r.prefixed()?;
        let salt: [u8; SALT_LEN] = salt.try_into().map_err(|_| {
            AptrustError::MalformedMessage(format!("peer response: salt length {}", salt.len()))
        })?;

        let sig = r.prefixed()?;
        let signature = match sig.len() {
            0 => None,
            SIGNATURE_LEN => {
                let mut out = [0u8; SIGNATURE_LEN];
                out.copy_from_slice(sig);
                Some(out)
            }
            other => {
                return Err(AptrustError::MalformedMessage(format!(
                    "peer response: signature length {other}"
                )))
            }
        };

        r.finish()?;
        Ok(Self {
            public_key,
            salt,
            signature,
        })
    }
}

// ── Login request ────────────────────────────────────────────────────────

/// Message 3: client -> access point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub challenge_response: [u8; CHALLENGE_RESPONSE_LEN],
    /// Login body sealed by the client->server cipher at nonce 0.
    pub sealed_body: Vec<u8>,
}

impl LoginRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + CHALLENGE_RESPONSE_LEN + self.sealed_body.len());
        buf.put_u8(Command::Login.as_u8());
        buf.put_slice(&self.challenge_response);
        buf.put_slice(&self.sealed_body);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data, "login request");
        let cmd = r.u8()?;
        if cmd != Command::Login.as_u8() {
            return Err(AptrustError::UnexpectedCommand(cmd));
        }
        let challenge_response = r.array()?;
        let sealed_body = r.rest();
        if sealed_body.len() < TAG_LEN {
            return Err(AptrustError::MalformedMessage(format!(
                "login request: sealed body of {} bytes",
                sealed_body.len()
            )));
        }
        Ok(Self {
            challenge_response,
            sealed_body: sealed_body.to_vec(),
        })
    }
}

/// Plaintext of the sealed login body.
pub fn encode_login_body(credentials: &Credentials) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(
        1 + 6
            + credentials.identity().len()
            + credentials.secret().len()
            + credentials.device_id().len(),
    );
    buf.put_u8(credentials.kind().wire_id());
    put_prefixed(&mut buf, "identity", credentials.identity().as_bytes())?;
    put_prefixed(&mut buf, "secret", credentials.secret())?;
    put_prefixed(&mut buf, "device_id", credentials.device_id().as_bytes())?;
    Ok(buf)
}

/// Parse an opened login body back into credentials (access point side).
pub fn decode_login_body(data: &[u8]) -> Result<Credentials> {
    let mut r = Reader::new(data, "login body");
    let kind_id = r.u8()?;
    let kind = CredentialKind::from_wire_id(kind_id).ok_or_else(|| {
        AptrustError::MalformedMessage(format!("login body: unknown credential kind 0x{kind_id:02x}"))
    })?;
    let identity = r.prefixed_string("identity")?;
    let secret = r.prefixed()?.to_vec();
    let device_id = r.prefixed_string("device_id")?;
    r.finish()?;
    Ok(Credentials::new(identity, secret, kind, device_id))
}

// ── Login reply ──────────────────────────────────────────────────────────

/// Payload of an auth-successful reply.
#[derive(Clone, PartialEq, Eq)]
pub struct Welcome {
    /// Account name as the access point spells it.
    pub canonical_identity: String,
    pub reusable_credential_kind: CredentialKind,
    /// Credential that can replace the original secret on a later login.
    pub reusable_credential: Vec<u8>,
    /// Two-letter country code of the account.
    pub country_code: String,
}

impl Welcome {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(
            7 + self.canonical_identity.len()
                + self.reusable_credential.len()
                + self.country_code.len(),
        );
        put_prefixed(&mut buf, "canonical_identity", self.canonical_identity.as_bytes())?;
        buf.put_u8(self.reusable_credential_kind.wire_id());
        put_prefixed(&mut buf, "reusable_credential", &self.reusable_credential)?;
        put_prefixed(&mut buf, "country_code", self.country_code.as_bytes())?;
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data, "welcome");
        let canonical_identity = r.prefixed_string("canonical_identity")?;
        let kind_id = r.u8()?;
        let reusable_credential_kind = CredentialKind::from_wire_id(kind_id).ok_or_else(|| {
            AptrustError::MalformedMessage(format!("welcome: unknown credential kind 0x{kind_id:02x}"))
        })?;
        let reusable_credential = r.prefixed()?.to_vec();
        let country_code = r.prefixed_string("country_code")?;
        r.finish()?;
        Ok(Self {
            canonical_identity,
            reusable_credential_kind,
            reusable_credential,
            country_code,
        })
    }
}

impl Drop for Welcome {
    fn drop(&mut self) {
        self.reusable_credential.zeroize();
    }
}

impl fmt::Debug for Welcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Welcome")
            .field("canonical_identity", &self.canonical_identity)
            .field("reusable_credential_kind", &self.reusable_credential_kind)
            .field("reusable_credential", &"<redacted>")
            .field("country_code", &self.country_code)
            .finish()
    }
}

/// Message 4: access point -> client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginReply {
    /// `AuthSuccessful` or `AuthDeclined`.
    pub command: Command,
    /// Reply body sealed by the server->client cipher at nonce 0.
    pub sealed_body: Vec<u8>,
}

impl LoginReply {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.sealed_body.len());
        buf.put_u8(self.command.as_u8());
        buf.put_slice(&self.sealed_body);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data, "login reply");
        let byte = r.u8()?;
        let command = match Command::try_from(byte) {
            Ok(cmd @ (Command::AuthSuccessful | Command::AuthDeclined)) => cmd,
            _ => return Err(AptrustError::UnexpectedCommand(byte)),
        };
        let sealed_body = r.rest();
        if sealed_body.len() < TAG_LEN {
            return Err(AptrustError::MalformedMessage(format!(
                "login reply: sealed body of {} bytes",
                sealed_body.len()
            )));
        }
        Ok(Self {
            command,
            sealed_body: sealed_body.to_vec(),
        })
    }
}

/// Body of an auth-declined reply.
pub fn encode_decline(reason_code: u32) -> [u8; 4] {
    reason_code.to_be_bytes()
}

pub fn decode_decline(data: &[u8]) -> Result<u32> {
    let mut r = Reader::new(data, "auth declined");
    let code = r.u32()?;
    r.finish()?;
    Ok(code)
}

/// Human-readable label for a decline reason code, for diagnostics only.
pub fn decline_reason_label(reason_code: u32) -> &'static str {
    match reason_code {
        0 => "protocol error",
        2 => "try another access point",
        5 => "bad connection id",
        9 => "travel restriction",
        11 => "premium account required",
        12 => "bad credentials",
        13 => "could not validate credentials",
        14 => "account exists",
        15 => "extra verification required",
        16 => "invalid app key",
        17 => "application banned",
        _ => "unknown",
    }
}

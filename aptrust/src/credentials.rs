// Login credentials supplied by the caller's credential provider.

use std::fmt;

use zeroize::Zeroize;

use crate::handshake::messages::Welcome;

/// Kind of secret material carried in a login request (wire value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    /// Account password (0x00).
    Password,
    /// Reusable credential handed out by a previous welcome (0x01).
    StoredToken,
    /// Token obtained through an interactive login flow (0x03).
    InteractiveToken,
}

impl CredentialKind {
    /// Wire ID used in the login body.
    pub fn wire_id(self) -> u8 {
        match self {
            CredentialKind::Password => 0x00,
            CredentialKind::StoredToken => 0x01,
            CredentialKind::InteractiveToken => 0x03,
        }
    }

    /// Resolve from a wire ID.
    pub fn from_wire_id(id: u8) -> Option<Self> {
        match id {
            0x00 => Some(CredentialKind::Password),
            0x01 => Some(CredentialKind::StoredToken),
            0x03 => Some(CredentialKind::InteractiveToken),
            _ => None,
        }
    }
}

/// Identity, secret and device identifier consumed verbatim by the login packet.
///
/// The secret is wiped when the value is dropped and never appears in `Debug`
/// output.
#[derive(Clone)]
pub struct Credentials {
    identity: String,
    secret: Vec<u8>,
    kind: CredentialKind,
    device_id: String,
}

impl Credentials {
    pub fn new(
        identity: impl Into<String>,
        secret: impl Into<Vec<u8>>,
        kind: CredentialKind,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
            kind,
            device_id: device_id.into(),
        }
    }

    /// Password login.
    pub fn password(
        identity: impl Into<String>,
        password: impl Into<Vec<u8>>,
        device_id: impl Into<String>,
    ) -> Self {
        Self::new(identity, password, CredentialKind::Password, device_id)
    }

    /// Credentials for a follow-up session, built from the reusable credential
    /// in a welcome payload.
    pub fn from_welcome(welcome: &Welcome, device_id: impl Into<String>) -> Self {
        Self::new(
            welcome.canonical_identity.clone(),
            welcome.reusable_credential.clone(),
            welcome.reusable_credential_kind,
            device_id,
        )
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    pub fn kind(&self) -> CredentialKind {
        self.kind
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("kind", &self.kind)
            .field("secret", &"<redacted>")
            .finish_non_exhaustive()
    }
}

// Login handshake drivers: `Initiator` (client) and `Responder` (access point).
//
// Both are sans-IO: they consume and produce message payloads and leave
// framing and sockets to the caller.
//
//   Initiator                           Responder
//     create_hello       --hello-->       process_hello
//     process_response   <--response--
//     create_login       --login-->       process_login
//     process_reply      <--reply--       accept / decline

use std::mem;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::command::Command;
use crate::credentials::Credentials;
use crate::crypto::cipher::{DirectionalCipher, Sealed};
use crate::crypto::kdf::{
    compute_challenge_response, derive_session_keys, verify_challenge_response, SessionKeys,
};
use crate::crypto::signing::{ApSigningKey, ApVerifyingKey};
use crate::crypto::x25519::X25519KeyPair;
use crate::error::{AptrustError, Result};
use crate::handshake::messages::{
    decline_reason_label, decode_decline, decode_login_body, encode_decline, encode_login_body,
    ClientHello, ClientInfo, LoginReply, LoginRequest, PeerResponse, Welcome, CLIENT_NONCE_LEN,
    SALT_LEN,
};
use crate::handshake::state::HandshakeState;

fn transition_error(from: &str, to: &str) -> AptrustError {
    AptrustError::InvalidStateTransition {
        from: from.into(),
        to: to.into(),
    }
}

/// Result of a successful login, client side.
#[derive(Debug)]
pub struct HandshakeOutcome {
    pub welcome: Welcome,
    /// Client -> access point cipher, next nonce 1.
    pub send: DirectionalCipher,
    /// Access point -> client cipher, next nonce 1.
    pub recv: DirectionalCipher,
}

// ── Initiator ────────────────────────────────────────────────────────────

/// Client side of the login handshake.
#[derive(Debug)]
pub struct Initiator {
    info: ClientInfo,
    preset: Option<(X25519KeyPair, [u8; CLIENT_NONCE_LEN])>,
    pinned: Option<ApVerifyingKey>,
    state: HandshakeState,
}

impl Initiator {
    pub fn new(info: ClientInfo) -> Self {
        Self {
            info,
            preset: None,
            pinned: None,
            state: HandshakeState::Init,
        }
    }

    /// Use a fixed ephemeral keypair and client nonce instead of fresh random
    /// ones. Intended for reproducible test vectors.
    pub fn with_ephemeral(
        info: ClientInfo,
        ephemeral: X25519KeyPair,
        nonce: [u8; CLIENT_NONCE_LEN],
    ) -> Self {
        Self {
            preset: Some((ephemeral, nonce)),
            ..Self::new(info)
        }
    }

    /// Require the peer response to be signed by this access point key.
    pub fn pin_access_point(mut self, key: ApVerifyingKey) -> Self {
        self.pinned = Some(key);
        self
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Session keys, once the peer response has been processed and until the
    /// login request consumes them.
    pub fn derived_keys(&self) -> Option<&SessionKeys> {
        match &self.state {
            HandshakeState::PeerResponseReceived { keys, .. } => Some(keys),
            _ => None,
        }
    }

    /// Step 1: build the client hello payload.
    pub fn create_hello(&mut self) -> Result<Vec<u8>> {
        if !matches!(self.state, HandshakeState::Init) {
            return Err(transition_error(self.state.label(), "HelloSent"));
        }

        let (ephemeral, nonce) = match self.preset.take() {
            Some(preset) => preset,
            None => {
                let mut nonce = [0u8; CLIENT_NONCE_LEN];
                OsRng.fill_bytes(&mut nonce);
                (X25519KeyPair::generate(), nonce)
            }
        };

        let hello = ClientHello {
            info: self.info,
            nonce,
            public_key: ephemeral.public_key_bytes(),
        }
        .encode();

        tracing::debug!(len = hello.len(), "client hello built");
        self.state = HandshakeState::HelloSent {
            ephemeral,
            hello: hello.clone(),
        };
        Ok(hello)
    }

    /// Step 2: absorb the peer response and derive the session keys.
    pub fn process_response(&mut self, payload: &[u8]) -> Result<()> {
        let (ephemeral, hello) = match self.take_state() {
            HandshakeState::HelloSent { ephemeral, hello } => (ephemeral, hello),
            other => return Err(self.restore(other, "PeerResponseReceived")),
        };

        let result = self.derive_from_response(&ephemeral, hello, payload);
        self.settle(result)
    }

    fn derive_from_response(
        &self,
        ephemeral: &X25519KeyPair,
        hello: Vec<u8>,
        payload: &[u8],
    ) -> Result<HandshakeState> {
        let response = PeerResponse::decode(payload)?;

        if let Some(pinned) = &self.pinned {
            let signature = response.signature.ok_or_else(|| {
                AptrustError::CryptoMismatch("access point response is not signed".into())
            })?;
            pinned.verify(&response.public_key, &signature)?;
        }

        let shared = ephemeral.diffie_hellman(&response.public_key)?;
        let mut transcript = hello;
        transcript.extend_from_slice(payload);
        let keys = derive_session_keys(&shared, &response.salt, &transcript)?;

        tracing::debug!(
            transcript_len = transcript.len(),
            signed = response.signature.is_some(),
            "session keys derived"
        );
        Ok(HandshakeState::PeerResponseReceived { keys, transcript })
    }

    /// Step 3: build the login request carrying the challenge response and
    /// the sealed credentials.
    pub fn create_login(&mut self, credentials: &Credentials) -> Result<Vec<u8>> {
        let (keys, transcript) = match self.take_state() {
            HandshakeState::PeerResponseReceived { keys, transcript } => (keys, transcript),
            other => return Err(self.restore(other, "LoginSent")),
        };

        let result = (|| -> Result<(Vec<u8>, HandshakeState)> {
            let challenge_response = compute_challenge_response(&keys.challenge_key, &transcript)?;
            let mut send = DirectionalCipher::new(keys.client_to_server.clone());
            let recv = DirectionalCipher::new(keys.server_to_client.clone());

            let mut body = encode_login_body(credentials)?;
            let sealed = send.seal(Command::Login.as_u8(), &body);
            body.zeroize();

            let packet = LoginRequest {
                challenge_response,
                sealed_body: sealed?.into_bytes(),
            }
            .encode();
            tracing::debug!(len = packet.len(), kind = ?credentials.kind(), "login request built");
            Ok((packet, HandshakeState::LoginSent { send, recv }))
        })();

        match result {
            Ok((packet, next)) => {
                self.state = next;
                Ok(packet)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Step 4: open the login reply.
    ///
    /// On success the directional ciphers move into the outcome with both
    /// counters at 1. A decline surfaces the raw reason code.
    pub fn process_reply(&mut self, payload: &[u8]) -> Result<HandshakeOutcome> {
        let (send, mut recv) = match self.take_state() {
            HandshakeState::LoginSent { send, recv } => (send, recv),
            other => return Err(self.restore(other, "Authenticated")),
        };

        let result = (|| -> Result<Welcome> {
            let reply = LoginReply::decode(payload)?;
            let (ciphertext, tag) = Sealed::split(&reply.sealed_body)?;
            let body = recv
                .open(reply.command.as_u8(), ciphertext, tag)
                .map_err(|_| AptrustError::CryptoMismatch("login reply tag mismatch".into()))?;

            match reply.command {
                Command::AuthSuccessful => Welcome::decode(&body),
                Command::AuthDeclined => {
                    let reason_code = decode_decline(&body)?;
                    tracing::info!(
                        reason_code,
                        reason = decline_reason_label(reason_code),
                        "login declined"
                    );
                    Err(AptrustError::AuthDeclined { reason_code })
                }
                other => Err(AptrustError::UnexpectedCommand(other.as_u8())),
            }
        })();

        match result {
            Ok(welcome) => {
                self.state = HandshakeState::Authenticated;
                tracing::debug!(
                    send_nonce = send.nonce(),
                    recv_nonce = recv.nonce(),
                    "handshake complete"
                );
                Ok(HandshakeOutcome {
                    welcome,
                    send,
                    recv,
                })
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn take_state(&mut self) -> HandshakeState {
        mem::replace(
            &mut self.state,
            HandshakeState::Failed {
                reason: "handshake interrupted".into(),
            },
        )
    }

    fn restore(&mut self, state: HandshakeState, to: &str) -> AptrustError {
        let err = transition_error(state.label(), to);
        self.state = state;
        err
    }

    fn settle(&mut self, result: Result<HandshakeState>) -> Result<()> {
        match result {
            Ok(next) => {
                self.state = next;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&mut self, err: AptrustError) -> AptrustError {
        tracing::debug!(error = %err, "handshake failed");
        self.state = HandshakeState::Failed {
            reason: err.to_string(),
        };
        err
    }
}

// ── Responder ────────────────────────────────────────────────────────────

/// Result of accepting a login, access point side.
#[derive(Debug)]
pub struct ResponderOutcome {
    /// Encoded auth-successful reply to send back.
    pub reply: Vec<u8>,
    /// Access point -> client cipher, next nonce 1.
    pub send: DirectionalCipher,
    /// Client -> access point cipher, next nonce 1.
    pub recv: DirectionalCipher,
}

#[derive(Debug)]
enum ResponderState {
    AwaitingHello,
    AwaitingLogin {
        keys: SessionKeys,
        transcript: Vec<u8>,
    },
    LoginVerified {
        send: DirectionalCipher,
        recv: DirectionalCipher,
    },
    Finished,
    Failed,
}

impl ResponderState {
    fn label(&self) -> &'static str {
        match self {
            ResponderState::AwaitingHello => "AwaitingHello",
            ResponderState::AwaitingLogin { .. } => "AwaitingLogin",
            ResponderState::LoginVerified { .. } => "LoginVerified",
            ResponderState::Finished => "Finished",
            ResponderState::Failed => "Failed",
        }
    }
}

/// Access point side of the login handshake.
#[derive(Debug)]
pub struct Responder {
    signing_key: Option<ApSigningKey>,
    preset: Option<(X25519KeyPair, [u8; SALT_LEN])>,
    state: ResponderState,
}

impl Default for Responder {
    fn default() -> Self {
        Self::new()
    }
}

impl Responder {
    pub fn new() -> Self {
        Self {
            signing_key: None,
            preset: None,
            state: ResponderState::AwaitingHello,
        }
    }

    /// Sign the ephemeral public value in every peer response.
    pub fn with_signing_key(mut self, key: ApSigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Use a fixed ephemeral keypair and salt (test vectors).
    pub fn with_ephemeral(mut self, ephemeral: X25519KeyPair, salt: [u8; SALT_LEN]) -> Self {
        self.preset = Some((ephemeral, salt));
        self
    }

    /// Answer a client hello with the peer response payload.
    pub fn process_hello(&mut self, hello: &[u8]) -> Result<Vec<u8>> {
        if !matches!(self.state, ResponderState::AwaitingHello) {
            return Err(transition_error(self.state.label(), "AwaitingLogin"));
        }

        let result = (|| -> Result<(Vec<u8>, ResponderState)> {
            let parsed = ClientHello::decode(hello)?;
            let (ephemeral, salt) = match self.preset.take() {
                Some(preset) => preset,
                None => {
                    let mut salt = [0u8; SALT_LEN];
                    OsRng.fill_bytes(&mut salt);
                    (X25519KeyPair::generate(), salt)
                }
            };

            let public_key = ephemeral.public_key_bytes();
            let response = PeerResponse {
                public_key,
                salt,
                signature: self.signing_key.as_ref().map(|k| k.sign(&public_key)),
            }
            .encode();

            let shared = ephemeral.diffie_hellman(&parsed.public_key)?;
            let mut transcript = Vec::with_capacity(hello.len() + response.len());
            transcript.extend_from_slice(hello);
            transcript.extend_from_slice(&response);
            let keys = derive_session_keys(&shared, &salt, &transcript)?;

            tracing::debug!(client_version = parsed.info.version, "client hello accepted");
            Ok((response, ResponderState::AwaitingLogin { keys, transcript }))
        })();

        self.advance(result)
    }

    /// Verify the challenge response and open the sealed login body.
    pub fn process_login(&mut self, login: &[u8]) -> Result<Credentials> {
        let (keys, transcript) = match mem::replace(&mut self.state, ResponderState::Failed) {
            ResponderState::AwaitingLogin { keys, transcript } => (keys, transcript),
            other => {
                let err = transition_error(other.label(), "LoginVerified");
                self.state = other;
                return Err(err);
            }
        };

        let result = (|| -> Result<(Credentials, ResponderState)> {
            let request = LoginRequest::decode(login)?;
            verify_challenge_response(
                &keys.challenge_key,
                &transcript,
                &request.challenge_response,
            )?;

            let send = DirectionalCipher::new(keys.server_to_client.clone());
            let mut recv = DirectionalCipher::new(keys.client_to_server.clone());
            let (ciphertext, tag) = Sealed::split(&request.sealed_body)?;
            let mut body = recv
                .open(Command::Login.as_u8(), ciphertext, tag)
                .map_err(|_| AptrustError::CryptoMismatch("login body tag mismatch".into()))?;
            let credentials = decode_login_body(&body);
            body.zeroize();

            Ok((credentials?, ResponderState::LoginVerified { send, recv }))
        })();

        self.advance(result)
    }

    /// Accept the verified login with the given welcome payload.
    pub fn accept(&mut self, welcome: &Welcome) -> Result<ResponderOutcome> {
        let (mut send, recv) = self.take_verified("Finished")?;
        let result = (|| -> Result<Vec<u8>> {
            let body = welcome.encode()?;
            let sealed = send.seal(Command::AuthSuccessful.as_u8(), &body)?;
            Ok(LoginReply {
                command: Command::AuthSuccessful,
                sealed_body: sealed.into_bytes(),
            }
            .encode())
        })();

        let reply = self.advance(result.map(|reply| (reply, ResponderState::Finished)))?;
        Ok(ResponderOutcome { reply, send, recv })
    }

    /// Decline the verified login with a reason code.
    pub fn decline(&mut self, reason_code: u32) -> Result<Vec<u8>> {
        let (mut send, _recv) = self.take_verified("Finished")?;
        let result = send
            .seal(Command::AuthDeclined.as_u8(), &encode_decline(reason_code))
            .map(|sealed| {
                let reply = LoginReply {
                    command: Command::AuthDeclined,
                    sealed_body: sealed.into_bytes(),
                }
                .encode();
                (reply, ResponderState::Finished)
            });
        tracing::debug!(reason_code, "declining login");
        self.advance(result)
    }

    fn take_verified(&mut self, to: &str) -> Result<(DirectionalCipher, DirectionalCipher)> {
        match mem::replace(&mut self.state, ResponderState::Failed) {
            ResponderState::LoginVerified { send, recv } => Ok((send, recv)),
            other => {
                let err = transition_error(other.label(), to);
                self.state = other;
                Err(err)
            }
        }
    }

    fn advance<T>(&mut self, result: Result<(T, ResponderState)>) -> Result<T> {
        match result {
            Ok((value, next)) => {
                self.state = next;
                Ok(value)
            }
            Err(e) => {
                tracing::debug!(error = %e, "responder handshake failed");
                self.state = ResponderState::Failed;
                Err(e)
            }
        }
    }
}

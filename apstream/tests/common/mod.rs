//! Shared helpers: a scripted access point and pre-keyed transport pairs.

#![allow(dead_code)]

use std::time::Duration;

use aptrust::crypto::kdf::DirectionKeys;
use aptrust::{CredentialKind, Credentials, DirectionalCipher, Responder, ResponderOutcome, Welcome};
use apstream::{EncryptedTransport, PlainTransport};
use tokio::io::{duplex, AsyncRead, AsyncWrite, DuplexStream};

pub const IO_TIMEOUT: Duration = Duration::from_secs(2);
pub const PIPE_CAPACITY: usize = 256 * 1024;

pub fn creds() -> Credentials {
    Credentials::password("alice", b"hunter2".to_vec(), "dev-1")
}

pub fn welcome() -> Welcome {
    Welcome {
        canonical_identity: "alice".into(),
        reusable_credential_kind: CredentialKind::StoredToken,
        reusable_credential: vec![0xc0, 0xff, 0xee],
        country_code: "SE".into(),
    }
}

/// How the scripted access point answers the login.
pub enum Verdict {
    Accept(Welcome),
    Decline(u32),
}

/// Access point half of the handshake over a plain transport.
///
/// Returns the plain transport and, on accept, the access point's ciphers.
pub async fn serve_handshake<S>(
    stream: S,
    mut responder: Responder,
    verdict: Verdict,
) -> (PlainTransport<S>, Option<ResponderOutcome>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut plain = PlainTransport::new(stream, IO_TIMEOUT);

    let hello = plain.read_frame().await.expect("hello");
    let response = responder.process_hello(&hello).expect("process hello");
    plain.write_frame(&response).await.expect("write response");

    let login = plain.read_frame().await.expect("login");
    let seen = responder.process_login(&login).expect("process login");
    assert_eq!(seen.identity(), "alice");

    match verdict {
        Verdict::Accept(welcome) => {
            let outcome = responder.accept(&welcome).expect("accept");
            plain.write_frame(&outcome.reply).await.expect("write reply");
            (plain, Some(outcome))
        }
        Verdict::Decline(code) => {
            let reply = responder.decline(code).expect("decline");
            plain.write_frame(&reply).await.expect("write reply");
            (plain, None)
        }
    }
}

/// Accept the login and keep serving as an encrypted transport.
pub async fn serve_and_accept<S>(stream: S) -> EncryptedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (plain, outcome) =
        serve_handshake(stream, Responder::new(), Verdict::Accept(welcome())).await;
    let outcome = outcome.expect("accepted");
    EncryptedTransport::new(plain, outcome.send, outcome.recv)
}

pub fn keys(seed: u8) -> DirectionKeys {
    DirectionKeys {
        cipher_key: [seed; 32],
        mac_key: [seed ^ 0xff; 32],
    }
}

/// Client-to-server and server-to-client ciphers for a pre-keyed pair.
pub fn ciphers() -> (DirectionalCipher, DirectionalCipher) {
    (DirectionalCipher::new(keys(0x11)), DirectionalCipher::new(keys(0x22)))
}

/// Two encrypted transports wired to each other without a handshake.
pub fn encrypted_pair() -> (
    EncryptedTransport<DuplexStream>,
    EncryptedTransport<DuplexStream>,
) {
    let (a, b) = duplex(PIPE_CAPACITY);
    let (c2s, s2c) = ciphers();
    let (c2s_peer, s2c_peer) = ciphers();
    let client = EncryptedTransport::new(PlainTransport::new(a, IO_TIMEOUT), c2s, s2c);
    let server = EncryptedTransport::new(PlainTransport::new(b, IO_TIMEOUT), s2c_peer, c2s_peer);
    (client, server)
}

/// An encrypted client transport facing a raw stream, so tests can inject
/// arbitrary bytes. The returned cipher seals frames the client will accept.
pub fn encrypted_vs_raw() -> (
    EncryptedTransport<DuplexStream>,
    DuplexStream,
    DirectionalCipher,
) {
    let (a, b) = duplex(PIPE_CAPACITY);
    let (c2s, s2c) = ciphers();
    let (_, s2c_peer) = ciphers();
    let client = EncryptedTransport::new(PlainTransport::new(a, IO_TIMEOUT), c2s, s2c);
    (client, b, s2c_peer)
}

/// Encode a frame sealed by `cipher` into wire bytes.
pub fn sealed_bytes(cipher: &mut DirectionalCipher, command: u8, payload: &[u8]) -> Vec<u8> {
    let sealed = cipher.seal(command, payload).expect("seal");
    let mut out = vec![command];
    out.extend_from_slice(&(sealed.ciphertext.len() as u16).to_be_bytes());
    out.extend_from_slice(&sealed.ciphertext);
    out.extend_from_slice(&sealed.tag);
    out
}

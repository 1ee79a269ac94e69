//! Session lifecycle: resolve, connect, authenticate, then route every frame
//! through the encrypted transport until closed.
//!
//! ```text
//! Disconnected -> PlainConnected -> Authenticating -> Authenticated
//!       \               \                 \                 \
//!        +---------------+-----------------+-----------------+--> Closed
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::time::Duration;

use aptrust::{Command, Credentials, Initiator, Welcome};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};

use crate::config::SessionConfig;
use crate::encrypted::EncryptedTransport;
use crate::error::{ApStreamError, Result};
use crate::frame::Frame;
use crate::plain::PlainTransport;
use crate::resolver::{AccessPointResolver, Endpoint};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    PlainConnected,
    Authenticating,
    Authenticated,
    Closed,
}

impl SessionState {
    pub fn label(self) -> &'static str {
        match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::PlainConnected => "PlainConnected",
            SessionState::Authenticating => "Authenticating",
            SessionState::Authenticated => "Authenticated",
            SessionState::Closed => "Closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What to do when the external keepalive supervisor fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutAction {
    Ignore,
    /// Send a ping and close unless a pong arrives within `window`.
    Ping { window: Duration },
    Close,
}

/// Decides the reaction to [`SessionController::trigger_timeout`].
pub trait TimeoutPolicy: Send + Sync {
    fn on_timeout(&self, state: SessionState) -> TimeoutAction;
}

impl<F> TimeoutPolicy for F
where
    F: Fn(SessionState) -> TimeoutAction + Send + Sync,
{
    fn on_timeout(&self, state: SessionState) -> TimeoutAction {
        self(state)
    }
}

/// Ping when authenticated, close otherwise.
#[derive(Debug, Clone, Copy)]
pub struct KeepalivePolicy {
    pub window: Duration,
}

impl TimeoutPolicy for KeepalivePolicy {
    fn on_timeout(&self, state: SessionState) -> TimeoutAction {
        match state {
            SessionState::Authenticated => TimeoutAction::Ping {
                window: self.window,
            },
            _ => TimeoutAction::Close,
        }
    }
}

enum ActiveTransport<S> {
    None,
    Plain(PlainTransport<S>),
    Encrypted(EncryptedTransport<S>),
}

/// Single entry point for one device's session with an access point.
pub struct SessionController<S> {
    config: SessionConfig,
    credentials: Credentials,
    state: SessionState,
    transport: ActiveTransport<S>,
    welcome: Option<Welcome>,
    pending: VecDeque<Frame>,
    timeout_policy: Box<dyn TimeoutPolicy>,
}

impl<S> fmt::Debug for SessionController<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state)
            .field("credentials", &self.credentials)
            .field("welcome", &self.welcome)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl SessionController<TcpStream> {
    /// Resolve an access point and open a plain TCP connection to it.
    ///
    /// Resolution and connect failures leave the session `Disconnected` so
    /// the caller may try again, possibly landing on another access point.
    pub async fn connect_with_random_ap(&mut self) -> Result<Endpoint> {
        self.require(SessionState::Disconnected, SessionState::PlainConnected)?;

        let endpoint = AccessPointResolver::from_config(&self.config)
            .resolve_endpoint()
            .await?;
        let transport = PlainTransport::connect(
            &endpoint,
            self.config.connect_timeout(),
            self.config.io_timeout(),
        )
        .await?;
        self.connect(transport)?;
        Ok(endpoint)
    }
}

impl<S> SessionController<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// New disconnected session. The device id comes from `credentials` and
    /// is fixed for the session's lifetime.
    pub fn new(config: SessionConfig, credentials: Credentials) -> Result<Self> {
        config.validate()?;
        let timeout_policy = Box::new(KeepalivePolicy {
            window: config.keepalive_window(),
        });
        Ok(Self {
            config,
            credentials,
            state: SessionState::Disconnected,
            transport: ActiveTransport::None,
            welcome: None,
            pending: VecDeque::new(),
            timeout_policy,
        })
    }

    /// Replace the default keepalive policy.
    pub fn with_timeout_policy(mut self, policy: impl TimeoutPolicy + 'static) -> Self {
        self.timeout_policy = Box::new(policy);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn device_id(&self) -> &str {
        self.credentials.device_id()
    }

    /// Welcome payload of the login, once authenticated.
    pub fn welcome(&self) -> Option<&Welcome> {
        self.welcome.as_ref()
    }

    pub fn country_code(&self) -> Option<&str> {
        self.welcome.as_ref().map(|w| w.country_code.as_str())
    }

    pub fn canonical_identity(&self) -> Option<&str> {
        self.welcome.as_ref().map(|w| w.canonical_identity.as_str())
    }

    /// Send-side and receive-side nonce counters of the encrypted transport.
    pub fn nonces(&self) -> Option<(u32, u32)> {
        match &self.transport {
            ActiveTransport::Encrypted(t) => Some((t.send_nonce(), t.recv_nonce())),
            _ => None,
        }
    }

    /// Adopt an already connected plain transport.
    pub fn connect(&mut self, transport: PlainTransport<S>) -> Result<()> {
        self.require(SessionState::Disconnected, SessionState::PlainConnected)?;
        self.transport = ActiveTransport::Plain(transport);
        self.transition(SessionState::PlainConnected);
        Ok(())
    }

    /// Run the login handshake over the plain transport and switch to the
    /// encrypted transport.
    ///
    /// Returns the reusable credential from the welcome payload. Any failure
    /// closes the session; retrying needs a new controller and transport.
    ///
    /// If the returned future is dropped before it completes, the session
    /// stays `Authenticating` with the half-used plain transport still owned.
    /// Only [`close`](Self::close) is legal from there.
    pub async fn authenticate(&mut self) -> Result<Vec<u8>> {
        self.require(SessionState::PlainConnected, SessionState::Authenticating)?;
        if !matches!(self.transport, ActiveTransport::Plain(_)) {
            return Err(self.state_error(SessionState::Authenticating));
        }
        self.transition(SessionState::Authenticating);

        let ActiveTransport::Plain(plain) = &mut self.transport else {
            return Err(ApStreamError::InvalidStateTransition {
                from: SessionState::Authenticating.label().into(),
                to: SessionState::Authenticated.label().into(),
            });
        };
        let result = run_handshake(&self.config, &self.credentials, plain).await;

        match result {
            Ok(outcome) => {
                let plain = match mem::replace(&mut self.transport, ActiveTransport::None) {
                    ActiveTransport::Plain(plain) => plain,
                    _ => return Err(self.state_error(SessionState::Authenticated)),
                };
                let credential = outcome.welcome.reusable_credential.clone();
                tracing::info!(
                    country = %outcome.welcome.country_code,
                    "authenticated"
                );
                self.transport = ActiveTransport::Encrypted(EncryptedTransport::new(
                    plain,
                    outcome.send,
                    outcome.recv,
                ));
                self.welcome = Some(outcome.welcome);
                self.transition(SessionState::Authenticated);
                Ok(credential)
            }
            Err(err) => {
                tracing::warn!(error = %err, "authentication failed");
                self.close().await?;
                Err(err)
            }
        }
    }

    /// Send one command frame over the encrypted transport.
    pub async fn send_frame(&mut self, command: Command, payload: &[u8]) -> Result<()> {
        let result = self.encrypted(SessionState::Authenticated)?
            .send_frame(command, payload)
            .await;
        self.check(result)
    }

    /// Next frame from the peer, oldest queued frame first.
    pub async fn receive_frame(&mut self) -> Result<Frame> {
        self.encrypted(SessionState::Authenticated)?;
        if let Some(frame) = self.pending.pop_front() {
            return Ok(frame);
        }
        let result = self.encrypted(SessionState::Authenticated)?.receive_frame().await;
        self.check(result)
    }

    /// Like [`receive_frame`](Self::receive_frame) with a deadline. Running
    /// out of time is reported as `Timeout` and leaves the session open.
    pub async fn receive_frame_within(&mut self, window: Duration) -> Result<Frame> {
        self.encrypted(SessionState::Authenticated)?;
        if let Some(frame) = self.pending.pop_front() {
            return Ok(frame);
        }
        let result = self
            .encrypted(SessionState::Authenticated)?
            .receive_frame_within(window)
            .await;
        self.check(result)
    }

    /// Hook for an external keepalive supervisor. The reaction comes from
    /// the configured [`TimeoutPolicy`].
    pub async fn trigger_timeout(&mut self) -> Result<()> {
        let action = self.timeout_policy.on_timeout(self.state);
        tracing::debug!(state = %self.state, ?action, "timeout triggered");
        match action {
            TimeoutAction::Ignore => Ok(()),
            TimeoutAction::Close => self.close().await,
            TimeoutAction::Ping { window } => self.ping(window).await,
        }
    }

    /// Frames other than the pong are queued for later `receive_frame`
    /// calls, so the queue is bounded by what the peer sends within
    /// `window`. Unknown commands are skipped and do not end the wait.
    async fn ping(&mut self, window: Duration) -> Result<()> {
        let mut token = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut token);
        self.send_frame(Command::Ping, &token).await?;

        let deadline = Instant::now() + window;
        loop {
            let transport = self.encrypted(SessionState::Authenticated)?;
            let received = timeout_at(deadline, transport.receive_frame()).await;
            let frame = match received {
                Ok(Ok(frame)) => frame,
                Ok(Err(ApStreamError::UnknownCommand(byte))) => {
                    tracing::debug!(command = byte, "skipping unknown command while awaiting pong");
                    continue;
                }
                Ok(Err(err)) => return self.check(Err(err)),
                Err(_) => {
                    tracing::warn!(window_ms = window.as_millis() as u64, "no pong, closing");
                    self.close().await?;
                    return Err(ApStreamError::Timeout);
                }
            };
            match frame.command {
                Command::Pong if frame.payload[..] == token[..] => return Ok(()),
                Command::PongAck => return Ok(()),
                _ => self.pending.push_back(frame),
            }
        }
    }

    /// Tear down whichever transport is active. Always legal, idempotent.
    pub async fn close(&mut self) -> Result<()> {
        let result = match mem::replace(&mut self.transport, ActiveTransport::None) {
            ActiveTransport::None => Ok(()),
            ActiveTransport::Plain(mut plain) => plain.close().await,
            ActiveTransport::Encrypted(mut encrypted) => encrypted.close().await,
        };
        if let Err(err) = result {
            tracing::debug!(error = %err, "error while closing transport");
        }
        self.pending.clear();
        if self.state != SessionState::Closed {
            self.transition(SessionState::Closed);
        }
        Ok(())
    }

    fn encrypted(&mut self, needed: SessionState) -> Result<&mut EncryptedTransport<S>> {
        if self.state != needed {
            return Err(self.state_error(needed));
        }
        match &mut self.transport {
            ActiveTransport::Encrypted(t) => Ok(t),
            _ => Err(ApStreamError::InvalidStateTransition {
                from: self.state.label().into(),
                to: needed.label().into(),
            }),
        }
    }

    /// Move to `Closed` when the transport has torn itself down.
    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            let dead = match &self.transport {
                ActiveTransport::Encrypted(t) => t.is_closed(),
                _ => true,
            };
            if dead {
                self.transport = ActiveTransport::None;
                self.pending.clear();
                self.transition(SessionState::Closed);
            }
        }
        result
    }

    fn require(&self, expected: SessionState, to: SessionState) -> Result<()> {
        if self.state != expected {
            return Err(self.state_error(to));
        }
        Ok(())
    }

    fn state_error(&self, to: SessionState) -> ApStreamError {
        ApStreamError::InvalidStateTransition {
            from: self.state.label().into(),
            to: to.label().into(),
        }
    }

    fn transition(&mut self, to: SessionState) {
        tracing::debug!(from = %self.state, to = %to, "session state");
        self.state = to;
    }
}

async fn run_handshake<S>(
    config: &SessionConfig,
    credentials: &Credentials,
    plain: &mut PlainTransport<S>,
) -> Result<aptrust::HandshakeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut initiator = Initiator::new(config.client_info());
    if let Some(key) = config.verifying_key()? {
        initiator = initiator.pin_access_point(key);
    }

    plain.write_frame(&initiator.create_hello()?).await?;
    let response = plain.read_frame().await?;
    initiator.process_response(&response)?;

    plain.write_frame(&initiator.create_login(credentials)?).await?;
    let reply = plain.read_frame().await?;
    Ok(initiator.process_reply(&reply)?)
}

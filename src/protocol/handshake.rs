//! Gate login handshake.
//!
//! The gate accepts no application traffic until the client has logged in.
//! The exchange is a single request followed by a wait:
//!
//! ```text
//! Idle ──send login(8001, user, pass)──► AwaitingResponse
//! AwaitingResponse ──8501──► Authenticated
//! AwaitingResponse ──8502 + reason──► Rejected(reason)
//! AwaitingResponse ──anything else──► AwaitingResponse (ignored)
//! ```
//!
//! **Per-connection state**
//! Instead of a process-wide "authenticated" flag, a successful run returns an
//! [`Authenticated`] token. The outbound serializer and inbound reader both
//! require a reference to it, so neither can be started on a connection that
//! has not logged in.

use futures::{SinkExt, StreamExt};
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, warn};

use crate::config::{CMD_AUTH_FAIL, CMD_AUTH_SUCCESS, CMD_LOGIN};
use crate::core::codec::{GateCodec, GateItem};
use crate::core::packet::{InboundFrame, OutboundFrame, WireFrame};
use crate::error::{constants, BridgeError, Result};

/// Gate login name and password
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supplies gate credentials at connect time
pub trait CredentialSource: Send + Sync {
    fn credentials(&self) -> Result<Credentials>;
}

impl CredentialSource for Credentials {
    fn credentials(&self) -> Result<Credentials> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    AwaitingResponse,
    Authenticated,
    Rejected(String),
}

/// Proof that the login exchange completed on this connection.
#[derive(Debug)]
pub struct Authenticated {
    ignored_frames: usize,
}

impl Authenticated {
    /// Frames received and discarded while waiting for the verdict
    pub fn ignored_frames(&self) -> usize {
        self.ignored_frames
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self { ignored_frames: 0 }
    }
}

/// Build the login request frame.
pub fn login_frame(credentials: &Credentials) -> Result<WireFrame> {
    let mut frame = OutboundFrame::new(CMD_LOGIN);
    frame.write_str(&credentials.username)?;
    frame.write_str(&credentials.password)?;
    Ok(frame.build())
}

/// One-shot login driver for a single connection
pub struct AuthHandshake {
    credentials: Credentials,
    state: HandshakeState,
}

impl AuthHandshake {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: HandshakeState::Idle,
        }
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Send the login request and block until the gate answers.
    ///
    /// Frames other than the two sentinels are ignored. There is no timeout:
    /// the call returns only on a verdict, end of stream, or an I/O error.
    ///
    /// # Errors
    /// - `AuthRejected(reason)` when the gate refuses the login
    /// - `ConnectionClosed` / `Io` on transport failure (never retried)
    /// - `HandshakeError` if called a second time
    #[instrument(skip_all, fields(username = %self.credentials.username))]
    pub async fn run<T>(&mut self, framed: &mut Framed<T, GateCodec>) -> Result<Authenticated>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        if self.state != HandshakeState::Idle {
            return Err(BridgeError::HandshakeError(
                constants::ERR_HANDSHAKE_ALREADY_RUN.into(),
            ));
        }

        let login = login_frame(&self.credentials)?;
        self.state = HandshakeState::AwaitingResponse;
        info!("Authenticating with gate");
        framed.send(login).await?;

        let mut ignored_frames = 0usize;
        loop {
            let remainder = match framed.next().await {
                None => return Err(BridgeError::ConnectionClosed),
                Some(Err(e)) => return Err(e),
                Some(Ok(GateItem::Empty(length))) => {
                    debug!(length, "Ignoring empty frame during handshake");
                    ignored_frames += 1;
                    continue;
                }
                Some(Ok(GateItem::Frame(remainder))) => remainder,
            };

            let mut frame = match InboundFrame::parse(remainder) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(error = %e, "Ignoring malformed frame during handshake");
                    ignored_frames += 1;
                    continue;
                }
            };

            match frame.command() {
                CMD_AUTH_SUCCESS => {
                    self.state = HandshakeState::Authenticated;
                    info!(ignored_frames, "Authentication succeeded");
                    return Ok(Authenticated { ignored_frames });
                }
                CMD_AUTH_FAIL => {
                    let reason = frame.read_str();
                    warn!(reason = %reason, "Authentication failed");
                    self.state = HandshakeState::Rejected(reason.clone());
                    return Err(BridgeError::AuthRejected(reason));
                }
                command => {
                    debug!(command, "Ignoring frame before authentication");
                    ignored_frames += 1;
                }
            }
        }
    }
}

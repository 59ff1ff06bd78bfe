//! Handshake state machine
//!
//! ```text
//! Disconnected ──begin──▶ Handshaking ──token seen──▶ Connected
//!       ▲                     │
//!       │                  deadline
//!       │                     ▼
//!       └──────(begin)──── Faulted
//! ```
//!
//! A connected responder also answers a repeated greeting, so a host that
//! restarts can reconnect without the firmware being re-armed.

use thiserror::Error;

use super::matcher::TokenMatcher;
use crate::config::{HandshakeRole, LinkConfig, Token};
use crate::traits::{LinkError, Transport};

/// Handshake states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandshakeState {
    /// No handshake armed; data frames are ignored
    Disconnected,
    /// Waiting for the peer's token
    Handshaking,
    /// Peer answered; data frames flow
    Connected,
    /// Deadline passed without the peer's token
    Faulted,
}

/// Handshake failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandshakeError {
    /// `begin` called while a handshake is outstanding or established
    #[error("handshake already active ({0:?})")]
    AlreadyActive(HandshakeState),
    /// No token from the peer before the deadline
    #[error("handshake timed out")]
    Timeout,
    /// Writing a token failed
    #[error("handshake link error: {0}")]
    Link(LinkError),
}

/// Drives the greeting exchange for one connection
#[derive(Debug, Clone)]
pub struct Handshake {
    state: HandshakeState,
    role: HandshakeRole,
    greeting: Token,
    ack: Token,
    timeout_ms: u32,
    elapsed_ms: u32,
    matcher: TokenMatcher,
}

impl Handshake {
    /// Create a disconnected handshake from the link configuration
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            state: HandshakeState::Disconnected,
            role: config.role,
            greeting: config.greeting.clone(),
            ack: config.ack.clone(),
            timeout_ms: config.handshake_timeout_ms,
            elapsed_ms: 0,
            matcher: TokenMatcher::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// True once the peer has answered
    pub fn is_connected(&self) -> bool {
        self.state == HandshakeState::Connected
    }

    /// Configured role
    pub fn role(&self) -> HandshakeRole {
        self.role
    }

    /// Arm the handshake
    ///
    /// The initiator writes its greeting; the responder only starts
    /// listening. Re-arming from `Faulted` is allowed; calling this while
    /// `Handshaking` or `Connected` is an error.
    pub fn begin<T: Transport>(&mut self, link: &mut T) -> Result<(), HandshakeError> {
        match self.state {
            HandshakeState::Handshaking | HandshakeState::Connected => {
                return Err(HandshakeError::AlreadyActive(self.state));
            }
            HandshakeState::Disconnected | HandshakeState::Faulted => {}
        }

        if self.role == HandshakeRole::Initiator {
            link.write(&self.greeting).map_err(HandshakeError::Link)?;
        }

        self.matcher.reset();
        self.elapsed_ms = 0;
        self.state = HandshakeState::Handshaking;
        debug!("handshake armed as {:?}", self.role);
        Ok(())
    }

    /// Inspect incoming bytes for the peer's token
    ///
    /// Returns `Some(n)` when the token ends at byte `n` of `bytes`; the
    /// remaining bytes belong to the frame reader. The responder writes its
    /// acknowledgement before reporting the match.
    pub fn on_bytes_received<T: Transport>(
        &mut self,
        bytes: &[u8],
        link: &mut T,
    ) -> Result<Option<usize>, HandshakeError> {
        if self.state != HandshakeState::Handshaking {
            return Ok(None);
        }

        let expected = match self.role {
            HandshakeRole::Initiator => &self.ack,
            HandshakeRole::Responder => &self.greeting,
        };
        let Some(end) = bytes
            .iter()
            .position(|&b| self.matcher.push(b, expected))
        else {
            return Ok(None);
        };

        if self.role == HandshakeRole::Responder {
            link.write(&self.ack).map_err(HandshakeError::Link)?;
        }

        self.matcher.reset();
        self.state = HandshakeState::Connected;
        info!("handshake complete after {} ms", self.elapsed_ms);
        Ok(Some(end + 1))
    }

    /// Watch a byte seen between frames for a renewed greeting
    ///
    /// Only a connected responder listens here: a host that restarts greets
    /// again while the firmware still considers the link up. Returns `true`
    /// once the acknowledgement has been written; the caller then starts a
    /// fresh session.
    pub fn on_idle_byte<T: Transport>(
        &mut self,
        byte: u8,
        link: &mut T,
    ) -> Result<bool, HandshakeError> {
        if self.state != HandshakeState::Connected || self.role != HandshakeRole::Responder {
            return Ok(false);
        }
        if !self.matcher.push(byte, &self.greeting) {
            return Ok(false);
        }

        link.write(&self.ack).map_err(HandshakeError::Link)?;
        self.matcher.reset();
        info!("peer greeted again, restarting session");
        Ok(true)
    }

    /// Account for elapsed time while waiting for the peer
    ///
    /// Moves to `Faulted` and returns `Timeout` once the deadline passes.
    pub fn advance_time(&mut self, delta_ms: u32) -> Result<(), HandshakeError> {
        if self.state != HandshakeState::Handshaking {
            return Ok(());
        }

        self.elapsed_ms = self.elapsed_ms.saturating_add(delta_ms);
        if self.elapsed_ms < self.timeout_ms {
            return Ok(());
        }

        self.state = HandshakeState::Faulted;
        warn!("handshake timed out after {} ms", self.elapsed_ms);
        Err(HandshakeError::Timeout)
    }

    /// Drop back to `Disconnected` (link closed or session torn down)
    pub fn disconnect(&mut self) {
        self.matcher.reset();
        self.elapsed_ms = 0;
        self.state = HandshakeState::Disconnected;
    }
}

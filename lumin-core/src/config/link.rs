//! Link configuration
//!
//! Every tunable of a connection: handshake tokens and role, timeouts,
//! polling cadence and retry backoff. The handshake tokens are a contract
//! between host and firmware revisions, so they are data, not literals.

use heapless::Vec;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum handshake token length
pub const MAX_TOKEN_LEN: usize = 32;

/// Greeting sent by the host
pub const DEFAULT_GREETING: &[u8] = b"HELLO_LUMIN";

/// Acknowledgement sent by the firmware
pub const DEFAULT_ACK: &[u8] = b"LUMIN_ACK";

/// Handshake deadline
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u32 = 5000;

/// Inactivity window for a partial frame
pub const DEFAULT_FRAME_TIMEOUT_MS: u32 = lumin_protocol::DEFAULT_FRAME_TIMEOUT_MS;

/// Sleep between transport polls
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 100;

/// Handshake token bytes
pub type Token = Vec<u8, MAX_TOKEN_LEN>;

/// Configuration errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Greeting or acknowledgement is empty
    #[error("handshake token is empty")]
    EmptyToken,
    /// Token longer than MAX_TOKEN_LEN
    #[error("handshake token of {len} bytes exceeds 32 bytes")]
    TokenTooLong {
        /// Length of the rejected token
        len: usize,
    },
    /// A timeout or interval is zero
    #[error("timeouts and poll interval must be non-zero")]
    ZeroDuration,
    /// Serialization failed
    #[error("config serialization failed")]
    Serialize,
    /// Deserialization failed
    #[error("config deserialization failed")]
    Deserialize,
}

/// Which side of the greeting exchange this end plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HandshakeRole {
    /// Sends the greeting, waits for the acknowledgement (host)
    #[default]
    Initiator,
    /// Waits for the greeting, answers with the acknowledgement (firmware)
    Responder,
}

/// Exponential retry delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Backoff {
    /// Delay before the first retry (ms)
    pub initial_ms: u32,
    /// Upper bound on any delay (ms)
    pub max_ms: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            max_ms: 8000,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (0-based), doubling each time
    pub fn delay_ms(&self, retry: u32) -> u32 {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_ms.saturating_mul(factor).min(self.max_ms)
    }
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinkConfig {
    /// Handshake role
    pub role: HandshakeRole,
    /// Token sent by the initiator
    pub greeting: Token,
    /// Token sent back by the responder
    pub ack: Token,
    /// Handshake deadline (ms)
    pub handshake_timeout_ms: u32,
    /// Partial frame inactivity timeout (ms)
    pub frame_timeout_ms: u32,
    /// Sleep between transport polls while waiting (ms)
    pub poll_interval_ms: u32,
    /// Delay policy between handshake attempts
    pub backoff: Backoff,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            role: HandshakeRole::Initiator,
            greeting: token_from(DEFAULT_GREETING),
            ack: token_from(DEFAULT_ACK),
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            frame_timeout_ms: DEFAULT_FRAME_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            backoff: Backoff::default(),
        }
    }
}

// Defaults are far below MAX_TOKEN_LEN
fn token_from(bytes: &[u8]) -> Token {
    Vec::from_slice(bytes).unwrap_or_default()
}

fn make_token(bytes: &[u8]) -> Result<Token, ConfigError> {
    if bytes.is_empty() {
        return Err(ConfigError::EmptyToken);
    }
    Vec::from_slice(bytes).map_err(|_| ConfigError::TokenTooLong { len: bytes.len() })
}

impl LinkConfig {
    /// Default configuration for the firmware side
    pub fn responder() -> Self {
        Self {
            role: HandshakeRole::Responder,
            ..Self::default()
        }
    }

    /// Set the handshake role
    pub fn with_role(mut self, role: HandshakeRole) -> Self {
        self.role = role;
        self
    }

    /// Set the greeting token
    pub fn with_greeting(mut self, greeting: &[u8]) -> Result<Self, ConfigError> {
        self.greeting = make_token(greeting)?;
        Ok(self)
    }

    /// Set the acknowledgement token
    pub fn with_ack(mut self, ack: &[u8]) -> Result<Self, ConfigError> {
        self.ack = make_token(ack)?;
        Ok(self)
    }

    /// Set the handshake deadline
    pub fn with_handshake_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.handshake_timeout_ms = timeout_ms;
        self
    }

    /// Set the partial frame inactivity timeout
    pub fn with_frame_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.frame_timeout_ms = timeout_ms;
        self
    }

    /// Set the poll interval
    pub fn with_poll_interval_ms(mut self, interval_ms: u32) -> Self {
        self.poll_interval_ms = interval_ms;
        self
    }

    /// Set the retry backoff
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Check invariants that the public fields cannot enforce
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.greeting.is_empty() || self.ack.is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        if self.handshake_timeout_ms == 0
            || self.frame_timeout_ms == 0
            || self.poll_interval_ms == 0
        {
            return Err(ConfigError::ZeroDuration);
        }
        Ok(())
    }

    /// Serialize into `buf` as postcard, returning the used prefix
    #[cfg(feature = "serde")]
    pub fn to_postcard<'b>(&self, buf: &'b mut [u8]) -> Result<&'b mut [u8], ConfigError> {
        postcard::to_slice(self, buf).map_err(|_| ConfigError::Serialize)
    }

    /// Deserialize and validate a postcard blob
    #[cfg(feature = "serde")]
    pub fn from_postcard(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Deserialize)?;
        config.validate()?;
        Ok(config)
    }
}

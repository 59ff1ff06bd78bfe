//! Connection handshake
//!
//! The greeting exchange that gates acceptance of data frames. States are
//! explicit and every transition is driven by a call from the connection.

pub mod machine;
pub mod matcher;

pub use machine::{Handshake, HandshakeError, HandshakeState};
pub use matcher::TokenMatcher;

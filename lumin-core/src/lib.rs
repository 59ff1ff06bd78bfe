//! Link-level logic for the Lumin Bridge
//!
//! Everything between a byte stream and the application, shared by the
//! host daemon and the firmware:
//!
//! - Collaborator traits (transport, dispatcher)
//! - Greeting handshake state machine
//! - Per-connection device registry
//! - Connection pipeline tying reader, codec and registry together
//! - Link configuration and deadline-bounded waiting
//!
//! Wire formats live in `lumin-protocol` and are re-exported here.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// Must come first so the logging macros are visible to every module
#[macro_use]
mod fmt;

pub mod config;
pub mod handshake;
pub mod registry;
pub mod session;
pub mod traits;
pub mod wait;

pub use config::{Backoff, ConfigError, HandshakeRole, LinkConfig};
pub use handshake::{Handshake, HandshakeError, HandshakeState};
pub use registry::{DeviceRegistry, RegistryError, Snapshot};
pub use session::{Connection, LinkStats, SessionError};
pub use traits::{Dispatcher, FrameRejection, LinkError, Transport};

pub use lumin_protocol::{
    sync_packets, CodecError, Device, DeviceType, Frame, FrameReader, FullSync, Packet,
    PacketType, ValueReport,
};

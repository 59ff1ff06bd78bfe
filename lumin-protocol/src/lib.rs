//! Lumin Bridge Serial Protocol
//!
//! This crate defines the binary protocol spoken over the serial link between
//! the host (which owns the audio outputs and monitors) and the Lumin Bridge
//! knob firmware. It covers framing and the packet codec only; handshake,
//! registry and connection handling live in `lumin-core`.
//!
//! # Protocol Overview
//!
//! All packets use a simple binary frame format:
//! ```text
//! ┌───────┬────────┬──────┬─────────────┐
//! │ START │ LENGTH │ TYPE │ PAYLOAD     │
//! │ 1B    │ 1B     │ 1B   │ LENGTH-1 B  │
//! └───────┴────────┴──────┴─────────────┘
//! ```
//!
//! `LENGTH` counts the type tag and payload. There is no checksum.
//!
//! | Type | Tag  | Body length      |
//! |------|------|------------------|
//! | ResetDeviceMatrix | 0x00 | 1 |
//! | FullSync          | 0x01 | 2 + 35·count (count ≤ 7) |
//! | DeltaUpdate       | 0x02 | 36 |
//! | ValueReport       | 0x10 | 4 |

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod device;
pub mod error;
pub mod frame;
pub mod packet;

pub use device::{Device, DeviceType, DEVICE_RECORD_SIZE, MAX_NAME_LEN, NAME_FIELD_SIZE};
pub use error::CodecError;
pub use frame::{
    Frame, FrameReader, Frames, DEFAULT_FRAME_TIMEOUT_MS, FRAME_START, MAX_FRAME_SIZE,
    MAX_PAYLOAD_SIZE,
};
pub use packet::{
    encode_full_sync, sync_packets, FullSync, Packet, PacketType, SyncPackets, ValueReport,
    MAX_DEVICES_PER_SYNC,
};

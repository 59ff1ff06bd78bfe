//! Packet types and the codec between packets and frames
//!
//! Host → firmware: `ResetDeviceMatrix`, `FullSync`, `DeltaUpdate`
//! Firmware → host: `ValueReport`

use heapless::Vec;

use crate::device::{Device, DeviceType, DEVICE_RECORD_SIZE};
use crate::error::CodecError;
use crate::frame::{Frame, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};

/// Devices that fit one `FullSync` frame: 2 + 35·7 = 247 ≤ 255
pub const MAX_DEVICES_PER_SYNC: usize = (MAX_PAYLOAD_SIZE - 2) / DEVICE_RECORD_SIZE;

/// Body length of a `DeltaUpdate` frame (tag + record)
pub const DELTA_UPDATE_LEN: usize = 1 + DEVICE_RECORD_SIZE;

/// Body length of a `ValueReport` frame (tag + id + value + type)
pub const VALUE_REPORT_LEN: usize = 4;

/// Body length of a `ResetDeviceMatrix` frame (tag only)
pub const RESET_LEN: usize = 1;

/// Packet type tag, the first body byte of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketType {
    /// Clear every device on the receiver
    ResetDeviceMatrix = 0x00,
    /// Replace the whole device set
    FullSync = 0x01,
    /// Insert or overwrite one device
    DeltaUpdate = 0x02,
    /// Value changed on the firmware side
    ValueReport = 0x10,
}

impl PacketType {
    /// Parse a packet type from its wire format byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(PacketType::ResetDeviceMatrix),
            0x01 => Some(PacketType::FullSync),
            0x02 => Some(PacketType::DeltaUpdate),
            0x10 => Some(PacketType::ValueReport),
            _ => None,
        }
    }

    /// Convert to wire format byte
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PacketType {
    type Error = CodecError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        PacketType::from_byte(byte).ok_or(CodecError::UnknownPacketType(byte))
    }
}

/// Complete device set for one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FullSync {
    devices: Vec<Device, MAX_DEVICES_PER_SYNC>,
}

impl FullSync {
    /// Build a snapshot from a device list
    ///
    /// Fails with [`CodecError::PayloadTooLarge`] if the frame would exceed
    /// 255 bytes; use [`sync_packets`] to split larger sets. Duplicate ids are
    /// left for the receiving registry to reject.
    pub fn new(devices: &[Device]) -> Result<Self, CodecError> {
        let mut out = Vec::new();
        out.extend_from_slice(devices)
            .map_err(|_| CodecError::PayloadTooLarge {
                size: Self::body_len(devices.len()),
            })?;
        Ok(Self { devices: out })
    }

    /// Devices in wire order
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Body length of a `FullSync` frame carrying `count` devices
    pub const fn body_len(count: usize) -> usize {
        2 + DEVICE_RECORD_SIZE * count
    }
}

/// Value change reported by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ValueReport {
    /// Device identifier
    pub id: u8,
    /// New value
    pub value: u8,
    /// Device kind, used to disambiguate the id
    pub device_type: DeviceType,
}

/// Typed, decoded form of a frame body
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Packet {
    /// Clear the receiver's registry
    ResetDeviceMatrix,
    /// Replace the receiver's registry
    FullSync(FullSync),
    /// Insert or overwrite one device
    DeltaUpdate(Device),
    /// Firmware-side value change
    ValueReport(ValueReport),
}

impl Packet {
    /// Tag written as the first body byte
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::ResetDeviceMatrix => PacketType::ResetDeviceMatrix,
            Packet::FullSync(_) => PacketType::FullSync,
            Packet::DeltaUpdate(_) => PacketType::DeltaUpdate,
            Packet::ValueReport(_) => PacketType::ValueReport,
        }
    }

    /// Value of the length field once encoded
    pub fn body_len(&self) -> usize {
        match self {
            Packet::ResetDeviceMatrix => RESET_LEN,
            Packet::FullSync(sync) => FullSync::body_len(sync.devices.len()),
            Packet::DeltaUpdate(_) => DELTA_UPDATE_LEN,
            Packet::ValueReport(_) => VALUE_REPORT_LEN,
        }
    }

    /// Encode this packet as a complete frame into `buffer`
    ///
    /// Returns the number of bytes written
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, CodecError> {
        self.to_frame()?.encode(buffer)
    }

    /// Encode this packet as a complete frame into a heapless Vec
    pub fn encode_to_vec(&self) -> Result<Vec<u8, MAX_FRAME_SIZE>, CodecError> {
        self.to_frame()?.encode_to_vec()
    }

    /// Build the frame carrying this packet
    pub fn to_frame(&self) -> Result<Frame, CodecError> {
        let size = self.body_len();
        if size > MAX_PAYLOAD_SIZE {
            return Err(CodecError::PayloadTooLarge { size });
        }

        let mut body = [0u8; MAX_PAYLOAD_SIZE];
        body[0] = self.packet_type().to_byte();

        match self {
            Packet::ResetDeviceMatrix => {}
            Packet::FullSync(sync) => {
                // Bounded by MAX_DEVICES_PER_SYNC
                body[1] = sync.devices.len() as u8;
                for (device, record) in sync
                    .devices
                    .iter()
                    .zip(body[2..size].chunks_exact_mut(DEVICE_RECORD_SIZE))
                {
                    device.encode_record(record)?;
                }
            }
            Packet::DeltaUpdate(device) => {
                device.encode_record(&mut body[1..size])?;
            }
            Packet::ValueReport(report) => {
                body[1] = report.id;
                body[2] = report.value;
                body[3] = report.device_type.to_byte();
            }
        }

        Frame::new(&body[..size])
    }

    /// Decode a packet from a frame produced by the reader
    ///
    /// The frame length must exactly match what the variant consumes.
    pub fn decode(frame: &Frame) -> Result<Self, CodecError> {
        let body = frame.payload.as_slice();
        let (&tag, rest) = body.split_first().ok_or(CodecError::MalformedFrame {
            expected: RESET_LEN,
            actual: 0,
        })?;

        match PacketType::try_from(tag)? {
            PacketType::ResetDeviceMatrix => {
                expect_len(RESET_LEN, body.len())?;
                Ok(Packet::ResetDeviceMatrix)
            }
            PacketType::FullSync => {
                let count = *rest.first().ok_or(CodecError::MalformedFrame {
                    expected: FullSync::body_len(0),
                    actual: body.len(),
                })?;
                expect_len(FullSync::body_len(count as usize), body.len())?;

                let mut devices = Vec::new();
                for record in rest[1..].chunks_exact(DEVICE_RECORD_SIZE) {
                    devices
                        .push(Device::decode_record(record)?)
                        .map_err(|_| CodecError::MalformedFrame {
                            expected: FullSync::body_len(MAX_DEVICES_PER_SYNC),
                            actual: body.len(),
                        })?;
                }
                Ok(Packet::FullSync(FullSync { devices }))
            }
            PacketType::DeltaUpdate => {
                expect_len(DELTA_UPDATE_LEN, body.len())?;
                Ok(Packet::DeltaUpdate(Device::decode_record(rest)?))
            }
            PacketType::ValueReport => {
                expect_len(VALUE_REPORT_LEN, body.len())?;
                Ok(Packet::ValueReport(ValueReport {
                    id: rest[0],
                    value: rest[1],
                    device_type: DeviceType::try_from(rest[2])?,
                }))
            }
        }
    }
}

impl TryFrom<&Frame> for Packet {
    type Error = CodecError;

    fn try_from(frame: &Frame) -> Result<Self, Self::Error> {
        Packet::decode(frame)
    }
}

fn expect_len(expected: usize, actual: usize) -> Result<(), CodecError> {
    if expected == actual {
        Ok(())
    } else {
        Err(CodecError::MalformedFrame { expected, actual })
    }
}

/// Encode a device set as a single `FullSync` frame
pub fn encode_full_sync(devices: &[Device]) -> Result<Vec<u8, MAX_FRAME_SIZE>, CodecError> {
    Packet::FullSync(FullSync::new(devices)?).encode_to_vec()
}

/// Packets that bring a receiver to exactly `devices`
///
/// Yields one `FullSync` when the set fits a frame, otherwise a
/// `ResetDeviceMatrix` followed by one `DeltaUpdate` per device. Either
/// sequence leaves the receiving registry with the same contents.
pub fn sync_packets(devices: &[Device]) -> Result<SyncPackets<'_>, CodecError> {
    for (i, device) in devices.iter().enumerate() {
        if devices[..i].iter().any(|d| d.id == device.id) {
            return Err(CodecError::DuplicateDeviceId(device.id));
        }
    }

    let state = if devices.len() <= MAX_DEVICES_PER_SYNC {
        SyncState::Single
    } else {
        SyncState::Reset
    };

    Ok(SyncPackets {
        devices,
        state,
        next_device: 0,
    })
}

#[derive(Debug, Clone, Copy)]
enum SyncState {
    Single,
    Reset,
    Deltas,
    Done,
}

/// Iterator returned by [`sync_packets`]
#[derive(Debug, Clone)]
pub struct SyncPackets<'a> {
    devices: &'a [Device],
    state: SyncState,
    next_device: usize,
}

impl Iterator for SyncPackets<'_> {
    type Item = Packet;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            SyncState::Single => {
                self.state = SyncState::Done;
                FullSync::new(self.devices).ok().map(Packet::FullSync)
            }
            SyncState::Reset => {
                self.state = SyncState::Deltas;
                Some(Packet::ResetDeviceMatrix)
            }
            SyncState::Deltas => {
                let device = self.devices.get(self.next_device)?;
                self.next_device += 1;
                Some(Packet::DeltaUpdate(device.clone()))
            }
            SyncState::Done => None,
        }
    }
}

//! Device records carried by synchronization packets
//!
//! A device occupies 35 bytes on the wire:
//! ```text
//! ┌──────────┬────┬───────┬─────────────┐
//! │ NAME     │ ID │ VALUE │ DEVICE TYPE │
//! │ 32B      │ 1B │ 1B    │ 1B          │
//! └──────────┴────┴───────┴─────────────┘
//! ```
//! The name is ASCII, null-padded, and always carries at least one null byte.

use heapless::String;

use crate::error::CodecError;

/// Size of the fixed name field on the wire
pub const NAME_FIELD_SIZE: usize = 32;

/// Longest name that still leaves room for the terminator
pub const MAX_NAME_LEN: usize = NAME_FIELD_SIZE - 1;

/// Size of one encoded device record
pub const DEVICE_RECORD_SIZE: usize = NAME_FIELD_SIZE + 3;

/// Kind of peripheral a device controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DeviceType {
    /// Audio output volume
    Volume = 0,
    /// Monitor backlight brightness
    Brightness = 1,
}

// Wire format values
const DEVICE_TYPE_VOLUME: u8 = 0x00;
const DEVICE_TYPE_BRIGHTNESS: u8 = 0x01;

impl DeviceType {
    /// Parse a device type from its wire format byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            DEVICE_TYPE_VOLUME => Some(DeviceType::Volume),
            DEVICE_TYPE_BRIGHTNESS => Some(DeviceType::Brightness),
            _ => None,
        }
    }

    /// Convert to wire format byte
    pub fn to_byte(self) -> u8 {
        match self {
            DeviceType::Volume => DEVICE_TYPE_VOLUME,
            DeviceType::Brightness => DEVICE_TYPE_BRIGHTNESS,
        }
    }
}

impl TryFrom<u8> for DeviceType {
    type Error = CodecError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        DeviceType::from_byte(byte).ok_or(CodecError::UnknownDeviceType(byte))
    }
}

/// One managed peripheral
///
/// The name is validated on construction, so every `Device` value can be
/// encoded without truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Device {
    name: String<MAX_NAME_LEN>,
    /// Identifier, unique within a synchronization snapshot
    pub id: u8,
    /// Magnitude whose meaning depends on `device_type`
    pub value: u8,
    /// Peripheral kind
    pub device_type: DeviceType,
}

impl Device {
    /// Create a device, rejecting names that do not fit the wire field
    ///
    /// Names longer than [`MAX_NAME_LEN`] bytes fail with
    /// [`CodecError::NameTooLong`]; they are never truncated. Names with
    /// non-ASCII or NUL bytes fail with [`CodecError::NonAsciiName`].
    pub fn new(name: &str, id: u8, value: u8, device_type: DeviceType) -> Result<Self, CodecError> {
        Ok(Self {
            name: validate_name(name)?,
            id,
            value,
            device_type,
        })
    }

    /// Device name
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Replace the device name, with the same validation as [`Device::new`]
    pub fn set_name(&mut self, name: &str) -> Result<(), CodecError> {
        self.name = validate_name(name)?;
        Ok(())
    }

    /// Write the 35-byte record into `out`
    pub fn encode_record(&self, out: &mut [u8]) -> Result<usize, CodecError> {
        let out = out
            .get_mut(..DEVICE_RECORD_SIZE)
            .ok_or(CodecError::BufferTooSmall {
                needed: DEVICE_RECORD_SIZE,
            })?;

        let name = self.name.as_bytes();
        out[..NAME_FIELD_SIZE].fill(0);
        out[..name.len()].copy_from_slice(name);
        out[NAME_FIELD_SIZE] = self.id;
        out[NAME_FIELD_SIZE + 1] = self.value;
        out[NAME_FIELD_SIZE + 2] = self.device_type.to_byte();

        Ok(DEVICE_RECORD_SIZE)
    }

    /// Parse a record; `record` must be exactly 35 bytes
    pub fn decode_record(record: &[u8]) -> Result<Self, CodecError> {
        if record.len() != DEVICE_RECORD_SIZE {
            return Err(CodecError::MalformedFrame {
                expected: DEVICE_RECORD_SIZE,
                actual: record.len(),
            });
        }

        let (name_field, tail) = record.split_at(NAME_FIELD_SIZE);
        let name = decode_name(name_field)?;
        let device_type = DeviceType::try_from(tail[2])?;

        Ok(Self {
            name,
            id: tail[0],
            value: tail[1],
            device_type,
        })
    }
}

fn validate_name(name: &str) -> Result<String<MAX_NAME_LEN>, CodecError> {
    if name.len() > MAX_NAME_LEN {
        return Err(CodecError::NameTooLong { len: name.len() });
    }
    if !name.bytes().all(|b| b.is_ascii() && b != 0) {
        return Err(CodecError::NonAsciiName);
    }

    let mut out = String::new();
    out.push_str(name)
        .map_err(|_| CodecError::NameTooLong { len: name.len() })?;
    Ok(out)
}

/// Read a name field up to its first null byte
fn decode_name(field: &[u8]) -> Result<String<MAX_NAME_LEN>, CodecError> {
    let end = field
        .iter()
        .position(|&b| b == 0)
        .ok_or(CodecError::UnterminatedName)?;

    let text = core::str::from_utf8(&field[..end]).map_err(|_| CodecError::NonAsciiName)?;
    validate_name(text)
}

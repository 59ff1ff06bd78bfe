//! Frame encoding and the streaming frame reader.
//!
//! Frame format:
//! - START (1 byte): 0xAA synchronization byte
//! - LENGTH (1 byte): number of bytes that follow (packet type + payload)
//! - BODY (LENGTH bytes): packet type tag followed by the variant payload
//!
//! There is no checksum; the link is trusted for integrity.

use heapless::Vec;

use crate::error::CodecError;

/// Frame synchronization byte
pub const FRAME_START: u8 = 0xAA;

/// Maximum body size in bytes (the length field is one byte)
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize;

/// START + LENGTH
pub const FRAME_HEADER_SIZE: usize = 2;

/// Maximum complete frame size (START + LENGTH + MAX_PAYLOAD)
pub const MAX_FRAME_SIZE: usize = FRAME_HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// Inactivity window after which a partial frame is dropped
pub const DEFAULT_FRAME_TIMEOUT_MS: u32 = 5000;

/// A length-validated frame body
///
/// `payload[0]`, when present, is the packet type tag. The reader never
/// interprets it; that is left to [`crate::Packet::decode`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    /// Bytes following the length field
    pub payload: Vec<u8, MAX_PAYLOAD_SIZE>,
}

impl Frame {
    /// Create a frame around the given body
    pub fn new(payload: &[u8]) -> Result<Self, CodecError> {
        let mut body = Vec::new();
        body.extend_from_slice(payload)
            .map_err(|_| CodecError::PayloadTooLarge {
                size: payload.len(),
            })?;
        Ok(Self { payload: body })
    }

    /// Value of the length field
    pub fn length(&self) -> u8 {
        // Bounded by MAX_PAYLOAD_SIZE
        self.payload.len() as u8
    }

    /// Encode this frame into a byte buffer
    ///
    /// Returns the number of bytes written
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, CodecError> {
        let frame_len = FRAME_HEADER_SIZE + self.payload.len();
        if buffer.len() < frame_len {
            return Err(CodecError::BufferTooSmall { needed: frame_len });
        }

        buffer[0] = FRAME_START;
        buffer[1] = self.length();
        buffer[FRAME_HEADER_SIZE..frame_len].copy_from_slice(&self.payload);

        Ok(frame_len)
    }

    /// Encode this frame into a heapless Vec
    pub fn encode_to_vec(&self) -> Result<Vec<u8, MAX_FRAME_SIZE>, CodecError> {
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = self.encode(&mut buffer)?;
        let mut vec = Vec::new();
        vec.extend_from_slice(&buffer[..len])
            .map_err(|_| CodecError::BufferTooSmall { needed: len })?;
        Ok(vec)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    /// Discarding bytes until START
    WaitingForStart,
    /// Got START, waiting for LENGTH
    WaitingForLength,
    /// Collecting LENGTH body bytes
    ReadingPayload,
}

/// Byte-accumulating scanner that turns a raw stream into frames
///
/// Time is fed in by the caller through [`FrameReader::advance_time`]; a
/// partial frame that sees no bytes for the configured timeout is dropped
/// and the reader goes back to scanning for START.
#[derive(Debug, Clone)]
pub struct FrameReader {
    state: ReadState,
    buffer: Vec<u8, MAX_PAYLOAD_SIZE>,
    expected_length: u8,
    idle_ms: u32,
    timeout_ms: u32,
    noise_bytes: u32,
    dropped_partials: u32,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    /// Create a reader with the default inactivity timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_FRAME_TIMEOUT_MS)
    }

    /// Create a reader with a custom inactivity timeout
    pub fn with_timeout(timeout_ms: u32) -> Self {
        Self {
            state: ReadState::WaitingForStart,
            buffer: Vec::new(),
            expected_length: 0,
            idle_ms: 0,
            timeout_ms,
            noise_bytes: 0,
            dropped_partials: 0,
        }
    }

    /// Drop any partial frame and resume scanning for START
    pub fn reset(&mut self) {
        self.state = ReadState::WaitingForStart;
        self.buffer.clear();
        self.expected_length = 0;
        self.idle_ms = 0;
    }

    /// True while a frame has been started but not completed
    pub fn is_assembling(&self) -> bool {
        self.state != ReadState::WaitingForStart
    }

    /// Bytes discarded while scanning for START
    pub fn noise_bytes(&self) -> u32 {
        self.noise_bytes
    }

    /// Partial frames dropped on inactivity timeout
    pub fn dropped_partials(&self) -> u32 {
        self.dropped_partials
    }

    /// Feed a single byte to the reader
    ///
    /// Returns `Some(frame)` when the byte completes a frame.
    pub fn feed(&mut self, byte: u8) -> Option<Frame> {
        self.idle_ms = 0;

        match self.state {
            ReadState::WaitingForStart => {
                if byte == FRAME_START {
                    self.state = ReadState::WaitingForLength;
                } else {
                    self.noise_bytes = self.noise_bytes.saturating_add(1);
                }
                None
            }
            ReadState::WaitingForLength => {
                self.expected_length = byte;
                self.buffer.clear();
                if byte == 0 {
                    // Zero-length frame; the codec reports it as malformed
                    self.state = ReadState::WaitingForStart;
                    return Some(Frame::default());
                }
                self.state = ReadState::ReadingPayload;
                None
            }
            ReadState::ReadingPayload => {
                if self.buffer.push(byte).is_err() {
                    self.reset();
                    return None;
                }
                if self.buffer.len() < self.expected_length as usize {
                    return None;
                }

                let frame = Frame {
                    payload: core::mem::take(&mut self.buffer),
                };
                self.reset();
                Some(frame)
            }
        }
    }

    /// Account for elapsed time without new bytes
    ///
    /// Returns `true` if a partial frame was dropped.
    pub fn advance_time(&mut self, delta_ms: u32) -> bool {
        if !self.is_assembling() {
            return false;
        }

        self.idle_ms = self.idle_ms.saturating_add(delta_ms);
        if self.idle_ms < self.timeout_ms {
            return false;
        }

        self.dropped_partials = self.dropped_partials.saturating_add(1);
        self.reset();
        true
    }

    /// Lazily yield every frame completed by `bytes`
    ///
    /// Bytes not consumed when the iterator is dropped are lost, so callers
    /// should drain it.
    pub fn frames<'r, 'b>(&'r mut self, bytes: &'b [u8]) -> Frames<'r, 'b> {
        Frames {
            reader: self,
            bytes: bytes.iter(),
        }
    }
}

/// Iterator returned by [`FrameReader::frames`]
pub struct Frames<'r, 'b> {
    reader: &'r mut FrameReader,
    bytes: core::slice::Iter<'b, u8>,
}

impl Iterator for Frames<'_, '_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        for &byte in self.bytes.by_ref() {
            if let Some(frame) = self.reader.feed(byte) {
                return Some(frame);
            }
        }
        None
    }
}

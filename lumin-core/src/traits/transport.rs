//! Byte transport abstraction
//!
//! Implemented by whatever owns the physical link (a UART, a USB CDC port,
//! a test double). The pipeline never configures the link itself.

use thiserror::Error;

/// Errors reported by a transport
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// The link was closed; pending waits must end with `Cancelled`
    #[error("link closed")]
    Closed,
    /// Read or write failed on an open link
    #[error("link I/O failure")]
    Io,
}

/// Duplex byte stream exclusively owned by one connection
pub trait Transport {
    /// Copy bytes that are already buffered into `buf`
    ///
    /// Must not block for longer than a short driver timeout. Returns
    /// `Ok(0)` when nothing is pending.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, LinkError>;

    /// Write all of `data` to the link
    fn write(&mut self, data: &[u8]) -> Result<(), LinkError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        (**self).read_available(buf)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), LinkError> {
        (**self).write(data)
    }
}

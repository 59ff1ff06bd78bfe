//! Collaborator traits
//!
//! These traits define the interface between the protocol pipeline and the
//! code that owns the serial port and acts on device changes.

pub mod dispatcher;
pub mod transport;

pub use dispatcher::{Dispatcher, FrameRejection};
pub use transport::{LinkError, Transport};

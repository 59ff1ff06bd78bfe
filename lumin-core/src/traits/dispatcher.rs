//! Dispatcher trait
//!
//! The dispatcher acts on confirmed device changes: on the firmware it
//! refreshes the menu, on the host it moves a volume slider or sets a
//! monitor's backlight. It is called synchronously from the pipeline and
//! must not block.

use lumin_protocol::{CodecError, Device};

use crate::registry::RegistryError;

/// Why an incoming frame was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameRejection {
    /// Frame body did not decode
    Codec(CodecError),
    /// Packet decoded but the registry refused it
    Registry(RegistryError),
}

/// Receiver of registry change notifications
pub trait Dispatcher {
    /// A device was inserted or changed
    fn on_device_changed(&mut self, id: u8, device: &Device);

    /// Every device was removed, ahead of a full replacement or a reset
    fn on_registry_cleared(&mut self) {}

    /// A frame was dropped; the pipeline keeps running
    fn on_frame_rejected(&mut self, _reason: FrameRejection) {}
}

/// Discards every notification
impl Dispatcher for () {
    fn on_device_changed(&mut self, _id: u8, _device: &Device) {}
}

impl<D: Dispatcher + ?Sized> Dispatcher for &mut D {
    fn on_device_changed(&mut self, id: u8, device: &Device) {
        (**self).on_device_changed(id, device)
    }

    fn on_registry_cleared(&mut self) {
        (**self).on_registry_cleared()
    }

    fn on_frame_rejected(&mut self, reason: FrameRejection) {
        (**self).on_frame_rejected(reason)
    }
}

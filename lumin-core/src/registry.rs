//! Device registry
//!
//! Mapping from device id to device state, kept identical on both ends of
//! the link. Storage is a fixed table indexed by id, so applying an update
//! never allocates and never fails for lack of space.
//!
//! Semantics:
//! - `FullSync` replaces every entry. Duplicate ids reject the whole packet
//!   before anything is touched.
//! - `DeltaUpdate` inserts or overwrites one entry, including its name and
//!   device type.
//! - `ValueReport` changes the value of an existing entry whose id and type
//!   both match.
//! - `ResetDeviceMatrix` removes every entry.

use lumin_protocol::{Device, DeviceType, Packet, ValueReport};
use thiserror::Error;

use crate::traits::Dispatcher;

/// One slot per possible id
///
/// Slots are stored inline, roughly 10 to 12 KB per registry depending on
/// the target's pointer width. Firmware should place its `Connection` in a
/// static rather than on a task stack.
pub const REGISTRY_CAPACITY: usize = u8::MAX as usize + 1;

/// Registry validation failures; the registry is left unchanged
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistryError {
    /// Same id twice in one `FullSync`
    #[error("duplicate device id {0} in full sync")]
    DuplicateDeviceId(u8),
    /// Value report for a device the registry does not hold
    #[error("no {device_type:?} device with id {id}")]
    UnknownDevice {
        /// Reported id
        id: u8,
        /// Reported device type
        device_type: DeviceType,
    },
}

/// Mapping from device id to device state
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    slots: [Option<Device>; REGISTRY_CAPACITY],
    len: usize,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            len: 0,
        }
    }

    /// Number of devices held
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no devices are held
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Look up a device by id
    pub fn get(&self, id: u8) -> Option<&Device> {
        self.slots[id as usize].as_ref()
    }

    /// Immutable view of the current devices
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot { registry: self }
    }

    /// Check that `packet` would be accepted, without applying it
    pub fn validate(&self, packet: &Packet) -> Result<(), RegistryError> {
        match packet {
            Packet::FullSync(sync) => check_unique(sync.devices()),
            Packet::ValueReport(report) => self.find_reported(report).map(|_| ()),
            Packet::DeltaUpdate(_) | Packet::ResetDeviceMatrix => Ok(()),
        }
    }

    /// Apply any state-bearing packet and notify `dispatcher`
    pub fn apply<D: Dispatcher>(
        &mut self,
        packet: &Packet,
        dispatcher: &mut D,
    ) -> Result<(), RegistryError> {
        match packet {
            Packet::FullSync(sync) => self.apply_full_sync(sync.devices(), dispatcher),
            Packet::DeltaUpdate(device) => {
                self.apply_delta_update(device, dispatcher);
                Ok(())
            }
            Packet::ValueReport(report) => self.apply_value_report(report, dispatcher),
            Packet::ResetDeviceMatrix => {
                self.clear(dispatcher);
                Ok(())
            }
        }
    }

    /// Replace the whole device set
    pub fn apply_full_sync<D: Dispatcher>(
        &mut self,
        devices: &[Device],
        dispatcher: &mut D,
    ) -> Result<(), RegistryError> {
        check_unique(devices)?;

        self.clear(dispatcher);
        for device in devices {
            self.slots[device.id as usize] = Some(device.clone());
        }
        self.len = devices.len();

        for device in devices {
            dispatcher.on_device_changed(device.id, device);
        }
        Ok(())
    }

    /// Insert or overwrite one device, returning the previous entry
    pub fn apply_delta_update<D: Dispatcher>(
        &mut self,
        device: &Device,
        dispatcher: &mut D,
    ) -> Option<Device> {
        let previous = self.slots[device.id as usize].replace(device.clone());
        if previous.is_none() {
            self.len += 1;
        }
        dispatcher.on_device_changed(device.id, device);
        previous
    }

    /// Update the value of a known device
    pub fn apply_value_report<D: Dispatcher>(
        &mut self,
        report: &ValueReport,
        dispatcher: &mut D,
    ) -> Result<(), RegistryError> {
        self.find_reported(report)?;

        if let Some(device) = self.slots[report.id as usize].as_mut() {
            device.value = report.value;
            dispatcher.on_device_changed(report.id, device);
        }
        Ok(())
    }

    /// Remove every device
    pub fn clear<D: Dispatcher>(&mut self, dispatcher: &mut D) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.len = 0;
        dispatcher.on_registry_cleared();
    }

    fn find_reported(&self, report: &ValueReport) -> Result<&Device, RegistryError> {
        self.get(report.id)
            .filter(|device| device.device_type == report.device_type)
            .ok_or(RegistryError::UnknownDevice {
                id: report.id,
                device_type: report.device_type,
            })
    }
}

fn check_unique(devices: &[Device]) -> Result<(), RegistryError> {
    let mut seen = [false; REGISTRY_CAPACITY];
    for device in devices {
        let slot = &mut seen[device.id as usize];
        if *slot {
            return Err(RegistryError::DuplicateDeviceId(device.id));
        }
        *slot = true;
    }
    Ok(())
}

/// Read-only view returned by [`DeviceRegistry::snapshot`]
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    registry: &'a DeviceRegistry,
}

impl<'a> Snapshot<'a> {
    /// Look up a device by id
    pub fn get(&self, id: u8) -> Option<&'a Device> {
        self.registry.get(id)
    }

    /// Number of devices in the view
    pub fn len(&self) -> usize {
        self.registry.len
    }

    /// True if the view holds no devices
    pub fn is_empty(&self) -> bool {
        self.registry.len == 0
    }

    /// Devices in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &'a Device> + 'a {
        self.registry.slots.iter().filter_map(Option::as_ref)
    }

    /// Devices of one type, in ascending id order
    pub fn of_type(&self, device_type: DeviceType) -> impl Iterator<Item = &'a Device> + 'a {
        self.iter()
            .filter(move |device| device.device_type == device_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumin_protocol::FullSync;

    #[test]
    fn test_registry_footprint_is_bounded() {
        assert!(core::mem::size_of::<DeviceRegistry>() <= 16 * 1024);
    }

    #[derive(Default)]
    struct Recorder {
        changed: std::vec::Vec<u8>,
        cleared: usize,
    }

    impl Dispatcher for Recorder {
        fn on_device_changed(&mut self, id: u8, _device: &Device) {
            self.changed.push(id);
        }

        fn on_registry_cleared(&mut self) {
            self.cleared += 1;
        }
    }

    fn device(name: &str, id: u8, value: u8, device_type: DeviceType) -> Device {
        Device::new(name, id, value, device_type).unwrap()
    }

    fn three_devices() -> [Device; 3] {
        [
            device("Speaker 1", 1, 60, DeviceType::Volume),
            device("Speaker 2", 2, 70, DeviceType::Volume),
            device("Innocn 34E7R", 3, 40, DeviceType::Brightness),
        ]
    }

    #[test]
    fn test_full_sync_populates_registry() {
        let mut registry = DeviceRegistry::new();
        let mut recorder = Recorder::default();
        registry
            .apply_full_sync(&three_devices(), &mut recorder)
            .unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get(3).unwrap().name(), "Innocn 34E7R");
        assert_eq!(recorder.changed, [1, 2, 3]);
        assert_eq!(recorder.cleared, 1);
    }

    #[test]
    fn test_full_sync_replaces_previous_set() {
        let mut registry = DeviceRegistry::new();
        registry.apply_full_sync(&three_devices(), &mut ()).unwrap();

        let replacement = [device("Headset", 9, 10, DeviceType::Volume)];
        registry.apply_full_sync(&replacement, &mut ()).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.get(1).is_none());
        assert_eq!(registry.get(9).unwrap().value, 10);
    }

    #[test]
    fn test_duplicate_id_leaves_registry_unchanged() {
        let mut registry = DeviceRegistry::new();
        registry.apply_full_sync(&three_devices(), &mut ()).unwrap();

        let mut recorder = Recorder::default();
        let duplicate = [
            device("A", 5, 1, DeviceType::Volume),
            device("B", 5, 2, DeviceType::Brightness),
        ];
        assert_eq!(
            registry.apply_full_sync(&duplicate, &mut recorder),
            Err(RegistryError::DuplicateDeviceId(5))
        );

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get(2).unwrap().value, 70);
        assert!(registry.get(5).is_none());
        assert!(recorder.changed.is_empty());
        assert_eq!(recorder.cleared, 0);
    }

    #[test]
    fn test_delta_update_inserts_unknown_id() {
        let mut registry = DeviceRegistry::new();
        let mut recorder = Recorder::default();

        let previous =
            registry.apply_delta_update(&device("Desk", 4, 25, DeviceType::Volume), &mut recorder);

        assert!(previous.is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(recorder.changed, [4]);
    }

    #[test]
    fn test_delta_update_overwrites_whole_entry() {
        let mut registry = DeviceRegistry::new();
        registry.apply_full_sync(&three_devices(), &mut ()).unwrap();

        let renamed = device("Innocn 34E7R (HDR)", 3, 80, DeviceType::Brightness);
        let previous = registry.apply_delta_update(&renamed, &mut ()).unwrap();

        assert_eq!(previous.value, 40);
        assert_eq!(registry.get(3), Some(&renamed));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_value_report_updates_value() {
        let mut registry = DeviceRegistry::new();
        registry.apply_full_sync(&three_devices(), &mut ()).unwrap();

        let mut recorder = Recorder::default();
        let report = ValueReport {
            id: 2,
            value: 75,
            device_type: DeviceType::Volume,
        };
        registry.apply_value_report(&report, &mut recorder).unwrap();

        assert_eq!(registry.get(2).unwrap().value, 75);
        assert_eq!(registry.get(2).unwrap().name(), "Speaker 2");
        assert_eq!(recorder.changed, [2]);
    }

    #[test]
    fn test_value_report_type_mismatch() {
        let mut registry = DeviceRegistry::new();
        registry.apply_full_sync(&three_devices(), &mut ()).unwrap();

        let report = ValueReport {
            id: 2,
            value: 75,
            device_type: DeviceType::Brightness,
        };
        assert_eq!(
            registry.apply_value_report(&report, &mut ()),
            Err(RegistryError::UnknownDevice {
                id: 2,
                device_type: DeviceType::Brightness
            })
        );
        assert_eq!(registry.get(2).unwrap().value, 70);
    }

    #[test]
    fn test_reset_clears() {
        let mut registry = DeviceRegistry::new();
        registry.apply_full_sync(&three_devices(), &mut ()).unwrap();

        let mut recorder = Recorder::default();
        registry
            .apply(&Packet::ResetDeviceMatrix, &mut recorder)
            .unwrap();

        assert!(registry.is_empty());
        assert_eq!(recorder.cleared, 1);
    }

    #[test]
    fn test_validate_matches_apply() {
        let registry = DeviceRegistry::new();
        let duplicate = [
            device("A", 1, 1, DeviceType::Volume),
            device("B", 1, 2, DeviceType::Volume),
        ];
        let packet = Packet::FullSync(FullSync::new(&duplicate).unwrap());

        assert_eq!(
            registry.validate(&packet),
            Err(RegistryError::DuplicateDeviceId(1))
        );
        assert!(registry
            .validate(&Packet::DeltaUpdate(duplicate[0].clone()))
            .is_ok());
    }

    #[test]
    fn test_snapshot_views() {
        let mut registry = DeviceRegistry::new();
        registry.apply_full_sync(&three_devices(), &mut ()).unwrap();

        let snapshot = registry.snapshot();
        let ids: std::vec::Vec<u8> = snapshot.iter().map(|d| d.id).collect();
        assert_eq!(ids, [1, 2, 3]);
        assert_eq!(snapshot.of_type(DeviceType::Volume).count(), 2);
        assert_eq!(snapshot.get(3).unwrap().value, 40);
    }
}

use std::collections::BTreeMap;

use lumin_core::{sync_packets, Device, DeviceRegistry, DeviceType, FullSync, Packet, ValueReport};
use proptest::prelude::*;

fn device_type() -> impl Strategy<Value = DeviceType> {
    prop_oneof![Just(DeviceType::Volume), Just(DeviceType::Brightness)]
}

// Small id space so reports and updates hit existing entries often
fn device() -> impl Strategy<Value = Device> {
    ("[a-z]{1,12}", 0u8..16, any::<u8>(), device_type()).prop_map(
        |(name, id, value, device_type)| Device::new(&name, id, value, device_type).unwrap(),
    )
}

fn packet() -> impl Strategy<Value = Packet> {
    prop_oneof![
        1 => Just(Packet::ResetDeviceMatrix),
        4 => device().prop_map(Packet::DeltaUpdate),
        2 => prop::collection::vec(device(), 0..=7)
            .prop_map(|devices| Packet::FullSync(FullSync::new(&devices).unwrap())),
        4 => (0u8..16, any::<u8>(), device_type()).prop_map(|(id, value, device_type)| {
            Packet::ValueReport(ValueReport {
                id,
                value,
                device_type,
            })
        }),
    ]
}

fn unique_by_id(devices: Vec<Device>) -> Vec<Device> {
    let mut seen = [false; 256];
    devices
        .into_iter()
        .filter(|d| !std::mem::replace(&mut seen[d.id as usize], true))
        .collect()
}

/// Reference semantics over an ordered map
fn model_apply(model: &mut BTreeMap<u8, Device>, packet: &Packet) {
    match packet {
        Packet::ResetDeviceMatrix => model.clear(),
        Packet::DeltaUpdate(device) => {
            model.insert(device.id, device.clone());
        }
        Packet::FullSync(sync) => {
            if unique_by_id(sync.devices().to_vec()).len() == sync.devices().len() {
                *model = sync.devices().iter().map(|d| (d.id, d.clone())).collect();
            }
        }
        Packet::ValueReport(report) => {
            if let Some(device) = model.get_mut(&report.id) {
                if device.device_type == report.device_type {
                    device.value = report.value;
                }
            }
        }
    }
}

proptest! {
    #[test]
    fn registry_matches_reference_model(packets in prop::collection::vec(packet(), 0..40)) {
        let mut registry = DeviceRegistry::new();
        let mut model = BTreeMap::new();

        for packet in &packets {
            let _ = registry.apply(packet, &mut ());
            model_apply(&mut model, packet);
        }

        let actual: Vec<Device> = registry.snapshot().iter().cloned().collect();
        let expected: Vec<Device> = model.into_values().collect();
        prop_assert_eq!(registry.len(), expected.len());
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn sync_replaces_any_prior_state(
        prior in prop::collection::vec(device(), 0..10),
        target in prop::collection::vec(device(), 0..30),
    ) {
        let target = unique_by_id(target);
        let mut registry = DeviceRegistry::new();
        for device in &prior {
            registry.apply_delta_update(device, &mut ());
        }

        for packet in sync_packets(&target).unwrap() {
            registry.apply(&packet, &mut ()).unwrap();
        }

        let mut expected = target.clone();
        expected.sort_by_key(|d| d.id);
        let actual: Vec<Device> = registry.snapshot().iter().cloned().collect();
        prop_assert_eq!(actual, expected);
    }
}

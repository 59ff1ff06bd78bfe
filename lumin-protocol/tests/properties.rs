use lumin_protocol::{
    Device, DeviceType, Frame, FrameReader, FullSync, Packet, ValueReport, FRAME_START,
    MAX_DEVICES_PER_SYNC,
};
use proptest::prelude::*;

fn device_type() -> impl Strategy<Value = DeviceType> {
    prop_oneof![Just(DeviceType::Volume), Just(DeviceType::Brightness)]
}

fn device() -> impl Strategy<Value = Device> {
    ("[ -~]{0,31}", any::<u8>(), any::<u8>(), device_type()).prop_map(
        |(name, id, value, device_type)| Device::new(&name, id, value, device_type).unwrap(),
    )
}

fn packet() -> impl Strategy<Value = Packet> {
    prop_oneof![
        Just(Packet::ResetDeviceMatrix),
        device().prop_map(Packet::DeltaUpdate),
        prop::collection::vec(device(), 0..=MAX_DEVICES_PER_SYNC)
            .prop_map(|devices| Packet::FullSync(FullSync::new(&devices).unwrap())),
        (any::<u8>(), any::<u8>(), device_type()).prop_map(|(id, value, device_type)| {
            Packet::ValueReport(ValueReport {
                id,
                value,
                device_type,
            })
        }),
    ]
}

proptest! {
    #[test]
    fn decode_inverts_encode(packet in packet()) {
        let encoded = packet.encode_to_vec().unwrap();
        let mut reader = FrameReader::new();
        let frames: Vec<Frame> = reader.frames(&encoded).collect();

        prop_assert_eq!(frames.len(), 1);
        prop_assert_eq!(Packet::decode(&frames[0]).unwrap(), packet);
    }

    #[test]
    fn length_field_counts_following_bytes(packet in packet()) {
        let encoded = packet.encode_to_vec().unwrap();
        prop_assert_eq!(encoded[0], FRAME_START);
        prop_assert_eq!(encoded[1] as usize, encoded.len() - 2);
        prop_assert_eq!(encoded[1] as usize, packet.body_len());
    }

    #[test]
    fn noise_before_frame_yields_one_frame(
        noise in prop::collection::vec(any::<u8>().prop_filter("not START", |b| *b != FRAME_START), 0..64),
        packet in packet(),
    ) {
        let mut stream = noise.clone();
        stream.extend_from_slice(&packet.encode_to_vec().unwrap());

        let mut reader = FrameReader::new();
        let frames: Vec<Frame> = reader.frames(&stream).collect();

        prop_assert_eq!(frames.len(), 1);
        prop_assert_eq!(Packet::decode(&frames[0]).unwrap(), packet);
        prop_assert_eq!(reader.noise_bytes() as usize, noise.len());
    }

    #[test]
    fn chunking_does_not_change_frames(packet in packet(), split in any::<prop::sample::Index>()) {
        let encoded = packet.encode_to_vec().unwrap();
        let at = split.index(encoded.len() + 1);

        let mut reader = FrameReader::new();
        let mut frames: Vec<Frame> = reader.frames(&encoded[..at]).collect();
        frames.extend(reader.frames(&encoded[at..]));

        prop_assert_eq!(frames.len(), 1);
        prop_assert_eq!(Packet::decode(&frames[0]).unwrap(), packet);
    }

    #[test]
    fn arbitrary_bodies_never_panic(body in prop::collection::vec(any::<u8>(), 0..=255)) {
        let frame = Frame::new(&body).unwrap();
        let _ = Packet::decode(&frame);
    }
}

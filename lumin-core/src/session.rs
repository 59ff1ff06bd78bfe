//! Connection pipeline
//!
//! One `Connection` owns everything for one link:
//! ```text
//! Transport ─bytes─▶ Handshake ─(connected)─▶ FrameReader ─frame─▶ Packet::decode
//!                                                                      │
//!                             Dispatcher ◀─changes─ DeviceRegistry ◀───┘
//! ```
//! Execution is strictly sequential. Connections never share a registry.

use embedded_hal::delay::DelayNs;
use lumin_protocol::{
    sync_packets, CodecError, Device, DeviceType, Frame, FrameReader, Packet, ValueReport,
    FRAME_START,
};
use thiserror::Error;

use crate::config::{ConfigError, LinkConfig};
use crate::handshake::{Handshake, HandshakeError, HandshakeState};
use crate::registry::{DeviceRegistry, RegistryError, Snapshot};
use crate::traits::{Dispatcher, FrameRejection, LinkError, Transport};
use crate::wait::{poll_until, Deadline};

/// Buffer size for one transport read
const RX_BUF_SIZE: usize = 64;

/// Connection-level failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError {
    /// Send attempted before the handshake completed
    #[error("not connected")]
    NotConnected,
    /// Peer never answered the handshake
    #[error("handshake timed out")]
    HandshakeTimeout,
    /// Transport closed during a wait
    #[error("cancelled: link closed")]
    Cancelled,
    /// Handshake misuse
    #[error("handshake: {0}")]
    Handshake(HandshakeError),
    /// Outgoing packet could not be encoded
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    /// Outgoing packet would be refused by the peer's registry
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),
    /// Transport failure other than close
    #[error("link: {0}")]
    Link(LinkError),
    /// Invalid configuration
    #[error("config: {0}")]
    Config(#[from] ConfigError),
}

impl From<LinkError> for SessionError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Closed => SessionError::Cancelled,
            other => SessionError::Link(other),
        }
    }
}

impl From<HandshakeError> for SessionError {
    fn from(e: HandshakeError) -> Self {
        match e {
            HandshakeError::Timeout => SessionError::HandshakeTimeout,
            HandshakeError::Link(link) => link.into(),
            other => SessionError::Handshake(other),
        }
    }
}

/// Counters for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStats {
    /// Frames decoded and applied
    pub frames_accepted: u32,
    /// Frames dropped by the codec
    pub codec_rejects: u32,
    /// Frames dropped by the registry
    pub registry_rejects: u32,
    /// Bytes discarded while scanning for a frame start
    pub noise_bytes: u32,
    /// Partial frames dropped on inactivity
    pub partial_frames_dropped: u32,
    /// Bytes received while no handshake was armed or established, or
    /// while waiting for the peer's token
    pub bytes_ignored: u32,
    /// Handshakes that completed
    pub handshakes_completed: u32,
    /// Handshakes that hit their deadline
    pub handshake_timeouts: u32,
}

/// Protocol pipeline for one link
pub struct Connection<T: Transport, D: Dispatcher> {
    link: T,
    dispatcher: D,
    config: LinkConfig,
    handshake: Handshake,
    reader: FrameReader,
    registry: DeviceRegistry,
    stats: LinkStats,
}

impl<T: Transport, D: Dispatcher> Connection<T, D> {
    /// Create a disconnected connection over `link`
    pub fn new(link: T, dispatcher: D, config: LinkConfig) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            link,
            dispatcher,
            handshake: Handshake::new(&config),
            reader: FrameReader::with_timeout(config.frame_timeout_ms),
            registry: DeviceRegistry::new(),
            stats: LinkStats::default(),
            config,
        })
    }

    /// Handshake state
    pub fn state(&self) -> HandshakeState {
        self.handshake.state()
    }

    /// True once data frames are accepted
    pub fn is_connected(&self) -> bool {
        self.handshake.is_connected()
    }

    /// Active configuration
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Device registry for this link
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Immutable view of the current devices
    pub fn snapshot(&self) -> Snapshot<'_> {
        self.registry.snapshot()
    }

    /// Link counters
    pub fn stats(&self) -> LinkStats {
        LinkStats {
            noise_bytes: self.reader.noise_bytes(),
            partial_frames_dropped: self.reader.dropped_partials(),
            ..self.stats
        }
    }

    /// Dispatcher receiving change notifications
    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Mutable access to the dispatcher
    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }

    /// Arm the handshake without waiting for it
    ///
    /// A fresh handshake starts a fresh session: the registry is emptied.
    pub fn begin(&mut self) -> Result<(), SessionError> {
        self.handshake.begin(&mut self.link)?;
        self.reader.reset();
        self.registry.clear(&mut ());
        Ok(())
    }

    /// Run the handshake to completion or timeout
    pub fn connect<Dl: DelayNs>(&mut self, delay: &mut Dl) -> Result<(), SessionError> {
        self.begin()?;

        let interval = self.config.poll_interval_ms;
        poll_until(delay, interval, |elapsed| {
            self.poll(elapsed)?;
            Ok(self.is_connected().then_some(()))
        })
    }

    /// Run the handshake up to `attempts` times, backing off in between
    pub fn connect_with_retry<Dl: DelayNs>(
        &mut self,
        delay: &mut Dl,
        attempts: u32,
    ) -> Result<(), SessionError> {
        let attempts = attempts.max(1);
        let mut retry = 0;

        loop {
            match self.connect(delay) {
                Err(SessionError::HandshakeTimeout) if retry + 1 < attempts => {
                    let wait_ms = self.config.backoff.delay_ms(retry);
                    warn!("handshake attempt {} failed, retrying in {} ms", retry + 1, wait_ms);
                    delay.delay_ms(wait_ms);
                    retry += 1;
                }
                result => return result,
            }
        }
    }

    /// One non-blocking pipeline step
    ///
    /// `elapsed_ms` is the time since the previous call. Reads whatever the
    /// transport holds, advances the handshake or the frame reader, and
    /// returns the number of packets applied to the registry.
    pub fn poll(&mut self, elapsed_ms: u32) -> Result<usize, SessionError> {
        let mut buf = [0u8; RX_BUF_SIZE];
        let n = match self.link.read_available(&mut buf) {
            Ok(n) => n,
            Err(e) => return Err(self.link_failed(e)),
        };
        let mut bytes = &buf[..n];

        if self.handshake.state() == HandshakeState::Handshaking {
            match self.handshake.on_bytes_received(bytes, &mut self.link) {
                Ok(Some(consumed)) => {
                    self.stats.handshakes_completed += 1;
                    bytes = &bytes[consumed..];
                }
                Ok(None) => {
                    self.stats.bytes_ignored = self.stats.bytes_ignored.saturating_add(n as u32);
                    bytes = &[];
                }
                Err(HandshakeError::Link(e)) => return Err(self.link_failed(e)),
                Err(e) => return Err(e.into()),
            }

            if let Err(e) = self.handshake.advance_time(elapsed_ms) {
                self.stats.handshake_timeouts += 1;
                return Err(e.into());
            }
        }

        if !self.handshake.is_connected() {
            self.stats.bytes_ignored = self.stats.bytes_ignored.saturating_add(bytes.len() as u32);
            return Ok(0);
        }

        // A partial frame only ages while the link is silent
        if n == 0 {
            if self.reader.advance_time(elapsed_ms) {
                warn!("partial frame dropped after {} ms of silence", self.config.frame_timeout_ms);
            }
            return Ok(0);
        }

        self.accept_bytes(bytes)
    }

    /// Poll until at least one packet is applied or `timeout_ms` passes
    ///
    /// Returns the number of packets applied (0 on timeout).
    pub fn poll_for<Dl: DelayNs>(
        &mut self,
        delay: &mut Dl,
        timeout_ms: u32,
    ) -> Result<usize, SessionError> {
        let mut deadline = Deadline::after_ms(timeout_ms);
        let interval = self.config.poll_interval_ms;

        poll_until(delay, interval, |elapsed| {
            deadline.consume(elapsed);
            let applied = self.poll(elapsed)?;
            if applied > 0 {
                Ok(Some(applied))
            } else if deadline.is_expired() {
                Ok(Some(0))
            } else {
                Ok(None)
            }
        })
    }

    /// Encode and write one packet, mirroring it into the local registry
    ///
    /// Packets the peer's registry would refuse are rejected before any
    /// byte is written.
    pub fn send(&mut self, packet: &Packet) -> Result<(), SessionError> {
        if !self.handshake.is_connected() {
            return Err(SessionError::NotConnected);
        }

        self.registry.validate(packet)?;
        let encoded = packet.encode_to_vec()?;
        if let Err(e) = self.link.write(&encoded) {
            return Err(self.link_failed(e));
        }
        trace!("sent {:?} ({} bytes)", packet.packet_type(), encoded.len());

        self.registry.apply(packet, &mut ())?;
        Ok(())
    }

    /// Push a change to one device
    pub fn send_delta_update(&mut self, device: &Device) -> Result<(), SessionError> {
        self.send(&Packet::DeltaUpdate(device.clone()))
    }

    /// Bring the peer to exactly `devices`
    ///
    /// Uses one `FullSync` when the set fits a frame, otherwise a reset
    /// followed by per-device updates.
    pub fn sync(&mut self, devices: &[Device]) -> Result<(), SessionError> {
        for packet in sync_packets(devices)? {
            self.send(&packet)?;
        }
        info!("synchronized {} devices", devices.len());
        Ok(())
    }

    /// Report a locally changed value to the peer (firmware side)
    pub fn report_value(
        &mut self,
        id: u8,
        value: u8,
        device_type: DeviceType,
    ) -> Result<(), SessionError> {
        self.send(&Packet::ValueReport(ValueReport {
            id,
            value,
            device_type,
        }))
    }

    /// Tear down the session; the registry is discarded
    pub fn disconnect(&mut self) {
        self.teardown();
    }

    /// Consume the connection and hand back its collaborators
    pub fn close(mut self) -> (T, D) {
        self.teardown();
        (self.link, self.dispatcher)
    }

    fn link_failed(&mut self, e: LinkError) -> SessionError {
        if e == LinkError::Closed {
            info!("link closed, tearing down session");
            self.teardown();
        }
        e.into()
    }

    fn teardown(&mut self) {
        self.handshake.disconnect();
        self.reader.reset();
        self.registry.clear(&mut self.dispatcher);
    }

    fn accept_bytes(&mut self, bytes: &[u8]) -> Result<usize, SessionError> {
        let mut applied = 0;

        for &byte in bytes {
            // Bytes between frames may carry a restarted peer's greeting
            if !self.reader.is_assembling() && byte != FRAME_START {
                match self.handshake.on_idle_byte(byte, &mut self.link) {
                    Ok(true) => {
                        self.restart_session();
                        continue;
                    }
                    Ok(false) => {}
                    Err(HandshakeError::Link(e)) => return Err(self.link_failed(e)),
                    Err(e) => return Err(e.into()),
                }
            }

            let Some(frame) = self.reader.feed(byte) else {
                continue;
            };
            let registry = &mut self.registry;
            if accept_frame(&frame, registry, &mut self.dispatcher, &mut self.stats) {
                applied += 1;
            }
        }
        Ok(applied)
    }

    fn restart_session(&mut self) {
        self.stats.handshakes_completed += 1;
        self.reader.reset();
        self.registry.clear(&mut self.dispatcher);
    }
}

fn accept_frame<D: Dispatcher>(
    frame: &Frame,
    registry: &mut DeviceRegistry,
    dispatcher: &mut D,
    stats: &mut LinkStats,
) -> bool {
    let rejection = match Packet::decode(frame) {
        Ok(packet) => match registry.apply(&packet, dispatcher) {
            Ok(()) => {
                stats.frames_accepted += 1;
                trace!("applied {:?}", packet.packet_type());
                return true;
            }
            Err(e) => {
                stats.registry_rejects += 1;
                FrameRejection::Registry(e)
            }
        },
        Err(e) => {
            stats.codec_rejects += 1;
            FrameRejection::Codec(e)
        }
    };

    warn!("frame dropped: {:?}", rejection);
    dispatcher.on_frame_rejected(rejection);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumin_protocol::FRAME_START;

    #[derive(Default)]
    struct Loopback {
        inbound: std::collections::VecDeque<u8>,
        outbound: std::vec::Vec<u8>,
        closed: bool,
    }

    impl Loopback {
        fn push(&mut self, bytes: &[u8]) {
            self.inbound.extend(bytes.iter().copied());
        }
    }

    impl Transport for Loopback {
        fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
            if self.closed {
                return Err(LinkError::Closed);
            }
            let n = buf.len().min(self.inbound.len());
            for slot in &mut buf[..n] {
                *slot = self.inbound.pop_front().unwrap_or_default();
            }
            Ok(n)
        }

        fn write(&mut self, data: &[u8]) -> Result<(), LinkError> {
            if self.closed {
                return Err(LinkError::Closed);
            }
            self.outbound.extend_from_slice(data);
            Ok(())
        }
    }

    fn connected() -> Connection<Loopback, ()> {
        let mut conn = Connection::new(Loopback::default(), (), LinkConfig::default()).unwrap();
        conn.begin().unwrap();
        conn.link.push(b"LUMIN_ACK\r\n");
        conn.poll(0).unwrap();
        assert!(conn.is_connected());
        conn
    }

    fn speaker(id: u8, value: u8) -> Device {
        Device::new("Speaker", id, value, DeviceType::Volume).unwrap()
    }

    #[test]
    fn test_send_requires_connection() {
        let mut conn = Connection::new(Loopback::default(), (), LinkConfig::default()).unwrap();
        assert_eq!(
            conn.send_delta_update(&speaker(1, 10)),
            Err(SessionError::NotConnected)
        );
        assert!(conn.link.outbound.is_empty());
    }

    #[test]
    fn test_ack_trailer_is_noise() {
        let conn = connected();
        assert_eq!(conn.stats().noise_bytes, 2);
        assert_eq!(conn.stats().handshakes_completed, 1);
    }

    #[test]
    fn test_frame_after_ack_in_same_chunk() {
        let mut conn = Connection::new(Loopback::default(), (), LinkConfig::default()).unwrap();
        conn.begin().unwrap();

        let frame = Packet::DeltaUpdate(speaker(4, 20)).encode_to_vec().unwrap();
        conn.link.push(b"LUMIN_ACK");
        conn.link.push(&frame);

        assert_eq!(conn.poll(0), Ok(1));
        assert_eq!(conn.registry().get(4).unwrap().value, 20);
    }

    #[test]
    fn test_sent_packets_mirror_into_registry() {
        let mut conn = connected();
        conn.link.outbound.clear();

        conn.sync(&[speaker(1, 10), speaker(2, 20)]).unwrap();
        assert_eq!(conn.registry().len(), 2);
        assert_eq!(conn.link.outbound[0], FRAME_START);
        assert_eq!(conn.link.outbound[1] as usize, 2 + 2 * 35);
    }

    #[test]
    fn test_duplicate_sync_is_not_sent() {
        let mut conn = connected();
        conn.link.outbound.clear();

        let result = conn.send(&Packet::FullSync(
            lumin_protocol::FullSync::new(&[speaker(1, 10), speaker(1, 20)]).unwrap(),
        ));
        assert_eq!(
            result,
            Err(SessionError::Registry(RegistryError::DuplicateDeviceId(1)))
        );
        assert!(conn.link.outbound.is_empty());
    }

    #[test]
    fn test_closed_link_cancels() {
        let mut conn = connected();
        conn.sync(&[speaker(1, 10)]).unwrap();
        conn.link.closed = true;

        assert_eq!(conn.poll(0), Err(SessionError::Cancelled));
        assert_eq!(conn.state(), HandshakeState::Disconnected);
        assert!(conn.registry().is_empty());
    }

    #[test]
    fn test_bytes_before_token_are_counted() {
        let mut conn = Connection::new(Loopback::default(), (), LinkConfig::default()).unwrap();
        conn.begin().unwrap();

        conn.link.push(b"boot ok\r\n");
        assert_eq!(conn.poll(0), Ok(0));
        assert_eq!(conn.stats().bytes_ignored, 9);
        assert_eq!(conn.state(), HandshakeState::Handshaking);
    }

    #[test]
    fn test_closed_link_on_send_tears_down() {
        let mut conn = connected();
        conn.link.closed = true;

        assert_eq!(
            conn.send_delta_update(&speaker(1, 10)),
            Err(SessionError::Cancelled)
        );
        assert!(!conn.is_connected());
        assert!(conn.registry().is_empty());
    }

    #[test]
    fn test_rejected_frame_counts() {
        let mut conn = connected();
        conn.link.push(&[FRAME_START, 0x02, 0x7F, 0x00]);

        assert_eq!(conn.poll(0), Ok(0));
        assert_eq!(conn.stats().codec_rejects, 1);
    }
}

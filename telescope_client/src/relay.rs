/*!
Client for mounts exposed by a network relay server.

Speaks the binary remote-telescope protocol from [`shared::relay`] over any
[`Transport`], usually TCP. Link handling:

- `Disconnected` → a connection attempt is started → `Connecting`
- `Connecting` + transport opened → `Connected`
- `Connected` + transport closed or silent too long → `Lost`
- `Lost` → after the reconnect delay → `Disconnected` → next attempt
*/

use crate::client::{ClientContext, ClientCore, ClientSettings, TelescopeClient};
use crate::link::LinkState;
use crate::transport::{Transport, TransportEvent, MAX_EVENTS_PER_TICK};
use bytes::BytesMut;
use shared::relay::{RelayDecoder, RelayGoto, RelayPosition};
use shared::Vec3d;
use tracing::{debug, info, warn};

pub struct RelayTelescope {
    core: ClientCore,
    settings: ClientSettings,
    transport: Box<dyn Transport>,
    decoder: RelayDecoder,
    rx_buffer: BytesMut,
    /// Ticks left before the next connection attempt
    retry_wait: u32,
    ticks_since_rx: u32,
}

impl RelayTelescope {
    pub fn new(
        name: impl Into<String>,
        context: ClientContext,
        settings: &ClientSettings,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            core: ClientCore::new(name, context, settings.stale_after_ticks),
            settings: settings.clone(),
            transport,
            decoder: RelayDecoder::new(),
            rx_buffer: BytesMut::with_capacity(1024),
            retry_wait: 0,
            ticks_since_rx: 0,
        }
    }

    pub fn silence_timeout_ticks(&self) -> Option<u32> {
        self.settings.silence_timeout_ticks
    }

    /// Get decoder statistics: (frames decoded, frames skipped, bytes discarded)
    pub fn decoder_stats(&self) -> (u64, u64, u64) {
        self.decoder.stats()
    }

    /// Start a connection attempt if one is due; true if it did
    fn maybe_reconnect(&mut self) -> bool {
        if self.core.link_state() != LinkState::Disconnected || self.retry_wait > 0 {
            return false;
        }

        info!("[{}] connecting via {}", self.core.name(), self.transport.describe());
        match self.transport.reopen() {
            Ok(()) => {
                self.core.set_link_state(LinkState::Connecting);
            }
            Err(e) => {
                warn!("[{}] connection attempt failed: {}", self.core.name(), e);
                self.retry_wait = self.settings.reconnect_after_ticks;
            }
        }
        true
    }

    /// Tear the link down after a failure and schedule a retry
    fn link_failed(&mut self, reason: &str) {
        match self.core.link_state() {
            LinkState::Connected => {
                warn!("[{}] link failed: {}", self.core.name(), reason);
                self.core.set_link_state(LinkState::Lost);
            }
            LinkState::Connecting => {
                info!("[{}] connection attempt failed: {}", self.core.name(), reason);
                self.core.set_link_state(LinkState::Disconnected);
            }
            LinkState::Disconnected | LinkState::Lost => {}
        }
        self.rx_buffer.clear();
        self.retry_wait = self.settings.reconnect_after_ticks;
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                if self.core.link_state() == LinkState::Connecting {
                    self.rx_buffer.clear();
                    self.ticks_since_rx = 0;
                    self.core.set_link_state(LinkState::Connected);
                }
            }
            TransportEvent::Data(bytes) => {
                if self.core.is_connected() {
                    self.ticks_since_rx = 0;
                    self.rx_buffer.extend_from_slice(&bytes);
                } else {
                    debug!("[{}] ignoring {} bytes while {}", self.core.name(), bytes.len(), self.core.link_state());
                }
            }
            TransportEvent::Closed(reason) => self.link_failed(&reason),
        }
    }

    fn handle_position(&mut self, position: RelayPosition) {
        if !position.is_ok() {
            debug!("[{}] discarding position with status {}", self.core.name(), position.status);
            return;
        }
        let j2000 = self
            .core
            .frames()
            .equinox_to_j2000(&position.direction(), self.settings.equinox);
        self.core.accept_sample(j2000);
    }
}

impl TelescopeClient for RelayTelescope {
    fn core(&self) -> &ClientCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ClientCore {
        &mut self.core
    }

    fn telescope_goto(&mut self, j2000_pos: Vec3d) {
        if !self.core.is_connected() {
            warn!("[{}] goto dropped: not connected", self.core.name());
            return;
        }

        let device_direction = self.core.frames().j2000_to_equinox(&j2000_pos, self.settings.equinox);
        let goto = RelayGoto::from_direction(&device_direction, self.core.now_micros());
        let mut frame = BytesMut::with_capacity(shared::protocol::RELAY_GOTO_BYTES);
        goto.encode(&mut frame);

        match self.transport.send(frame.freeze()) {
            Ok(()) => debug!("[{}] goto {} sent", self.core.name(), j2000_pos),
            Err(e) => warn!("[{}] goto not sent: {}", self.core.name(), e),
        }
    }

    fn prepare_communication(&mut self) -> bool {
        self.maybe_reconnect()
    }

    fn perform_communication(&mut self) {
        self.core.begin_tick();

        match self.core.link_state() {
            LinkState::Disconnected | LinkState::Lost => {
                self.retry_wait = self.retry_wait.saturating_sub(1);
                if self.core.link_state() == LinkState::Lost && self.retry_wait == 0 {
                    self.core.set_link_state(LinkState::Disconnected);
                }
            }
            LinkState::Connected => self.ticks_since_rx = self.ticks_since_rx.saturating_add(1),
            LinkState::Connecting => {}
        }
        self.maybe_reconnect();

        for _ in 0..MAX_EVENTS_PER_TICK {
            match self.transport.try_next() {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }

        while let Some(position) = self.decoder.decode(&mut self.rx_buffer) {
            self.handle_position(position);
        }

        if let Some(limit) = self.settings.silence_timeout_ticks {
            if self.core.is_connected() && self.ticks_since_rx > limit {
                self.transport.close();
                self.link_failed(&format!("no data for {} ticks", self.ticks_since_rx));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DEFAULT_DATAGRAM_SILENCE_TICKS;
    use crate::frames::{IdentityFrames, ReferenceFrames};
    use crate::link::ConnectionEvent;
    use crate::transport::{memory_pair, MemoryPeer};
    use shared::{Equinox, ManualClock};
    use std::f64::consts::PI;
    use std::sync::Arc;

    fn relay_with(settings: ClientSettings, frames: Arc<dyn ReferenceFrames>) -> (RelayTelescope, MemoryPeer) {
        let (transport, peer) = memory_pair();
        let context = ClientContext::new(Arc::new(ManualClock::new(1_000)), frames);
        let telescope = RelayTelescope::new("Relay", context, &settings, Box::new(transport));
        (telescope, peer)
    }

    fn relay() -> (RelayTelescope, MemoryPeer) {
        let settings = ClientSettings {
            reconnect_after_ticks: 3,
            ..ClientSettings::default()
        };
        relay_with(settings, Arc::new(IdentityFrames))
    }

    fn connect(telescope: &mut RelayTelescope, peer: &MemoryPeer) {
        telescope.prepare_communication();
        peer.open();
        telescope.perform_communication();
        assert!(telescope.is_connected());
    }

    fn position_frame(direction: Vec3d) -> Vec<u8> {
        let mut buf = BytesMut::new();
        RelayPosition::from_direction(&direction, 0, 0).encode(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn test_prepare_starts_first_attempt() {
        let (mut telescope, peer) = relay();
        assert!(telescope.prepare_communication());
        assert_eq!(telescope.core().link_state(), LinkState::Connecting);
        assert!(!telescope.prepare_communication());
        assert_eq!(peer.reopen_count(), 1);
    }

    #[test]
    fn test_connects_without_prepare() {
        let (mut telescope, peer) = relay();
        telescope.perform_communication();
        assert_eq!(peer.reopen_count(), 1);

        peer.open();
        telescope.perform_communication();
        assert!(telescope.is_connected());
    }

    #[test]
    fn test_position_goes_stale_after_window() {
        let (mut telescope, peer) = relay();
        connect(&mut telescope, &peer);
        assert!(!telescope.has_known_position());

        peer.push(&position_frame(Vec3d::new(0.0, 1.0, 0.0)));
        telescope.perform_communication();
        assert!(telescope.has_known_position());

        for _ in 0..5 {
            telescope.perform_communication();
            assert!(telescope.has_known_position());
        }
        telescope.perform_communication();
        assert!(!telescope.has_known_position());
        assert!(telescope.is_connected());
    }

    #[test]
    fn test_no_input_leaves_state_unchanged() {
        let (mut telescope, peer) = relay();
        connect(&mut telescope, &peer);
        peer.push(&position_frame(Vec3d::new(0.0, 0.0, 1.0)));
        telescope.perform_communication();

        let position = telescope.j2000_equatorial_pos();
        for _ in 0..3 {
            telescope.perform_communication();
            assert_eq!(telescope.j2000_equatorial_pos(), position);
            assert!(telescope.is_connected());
            assert!(telescope.has_known_position());
        }
    }

    #[test]
    fn test_partial_frame_completes_on_later_tick() {
        let (mut telescope, peer) = relay();
        connect(&mut telescope, &peer);

        let frame = position_frame(Vec3d::new(1.0, 0.0, 0.0));
        peer.push(&frame[..7]);
        telescope.perform_communication();
        assert!(!telescope.has_known_position());

        peer.push(&frame[7..]);
        telescope.perform_communication();
        assert!(telescope.has_known_position());
    }

    #[test]
    fn test_bad_status_is_not_a_sample() {
        let (mut telescope, peer) = relay();
        connect(&mut telescope, &peer);

        let mut buf = BytesMut::new();
        RelayPosition::from_direction(&Vec3d::new(1.0, 0.0, 0.0), 0, -1).encode(&mut buf);
        peer.push(&buf);
        telescope.perform_communication();

        assert!(!telescope.has_known_position());
        assert_eq!(telescope.j2000_equatorial_pos(), None);
    }

    #[test]
    fn test_goto_while_disconnected_is_dropped_then_delivered_after_connect() {
        let (mut telescope, peer) = relay();
        let target = Vec3d::from_ra_dec(PI, 0.0);

        telescope.telescope_goto(target);
        assert!(!telescope.is_connected());
        assert!(peer.sent().is_empty());

        connect(&mut telescope, &peer);
        telescope.telescope_goto(target);

        let sent = peer.sent();
        assert_eq!(sent.len(), 1);
        let goto = RelayGoto::decode(&sent[0]).unwrap();
        assert_eq!(goto.ra, 0x8000_0000);
        assert_eq!(goto.dec, 0);
        assert_eq!(goto.client_micros, 1_000);
    }

    #[test]
    fn test_loss_fires_once_and_reconnects_after_delay() {
        let (mut telescope, peer) = relay();
        let events = telescope.subscribe();
        connect(&mut telescope, &peer);
        peer.push(&position_frame(Vec3d::new(1.0, 0.0, 0.0)));
        telescope.perform_communication();

        peer.close("reset by peer");
        telescope.perform_communication();
        assert_eq!(telescope.core().link_state(), LinkState::Lost);
        assert!(!telescope.has_known_position());

        // Waiting out the reconnect delay
        for _ in 0..3 {
            assert!(!telescope.prepare_communication());
            telescope.perform_communication();
        }
        assert_eq!(telescope.core().link_state(), LinkState::Connecting);
        assert_eq!(peer.reopen_count(), 2);

        peer.open();
        telescope.perform_communication();
        assert!(telescope.is_connected());
        assert!(!telescope.has_known_position());

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                ConnectionEvent::Established,
                ConnectionEvent::Lost,
                ConnectionEvent::Established
            ]
        );
    }

    #[test]
    fn test_failed_attempt_is_silent() {
        let (mut telescope, peer) = relay();
        let events = telescope.subscribe();
        telescope.prepare_communication();
        peer.close("connection refused");
        telescope.perform_communication();

        assert_eq!(telescope.core().link_state(), LinkState::Disconnected);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_silence_timeout() {
        let settings = ClientSettings {
            silence_timeout_ticks: Some(2),
            ..ClientSettings::default()
        };
        let (mut telescope, peer) = relay_with(settings, Arc::new(IdentityFrames));
        connect(&mut telescope, &peer);

        telescope.perform_communication();
        telescope.perform_communication();
        assert!(telescope.is_connected());
        telescope.perform_communication();
        assert_eq!(telescope.core().link_state(), LinkState::Lost);
    }

    #[test]
    fn test_datagram_link_drops_when_peer_is_silent() {
        let (mut telescope, peer) = relay_with(ClientSettings::default().for_datagrams(), Arc::new(IdentityFrames));
        let events = telescope.subscribe();
        connect(&mut telescope, &peer);
        assert_eq!(events.try_recv().unwrap(), ConnectionEvent::Established);

        for _ in 0..DEFAULT_DATAGRAM_SILENCE_TICKS {
            telescope.perform_communication();
        }
        assert!(telescope.is_connected());

        telescope.perform_communication();
        assert_eq!(telescope.core().link_state(), LinkState::Lost);
        assert_eq!(events.try_recv().unwrap(), ConnectionEvent::Lost);
    }

    #[test]
    fn test_configured_silence_timeout_is_kept_for_datagrams() {
        let settings = ClientSettings {
            silence_timeout_ticks: Some(7),
            ..ClientSettings::default()
        };
        assert_eq!(settings.for_datagrams().silence_timeout_ticks, Some(7));
    }

    /// Rotates RA by a fixed amount, standing in for precession
    struct ShiftedFrames;

    impl ReferenceFrames for ShiftedFrames {
        fn j2000_to_jnow(&self, v: &Vec3d) -> Vec3d {
            let (ra, dec) = v.to_ra_dec();
            Vec3d::from_ra_dec(ra + 0.25, dec)
        }

        fn jnow_to_j2000(&self, v: &Vec3d) -> Vec3d {
            let (ra, dec) = v.to_ra_dec();
            Vec3d::from_ra_dec(ra - 0.25, dec)
        }
    }

    #[test]
    fn test_device_equinox_conversion() {
        let settings = ClientSettings {
            equinox: Equinox::JNow,
            ..ClientSettings::default()
        };
        let (mut telescope, peer) = relay_with(settings, Arc::new(ShiftedFrames));
        connect(&mut telescope, &peer);

        telescope.telescope_goto(Vec3d::from_ra_dec(1.0, 0.0));
        let goto = RelayGoto::decode(&peer.sent()[0]).unwrap();
        let (ra, _) = goto.direction().to_ra_dec();
        assert!((ra - 1.25).abs() < 1e-6);

        peer.push(&position_frame(Vec3d::from_ra_dec(1.25, 0.5)));
        telescope.perform_communication();
        let (ra, dec) = telescope.j2000_equatorial_pos().unwrap().to_ra_dec();
        assert!((ra - 1.0).abs() < 1e-6);
        assert!((dec - 0.5).abs() < 1e-6);
    }
}

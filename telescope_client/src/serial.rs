/*!
Client for directly attached mounts speaking the LX200 command subset.

The byte stream usually comes from a serial-to-network bridge. Commands
are queued and each reply is matched to the oldest outstanding command.
The link only counts as connected once the mount has answered something.
A goto sends the slew only after the mount accepted both target coordinates.
*/

use crate::client::{ClientContext, ClientCore, ClientSettings, TelescopeClient};
use crate::link::LinkState;
use crate::transport::{Transport, TransportEvent, MAX_EVENTS_PER_TICK};
use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use shared::lx200::{Lx200Command, Lx200Reply, ReplyParse};
use shared::Vec3d;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// LX200 polling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Ticks between position polls while the queue is idle
    pub poll_interval_ticks: u32,

    /// Ticks the oldest outstanding command may wait for its reply
    pub reply_timeout_ticks: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            poll_interval_ticks: 2,
            reply_timeout_ticks: 10,
        }
    }
}

pub struct SerialTelescope {
    core: ClientCore,
    settings: ClientSettings,
    serial: SerialSettings,
    transport: Box<dyn Transport>,
    rx_buffer: BytesMut,
    outstanding: VecDeque<Lx200Command>,
    /// RA half of a position waiting for its Dec
    pending_ra: Option<f64>,
    opening: bool,
    retry_wait: u32,
    ticks_waiting: u32,
    ticks_since_poll: u32,
    /// Target coordinate commands still waiting for an answer
    target_acks_pending: u32,
    /// Slew once every pending target command is accepted
    slew_armed: bool,
}

impl SerialTelescope {
    pub fn new(
        name: impl Into<String>,
        context: ClientContext,
        settings: &ClientSettings,
        serial: &SerialSettings,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            core: ClientCore::new(name, context, settings.stale_after_ticks),
            settings: settings.clone(),
            serial: serial.clone(),
            transport,
            rx_buffer: BytesMut::with_capacity(256),
            outstanding: VecDeque::new(),
            pending_ra: None,
            opening: false,
            retry_wait: 0,
            ticks_waiting: 0,
            ticks_since_poll: 0,
            target_acks_pending: 0,
            slew_armed: false,
        }
    }

    /// Number of commands still waiting for a reply
    pub fn outstanding_commands(&self) -> usize {
        self.outstanding.len()
    }

    fn maybe_reconnect(&mut self) -> bool {
        if self.core.link_state() != LinkState::Disconnected || self.retry_wait > 0 || self.opening {
            return false;
        }

        info!("[{}] opening {}", self.core.name(), self.transport.describe());
        match self.transport.reopen() {
            Ok(()) => self.opening = true,
            Err(e) => {
                warn!("[{}] open failed: {}", self.core.name(), e);
                self.retry_wait = self.settings.reconnect_after_ticks;
            }
        }
        true
    }

    fn send_command(&mut self, command: Lx200Command) -> bool {
        match self.transport.send(Bytes::from(command.encode())) {
            Ok(()) => {
                if self.outstanding.is_empty() {
                    self.ticks_waiting = 0;
                }
                self.outstanding.push_back(command);
                true
            }
            Err(e) => {
                warn!("[{}] {:?} not sent: {}", self.core.name(), command, e);
                false
            }
        }
    }

    fn poll_position(&mut self) {
        self.ticks_since_poll = 0;
        self.send_command(Lx200Command::GetRa);
        self.send_command(Lx200Command::GetDec);
    }

    fn reset_exchange(&mut self) {
        self.outstanding.clear();
        self.rx_buffer.clear();
        self.pending_ra = None;
        self.ticks_waiting = 0;
        self.ticks_since_poll = 0;
        self.target_acks_pending = 0;
        self.slew_armed = false;
    }

    /// Record the answer to a target coordinate command
    fn target_answered(&mut self, accepted: bool) {
        self.target_acks_pending = self.target_acks_pending.saturating_sub(1);
        if !accepted {
            warn!("[{}] mount rejected target coordinates", self.core.name());
            self.slew_armed = false;
        }
        if self.target_acks_pending == 0 && self.slew_armed {
            self.slew_armed = false;
            self.send_command(Lx200Command::SlewToTarget);
        }
    }

    fn link_failed(&mut self, reason: &str) {
        self.opening = false;
        match self.core.link_state() {
            LinkState::Connected => {
                warn!("[{}] link failed: {}", self.core.name(), reason);
                self.core.set_link_state(LinkState::Lost);
            }
            LinkState::Connecting => {
                info!("[{}] mount not reachable: {}", self.core.name(), reason);
                self.core.set_link_state(LinkState::Disconnected);
            }
            LinkState::Disconnected | LinkState::Lost => {
                debug!("[{}] transport closed: {}", self.core.name(), reason);
            }
        }
        self.reset_exchange();
        self.retry_wait = self.settings.reconnect_after_ticks;
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                if self.opening {
                    self.opening = false;
                    self.reset_exchange();
                    self.core.set_link_state(LinkState::Connecting);
                    self.poll_position();
                }
            }
            TransportEvent::Data(bytes) => match self.core.link_state() {
                LinkState::Connecting | LinkState::Connected => self.rx_buffer.extend_from_slice(&bytes),
                _ => debug!("[{}] ignoring {} bytes while {}", self.core.name(), bytes.len(), self.core.link_state()),
            },
            TransportEvent::Closed(reason) => self.link_failed(&reason),
        }
    }

    fn process_replies(&mut self) {
        while let Some(command) = self.outstanding.front().copied() {
            match command.parse_reply(&self.rx_buffer) {
                ReplyParse::Incomplete => break,
                ReplyParse::Complete { reply, consumed } => {
                    self.rx_buffer.advance(consumed);
                    self.outstanding.pop_front();
                    self.ticks_waiting = 0;
                    self.handle_reply(reply);
                }
                ReplyParse::Malformed { consumed, reason } => {
                    debug!(
                        "[{}] malformed reply to {:?} ({}): {}",
                        self.core.name(),
                        command,
                        reason,
                        hex::encode(&self.rx_buffer[..consumed])
                    );
                    self.rx_buffer.advance(consumed);
                    self.outstanding.pop_front();
                    self.ticks_waiting = 0;
                    match command {
                        Lx200Command::GetRa | Lx200Command::GetDec => self.pending_ra = None,
                        Lx200Command::SetTargetRa(_) | Lx200Command::SetTargetDec(_) => self.target_answered(false),
                        _ => {}
                    }
                }
            }
        }

        if self.outstanding.is_empty() && !self.rx_buffer.is_empty() {
            debug!("[{}] discarding unsolicited bytes: {}", self.core.name(), hex::encode(&self.rx_buffer));
            self.rx_buffer.clear();
        }
    }

    fn handle_reply(&mut self, reply: Lx200Reply) {
        if self.core.link_state() == LinkState::Connecting {
            self.core.set_link_state(LinkState::Connected);
        }

        match reply {
            Lx200Reply::Ra(ra) => self.pending_ra = Some(ra),
            Lx200Reply::Dec(dec) => {
                if let Some(ra) = self.pending_ra.take() {
                    let device = Vec3d::from_ra_dec(ra, dec);
                    let j2000 = self.core.frames().equinox_to_j2000(&device, self.settings.equinox);
                    self.core.accept_sample(j2000);
                }
            }
            Lx200Reply::Accepted(accepted) => self.target_answered(accepted),
            Lx200Reply::Slew(Ok(())) => debug!("[{}] slewing", self.core.name()),
            Lx200Reply::Slew(Err(message)) => warn!("[{}] slew refused: {}", self.core.name(), message),
        }
    }
}

impl TelescopeClient for SerialTelescope {
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

        let device = self.core.frames().j2000_to_equinox(&j2000_pos, self.settings.equinox);
        let (ra, dec) = device.to_ra_dec();
        let sent = [Lx200Command::SetTargetRa(ra), Lx200Command::SetTargetDec(dec)]
            .into_iter()
            .filter(|&command| self.send_command(command))
            .count();
        if sent == 2 {
            self.target_acks_pending += 2;
            self.slew_armed = true;
        } else {
            self.target_acks_pending += sent as u32;
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
            LinkState::Connecting | LinkState::Connected => {}
        }
        self.maybe_reconnect();

        for _ in 0..MAX_EVENTS_PER_TICK {
            match self.transport.try_next() {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }

        self.process_replies();

        if !self.outstanding.is_empty() {
            self.ticks_waiting += 1;
            if self.ticks_waiting > self.serial.reply_timeout_ticks {
                let reason = format!("no reply to {:?} within {} ticks", self.outstanding[0], self.serial.reply_timeout_ticks);
                self.transport.close();
                self.link_failed(&reason);
            }
        } else if self.core.is_connected() {
            self.ticks_since_poll += 1;
            if self.ticks_since_poll >= self.serial.poll_interval_ticks {
                self.poll_position();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::IdentityFrames;
    use crate::link::ConnectionEvent;
    use crate::transport::{memory_pair, MemoryPeer};
    use shared::ManualClock;
    use std::f64::consts::PI;
    use std::sync::Arc;

    const POLL: &[u8] = b":GR#:GD#";

    fn serial() -> (SerialTelescope, MemoryPeer) {
        let (transport, peer) = memory_pair();
        let context = ClientContext::new(Arc::new(ManualClock::new(0)), Arc::new(IdentityFrames));
        let settings = ClientSettings {
            reconnect_after_ticks: 3,
            ..ClientSettings::default()
        };
        let serial = SerialSettings {
            poll_interval_ticks: 2,
            reply_timeout_ticks: 3,
        };
        let telescope = SerialTelescope::new("LX200", context, &settings, &serial, Box::new(transport));
        (telescope, peer)
    }

    /// Open the link and answer the first poll
    fn connect(telescope: &mut SerialTelescope, peer: &MemoryPeer) {
        assert!(telescope.prepare_communication());
        peer.open();
        telescope.perform_communication();
        assert_eq!(telescope.core().link_state(), LinkState::Connecting);
        assert_eq!(peer.sent_bytes(), POLL);

        peer.push(b"12:00:00#+45*00:00#");
        telescope.perform_communication();
        assert!(telescope.is_connected());
    }

    /// Tick until a position poll has been sent
    fn await_poll(telescope: &mut SerialTelescope, peer: &MemoryPeer) {
        for _ in 0..10 {
            if peer.sent_bytes().ends_with(POLL) {
                return;
            }
            telescope.perform_communication();
        }
        panic!("no position poll sent");
    }

    #[test]
    fn test_first_reply_connects() {
        let (mut telescope, peer) = serial();
        let events = telescope.subscribe();
        connect(&mut telescope, &peer);

        assert!(telescope.has_known_position());
        let position = telescope.j2000_equatorial_pos().unwrap();
        assert!((position.ra_hours() - 12.0).abs() < 1e-9);
        assert!((position.dec_degrees() - 45.0).abs() < 1e-9);
        assert_eq!(telescope.outstanding_commands(), 0);
        assert_eq!(events.try_iter().collect::<Vec<_>>(), vec![ConnectionEvent::Established]);
    }

    #[test]
    fn test_silent_mount_never_connects() {
        let (mut telescope, peer) = serial();
        let events = telescope.subscribe();
        telescope.prepare_communication();
        peer.open();

        for _ in 0..5 {
            telescope.perform_communication();
        }
        assert!(!telescope.is_connected());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_reply_split_across_ticks() {
        let (mut telescope, peer) = serial();
        connect(&mut telescope, &peer);
        await_poll(&mut telescope, &peer);

        peer.push(b"06:00");
        telescope.perform_communication();
        assert_eq!(telescope.outstanding_commands(), 2);

        peer.push(b":00#-10*30");
        telescope.perform_communication();
        assert_eq!(telescope.outstanding_commands(), 1);

        peer.push(b":00#");
        telescope.perform_communication();
        let position = telescope.j2000_equatorial_pos().unwrap();
        assert!((position.ra_hours() - 6.0).abs() < 1e-9);
        assert!((position.dec_degrees() + 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_reply_fails_command_only() {
        let (mut telescope, peer) = serial();
        connect(&mut telescope, &peer);
        let before = telescope.j2000_equatorial_pos();
        await_poll(&mut telescope, &peer);

        peer.push(b"garbage#+10*00:00#");
        telescope.perform_communication();

        assert!(telescope.is_connected());
        assert_eq!(telescope.outstanding_commands(), 0);
        // The Dec alone does not make a sample
        assert_eq!(telescope.j2000_equatorial_pos(), before);
    }

    #[test]
    fn test_reply_timeout_loses_link_once() {
        let (mut telescope, peer) = serial();
        let events = telescope.subscribe();
        connect(&mut telescope, &peer);
        await_poll(&mut telescope, &peer);

        for _ in 0..4 {
            telescope.perform_communication();
        }
        assert_eq!(telescope.core().link_state(), LinkState::Lost);
        assert_eq!(telescope.outstanding_commands(), 0);
        assert!(!telescope.has_known_position());

        telescope.perform_communication();
        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![ConnectionEvent::Established, ConnectionEvent::Lost]
        );
    }

    #[test]
    fn test_reconnects_after_loss() {
        let (mut telescope, peer) = serial();
        connect(&mut telescope, &peer);

        peer.close("bridge went away");
        telescope.perform_communication();
        assert_eq!(telescope.core().link_state(), LinkState::Lost);

        for _ in 0..3 {
            telescope.perform_communication();
        }
        assert_eq!(telescope.core().link_state(), LinkState::Disconnected);
        assert_eq!(peer.reopen_count(), 2);

        peer.open();
        telescope.perform_communication();
        assert_eq!(peer.sent_bytes(), POLL);
        peer.push(b"01:00:00#+01*00:00#");
        telescope.perform_communication();
        assert!(telescope.has_known_position());
    }

    #[test]
    fn test_goto_sends_target_then_slew() {
        let (mut telescope, peer) = serial();

        telescope.telescope_goto(Vec3d::from_ra_dec(PI / 2.0, PI / 6.0));
        assert!(peer.sent().is_empty());

        connect(&mut telescope, &peer);
        telescope.telescope_goto(Vec3d::from_ra_dec(PI / 2.0, PI / 6.0));
        assert_eq!(peer.sent_bytes(), b":Sr 06:00:00#:Sd +30*00:00#");
        assert_eq!(telescope.outstanding_commands(), 2);

        peer.push(b"1");
        telescope.perform_communication();
        assert_eq!(telescope.outstanding_commands(), 1);
        assert!(peer.sent_bytes().is_empty());

        peer.push(b"1");
        telescope.perform_communication();
        assert_eq!(peer.sent_bytes(), b":MS#");
        assert_eq!(telescope.outstanding_commands(), 1);

        peer.push(b"1Below horizon#");
        telescope.perform_communication();
        assert!(telescope.is_connected());
        assert_eq!(telescope.outstanding_commands(), 0);

        await_poll(&mut telescope, &peer);
        peer.push(b"06:00:00#+30*00:00#");
        telescope.perform_communication();
        let position = telescope.j2000_equatorial_pos().unwrap();
        assert!((position.ra_hours() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejected_target_skips_slew() {
        let (mut telescope, peer) = serial();
        connect(&mut telescope, &peer);

        telescope.telescope_goto(Vec3d::from_ra_dec(PI / 2.0, PI / 6.0));
        assert_eq!(peer.sent_bytes(), b":Sr 06:00:00#:Sd +30*00:00#");
        peer.push(b"10");
        telescope.perform_communication();

        // Queue drained, so the next thing sent is a position poll and not a slew
        assert!(telescope.is_connected());
        assert_eq!(peer.sent_bytes(), POLL);
        peer.push(b"06:00:00#+30*00:00#");
        telescope.perform_communication();
        assert_eq!(telescope.outstanding_commands(), 0);

        // The next goto is independent of the rejected one
        telescope.telescope_goto(Vec3d::from_ra_dec(PI / 2.0, PI / 6.0));
        assert_eq!(peer.sent_bytes(), b":Sr 06:00:00#:Sd +30*00:00#");
        peer.push(b"11");
        telescope.perform_communication();
        assert_eq!(peer.sent_bytes(), b":MS#");
    }

    #[test]
    fn test_unsolicited_bytes_are_discarded() {
        let (mut telescope, peer) = serial();
        connect(&mut telescope, &peer);

        peer.push(b"stray#");
        telescope.perform_communication();
        await_poll(&mut telescope, &peer);

        peer.push(b"02:00:00#+02*00:00#");
        telescope.perform_communication();
        let position = telescope.j2000_equatorial_pos().unwrap();
        assert!((position.ra_hours() - 2.0).abs() < 1e-9);
    }
}

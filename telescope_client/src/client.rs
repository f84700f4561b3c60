/*!
The telescope client contract.

A telescope client represents one device inside the host: it has a stable
name, a reticle position derived from device samples, FOV circles, and a
non-blocking communication step the host calls once per tick.

Concrete clients embed a [`ClientCore`] holding the state every client
shares, and implement [`TelescopeClient`] on top of it. The provided
methods of the trait read the core, so the connectivity and position
predicates stay consistent across variants.
*/

use crate::frames::{IdentityFrames, ReferenceFrames};
use crate::info::{build_info_string, InfoFlags};
use crate::link::{ConnectionEvent, LinkState, LinkStateMachine};
use crate::position::{PositionSample, PositionTracker, DEFAULT_STALE_AFTER_TICKS};
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use shared::{Clock, Equinox, FovIndicatorSet, SystemClock, Vec3d};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Selection priority of telescope reticles; natural objects rank above them
pub const TELESCOPE_SELECT_PRIORITY: f32 = -10.0;

/// Silence timeout for UDP relays when none is configured
pub const DEFAULT_DATAGRAM_SILENCE_TICKS: u32 = 50;

/// Type label shown in info strings
pub const TELESCOPE_OBJECT_TYPE: &str = "Telescope";

/// Host services shared by all clients
#[derive(Clone)]
pub struct ClientContext {
    pub clock: Arc<dyn Clock>,
    pub frames: Arc<dyn ReferenceFrames>,
}

impl ClientContext {
    pub fn new(clock: Arc<dyn Clock>, frames: Arc<dyn ReferenceFrames>) -> Self {
        Self { clock, frames }
    }
}

impl Default for ClientContext {
    /// System clock and J2000-only frames
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(IdentityFrames))
    }
}

/// Per-client tuning shared by every variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Equinox the device reports and accepts coordinates in
    pub equinox: Equinox,

    /// Ticks a position sample stays fresh
    pub stale_after_ticks: u32,

    /// Ticks to wait after a failure before the next connection attempt
    pub reconnect_after_ticks: u32,

    /// Declare the link lost after this many ticks without inbound bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silence_timeout_ticks: Option<u32>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            equinox: Equinox::J2000,
            stale_after_ticks: DEFAULT_STALE_AFTER_TICKS,
            reconnect_after_ticks: 50,
            silence_timeout_ticks: None,
        }
    }
}

impl ClientSettings {
    /// Copy with a silence timeout filled in, for links that never report a close
    pub fn for_datagrams(&self) -> Self {
        Self {
            silence_timeout_ticks: self.silence_timeout_ticks.or(Some(DEFAULT_DATAGRAM_SILENCE_TICKS)),
            ..self.clone()
        }
    }
}

/// State every telescope client owns
pub struct ClientCore {
    name: String,
    name_i18n: String,
    fov: FovIndicatorSet,
    link: LinkStateMachine,
    position: PositionTracker,
    context: ClientContext,
    ticks: u64,
}

impl ClientCore {
    pub fn new(name: impl Into<String>, context: ClientContext, stale_after_ticks: u32) -> Self {
        let name = name.into();
        Self {
            name_i18n: name.clone(),
            name,
            fov: FovIndicatorSet::new(),
            link: LinkStateMachine::new(),
            position: PositionTracker::new(stale_after_ticks),
            context,
            ticks: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_i18n(&self) -> &str {
        &self.name_i18n
    }

    pub fn set_name_i18n(&mut self, name: impl Into<String>) {
        self.name_i18n = name.into();
    }

    pub fn fov(&self) -> &FovIndicatorSet {
        &self.fov
    }

    pub fn fov_mut(&mut self) -> &mut FovIndicatorSet {
        &mut self.fov
    }

    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    pub fn now_micros(&self) -> i64 {
        self.context.clock.now_micros()
    }

    pub fn frames(&self) -> &dyn ReferenceFrames {
        self.context.frames.as_ref()
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn link(&self) -> &LinkStateMachine {
        &self.link
    }

    pub fn subscribe(&mut self) -> Receiver<ConnectionEvent> {
        self.link.subscribe()
    }

    /// Move the link to `next`, notifying observers on edges.
    ///
    /// Leaving `Connected` invalidates the current position immediately.
    pub fn set_link_state(&mut self, next: LinkState) -> Option<ConnectionEvent> {
        let previous = self.link.state();
        let event = self.link.transition(next);

        if previous != next {
            debug!("[{}] link {} -> {}", self.name, previous, next);
        }
        match event {
            Some(ConnectionEvent::Established) => {
                info!("🔭 [{}] connection established", self.name);
            }
            Some(ConnectionEvent::Lost) => {
                warn!("⚠️ [{}] connection lost", self.name);
                self.position.invalidate();
            }
            None => {}
        }
        event
    }

    /// Start a communication tick
    pub fn begin_tick(&mut self) {
        self.ticks += 1;
        self.position.tick();
    }

    /// Number of communication ticks so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Record a device reading already converted to J2000.
    ///
    /// Readings are only accepted while connected; returns whether it was kept.
    pub fn accept_sample(&mut self, j2000: Vec3d) -> bool {
        if !self.is_connected() || !j2000.is_finite() {
            debug!("[{}] ignoring position sample while {}", self.name, self.link.state());
            return false;
        }
        let sample = PositionSample {
            timestamp_us: self.now_micros(),
            j2000: j2000.normalized(),
        };
        self.position.accept(sample);
        true
    }

    pub fn has_known_position(&self) -> bool {
        self.is_connected() && self.position.is_fresh()
    }

    /// Most recent accepted sample, fresh or not
    pub fn last_sample(&self) -> Option<&PositionSample> {
        self.position.last()
    }

    pub fn position(&self) -> &PositionTracker {
        &self.position
    }
}

/// Uniform interface the host uses for every kind of telescope
pub trait TelescopeClient {
    fn core(&self) -> &ClientCore;

    fn core_mut(&mut self) -> &mut ClientCore;

    /// Dispatch a pointing request toward a J2000 direction.
    ///
    /// Never blocks. Only dispatch is promised, not arrival; while not
    /// connected the request is dropped.
    fn telescope_goto(&mut self, j2000_pos: Vec3d);

    fn is_connected(&self) -> bool {
        self.core().is_connected()
    }

    /// True once internal setup is complete
    fn is_initialized(&self) -> bool {
        true
    }

    /// True while a fresh device sample is available
    fn has_known_position(&self) -> bool {
        self.core().has_known_position()
    }

    /// Per-tick pre-flight hook, called before [`perform_communication`].
    ///
    /// Returns true on ticks where the client did pre-flight work such as
    /// starting a connection attempt. The host performs communication
    /// either way.
    ///
    /// [`perform_communication`]: TelescopeClient::perform_communication
    fn prepare_communication(&mut self) -> bool {
        false
    }

    /// One bounded, non-blocking I/O step
    fn perform_communication(&mut self) {}

    fn english_name(&self) -> &str {
        self.core().name()
    }

    fn name_i18n(&self) -> &str {
        self.core().name_i18n()
    }

    fn set_name_i18n(&mut self, name: String) {
        self.core_mut().set_name_i18n(name);
    }

    /// Add a FOV circle of the given diameter in degrees; negative values are ignored
    fn add_fov_circle(&mut self, fov: f64) {
        self.core_mut().fov_mut().add(fov);
    }

    fn fov_circles(&self) -> &[f64] {
        self.core().fov().list()
    }

    fn reset_fov_circles(&mut self) {
        self.core_mut().fov_mut().clear();
    }

    /// Direction of the last real sample in J2000, `None` before the first one
    fn j2000_equatorial_pos(&self) -> Option<Vec3d> {
        self.core().last_sample().map(|s| s.j2000)
    }

    /// Subscribe to connection-established / connection-lost notifications
    fn subscribe(&mut self) -> Receiver<ConnectionEvent> {
        self.core_mut().subscribe()
    }

    fn object_type(&self) -> &'static str {
        TELESCOPE_OBJECT_TYPE
    }

    fn select_priority(&self) -> f32 {
        TELESCOPE_SELECT_PRIORITY
    }

    /// Summary of the current cached state; performs no I/O
    fn info_string(&self, flags: &InfoFlags) -> String {
        let core = self.core();
        build_info_string(
            core.name_i18n(),
            self.object_type(),
            core.last_sample().map(|s| &s.j2000),
            core.frames(),
            flags,
        )
    }
}

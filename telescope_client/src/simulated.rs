/*!
Simulated mount.

Needs no transport: it "connects" over two ticks and then, on every tick,
swings a fixed fraction of the way toward the last goto target.
*/

use crate::client::{ClientContext, ClientCore, ClientSettings, TelescopeClient};
use crate::link::LinkState;
use serde::{Deserialize, Serialize};
use shared::Vec3d;
use std::f64::consts::PI;
use tracing::{debug, warn};

/// Fraction of the remaining distance covered per tick
pub const DEFAULT_SLEW_FRACTION: f64 = 1.0 / 32.0;

/// Simulated mount parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedSettings {
    pub initial_ra_hours: f64,
    pub initial_dec_degrees: f64,
    pub slew_fraction: f64,
}

impl Default for SimulatedSettings {
    fn default() -> Self {
        Self {
            initial_ra_hours: 0.0,
            initial_dec_degrees: 0.0,
            slew_fraction: DEFAULT_SLEW_FRACTION,
        }
    }
}

pub struct SimulatedTelescope {
    core: ClientCore,
    current: Vec3d,
    target: Vec3d,
    slew_fraction: f64,
}

impl SimulatedTelescope {
    pub fn new(
        name: impl Into<String>,
        context: ClientContext,
        settings: &ClientSettings,
        simulated: &SimulatedSettings,
    ) -> Self {
        let start = Vec3d::from_ra_dec(
            simulated.initial_ra_hours * PI / 12.0,
            simulated.initial_dec_degrees.to_radians(),
        );
        let slew_fraction = if simulated.slew_fraction > 0.0 {
            simulated.slew_fraction.min(1.0)
        } else {
            DEFAULT_SLEW_FRACTION
        };

        Self {
            core: ClientCore::new(name, context, settings.stale_after_ticks),
            current: start,
            target: start,
            slew_fraction,
        }
    }

    pub fn target(&self) -> Vec3d {
        self.target
    }

    /// Advance the mount one step toward the target
    fn step(&mut self) {
        let mut target = self.target;
        // Exactly opposite directions would never leave the current axis
        if self.current.dot(&target) < -0.999_999 {
            let mut side = self.current.cross(&Vec3d::new(0.0, 0.0, 1.0));
            if side.length() < 1e-6 {
                side = self.current.cross(&Vec3d::new(1.0, 0.0, 0.0));
            }
            target = (target + side.normalized() * 1e-3).normalized();
        }

        let blended = self.current * (1.0 - self.slew_fraction) + target * self.slew_fraction;
        self.current = blended.normalized();
    }
}

impl TelescopeClient for SimulatedTelescope {
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
        if !j2000_pos.is_finite() || j2000_pos.length() == 0.0 {
            warn!("[{}] goto dropped: invalid direction", self.core.name());
            return;
        }
        self.target = j2000_pos.normalized();
        debug!("[{}] slewing to {}", self.core.name(), self.target);
    }

    fn perform_communication(&mut self) {
        self.core.begin_tick();

        match self.core.link_state() {
            LinkState::Disconnected | LinkState::Lost => {
                self.core.set_link_state(LinkState::Connecting);
            }
            LinkState::Connecting => {
                self.core.set_link_state(LinkState::Connected);
                self.core.accept_sample(self.current);
            }
            LinkState::Connected => {
                self.step();
                self.core.accept_sample(self.current);
            }
        }
    }
}

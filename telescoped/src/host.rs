/*!
Polling loop driving every configured telescope.

Each tick calls `prepare_communication()` then `perform_communication()` on
every client in order, drains their connection notifications and delivers
a pending goto once its telescope is connected.
*/

use crate::config::AppConfig;
use anyhow::{bail, Context, Result};
use crossbeam_channel::Receiver;
use serde::Serialize;
use shared::Vec3d;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use telescope_client::{
    ClientContext, ConnectionEvent, InfoCategory, InfoFlags, Telescope, TelescopeClient,
};
use tracing::{debug, info, warn};

/// Snapshot of one client for status output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientStatus {
    pub name: String,
    pub localized_name: String,
    pub kind: &'static str,
    pub connected: bool,
    pub initialized: bool,
    pub known_position: bool,
    pub ra_hours: Option<f64>,
    pub dec_degrees: Option<f64>,
    pub fov_circles: Vec<f64>,
}

impl ClientStatus {
    pub fn of(telescope: &Telescope) -> Self {
        let position = telescope.j2000_equatorial_pos();
        Self {
            name: telescope.english_name().to_string(),
            localized_name: telescope.name_i18n().to_string(),
            kind: telescope.kind(),
            connected: telescope.is_connected(),
            initialized: telescope.is_initialized(),
            known_position: telescope.has_known_position(),
            ra_hours: position.map(|p| p.ra_hours()),
            dec_degrees: position.map(|p| p.dec_degrees()),
            fov_circles: telescope.fov_circles().to_vec(),
        }
    }
}

struct ClientSlot {
    telescope: Telescope,
    events: Receiver<ConnectionEvent>,
}

struct PendingGoto {
    name: String,
    target: Vec3d,
}

pub struct TelescopeHost {
    clients: Vec<ClientSlot>,
    running: Arc<AtomicBool>,
    tick_interval: Duration,
    status_interval_ticks: u64,
    json_status: bool,
    pending_goto: Option<PendingGoto>,
    ticks: u64,
}

impl TelescopeHost {
    pub fn new(config: &AppConfig, context: ClientContext) -> Result<Self> {
        config.validate()?;

        let mut clients = Vec::with_capacity(config.telescopes.len());
        for telescope_config in &config.telescopes {
            let mut telescope = Telescope::from_config(telescope_config, context.clone())
                .with_context(|| format!("Failed to create telescope '{}'", telescope_config.name))?;
            let events = telescope.subscribe();
            info!("🔭 Added {} telescope '{}'", telescope.kind(), telescope.english_name());
            clients.push(ClientSlot { telescope, events });
        }

        Ok(Self {
            clients,
            running: Arc::new(AtomicBool::new(true)),
            tick_interval: Duration::from_millis(config.host.tick_interval_ms),
            status_interval_ticks: config.host.status_interval_ticks,
            json_status: config.host.json_status,
            pending_goto: None,
            ticks: 0,
        })
    }

    /// Get a reference to the running flag for external control
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn set_json_status(&mut self, json: bool) {
        self.json_status = json;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn telescopes(&self) -> impl Iterator<Item = &Telescope> {
        self.clients.iter().map(|slot| &slot.telescope)
    }

    /// Slew `name` to the given J2000 coordinates once it is connected
    pub fn queue_goto(&mut self, name: &str, ra_hours: f64, dec_degrees: f64) -> Result<()> {
        if !self.clients.iter().any(|slot| slot.telescope.english_name() == name) {
            bail!("no telescope named '{}'", name);
        }
        if !(0.0..24.0).contains(&ra_hours) || !(-90.0..=90.0).contains(&dec_degrees) {
            bail!("target out of range: RA {} h, Dec {}°", ra_hours, dec_degrees);
        }

        self.pending_goto = Some(PendingGoto {
            name: name.to_string(),
            target: Vec3d::from_ra_dec(ra_hours * PI / 12.0, dec_degrees.to_radians()),
        });
        Ok(())
    }

    pub fn goto_pending(&self) -> bool {
        self.pending_goto.is_some()
    }

    /// Run one communication tick; returns the connection events it produced
    pub fn tick(&mut self) -> Vec<(String, ConnectionEvent)> {
        self.ticks += 1;
        let mut events = Vec::new();

        for slot in &mut self.clients {
            if slot.telescope.prepare_communication() {
                debug!("[{}] pre-flight work this tick", slot.telescope.english_name());
            }
            slot.telescope.perform_communication();

            for event in slot.events.try_iter() {
                let name = slot.telescope.english_name().to_string();
                match event {
                    ConnectionEvent::Established => info!("✅ {} connected", name),
                    ConnectionEvent::Lost => warn!("❌ {} disconnected", name),
                }
                events.push((name, event));
            }
        }

        self.dispatch_goto();
        events
    }

    fn dispatch_goto(&mut self) {
        let Some(goto) = &self.pending_goto else {
            return;
        };
        let Some(slot) = self
            .clients
            .iter_mut()
            .find(|slot| slot.telescope.english_name() == goto.name)
        else {
            return;
        };

        if slot.telescope.is_connected() {
            info!("🎯 Goto {} -> {}", goto.name, goto.target);
            slot.telescope.telescope_goto(goto.target);
            self.pending_goto = None;
        }
    }

    pub fn statuses(&self) -> Vec<ClientStatus> {
        self.telescopes().map(ClientStatus::of).collect()
    }

    /// Render the status report printed every status interval
    pub fn status_report(&self) -> Result<String> {
        if self.json_status {
            return serde_json::to_string(&self.statuses()).context("Failed to serialize status");
        }

        let flags = InfoFlags::all().with(InfoCategory::PlainText);
        let mut report = String::new();
        for telescope in self.telescopes() {
            let state = if telescope.has_known_position() {
                "tracking"
            } else if telescope.is_connected() {
                "no position"
            } else {
                "offline"
            };
            report.push_str(&format!("[{}]\n{}\n", state, telescope.info_string(&flags)));
        }
        Ok(report)
    }

    /// Tick until stopped, or until `max_ticks` ticks have run
    pub fn run(&mut self, max_ticks: Option<u64>) -> Result<()> {
        self.run_loop(max_ticks, false)
    }

    /// Like [`run`](Self::run), but also stops once the queued goto is sent
    pub fn run_until_goto_sent(&mut self, max_ticks: Option<u64>) -> Result<()> {
        self.run_loop(max_ticks, true)
    }

    fn run_loop(&mut self, max_ticks: Option<u64>, until_goto_sent: bool) -> Result<()> {
        info!(
            "🚀 Polling {} telescope(s) every {} ms",
            self.clients.len(),
            self.tick_interval.as_millis()
        );

        while self.running.load(Ordering::SeqCst) {
            if max_ticks.is_some_and(|max| self.ticks >= max) {
                break;
            }

            self.tick();

            if self.status_interval_ticks > 0 && self.ticks % self.status_interval_ticks == 0 {
                println!("{}", self.status_report()?);
            }
            if until_goto_sent && !self.goto_pending() {
                break;
            }

            thread::sleep(self.tick_interval);
        }

        info!("🛑 Stopped after {} ticks", self.ticks);
        Ok(())
    }
}

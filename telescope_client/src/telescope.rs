/*!
The closed set of telescope kinds and their configuration.
*/

use crate::client::{ClientContext, ClientCore, ClientSettings, TelescopeClient};
use crate::error::{ClientError, Result};
use crate::relay::RelayTelescope;
use crate::serial::{SerialSettings, SerialTelescope};
use crate::simulated::{SimulatedSettings, SimulatedTelescope};
use crate::transport::{SocketKind, SocketSettings, SocketTransport};
use serde::{Deserialize, Serialize};
use shared::Vec3d;

/// One configured telescope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelescopeConfig {
    pub name: String,

    /// Display name; the English name is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localized_name: Option<String>,

    /// FOV circle diameters in degrees
    #[serde(default)]
    pub fov_circles: Vec<f64>,

    #[serde(flatten)]
    pub settings: ClientSettings,

    pub kind: TelescopeKind,
}

/// Kind-specific parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TelescopeKind {
    Simulated(SimulatedSettings),
    Relay {
        /// Relay server `host:port`
        address: String,
        #[serde(default)]
        protocol: SocketKind,
    },
    Serial {
        /// `host:port` of the serial bridge
        address: String,
        #[serde(flatten)]
        serial: SerialSettings,
    },
}

impl TelescopeConfig {
    pub fn simulated(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            localized_name: None,
            fov_circles: Vec::new(),
            settings: ClientSettings::default(),
            kind: TelescopeKind::Simulated(SimulatedSettings::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ClientError::invalid_config(&self.name, "name must not be empty"));
        }

        match &self.kind {
            TelescopeKind::Simulated(_) => {}
            TelescopeKind::Relay { address, .. } => check_address(&self.name, address)?,
            TelescopeKind::Serial { address, serial } => {
                check_address(&self.name, address)?;
                if serial.poll_interval_ticks == 0 {
                    return Err(ClientError::invalid_config(&self.name, "poll_interval_ticks must be at least 1"));
                }
                if serial.reply_timeout_ticks == 0 {
                    return Err(ClientError::invalid_config(&self.name, "reply_timeout_ticks must be at least 1"));
                }
            }
        }
        Ok(())
    }
}

fn check_address(name: &str, address: &str) -> Result<()> {
    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
        _ => Err(ClientError::invalid_config(
            name,
            format!("address '{}' is not host:port", address),
        )),
    }
}

/// A telescope of any supported kind
pub enum Telescope {
    Simulated(SimulatedTelescope),
    Relay(RelayTelescope),
    Serial(SerialTelescope),
}

impl Telescope {
    /// Build a client from its configuration, applying its localized name and FOV circles
    pub fn from_config(config: &TelescopeConfig, context: ClientContext) -> Result<Self> {
        config.validate()?;

        let name = config.name.clone();
        let mut telescope = match &config.kind {
            TelescopeKind::Simulated(simulated) => {
                Self::Simulated(SimulatedTelescope::new(name, context, &config.settings, simulated))
            }
            TelescopeKind::Relay { address, protocol } => {
                let transport = SocketTransport::new(SocketSettings::new(*protocol, address.clone()));
                // A UDP peer going away produces no close event
                let settings = match protocol {
                    SocketKind::Tcp => config.settings.clone(),
                    SocketKind::Udp => config.settings.for_datagrams(),
                };
                Self::Relay(RelayTelescope::new(name, context, &settings, Box::new(transport)))
            }
            TelescopeKind::Serial { address, serial } => {
                let transport = SocketTransport::new(SocketSettings::new(SocketKind::Tcp, address.clone()));
                Self::Serial(SerialTelescope::new(
                    name,
                    context,
                    &config.settings,
                    serial,
                    Box::new(transport),
                ))
            }
        };

        if let Some(localized) = &config.localized_name {
            telescope.set_name_i18n(localized.clone());
        }
        for &fov in &config.fov_circles {
            telescope.add_fov_circle(fov);
        }
        Ok(telescope)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Simulated(_) => "simulated",
            Self::Relay(_) => "relay",
            Self::Serial(_) => "serial",
        }
    }
}

impl TelescopeClient for Telescope {
    fn core(&self) -> &ClientCore {
        match self {
            Self::Simulated(t) => t.core(),
            Self::Relay(t) => t.core(),
            Self::Serial(t) => t.core(),
        }
    }

    fn core_mut(&mut self) -> &mut ClientCore {
        match self {
            Self::Simulated(t) => t.core_mut(),
            Self::Relay(t) => t.core_mut(),
            Self::Serial(t) => t.core_mut(),
        }
    }

    fn telescope_goto(&mut self, j2000_pos: Vec3d) {
        match self {
            Self::Simulated(t) => t.telescope_goto(j2000_pos),
            Self::Relay(t) => t.telescope_goto(j2000_pos),
            Self::Serial(t) => t.telescope_goto(j2000_pos),
        }
    }

    fn is_initialized(&self) -> bool {
        match self {
            Self::Simulated(t) => t.is_initialized(),
            Self::Relay(t) => t.is_initialized(),
            Self::Serial(t) => t.is_initialized(),
        }
    }

    fn prepare_communication(&mut self) -> bool {
        match self {
            Self::Simulated(t) => t.prepare_communication(),
            Self::Relay(t) => t.prepare_communication(),
            Self::Serial(t) => t.prepare_communication(),
        }
    }

    fn perform_communication(&mut self) {
        match self {
            Self::Simulated(t) => t.perform_communication(),
            Self::Relay(t) => t.perform_communication(),
            Self::Serial(t) => t.perform_communication(),
        }
    }
}

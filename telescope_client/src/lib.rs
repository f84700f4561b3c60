/*!
# Telescope Clients

Non-blocking clients for telescope mounts, all behind the
[`TelescopeClient`] contract. The host drives every client from a single
thread by calling [`TelescopeClient::prepare_communication`] and
[`TelescopeClient::perform_communication`] once per tick; neither call
blocks.

## Kinds

- [`SimulatedTelescope`] - Needs no hardware, slews toward goto targets
- [`RelayTelescope`] - Binary remote-telescope protocol over TCP or UDP
- [`SerialTelescope`] - LX200 command subset over a serial bridge

[`Telescope`] closes the set and is built from a [`TelescopeConfig`].

## Modules

- [`client`] - The contract and the state every client shares
- [`link`] - Link state machine and connection notifications
- [`position`] - Position samples and staleness tracking
- [`info`] - Info string builder
- [`frames`] - Reference-frame service
- [`transport`] - Socket and in-memory byte transports
*/

pub mod client;
pub mod error;
pub mod frames;
pub mod info;
pub mod link;
pub mod position;
pub mod relay;
pub mod serial;
pub mod simulated;
pub mod telescope;
pub mod transport;

pub use client::{
    ClientContext, ClientCore, ClientSettings, TelescopeClient, TELESCOPE_OBJECT_TYPE,
    TELESCOPE_SELECT_PRIORITY,
};
pub use error::{ClientError, Result, TransportError};
pub use frames::{IdentityFrames, ReferenceFrames};
pub use info::{InfoCategory, InfoFlags};
pub use link::{ConnectionEvent, LinkState};
pub use position::PositionSample;
pub use relay::RelayTelescope;
pub use serial::{SerialSettings, SerialTelescope};
pub use simulated::{SimulatedSettings, SimulatedTelescope};
pub use telescope::{Telescope, TelescopeConfig, TelescopeKind};
pub use transport::{SocketKind, SocketSettings, SocketTransport, Transport, TransportEvent};

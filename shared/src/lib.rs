/*!
# Shared Types and Utilities

This crate contains common types and utilities shared between the telescope
control components: the client library and the host daemon.

## Core Types

- [`Vec3d`] - Unit pointing direction in an equatorial frame
- [`Equinox`] - Reference epoch a device reports coordinates in
- [`FovIndicatorSet`] - Field-of-view circles drawn around a reticle
- [`Clock`] - Microsecond timestamp source

## Modules

- [`coordinates`] - Direction vectors and sexagesimal formatting
- [`clock`] - Monotonic microsecond clock
- [`fov`] - FOV indicator list
- [`relay`] - Binary remote-telescope protocol codec
- [`lx200`] - LX200 command subset codec
- [`error`] - Common error types
*/

pub mod clock;
pub mod coordinates;
pub mod error;
pub mod fov;
pub mod lx200;
pub mod relay;

// Re-export commonly used types
pub use clock::{now_micros, Clock, ManualClock, SystemClock};
pub use coordinates::{Equinox, Vec3d};
pub use error::{Result, SharedError};
pub use fov::FovIndicatorSet;

/// Version information for the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol constants
pub mod protocol {
    /// Size of the length and type prefix of every relay frame
    pub const RELAY_HEADER_BYTES: usize = 4;

    /// Total size of a relay goto frame
    pub const RELAY_GOTO_BYTES: usize = 20;

    /// Total size of a relay current-position frame
    pub const RELAY_POSITION_BYTES: usize = 24;

    /// Largest relay frame the decoder accepts before treating the length as garbage
    pub const RELAY_MAX_FRAME_BYTES: usize = 1024;

    /// Frame type shared by goto and current-position messages
    pub const RELAY_TYPE_POSITION: u16 = 0;

    /// Angle scale: 2^31 units correspond to PI radians
    pub const ANGLE_UNITS_PER_PI: f64 = 2_147_483_648.0;

    /// LX200 command and reply terminator
    pub const LX200_TERMINATOR: u8 = b'#';
}

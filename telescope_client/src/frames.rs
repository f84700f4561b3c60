/*!
Reference-frame service consumed by the clients.

The host supplies the actual precession model; clients only ask for
conversions between J2000 and the equinox a device speaks.
*/

use shared::{Equinox, Vec3d};

/// Conversion between J2000 and equator-of-date coordinates
pub trait ReferenceFrames: Send + Sync {
    /// Convert a J2000 direction to the equator and equinox of date
    fn j2000_to_jnow(&self, v: &Vec3d) -> Vec3d;

    /// Convert a direction referred to the equinox of date back to J2000
    fn jnow_to_j2000(&self, v: &Vec3d) -> Vec3d;

    fn j2000_to_equinox(&self, v: &Vec3d, equinox: Equinox) -> Vec3d {
        match equinox {
            Equinox::J2000 => *v,
            Equinox::JNow => self.j2000_to_jnow(v),
        }
    }

    fn equinox_to_j2000(&self, v: &Vec3d, equinox: Equinox) -> Vec3d {
        match equinox {
            Equinox::J2000 => *v,
            Equinox::JNow => self.jnow_to_j2000(v),
        }
    }
}

/// Treats the equinox of date as J2000
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityFrames;

impl ReferenceFrames for IdentityFrames {
    fn j2000_to_jnow(&self, v: &Vec3d) -> Vec3d {
        *v
    }

    fn jnow_to_j2000(&self, v: &Vec3d) -> Vec3d {
        *v
    }
}

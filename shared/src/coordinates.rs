/*!
Pointing directions and coordinate formatting.

Directions are unit vectors in an equatorial frame: x toward RA 0h on the
equator, y toward RA 6h, z toward the north celestial pole.
*/

use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// Reference epoch of equatorial coordinates exchanged with a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Equinox {
    /// Mean equator and equinox of J2000.0
    #[default]
    J2000,
    /// Equator and equinox of the current date
    JNow,
}

impl Equinox {
    /// Parse an equinox name (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "j2000" => Some(Self::J2000),
            "jnow" | "now" | "date" => Some(Self::JNow),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::J2000 => "j2000",
            Self::JNow => "jnow",
        }
    }
}

/// Three-component direction vector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3d {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Unit vector from right ascension and declination in radians
    pub fn from_ra_dec(ra: f64, dec: f64) -> Self {
        let cos_dec = dec.cos();
        Self {
            x: ra.cos() * cos_dec,
            y: ra.sin() * cos_dec,
            z: dec.sin(),
        }
    }

    /// Right ascension in `[0, 2π)` and declination in `[-π/2, π/2]`, radians
    pub fn to_ra_dec(&self) -> (f64, f64) {
        let ra = self.y.atan2(self.x).rem_euclid(TAU);
        let horizontal = (self.x * self.x + self.y * self.y).sqrt();
        let dec = self.z.atan2(horizontal);
        (ra, dec)
    }

    /// Right ascension in hours, `[0, 24)`
    pub fn ra_hours(&self) -> f64 {
        self.to_ra_dec().0 * 12.0 / PI
    }

    /// Declination in degrees
    pub fn dec_degrees(&self) -> f64 {
        self.to_ra_dec().1.to_degrees()
    }

    pub fn dot(&self, other: &Vec3d) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vec3d) -> Vec3d {
        Vec3d::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Same direction with unit length; a zero vector is returned unchanged
    pub fn normalized(&self) -> Vec3d {
        let len = self.length();
        if len > 0.0 {
            *self * (1.0 / len)
        } else {
            *self
        }
    }

    /// Angle between two directions in radians
    pub fn angle_to(&self, other: &Vec3d) -> f64 {
        let a = self.normalized();
        let b = other.normalized();
        a.dot(&b).clamp(-1.0, 1.0).acos()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3d {
    type Output = Vec3d;

    fn add(self, rhs: Vec3d) -> Vec3d {
        Vec3d::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3d {
    type Output = Vec3d;

    fn sub(self, rhs: Vec3d) -> Vec3d {
        Vec3d::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3d {
    type Output = Vec3d;

    fn mul(self, rhs: f64) -> Vec3d {
        Vec3d::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl fmt::Display for Vec3d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", format_hms(self.to_ra_dec().0), format_dms(self.to_ra_dec().1))
    }
}

/// Format a right ascension in radians as `12h34m56.7s`
pub fn format_hms(ra: f64) -> String {
    const TENTHS_PER_DAY: i64 = 24 * 36_000;
    let hours = ra.rem_euclid(TAU) * 12.0 / PI;
    let tenths = ((hours * 36_000.0).round() as i64).rem_euclid(TENTHS_PER_DAY);
    format!(
        "{:02}h{:02}m{:02}.{}s",
        tenths / 36_000,
        (tenths / 600) % 60,
        (tenths % 600) / 10,
        tenths % 10
    )
}

/// Format a declination in radians as `+12°34'56.7"`
pub fn format_dms(dec: f64) -> String {
    let degrees = dec.to_degrees();
    let sign = if degrees < 0.0 { '-' } else { '+' };
    let tenths = (degrees.abs() * 36_000.0).round() as i64;
    format!(
        "{}{:02}°{:02}'{:02}.{}\"",
        sign,
        tenths / 36_000,
        (tenths / 600) % 60,
        (tenths % 600) / 10,
        tenths % 10
    )
}

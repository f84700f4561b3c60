/*!
IAU 1976 precession between J2000 and the equinox of date.
*/

use chrono::{DateTime, TimeZone, Utc};
use shared::Vec3d;
use telescope_client::ReferenceFrames;

const ARCSEC: f64 = std::f64::consts::PI / (180.0 * 3600.0);
const SECONDS_PER_CENTURY: f64 = 36_525.0 * 86_400.0;

/// Precession matrix for one epoch; rows map J2000 onto the equator of date
#[derive(Debug, Clone, Copy)]
pub struct PrecessionFrames {
    matrix: [[f64; 3]; 3],
}

impl PrecessionFrames {
    pub fn at(epoch: DateTime<Utc>) -> Self {
        let t = (epoch - j2000_epoch()).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_CENTURY;

        let zeta = (2306.2181 * t + 0.30188 * t * t + 0.017998 * t * t * t) * ARCSEC;
        let z = (2306.2181 * t + 1.09468 * t * t + 0.018203 * t * t * t) * ARCSEC;
        let theta = (2004.3109 * t - 0.42665 * t * t - 0.041833 * t * t * t) * ARCSEC;

        let (sin_zeta, cos_zeta) = zeta.sin_cos();
        let (sin_z, cos_z) = z.sin_cos();
        let (sin_theta, cos_theta) = theta.sin_cos();

        Self {
            matrix: [
                [
                    cos_zeta * cos_theta * cos_z - sin_zeta * sin_z,
                    -sin_zeta * cos_theta * cos_z - cos_zeta * sin_z,
                    -sin_theta * cos_z,
                ],
                [
                    cos_zeta * cos_theta * sin_z + sin_zeta * cos_z,
                    -sin_zeta * cos_theta * sin_z + cos_zeta * cos_z,
                    -sin_theta * sin_z,
                ],
                [cos_zeta * sin_theta, -sin_zeta * sin_theta, cos_theta],
            ],
        }
    }

    pub fn now() -> Self {
        Self::at(Utc::now())
    }
}

fn j2000_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

impl ReferenceFrames for PrecessionFrames {
    fn j2000_to_jnow(&self, v: &Vec3d) -> Vec3d {
        let m = &self.matrix;
        Vec3d::new(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        )
    }

    fn jnow_to_j2000(&self, v: &Vec3d) -> Vec3d {
        // Rotation matrix: the inverse is the transpose
        let m = &self.matrix;
        Vec3d::new(
            m[0][0] * v.x + m[1][0] * v.y + m[2][0] * v.z,
            m[0][1] * v.x + m[1][1] * v.y + m[2][1] * v.z,
            m[0][2] * v.x + m[1][2] * v.y + m[2][2] * v.z,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_at_j2000() {
        let frames = PrecessionFrames::at(j2000_epoch());
        let v = Vec3d::from_ra_dec(1.0, 0.3);
        assert!((frames.j2000_to_jnow(&v) - v).length() < 1e-12);
    }

    #[test]
    fn test_fifty_years_of_precession() {
        let epoch = Utc.with_ymd_and_hms(2050, 1, 1, 12, 0, 0).unwrap();
        let frames = PrecessionFrames::at(epoch);

        let of_date = frames.j2000_to_jnow(&Vec3d::new(1.0, 0.0, 0.0));
        let (ra, dec) = of_date.to_ra_dec();
        // About 46" per year in RA and 20" per year in Dec at 0h on the equator
        assert!((0.63..0.65).contains(&ra.to_degrees()));
        assert!((0.27..0.29).contains(&dec.to_degrees()));
    }

    #[test]
    fn test_conversion_reverses() {
        let frames = PrecessionFrames::at(Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap());
        let v = Vec3d::from_ra_dec(4.2, -0.7);
        let back = frames.jnow_to_j2000(&frames.j2000_to_jnow(&v));
        assert!((back - v).length() < 1e-12);
        assert!((frames.j2000_to_jnow(&v).length() - 1.0).abs() < 1e-12);
    }
}

/*!
Binary remote-telescope protocol used by network relay servers.

All integers are little-endian. Every frame starts with a `u16` total length
and a `u16` type.

| Frame            | Direction       | Layout                                              |
|------------------|-----------------|-----------------------------------------------------|
| Goto             | client → server | len=20, type=0, i64 time µs, u32 ra, i32 dec        |
| Current position | server → client | len=24, type=0, i64 time µs, u32 ra, i32 dec, i32 st |

Right ascension uses the full `u32` range for 24h, declination uses
`0x40000000` for +90°.
*/

use crate::coordinates::Vec3d;
use crate::error::{Result, SharedError};
use crate::protocol::{
    ANGLE_UNITS_PER_PI, RELAY_GOTO_BYTES, RELAY_HEADER_BYTES, RELAY_MAX_FRAME_BYTES,
    RELAY_POSITION_BYTES, RELAY_TYPE_POSITION,
};
use bytes::{Buf, BufMut, BytesMut};
use std::f64::consts::PI;
use tracing::debug;

/// Encode a right ascension in radians; 2π wraps to 0
pub fn ra_to_wire(ra: f64) -> u32 {
    (ra * (ANGLE_UNITS_PER_PI / PI)).round() as i64 as u32
}

/// Encode a declination in radians, clamped to ±π/2
pub fn dec_to_wire(dec: f64) -> i32 {
    (dec.clamp(-PI / 2.0, PI / 2.0) * (ANGLE_UNITS_PER_PI / PI)).round() as i32
}

pub fn ra_from_wire(ra: u32) -> f64 {
    ra as f64 * (PI / ANGLE_UNITS_PER_PI)
}

pub fn dec_from_wire(dec: i32) -> f64 {
    dec as f64 * (PI / ANGLE_UNITS_PER_PI)
}

/// Goto request sent to the relay server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayGoto {
    pub client_micros: i64,
    pub ra: u32,
    pub dec: i32,
}

impl RelayGoto {
    /// Build a goto frame for `direction`, expressed in the server's equinox
    pub fn from_direction(direction: &Vec3d, client_micros: i64) -> Self {
        let (ra, dec) = direction.to_ra_dec();
        Self {
            client_micros,
            ra: ra_to_wire(ra),
            dec: dec_to_wire(dec),
        }
    }

    pub fn direction(&self) -> Vec3d {
        Vec3d::from_ra_dec(ra_from_wire(self.ra), dec_from_wire(self.dec))
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(RELAY_GOTO_BYTES);
        buf.put_u16_le(RELAY_GOTO_BYTES as u16);
        buf.put_u16_le(RELAY_TYPE_POSITION);
        buf.put_i64_le(self.client_micros);
        buf.put_u32_le(self.ra);
        buf.put_i32_le(self.dec);
    }

    /// Parse a complete goto frame
    pub fn decode(mut bytes: &[u8]) -> Result<Self> {
        if bytes.len() != RELAY_GOTO_BYTES {
            return Err(SharedError::malformed_frame(format!(
                "goto frame must be {} bytes, got {}",
                RELAY_GOTO_BYTES,
                bytes.len()
            )));
        }
        let length = bytes.get_u16_le() as usize;
        let frame_type = bytes.get_u16_le();
        if length != RELAY_GOTO_BYTES || frame_type != RELAY_TYPE_POSITION {
            return Err(SharedError::malformed_frame(format!(
                "unexpected goto header: length {}, type {}",
                length, frame_type
            )));
        }
        Ok(Self {
            client_micros: bytes.get_i64_le(),
            ra: bytes.get_u32_le(),
            dec: bytes.get_i32_le(),
        })
    }
}

/// Current position reported by the relay server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPosition {
    pub server_micros: i64,
    pub ra: u32,
    pub dec: i32,
    /// 0 means the position is valid
    pub status: i32,
}

impl RelayPosition {
    pub fn from_direction(direction: &Vec3d, server_micros: i64, status: i32) -> Self {
        let (ra, dec) = direction.to_ra_dec();
        Self {
            server_micros,
            ra: ra_to_wire(ra),
            dec: dec_to_wire(dec),
            status,
        }
    }

    pub fn direction(&self) -> Vec3d {
        Vec3d::from_ra_dec(ra_from_wire(self.ra), dec_from_wire(self.dec))
    }

    pub fn is_ok(&self) -> bool {
        self.status == 0
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(RELAY_POSITION_BYTES);
        buf.put_u16_le(RELAY_POSITION_BYTES as u16);
        buf.put_u16_le(RELAY_TYPE_POSITION);
        buf.put_i64_le(self.server_micros);
        buf.put_u32_le(self.ra);
        buf.put_i32_le(self.dec);
        buf.put_i32_le(self.status);
    }
}

/// Incremental decoder for server → client frames.
///
/// Partial frames stay in the caller's buffer until the next call. A length
/// field outside `4..=1024` is treated as noise: one byte is dropped and the
/// scan restarts. Well-sized frames of an unknown type are skipped whole.
#[derive(Debug, Default)]
pub struct RelayDecoder {
    frames_decoded: u64,
    frames_skipped: u64,
    bytes_discarded: u64,
}

impl RelayDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get statistics: (frames decoded, frames skipped, bytes discarded)
    pub fn stats(&self) -> (u64, u64, u64) {
        (self.frames_decoded, self.frames_skipped, self.bytes_discarded)
    }

    /// Pop the next current-position frame out of `buf`, if one is complete
    pub fn decode(&mut self, buf: &mut BytesMut) -> Option<RelayPosition> {
        loop {
            if buf.len() < 2 {
                return None;
            }

            let length = u16::from_le_bytes([buf[0], buf[1]]) as usize;
            if !(RELAY_HEADER_BYTES..=RELAY_MAX_FRAME_BYTES).contains(&length) {
                debug!("Discarding byte {:02x}: implausible frame length {}", buf[0], length);
                buf.advance(1);
                self.bytes_discarded += 1;
                continue;
            }

            if buf.len() < length {
                return None;
            }

            let mut frame = buf.split_to(length);
            frame.advance(2);
            let frame_type = frame.get_u16_le();

            if frame_type != RELAY_TYPE_POSITION || length != RELAY_POSITION_BYTES {
                debug!(
                    "Skipping frame type {} ({} bytes): {}",
                    frame_type,
                    length,
                    hex::encode(&frame)
                );
                self.frames_skipped += 1;
                continue;
            }

            self.frames_decoded += 1;
            return Some(RelayPosition {
                server_micros: frame.get_i64_le(),
                ra: frame.get_u32_le(),
                dec: frame.get_i32_le(),
                status: frame.get_i32_le(),
            });
        }
    }
}

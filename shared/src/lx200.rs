/*!
LX200 command subset for directly attached mounts.

Only the commands needed to poll the position and slew are covered:

| Command          | Reply                                   |
|------------------|-----------------------------------------|
| `:GR#`           | `HH:MM:SS#` (long) or `HH:MM.T#` (short)  |
| `:GD#`           | `sDD*MM:SS#`, `sDD*MM'SS#` or `sDD*MM#`   |
| `:Sr HH:MM:SS#`  | `1` accepted, `0` rejected              |
| `:Sd sDD*MM:SS#` | `1` accepted, `0` rejected              |
| `:MS#`           | `0` slewing, `1<msg>#` or `2<msg>#` error |

Replies carry no identifier, so they are matched to commands by order.
*/

use crate::error::{Result, SharedError};
use crate::protocol::LX200_TERMINATOR;
use regex::Regex;
use std::f64::consts::{PI, TAU};
use std::sync::OnceLock;

/// Longest `#`-terminated reply accepted before the buffer is declared garbage
pub const MAX_REPLY_BYTES: usize = 64;

/// A command sent to the mount
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lx200Command {
    GetRa,
    GetDec,
    /// Target right ascension in radians
    SetTargetRa(f64),
    /// Target declination in radians
    SetTargetDec(f64),
    SlewToTarget,
}

impl Lx200Command {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::GetRa => b":GR#".to_vec(),
            Self::GetDec => b":GD#".to_vec(),
            Self::SetTargetRa(ra) => format!(":Sr {}#", format_ra(*ra)).into_bytes(),
            Self::SetTargetDec(dec) => format!(":Sd {}#", format_dec(*dec)).into_bytes(),
            Self::SlewToTarget => b":MS#".to_vec(),
        }
    }

    /// Parse the reply to this command from the front of `buf`
    pub fn parse_reply(&self, buf: &[u8]) -> ReplyParse {
        match self {
            Self::GetRa => parse_terminated(buf, |text| parse_ra(text).map(Lx200Reply::Ra)),
            Self::GetDec => parse_terminated(buf, |text| parse_dec(text).map(Lx200Reply::Dec)),
            Self::SetTargetRa(_) | Self::SetTargetDec(_) => match buf.first() {
                None => ReplyParse::Incomplete,
                Some(b'1') => ReplyParse::Complete { reply: Lx200Reply::Accepted(true), consumed: 1 },
                Some(b'0') => ReplyParse::Complete { reply: Lx200Reply::Accepted(false), consumed: 1 },
                Some(other) => ReplyParse::Malformed {
                    consumed: 1,
                    reason: format!("expected 0 or 1, got byte {:02x}", other),
                },
            },
            Self::SlewToTarget => match buf.first() {
                None => ReplyParse::Incomplete,
                Some(b'0') => ReplyParse::Complete { reply: Lx200Reply::Slew(Ok(())), consumed: 1 },
                Some(b'1') | Some(b'2') => parse_terminated(&buf[1..], |text| {
                    Ok(Lx200Reply::Slew(Err(text.trim().to_string())))
                })
                .shifted(1),
                Some(other) => ReplyParse::Malformed {
                    consumed: 1,
                    reason: format!("unexpected slew status byte {:02x}", other),
                },
            },
        }
    }
}

/// A decoded mount reply
#[derive(Debug, Clone, PartialEq)]
pub enum Lx200Reply {
    /// Right ascension in radians
    Ra(f64),
    /// Declination in radians
    Dec(f64),
    Accepted(bool),
    /// `Err` carries the mount's explanation, e.g. "Object below horizon"
    Slew(std::result::Result<(), String>),
}

/// Result of trying to parse one reply
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyParse {
    /// Not enough bytes yet
    Incomplete,
    Complete { reply: Lx200Reply, consumed: usize },
    /// `consumed` bytes should be dropped
    Malformed { consumed: usize, reason: String },
}

impl ReplyParse {
    fn shifted(self, by: usize) -> Self {
        match self {
            Self::Incomplete => Self::Incomplete,
            Self::Complete { reply, consumed } => Self::Complete { reply, consumed: consumed + by },
            Self::Malformed { consumed, reason } => Self::Malformed { consumed: consumed + by, reason },
        }
    }
}

fn parse_terminated<F>(buf: &[u8], parse: F) -> ReplyParse
where
    F: FnOnce(&str) -> Result<Lx200Reply>,
{
    match buf.iter().position(|&b| b == LX200_TERMINATOR) {
        Some(end) => {
            let text = String::from_utf8_lossy(&buf[..end]);
            match parse(&text) {
                Ok(reply) => ReplyParse::Complete { reply, consumed: end + 1 },
                Err(e) => ReplyParse::Malformed { consumed: end + 1, reason: e.to_string() },
            }
        }
        None if buf.len() > MAX_REPLY_BYTES => ReplyParse::Malformed {
            consumed: buf.len(),
            reason: format!("no terminator within {} bytes", buf.len()),
        },
        None => ReplyParse::Incomplete,
    }
}

fn ra_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(\d{1,2}):(\d{2})(?::(\d{2}(?:\.\d+)?)|\.(\d))$").expect("valid RA pattern")
    })
}

fn dec_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // The degree separator is '*', ':', '°' or a non-ASCII byte some mounts send
        Regex::new(r"^\s*([+-]?)(\d{1,2})[*:°\x{FFFD}](\d{2})(?:[:'](\d{2}(?:\.\d+)?))?$")
            .expect("valid Dec pattern")
    })
}

fn capture_f64(caps: &regex::Captures<'_>, index: usize) -> f64 {
    caps.get(index)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Parse `HH:MM:SS` or `HH:MM.T` into radians
pub fn parse_ra(text: &str) -> Result<f64> {
    let caps = ra_regex()
        .captures(text)
        .ok_or_else(|| SharedError::invalid_coordinates(format!("unparseable RA {:?}", text)))?;

    let hours = capture_f64(&caps, 1);
    let minutes = capture_f64(&caps, 2) + capture_f64(&caps, 4) / 10.0;
    let seconds = capture_f64(&caps, 3);
    if hours >= 24.0 || minutes >= 60.0 || seconds >= 60.0 {
        return Err(SharedError::invalid_coordinates(format!("RA out of range {:?}", text)));
    }

    Ok((hours + minutes / 60.0 + seconds / 3600.0) * PI / 12.0)
}

/// Parse `sDD*MM:SS`, `sDD*MM'SS` or `sDD*MM` into radians
pub fn parse_dec(text: &str) -> Result<f64> {
    let caps = dec_regex()
        .captures(text)
        .ok_or_else(|| SharedError::invalid_coordinates(format!("unparseable Dec {:?}", text)))?;

    let negative = caps.get(1).map(|m| m.as_str() == "-").unwrap_or(false);
    let degrees = capture_f64(&caps, 2);
    let minutes = capture_f64(&caps, 3);
    let seconds = capture_f64(&caps, 4);
    let magnitude = degrees + minutes / 60.0 + seconds / 3600.0;
    if minutes >= 60.0 || seconds >= 60.0 || magnitude > 90.0 {
        return Err(SharedError::invalid_coordinates(format!("Dec out of range {:?}", text)));
    }

    let dec = magnitude.to_radians();
    Ok(if negative { -dec } else { dec })
}

/// Format a right ascension in radians as `HH:MM:SS`
pub fn format_ra(ra: f64) -> String {
    let seconds = ((ra.rem_euclid(TAU) * 43_200.0 / PI).round() as i64).rem_euclid(86_400);
    format!("{:02}:{:02}:{:02}", seconds / 3600, (seconds / 60) % 60, seconds % 60)
}

/// Format a declination in radians as `sDD*MM:SS`, clamped to ±90°
pub fn format_dec(dec: f64) -> String {
    let degrees = dec.to_degrees().clamp(-90.0, 90.0);
    let sign = if degrees < 0.0 { '-' } else { '+' };
    let seconds = (degrees.abs() * 3600.0).round() as i64;
    format!("{}{:02}*{:02}:{:02}", sign, seconds / 3600, (seconds / 60) % 60, seconds % 60)
}

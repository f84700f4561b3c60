/*!
Informational summary of a telescope for display.

The summary is HTML by default; [`InfoCategory::PlainText`] strips the markup.
Each category independently adds or removes one section.
*/

use crate::frames::ReferenceFrames;
use regex::Regex;
use serde::{Deserialize, Serialize};
use shared::coordinates::{format_dms, format_hms};
use shared::Vec3d;
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::OnceLock;

/// Sections that can be requested from an info string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InfoCategory {
    Name,
    RaDecJ2000,
    RaDecApparent,
    ObjectType,
    PlainText,
}

impl InfoCategory {
    /// Parse category from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "name" => Some(Self::Name),
            "radec_j2000" | "j2000" => Some(Self::RaDecJ2000),
            "radec_apparent" | "radec" | "apparent" => Some(Self::RaDecApparent),
            "type" | "object_type" => Some(Self::ObjectType),
            "plain_text" | "plaintext" => Some(Self::PlainText),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::RaDecJ2000 => "radec_j2000",
            Self::RaDecApparent => "radec_apparent",
            Self::ObjectType => "object_type",
            Self::PlainText => "plain_text",
        }
    }
}

/// Set of requested info categories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoFlags {
    categories: HashSet<InfoCategory>,
}

impl InfoFlags {
    pub fn new(categories: &[InfoCategory]) -> Self {
        Self {
            categories: categories.iter().copied().collect(),
        }
    }

    /// Build flags from category names, ignoring unknown ones
    pub fn from_names(names: &[&str]) -> Self {
        Self {
            categories: names.iter().filter_map(|n| InfoCategory::from_str(n)).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::new(&[])
    }

    /// Every category, HTML output
    pub fn all() -> Self {
        Self::new(&[
            InfoCategory::Name,
            InfoCategory::RaDecJ2000,
            InfoCategory::RaDecApparent,
            InfoCategory::ObjectType,
        ])
    }

    /// Return a copy that also includes `category`
    pub fn with(mut self, category: InfoCategory) -> Self {
        self.categories.insert(category);
        self
    }

    pub fn includes(&self, category: InfoCategory) -> bool {
        self.categories.contains(&category)
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

impl Default for InfoFlags {
    fn default() -> Self {
        Self::all()
    }
}

/// Render the summary for a telescope.
///
/// Coordinates are only printed when a real sample exists.
pub fn build_info_string(
    name: &str,
    object_type: &str,
    j2000: Option<&Vec3d>,
    frames: &dyn ReferenceFrames,
    flags: &InfoFlags,
) -> String {
    let mut out = String::new();

    if flags.includes(InfoCategory::Name) {
        let _ = write!(out, "<h2>{}</h2>", name);
    }

    if flags.includes(InfoCategory::ObjectType) {
        let _ = write!(out, "Type: <b>{}</b><br>", object_type);
    }

    if let Some(pos) = j2000 {
        if flags.includes(InfoCategory::RaDecJ2000) {
            let (ra, dec) = pos.to_ra_dec();
            let _ = write!(out, "RA/Dec (J2000): {}/{}<br>", format_hms(ra), format_dms(dec));
        }
        if flags.includes(InfoCategory::RaDecApparent) {
            let (ra, dec) = frames.j2000_to_jnow(pos).to_ra_dec();
            let _ = write!(out, "RA/Dec (of date): {}/{}<br>", format_hms(ra), format_dms(dec));
        }
    }

    if flags.includes(InfoCategory::PlainText) {
        strip_markup(&out)
    } else {
        out
    }
}

fn line_break_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>|</h2>").expect("valid line break pattern"))
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"))
}

/// Turn line-ending tags into newlines, drop the rest, trim the tail
fn strip_markup(html: &str) -> String {
    let with_breaks = line_break_regex().replace_all(html, "\n");
    let plain = tag_regex().replace_all(&with_breaks, "");
    plain.trim_end().to_string()
}

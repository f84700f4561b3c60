/*!
Field-of-view indicators drawn around a telescope reticle.
*/

use serde::{Deserialize, Serialize};

/// Ordered list of FOV circle diameters, in angular degrees.
///
/// Duplicates are allowed and insertion order is kept. Negative diameters
/// are rejected on insertion without raising an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FovIndicatorSet {
    circles: Vec<f64>,
}

impl FovIndicatorSet {
    /// Create an empty indicator set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a circle diameter; ignored unless `fov >= 0`
    pub fn add(&mut self, fov: f64) {
        // NaN fails the comparison and is dropped too
        if fov >= 0.0 {
            self.circles.push(fov);
        }
    }

    /// Circle diameters in insertion order
    pub fn list(&self) -> &[f64] {
        &self.circles
    }

    /// Remove every indicator
    pub fn clear(&mut self) {
        self.circles.clear();
    }

    pub fn len(&self) -> usize {
        self.circles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circles.is_empty()
    }
}

impl FromIterator<f64> for FovIndicatorSet {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut set = Self::new();
        for fov in iter {
            set.add(fov);
        }
        set
    }
}

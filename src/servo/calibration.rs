//! Calibration overlay: `channel -> {min_deg, max_deg, start_deg, stop_deg}`,
//! loaded from a JSON file at startup. Tightens (never widens) the
//! configured limits (spec.md §3).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChannelOverlay {
    pub min_deg: f32,
    pub max_deg: f32,
    pub start_deg: f32,
    pub stop_deg: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationOverlay {
    #[serde(flatten)]
    pub channels: HashMap<u8, ChannelOverlay>,
}

impl CalibrationOverlay {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Calibration(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Calibration(e.to_string()))
    }

    /// Apply the overlay to a base config's angle range. Never widens the
    /// range: the intersection of base and overlay limits is used.
    pub fn tighten(&self, channel: u8, min_deg: f32, max_deg: f32) -> (f32, f32) {
        match self.channels.get(&channel) {
            Some(o) => (min_deg.max(o.min_deg), max_deg.min(o.max_deg)),
            None => (min_deg, max_deg),
        }
    }

    pub fn start_deg(&self, channel: u8, fallback: f32) -> f32 {
        self.channels.get(&channel).map(|o| o.start_deg).unwrap_or(fallback)
    }

    pub fn stop_deg(&self, channel: u8, fallback: f32) -> f32 {
        self.channels.get(&channel).map(|o| o.stop_deg).unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tighten_never_widens() {
        let mut overlay = CalibrationOverlay::default();
        overlay.channels.insert(0, ChannelOverlay { min_deg: 10.0, max_deg: 170.0, start_deg: 90.0, stop_deg: 90.0 });
        let (min, max) = overlay.tighten(0, 0.0, 180.0);
        assert_eq!((min, max), (10.0, 170.0));

        let mut overlay2 = CalibrationOverlay::default();
        overlay2.channels.insert(0, ChannelOverlay { min_deg: -10.0, max_deg: 200.0, start_deg: 90.0, stop_deg: 90.0 });
        let (min2, max2) = overlay2.tighten(0, 0.0, 180.0);
        assert_eq!((min2, max2), (0.0, 180.0));
    }
}

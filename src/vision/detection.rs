use serde::{Deserialize, Serialize};

/// One labeled bounding box from the vision module (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub score: f32,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub center_x: f32,
    pub center_y: f32,
}

impl Detection {
    /// Center point per the `coordinates_are_center` configuration flag.
    pub fn center(&self, coordinates_are_center: bool) -> (f32, f32) {
        if coordinates_are_center {
            (self.center_x, self.center_y)
        } else {
            (self.x, self.y)
        }
    }
}

pub fn highest_score(detections: &[Detection]) -> Option<&Detection> {
    detections.iter().max_by(|a, b| a.score.total_cmp(&b.score))
}

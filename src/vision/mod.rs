pub mod client;
pub mod detection;
pub mod tracker;

pub use client::{SerialVisionTransport, VisionClient};
pub use detection::Detection;
pub use tracker::{FaceTracker, FaceTrackerHandle};

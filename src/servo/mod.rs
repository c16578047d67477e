pub mod calibration;
pub mod layout;
pub mod motion;
pub mod registry;

pub use calibration::CalibrationOverlay;
pub use motion::{Servo, ServoConfig, ServoState};
pub use registry::ServoRegistry;

//! Fixed servo layout bound by mechanics (spec.md §3): ten named handles
//! on channels 0-9 with default configs, overlaid by calibration at
//! startup and registered into a `ServoRegistry`.

use super::calibration::CalibrationOverlay;
use super::motion::ServoConfig;
use super::registry::{RegistryError, ServoRegistry};
use crate::pwm::PwmBus;

/// `(name, channel, default_config)` in mechanical layout order.
pub const LAYOUT: &[(&str, u8, ServoConfig)] = &[
    ("EYL", 0, default_eye_config()),
    ("EYR", 1, default_eye_config()),
    ("LID", 2, default_lid_config()),
    ("NPT", 3, default_pitch_config()),
    ("NRL", 4, default_roll_config()),
    ("MOU", 5, default_mouth_config()),
    ("EAL", 6, default_ear_config()),
    ("EAR", 7, default_ear_config()),
    ("LWH", 8, default_wheel_config()),
    ("RWH", 9, default_wheel_config()),
];

const fn default_eye_config() -> ServoConfig {
    ServoConfig {
        min_angle_deg: 60.0,
        max_angle_deg: 120.0,
        min_pulse_us: 1000.0,
        max_pulse_us: 2000.0,
        max_speed_deg_per_s: 240.0,
        max_accel_deg_per_s2: 1800.0,
        deadzone_deg: 0.3,
        neutral_deg: 90.0,
        invert: false,
        pwm_freq_hz: 50,
    }
}

const fn default_lid_config() -> ServoConfig {
    ServoConfig {
        min_angle_deg: 30.0,
        max_angle_deg: 150.0,
        min_pulse_us: 600.0,
        max_pulse_us: 2400.0,
        max_speed_deg_per_s: 600.0,
        max_accel_deg_per_s2: 6000.0,
        deadzone_deg: 0.5,
        neutral_deg: 150.0,
        invert: false,
        pwm_freq_hz: 50,
    }
}

const fn default_pitch_config() -> ServoConfig {
    ServoConfig {
        min_angle_deg: 60.0,
        max_angle_deg: 120.0,
        min_pulse_us: 1000.0,
        max_pulse_us: 2000.0,
        max_speed_deg_per_s: 120.0,
        max_accel_deg_per_s2: 800.0,
        deadzone_deg: 0.3,
        neutral_deg: 90.0,
        invert: false,
        pwm_freq_hz: 50,
    }
}

const fn default_roll_config() -> ServoConfig {
    ServoConfig {
        min_angle_deg: 60.0,
        max_angle_deg: 120.0,
        min_pulse_us: 1000.0,
        max_pulse_us: 2000.0,
        max_speed_deg_per_s: 90.0,
        max_accel_deg_per_s2: 600.0,
        deadzone_deg: 0.3,
        neutral_deg: 90.0,
        invert: false,
        pwm_freq_hz: 50,
    }
}

const fn default_mouth_config() -> ServoConfig {
    ServoConfig {
        min_angle_deg: 60.0,
        max_angle_deg: 120.0,
        min_pulse_us: 1000.0,
        max_pulse_us: 2000.0,
        max_speed_deg_per_s: 400.0,
        max_accel_deg_per_s2: 4000.0,
        deadzone_deg: 0.3,
        neutral_deg: 60.0,
        invert: false,
        pwm_freq_hz: 50,
    }
}

const fn default_ear_config() -> ServoConfig {
    ServoConfig {
        min_angle_deg: 45.0,
        max_angle_deg: 135.0,
        min_pulse_us: 900.0,
        max_pulse_us: 2100.0,
        max_speed_deg_per_s: 150.0,
        max_accel_deg_per_s2: 1200.0,
        deadzone_deg: 0.5,
        neutral_deg: 90.0,
        invert: false,
        pwm_freq_hz: 50,
    }
}

const fn default_wheel_config() -> ServoConfig {
    ServoConfig {
        min_angle_deg: 0.0,
        max_angle_deg: 90.0,
        min_pulse_us: 1000.0,
        max_pulse_us: 2000.0,
        max_speed_deg_per_s: 200.0,
        max_accel_deg_per_s2: 1000.0,
        deadzone_deg: 0.5,
        neutral_deg: 0.0,
        invert: false,
        pwm_freq_hz: 50,
    }
}

/// Build the full registry: default layout + calibration overlay tightening.
pub fn build_registry(
    bus: PwmBus,
    overlay: &CalibrationOverlay,
) -> Result<ServoRegistry, RegistryError> {
    let mut registry = ServoRegistry::new();
    for (name, channel, config) in LAYOUT {
        let mut cfg = *config;
        let (min_deg, max_deg) = overlay.tighten(*channel, cfg.min_angle_deg, cfg.max_angle_deg);
        cfg.min_angle_deg = min_deg;
        cfg.max_angle_deg = max_deg;
        cfg.neutral_deg = cfg.neutral_deg.clamp(min_deg, max_deg);
        registry.register(name, *channel, cfg, bus.clone())?;
    }
    Ok(registry)
}

pub fn start_angle(name: &str, channel: u8, overlay: &CalibrationOverlay) -> f32 {
    let fallback = LAYOUT
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, _, c)| c.neutral_deg)
        .unwrap_or(90.0);
    overlay.start_deg(channel, fallback)
}

pub fn stop_angle(name: &str, channel: u8, overlay: &CalibrationOverlay) -> f32 {
    let fallback = LAYOUT
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, _, c)| c.neutral_deg)
        .unwrap_or(90.0);
    overlay.stop_deg(channel, fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pwm::MockPwmTransport;

    #[test]
    fn layout_has_unique_names_and_channels() {
        let bus = PwmBus::new(Box::new(MockPwmTransport::default()));
        let overlay = CalibrationOverlay::default();
        let registry = build_registry(bus, &overlay).unwrap();
        for (name, _, _) in LAYOUT {
            assert!(registry.get(name).is_some());
        }
    }
}

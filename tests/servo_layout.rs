//! Registry construction, calibration tightening, and the take/permanent
//! ownership contract (spec.md §3, §4.3).

use coglet_core::pwm::{MockPwmTransport, PwmBus};
use coglet_core::servo::calibration::{CalibrationOverlay, ChannelOverlay};
use coglet_core::servo::layout::{self, LAYOUT};

fn bus() -> PwmBus {
    PwmBus::new(Box::new(MockPwmTransport::default()))
}

#[test]
fn default_overlay_registers_every_named_servo_once() {
    let registry = layout::build_registry(bus(), &CalibrationOverlay::default()).unwrap();
    for (name, _, _) in LAYOUT {
        assert!(registry.get(name).is_some(), "{name} missing from registry");
    }
    assert_eq!(registry.names().count(), LAYOUT.len());
}

#[test]
fn overlay_tightens_registered_servo_bounds() {
    let mut overlay = CalibrationOverlay::default();
    // EYL is channel 0, default range [60, 120].
    overlay.channels.insert(0, ChannelOverlay { min_deg: 70.0, max_deg: 110.0, start_deg: 90.0, stop_deg: 90.0 });
    let registry = layout::build_registry(bus(), &overlay).unwrap();
    let eyl = registry.get("EYL").unwrap();
    assert_eq!(eyl.config().min_angle_deg, 70.0);
    assert_eq!(eyl.config().max_angle_deg, 110.0);
}

#[test]
fn take_removes_the_servo_and_it_cannot_be_taken_twice() {
    let mut registry = layout::build_registry(bus(), &CalibrationOverlay::default()).unwrap();
    let npt = registry.take("NPT");
    assert!(npt.is_some());
    assert!(registry.get("NPT").is_none());
    assert!(registry.take("NPT").is_none());
}

#[test]
fn stop_angle_falls_back_to_neutral_without_overlay() {
    let overlay = CalibrationOverlay::default();
    let angle = layout::stop_angle("MOU", 5, &overlay);
    // default_mouth_config's neutral_deg is 60.0.
    assert_eq!(angle, 60.0);
}

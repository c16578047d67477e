//! End-to-end checks of the motion profile invariants (spec.md §8) driven
//! entirely through the public `Servo`/`PwmBus` API with a mock transport.

use coglet_core::pwm::{MockPwmTransport, PwmBus};
use coglet_core::servo::{Servo, ServoConfig};
use std::time::{Duration, Instant};

fn make_servo(config: ServoConfig) -> Servo {
    let bus = PwmBus::new(Box::new(MockPwmTransport::default()));
    Servo::new("TEST", 3, config, bus)
}

fn default_config() -> ServoConfig {
    ServoConfig {
        min_angle_deg: 0.0,
        max_angle_deg: 180.0,
        min_pulse_us: 500.0,
        max_pulse_us: 2500.0,
        max_speed_deg_per_s: 180.0,
        max_accel_deg_per_s2: 1800.0,
        deadzone_deg: 0.25,
        neutral_deg: 90.0,
        invert: false,
        pwm_freq_hz: 50,
    }
}

#[test]
fn converges_within_clamp_and_stays_in_bounds() {
    let mut servo = make_servo(default_config());
    servo.set_target(5.0);
    let mut t = Instant::now();
    for _ in 0..1000 {
        t += Duration::from_millis(10);
        servo.update(t).unwrap();
        let angle = servo.state().current_angle_deg;
        assert!((0.0..=180.0).contains(&angle));
    }
    assert!((servo.state().current_angle_deg - 5.0).abs() <= 0.5);
}

#[test]
fn velocity_change_is_bounded_by_max_accel() {
    let config = default_config();
    let mut servo = make_servo(config);
    servo.set_target(180.0);
    let mut t = Instant::now();
    let mut prev_v = servo.state().current_velocity_deg_per_s;
    for _ in 0..200 {
        let dt = Duration::from_millis(5);
        t += dt;
        servo.update(t).unwrap();
        let v = servo.state().current_velocity_deg_per_s;
        let max_delta = config.max_accel_deg_per_s2 * dt.as_secs_f32() + 1e-3;
        assert!((v - prev_v).abs() <= max_delta, "velocity jumped by {}", (v - prev_v).abs());
        assert!(v.abs() <= config.max_speed_deg_per_s + 1e-3);
        prev_v = v;
    }
}

#[test]
fn pulse_endpoints_match_angle_endpoints() {
    // Indirect: angle endpoints correspond to pulse endpoints via the
    // documented linear map. We can't read the pulse back from the mock
    // transport's encoded bytes without parsing the wire protocol, so this
    // asserts the clamp/invert behavior that feeds that map instead.
    let mut config = default_config();
    config.invert = true;
    let mut servo = make_servo(config);
    servo.set_target(0.0);
    // inverted: target 0 maps to max+min-0 == max
    let mut t = Instant::now();
    for _ in 0..2000 {
        t += Duration::from_millis(10);
        servo.update(t).unwrap();
    }
    assert!((servo.state().current_angle_deg - config.max_angle_deg).abs() <= 0.5);
}

#[test]
fn release_stops_future_pulses_until_retargeted() {
    let mut servo = make_servo(default_config());
    assert!(!servo.is_released());
    servo.release().unwrap();
    assert!(servo.is_released());
    servo.set_target(100.0);
    assert!(!servo.is_released());
}

#[test]
fn deadzone_rejects_small_retargets() {
    let mut config = default_config();
    config.deadzone_deg = 5.0;
    let mut servo = make_servo(config);
    servo.set_target(90.0 + 4.0);
    assert!((servo.state().target_angle_deg - 90.0).abs() < 1e-6, "small retarget inside deadzone should be rejected");
    servo.set_target(90.0 + 10.0);
    assert!((servo.state().target_angle_deg - 100.0).abs() < 1e-6);
}

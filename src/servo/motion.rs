//! Per-channel speed/acceleration limited motion profile atop a PWM
//! channel (spec.md §4.2). Grounded on the pulse-width mapping used by
//! embedded servo drivers in the retrieval pack (angle -> `[min_us, max_us]`
//! linear interpolation), generalized here to add speed/accel limiting
//! and a shared serial `PwmBus` instead of a directly-owned PWM slice.

use crate::error::BusError;
use crate::pwm::PwmBus;
use std::time::Instant;
use tracing::trace;

#[derive(Debug, Clone, Copy)]
pub struct ServoConfig {
    pub min_angle_deg: f32,
    pub max_angle_deg: f32,
    pub min_pulse_us: f32,
    pub max_pulse_us: f32,
    pub max_speed_deg_per_s: f32,
    pub max_accel_deg_per_s2: f32,
    pub deadzone_deg: f32,
    pub neutral_deg: f32,
    pub invert: bool,
    pub pwm_freq_hz: u32,
}

impl ServoConfig {
    /// Validates the invariants spec.md §3 requires of a `ServoConfig`.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.min_angle_deg <= self.neutral_deg && self.neutral_deg <= self.max_angle_deg) {
            return Err("neutral_deg must lie within [min_angle_deg, max_angle_deg]".into());
        }
        if !(self.min_pulse_us < self.max_pulse_us) {
            return Err("min_pulse_us must be < max_pulse_us".into());
        }
        if self.max_speed_deg_per_s <= 0.0 || self.max_accel_deg_per_s2 <= 0.0 {
            return Err("max_speed_deg_per_s and max_accel_deg_per_s2 must be strictly positive".into());
        }
        if self.pwm_freq_hz == 0 {
            return Err("pwm_freq_hz must be strictly positive".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ServoState {
    pub current_angle_deg: f32,
    pub current_velocity_deg_per_s: f32,
    pub target_angle_deg: f32,
}

pub struct Servo {
    name: &'static str,
    channel: u8,
    config: ServoConfig,
    state: ServoState,
    last_tick: Instant,
    bus: PwmBus,
    released: bool,
}

impl Servo {
    pub fn new(name: &'static str, channel: u8, config: ServoConfig, bus: PwmBus) -> Self {
        Self {
            name,
            channel,
            state: ServoState {
                current_angle_deg: config.neutral_deg,
                current_velocity_deg_per_s: 0.0,
                target_angle_deg: config.neutral_deg,
            },
            last_tick: Instant::now(),
            config,
            bus,
            released: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn config(&self) -> &ServoConfig {
        &self.config
    }

    pub fn state(&self) -> ServoState {
        self.state
    }

    /// Clamp, invert, deadzone-reject, and (if accepted) update the target.
    pub fn set_target(&mut self, angle: f32) {
        let clamped = angle.clamp(self.config.min_angle_deg, self.config.max_angle_deg);
        let target = if self.config.invert {
            self.config.max_angle_deg + self.config.min_angle_deg - clamped
        } else {
            clamped
        };
        if (target - self.state.target_angle_deg).abs() < self.config.deadzone_deg {
            return;
        }
        self.state.target_angle_deg = target;
        self.released = false;
    }

    /// Advance motion by `dt = now - last_tick` and write the resulting
    /// pulse to the bus. See spec.md §4.2 for the exact update law.
    pub fn update(&mut self, now: Instant) -> Result<(), BusError> {
        let dt = now.saturating_duration_since(self.last_tick).as_secs_f32();
        self.last_tick = now;
        if dt <= 0.0 {
            return Ok(());
        }

        let error = self.state.target_angle_deg - self.state.current_angle_deg;
        let desired_speed = error.signum() * (error.abs() / dt).min(self.config.max_speed_deg_per_s);
        let max_delta_v = self.config.max_accel_deg_per_s2 * dt;
        let v_change = (desired_speed - self.state.current_velocity_deg_per_s)
            .clamp(-max_delta_v, max_delta_v);
        self.state.current_velocity_deg_per_s += v_change;
        self.state.current_velocity_deg_per_s = self
            .state
            .current_velocity_deg_per_s
            .clamp(-self.config.max_speed_deg_per_s, self.config.max_speed_deg_per_s);

        let next = self.state.current_angle_deg + self.state.current_velocity_deg_per_s * dt;
        self.state.current_angle_deg = next.clamp(self.config.min_angle_deg, self.config.max_angle_deg);

        let pulse = self.angle_to_pulse_us(self.state.current_angle_deg);
        trace!(servo = self.name, angle = self.state.current_angle_deg, pulse, "servo tick");
        self.bus.set_pulse_us(self.channel, pulse, self.config.pwm_freq_hz)
    }

    fn angle_to_pulse_us(&self, angle: f32) -> f32 {
        let span = self.config.max_angle_deg - self.config.min_angle_deg;
        let frac = if span.abs() < f32::EPSILON {
            0.0
        } else {
            (angle - self.config.min_angle_deg) / span
        };
        self.config.min_pulse_us + frac * (self.config.max_pulse_us - self.config.min_pulse_us)
    }

    /// Stop issuing pulses for this channel.
    pub fn release(&mut self) -> Result<(), BusError> {
        self.released = true;
        self.bus.release(self.channel)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pwm::MockPwmTransport;
    use approx::assert_relative_eq;

    fn make_servo() -> Servo {
        let bus = PwmBus::new(Box::new(MockPwmTransport::default()));
        let config = ServoConfig {
            min_angle_deg: 0.0,
            max_angle_deg: 180.0,
            min_pulse_us: 500.0,
            max_pulse_us: 2500.0,
            max_speed_deg_per_s: 200.0,
            max_accel_deg_per_s2: 2000.0,
            deadzone_deg: 0.5,
            neutral_deg: 90.0,
            invert: false,
            pwm_freq_hz: 50,
        };
        config.validate().unwrap();
        Servo::new("TEST", 0, config, bus)
    }

    #[test]
    fn converges_to_target_within_limits() {
        let mut servo = make_servo();
        servo.set_target(150.0);
        let mut t = Instant::now();
        for _ in 0..500 {
            t += std::time::Duration::from_millis(10);
            servo.update(t).unwrap();
            assert!(servo.state().current_angle_deg >= 0.0);
            assert!(servo.state().current_angle_deg <= 180.0);
        }
        assert_relative_eq!(servo.state().current_angle_deg, 150.0, epsilon = 0.5);
    }

    #[test]
    fn acceleration_is_bounded() {
        let mut servo = make_servo();
        servo.set_target(180.0);
        let mut t = Instant::now();
        let mut prev_v = 0.0;
        for _ in 0..50 {
            t += std::time::Duration::from_millis(10);
            servo.update(t).unwrap();
            let dv = (servo.state().current_velocity_deg_per_s - prev_v).abs();
            assert!(dv <= servo.config().max_accel_deg_per_s2 * 0.010 + 1e-3);
            prev_v = servo.state().current_velocity_deg_per_s;
        }
    }

    #[test]
    fn deadzone_rejects_small_changes() {
        let mut servo = make_servo();
        servo.set_target(90.2);
        assert_eq!(servo.state().target_angle_deg, 90.0);
    }

    #[test]
    fn invert_swaps_pulse_endpoints() {
        let mut servo = make_servo();
        servo.config.invert = true;
        servo.set_target(0.0);
        // Inverted raw=0 -> target = max+min-0 = 180
        assert_relative_eq!(servo.state().target_angle_deg, 180.0, epsilon = 1e-3);
    }

    #[test]
    fn pulse_endpoints_roundtrip() {
        let servo = make_servo();
        assert_relative_eq!(servo.angle_to_pulse_us(0.0), 500.0, epsilon = 1e-3);
        assert_relative_eq!(servo.angle_to_pulse_us(180.0), 2500.0, epsilon = 1e-3);
    }
}

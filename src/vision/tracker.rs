//! Face Tracker — own thread; polls vision, applies deadzone/gain/clamp
//! for eyes + pitch, delayed wheel follow, neutral-return on loss
//! (spec.md §4.7).

use super::client::VisionClient;
use super::detection::highest_score;
use crate::config::TrackerConfig;
use crate::servo::Servo;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct FaceTracker {
    enabled: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

struct Servos {
    eyl: Servo,
    eyr: Servo,
    npt: Servo,
    yaw: Option<Servo>,
    lwh: Servo,
    rwh: Servo,
}

impl FaceTracker {
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        eyl: Servo,
        eyr: Servo,
        npt: Servo,
        yaw: Option<Servo>,
        lwh: Servo,
        rwh: Servo,
        vision: VisionClient,
        config: TrackerConfig,
    ) -> Self {
        let enabled = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(AtomicBool::new(false));
        let enabled_thread = enabled.clone();
        let stop_thread = stop.clone();

        let handle = std::thread::Builder::new()
            .name("face-tracker".into())
            .spawn(move || {
                info!("face tracker started");
                let mut servos = Servos { eyl, eyr, npt, yaw, lwh, rwh };
                run(&mut servos, vision, config, enabled_thread, stop_thread);
                park_and_release(&mut servos);
                info!("face tracker stopped");
            })
            .expect("failed to spawn face tracker thread");

        Self { enabled, stop, handle: Some(handle) }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// A cheap clone-able handle for callers (the dialogue controller) that
    /// only need to toggle tracking, not own the tracker's lifecycle.
    pub fn handle(&self) -> FaceTrackerHandle {
        FaceTrackerHandle { enabled: self.enabled.clone() }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

#[derive(Clone)]
pub struct FaceTrackerHandle {
    enabled: Arc<AtomicBool>,
}

impl FaceTrackerHandle {
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

impl Drop for FaceTracker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

fn run(
    servos: &mut Servos,
    vision: VisionClient,
    config: TrackerConfig,
    enabled: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
) {
    let eye_neutral = servos.eyl.config().neutral_deg;
    let pitch_neutral = servos.npt.config().neutral_deg;
    let yaw_neutral = servos.yaw.as_ref().map(|s| s.config().neutral_deg);
    let wheel_neutral = servos.lwh.config().neutral_deg;

    let mut last_invoke: Option<Instant> = None;
    let mut last_detection_ts: Option<Instant> = None;
    let mut fail_streak: u32 = 0;
    let mut deviation_since: Option<Instant> = None;

    loop {
        std::thread::sleep(Duration::from_secs_f32(config.update_interval_s));
        if stop.load(Ordering::SeqCst) {
            break;
        }
        if !enabled.load(Ordering::SeqCst) {
            continue;
        }

        let now = Instant::now();
        let due = last_invoke
            .map(|t| now.duration_since(t).as_secs_f32() >= config.invoke_interval_s)
            .unwrap_or(true);

        if due {
            last_invoke = Some(now);
            match vision.invoke_once(Duration::from_secs_f32(config.invoke_timeout_s)) {
                Ok(detections) => {
                    fail_streak = 0;
                    if detections.is_empty() {
                        maybe_return_neutral(
                            servos,
                            now,
                            last_detection_ts,
                            config.neutral_timeout_s,
                            eye_neutral,
                            pitch_neutral,
                            yaw_neutral,
                            wheel_neutral,
                            &mut deviation_since,
                        );
                    } else {
                        last_detection_ts = Some(now);
                        apply_detection(servos, &config, highest_score(&detections).unwrap());
                        update_wheel_follow(servos, &config, eye_neutral, wheel_neutral, now, &mut deviation_since);
                    }
                }
                Err(e) => {
                    fail_streak += 1;
                    debug!(error = %e, fail_streak, "vision invoke failed");
                    if fail_streak >= config.vision_timeout_streak_degrade {
                        warn!(fail_streak, "vision degraded, returning to neutral branch");
                        maybe_return_neutral(
                            servos,
                            now,
                            last_detection_ts,
                            config.neutral_timeout_s,
                            eye_neutral,
                            pitch_neutral,
                            yaw_neutral,
                            wheel_neutral,
                            &mut deviation_since,
                        );
                    }
                }
            }
        }

        let now = Instant::now();
        let _ = servos.eyl.update(now);
        let _ = servos.eyr.update(now);
        let _ = servos.npt.update(now);
        if let Some(yaw) = servos.yaw.as_mut() {
            let _ = yaw.update(now);
        }
        let _ = servos.lwh.update(now);
        let _ = servos.rwh.update(now);
    }
}

#[allow(clippy::too_many_arguments)]
fn maybe_return_neutral(
    servos: &mut Servos,
    now: Instant,
    last_detection_ts: Option<Instant>,
    neutral_timeout_s: f32,
    eye_neutral: f32,
    pitch_neutral: f32,
    yaw_neutral: Option<f32>,
    wheel_neutral: f32,
    deviation_since: &mut Option<Instant>,
) {
    let elapsed = last_detection_ts
        .map(|t| now.duration_since(t).as_secs_f32())
        .unwrap_or(f32::INFINITY);
    if elapsed <= neutral_timeout_s {
        return;
    }
    servos.eyl.set_target(eye_neutral);
    servos.eyr.set_target(eye_neutral);
    servos.npt.set_target(pitch_neutral);
    if let (Some(yaw), Some(yn)) = (servos.yaw.as_mut(), yaw_neutral) {
        yaw.set_target(yn);
    }
    servos.lwh.set_target(wheel_neutral);
    servos.rwh.set_target(wheel_neutral);
    *deviation_since = None;
}

fn apply_detection(servos: &mut Servos, config: &TrackerConfig, detection: &super::detection::Detection) {
    let (cx, cy) = detection.center(config.coordinates_are_center);
    let ex = cx - config.frame_width / 2.0;
    let ey = cy - config.frame_height / 2.0;

    let eye_neutral = servos.eyl.config().neutral_deg;
    if ex.abs() > config.eye_deadzone_px {
        let delta = (ex * config.eye_gain_deg_per_px).clamp(-config.eye_max_delta_deg, config.eye_max_delta_deg);
        servos.eyl.set_target(eye_neutral + delta);
        servos.eyr.set_target(eye_neutral + delta);
    }

    let pitch_neutral = servos.npt.config().neutral_deg;
    if ey.abs() > config.pitch_deadzone_px {
        let delta = (ey * config.pitch_gain_deg_per_px).clamp(-config.pitch_max_delta_deg, config.pitch_max_delta_deg);
        servos.npt.set_target(pitch_neutral + delta);
    }

    if config.yaw_enabled {
        if let Some(yaw) = servos.yaw.as_mut() {
            let yaw_neutral = yaw.config().neutral_deg;
            if ex.abs() > config.yaw_deadzone_px {
                let delta = (ex * config.yaw_gain_deg_per_px).clamp(-config.yaw_max_delta_deg, config.yaw_max_delta_deg);
                yaw.set_target(yaw_neutral + delta);
            }
        }
    }
}

fn update_wheel_follow(
    servos: &mut Servos,
    config: &TrackerConfig,
    eye_neutral: f32,
    wheel_neutral: f32,
    now: Instant,
    deviation_since: &mut Option<Instant>,
) {
    let eye_dev = (servos.eyl.state().current_angle_deg - eye_neutral).abs();
    let signed_dev = servos.eyl.state().current_angle_deg - eye_neutral;

    if eye_dev < config.wheel_deadzone_deg {
        *deviation_since = None;
        servos.lwh.set_target(wheel_neutral);
        servos.rwh.set_target(wheel_neutral);
        return;
    }

    let since = deviation_since.get_or_insert(now);
    let persisted = now.duration_since(*since).as_secs_f32();
    if persisted < config.wheel_follow_delay_s {
        return;
    }

    let u = ((eye_dev - config.wheel_input_min) / (config.wheel_input_max - config.wheel_input_min)).clamp(0.0, 1.0);
    let v = u.powf(config.wheel_power);
    let magnitude = config.wheel_output_min + v * (config.wheel_output_max - config.wheel_output_min);
    let signed = magnitude * signed_dev.signum();
    servos.lwh.set_target(wheel_neutral + signed);
    servos.rwh.set_target(wheel_neutral + signed);
}

/// Drives every tracker-owned servo back to its neutral angle and releases
/// its PWM channel. Called once after `run()` returns, as the tracker
/// thread's own shutdown step (spec.md §6, §8 scenario 6).
fn park_and_release(servos: &mut Servos) {
    let eye_neutral = servos.eyl.config().neutral_deg;
    let pitch_neutral = servos.npt.config().neutral_deg;
    let yaw_neutral = servos.yaw.as_ref().map(|s| s.config().neutral_deg);
    let wheel_neutral = servos.lwh.config().neutral_deg;

    servos.eyl.set_target(eye_neutral);
    servos.eyr.set_target(eye_neutral);
    servos.npt.set_target(pitch_neutral);
    if let (Some(yaw), Some(yn)) = (servos.yaw.as_mut(), yaw_neutral) {
        yaw.set_target(yn);
    }
    servos.lwh.set_target(wheel_neutral);
    servos.rwh.set_target(wheel_neutral);

    let deadline = Instant::now() + Duration::from_millis(800);
    while Instant::now() < deadline {
        let now = Instant::now();
        let _ = servos.eyl.update(now);
        let _ = servos.eyr.update(now);
        let _ = servos.npt.update(now);
        if let Some(yaw) = servos.yaw.as_mut() {
            let _ = yaw.update(now);
        }
        let _ = servos.lwh.update(now);
        let _ = servos.rwh.update(now);
        std::thread::sleep(Duration::from_millis(20));
    }

    let _ = servos.eyl.release();
    let _ = servos.eyr.release();
    let _ = servos.npt.release();
    if let Some(yaw) = servos.yaw.as_mut() {
        let _ = yaw.release();
    }
    let _ = servos.lwh.release();
    let _ = servos.rwh.release();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pwm::{MockPwmTransport, PwmBus};
    use crate::servo::ServoConfig;

    fn make_servo(name: &'static str, channel: u8) -> Servo {
        let bus = PwmBus::new(Box::new(MockPwmTransport::default()));
        let config = ServoConfig {
            min_angle_deg: 0.0,
            max_angle_deg: 180.0,
            min_pulse_us: 500.0,
            max_pulse_us: 2500.0,
            max_speed_deg_per_s: 400.0,
            max_accel_deg_per_s2: 4000.0,
            deadzone_deg: 0.1,
            neutral_deg: 90.0,
            invert: false,
            pwm_freq_hz: 50,
        };
        Servo::new(name, channel, config, bus)
    }

    #[test]
    fn wheel_does_not_move_before_delay_elapses() {
        let mut servos = Servos {
            eyl: make_servo("EYL", 0),
            eyr: make_servo("EYR", 1),
            npt: make_servo("NPT", 2),
            yaw: None,
            lwh: make_servo("LWH", 3),
            rwh: make_servo("RWH", 4),
        };
        let config = TrackerConfig::default();
        servos.eyl.set_target(90.0 + config.wheel_deadzone_deg + 5.0);
        let mut t = Instant::now();
        for _ in 0..50 {
            t += Duration::from_millis(10);
            servos.eyl.update(t).unwrap();
        }

        let mut deviation_since = None;
        update_wheel_follow(&mut servos, &config, 90.0, 0.0, t, &mut deviation_since);
        assert_eq!(servos.lwh.state().target_angle_deg, 0.0);

        t += Duration::from_secs_f32(config.wheel_follow_delay_s + 0.05);
        update_wheel_follow(&mut servos, &config, 90.0, 0.0, t, &mut deviation_since);
        assert!(servos.lwh.state().target_angle_deg != 0.0);
    }

    fn fresh_servos() -> Servos {
        Servos {
            eyl: make_servo("EYL", 0),
            eyr: make_servo("EYR", 1),
            npt: make_servo("NPT", 2),
            yaw: None,
            lwh: make_servo("LWH", 3),
            rwh: make_servo("RWH", 4),
        }
    }

    #[test]
    fn apply_detection_moves_eyes_and_pitch_toward_offset() {
        let mut servos = fresh_servos();
        let config = TrackerConfig::default();
        // Offset well beyond both deadzones, within the frame.
        let detection = super::super::detection::Detection {
            score: 0.9,
            x: 0.0,
            y: 0.0,
            w: 10.0,
            h: 10.0,
            center_x: config.frame_width / 2.0 + 100.0,
            center_y: config.frame_height / 2.0 + 100.0,
        };
        apply_detection(&mut servos, &config, &detection);
        assert!(servos.eyl.state().target_angle_deg > 90.0);
        assert!(servos.eyr.state().target_angle_deg > 90.0);
        assert!(servos.npt.state().target_angle_deg > 90.0);
    }

    #[test]
    fn apply_detection_within_deadzone_leaves_target_unchanged() {
        let mut servos = fresh_servos();
        let config = TrackerConfig::default();
        let detection = super::super::detection::Detection {
            score: 0.9,
            x: 0.0,
            y: 0.0,
            w: 10.0,
            h: 10.0,
            center_x: config.frame_width / 2.0,
            center_y: config.frame_height / 2.0,
        };
        apply_detection(&mut servos, &config, &detection);
        assert_eq!(servos.eyl.state().target_angle_deg, 90.0);
        assert_eq!(servos.npt.state().target_angle_deg, 90.0);
    }

    #[test]
    fn maybe_return_neutral_waits_out_the_timeout() {
        let mut servos = fresh_servos();
        servos.eyl.set_target(110.0);
        servos.npt.set_target(110.0);
        let config = TrackerConfig::default();
        let now = Instant::now();
        let last_detection = Some(now);
        let mut deviation_since = Some(now);

        maybe_return_neutral(&mut servos, now, last_detection, config.neutral_timeout_s, 90.0, 90.0, None, 0.0, &mut deviation_since);
        assert_eq!(servos.eyl.state().target_angle_deg, 110.0, "timeout not yet elapsed");

        let later = now + Duration::from_secs_f32(config.neutral_timeout_s + 0.1);
        maybe_return_neutral(&mut servos, later, last_detection, config.neutral_timeout_s, 90.0, 90.0, None, 0.0, &mut deviation_since);
        assert_eq!(servos.eyl.state().target_angle_deg, 90.0);
        assert_eq!(servos.npt.state().target_angle_deg, 90.0);
        assert!(deviation_since.is_none());
    }
}

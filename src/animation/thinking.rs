use super::AnimationHandle;
use crate::servo::Servo;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

pub struct ThinkingConfig {
    pub ear_delta_deg: f32,
    pub sample_period: Duration,
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        Self { ear_delta_deg: 15.0, sample_period: Duration::from_millis(600) }
    }
}

/// Alternating EAL/EAR positions sampled at a fixed rate (spec.md §4.5).
/// Owns `eal` and `ear` exclusively. NPT is deliberately left out: it is
/// permanently owned by the face tracker's pitch channel, and spec.md §8's
/// single-owner-per-servo invariant takes priority over the nod cue.
pub fn start(mut eal: Servo, mut ear: Servo, config: ThinkingConfig) -> AnimationHandle<(Servo, Servo)> {
    let eal_neutral = eal.config().neutral_deg;
    let ear_neutral = ear.config().neutral_deg;

    AnimationHandle::spawn("anim-thinking", move |stop| {
        let mut toggle = false;
        while !stop.load(Ordering::SeqCst) {
            let (el, er) = if toggle {
                (eal_neutral + config.ear_delta_deg, ear_neutral - config.ear_delta_deg)
            } else {
                (eal_neutral - config.ear_delta_deg, ear_neutral + config.ear_delta_deg)
            };
            eal.set_target(el);
            ear.set_target(er);

            let deadline = Instant::now() + config.sample_period;
            while Instant::now() < deadline {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                let now = Instant::now();
                let _ = eal.update(now);
                let _ = ear.update(now);
                std::thread::sleep(Duration::from_millis(20));
            }
            toggle = !toggle;
        }
        eal.set_target(eal_neutral);
        ear.set_target(ear_neutral);
        let now = Instant::now();
        let _ = eal.update(now);
        let _ = ear.update(now);
        (eal, ear)
    })
}

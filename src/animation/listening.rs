use super::AnimationHandle;
use crate::eyelid::EyelidController;
use crate::servo::Servo;
use std::f32::consts::TAU;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct ListeningConfig {
    pub amplitude_deg: f32,
    pub period_s: f32,
    pub lid_raise_deg: f32,
    pub override_duration: Duration,
    pub tick: Duration,
}

impl Default for ListeningConfig {
    fn default() -> Self {
        Self {
            amplitude_deg: 4.0,
            period_s: 1.6,
            lid_raise_deg: 170.0,
            override_duration: Duration::from_millis(400),
            tick: Duration::from_millis(20),
        }
    }
}

/// Small-amplitude head-roll oscillation plus a raised-lid override.
/// Owns `nrl` exclusively for the lifetime of the animation.
pub fn start(mut nrl: Servo, eyelid: Arc<EyelidController>, config: ListeningConfig) -> AnimationHandle<Servo> {
    let neutral = nrl.config().neutral_deg;
    AnimationHandle::spawn("anim-listening", move |stop| {
        let start = Instant::now();
        while !stop.load(Ordering::SeqCst) {
            let t = start.elapsed().as_secs_f32();
            let phase = (t / config.period_s) * TAU;
            nrl.set_target(neutral + config.amplitude_deg * phase.sin());
            let _ = nrl.update(Instant::now());
            eyelid.set_override(config.lid_raise_deg, config.override_duration);
            std::thread::sleep(config.tick);
        }
        nrl.set_target(neutral);
        let _ = nrl.update(Instant::now());
        eyelid.set_auto();
        nrl
    })
}

use super::AnimationHandle;
use crate::servo::Servo;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

pub struct TalkingConfig {
    pub open_angle: f32,
    pub closed_angle: f32,
    pub mouth_step_ms: u64,
}

impl Default for TalkingConfig {
    fn default() -> Self {
        Self { open_angle: 110.0, closed_angle: 60.0, mouth_step_ms: 90 }
    }
}

/// Drives MOU between closed and open every `mouth_step_ms` while TTS
/// plays; the dialogue controller stops this animation on TTS-DONE
/// (spec.md §4.5, §4.12).
pub fn start(mut mou: Servo, config: TalkingConfig) -> AnimationHandle<Servo> {
    AnimationHandle::spawn("anim-talking", move |stop| {
        let step = Duration::from_millis(config.mouth_step_ms);
        let mut open = true;
        while !stop.load(Ordering::SeqCst) {
            mou.set_target(if open { config.open_angle } else { config.closed_angle });
            open = !open;

            let deadline = Instant::now() + step;
            while Instant::now() < deadline {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                let _ = mou.update(Instant::now());
                std::thread::sleep(Duration::from_millis(10));
            }
        }
        mou.set_target(config.closed_angle);
        let _ = mou.update(Instant::now());
        mou
    })
}

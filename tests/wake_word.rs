//! Wake-word gating behavior driven through the public `WakeWordDetector`
//! API (spec.md §8 "Wake rearm" invariant, §4.10).

use coglet_core::config::WakeConfig;
use coglet_core::wake::{WakeScorer, WakeWordDetector};
use std::collections::VecDeque;

struct ScriptedScorer(VecDeque<f32>);

impl WakeScorer for ScriptedScorer {
    fn score(&mut self, _window: &[i16]) -> f32 {
        self.0.pop_front().unwrap_or(0.0)
    }
}

fn detector(config: WakeConfig, scores: Vec<f32>) -> WakeWordDetector {
    WakeWordDetector::new(config, 16_000, Box::new(ScriptedScorer(scores.into())))
}

fn window() -> Vec<i16> {
    vec![0i16; 1280]
}

#[test]
fn fires_once_then_requires_low_score_streak_to_rearm() {
    let config = WakeConfig { min_gap_s: 0.0, ..WakeConfig::default() };
    let mut det = detector(config.clone(), vec![0.95, 0.95, 0.1, 0.1, 0.1, 0.95]);
    let win = window();
    assert!(det.push_frame(&win).is_some());
    assert!(det.push_frame(&win).is_none());
    assert!(det.push_frame(&win).is_none());
    assert!(det.push_frame(&win).is_none());
    assert!(det.push_frame(&win).is_none());
    assert!(det.push_frame(&win).is_some());
}

#[test]
fn min_gap_suppresses_refire_even_when_rearmed() {
    let mut config = WakeConfig::default();
    config.min_gap_s = 100.0;
    let mut det = detector(config.clone(), vec![0.95, 0.1, 0.1, 0.1, 0.95]);
    let win = window();
    assert!(det.push_frame(&win).is_some(), "first fire");
    for _ in 0..3 {
        det.push_frame(&win);
    }
    assert!(det.push_frame(&win).is_none(), "min_gap_s blocks refire despite rearm");
}

#[test]
fn reset_after_tts_forces_immediate_rearm() {
    let config = WakeConfig::default();
    let mut det = detector(config, vec![0.9, 0.9]);
    let win = window();
    assert!(det.push_frame(&win).is_some());
    det.reset_after_tts();
    assert!(det.push_frame(&win).is_some(), "reset should allow an immediate refire");
}

#[test]
fn below_threshold_never_fires() {
    let config = WakeConfig::default();
    let mut det = detector(config, vec![0.1; 10]);
    let win = window();
    for _ in 0..10 {
        assert!(det.push_frame(&win).is_none());
    }
}

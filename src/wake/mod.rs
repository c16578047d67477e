//! Wake Word Detector — window/hop framed inference gate; debounce,
//! post-TTS suppression, rearm (spec.md §4.10).

use crate::config::WakeConfig;
use std::collections::VecDeque;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct WakeEvent {
    pub detected_at: Instant,
    pub confidence: f32,
}

/// Scoring backend abstraction: `score` runs one window/hop step of
/// inference and returns a confidence in `[0, 1]`. The concrete model
/// (a keyword-spotting network) is outside this core's scope; this
/// trait is the seam a real backend plugs into. `EnergyWakeScorer` is a
/// deterministic stand-in usable in tests and low-resource deployments.
pub trait WakeScorer: Send {
    fn score(&mut self, window: &[i16]) -> f32;
}

/// RMS-energy proxy scorer: maps louder-than-floor energy to a score.
/// Useful as a default and for deterministic tests; a real deployment
/// swaps in an ML-backed `WakeScorer`.
pub struct EnergyWakeScorer {
    pub floor_rms: f32,
    pub ceiling_rms: f32,
}

impl Default for EnergyWakeScorer {
    fn default() -> Self {
        Self { floor_rms: 500.0, ceiling_rms: 8000.0 }
    }
}

impl WakeScorer for EnergyWakeScorer {
    fn score(&mut self, window: &[i16]) -> f32 {
        if window.is_empty() {
            return 0.0;
        }
        let rms = (window.iter().map(|&s| (s as f32).powi(2)).sum::<f32>() / window.len() as f32).sqrt();
        ((rms - self.floor_rms) / (self.ceiling_rms - self.floor_rms)).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arming {
    Armed,
    CoolingDown,
}

pub struct WakeWordDetector {
    config: WakeConfig,
    window_samples: usize,
    hop_samples: usize,
    ring: VecDeque<i16>,
    scorer: Box<dyn WakeScorer>,
    state: Arming,
    last_fire: Option<Instant>,
    tts_done_at: Option<Instant>,
    low_count: u32,
}

impl WakeWordDetector {
    /// `win_ms`/`hop_ms` must already be multiples of 80ms at 16kHz
    /// (1280 samples) — enforced at config-validation time (spec.md §4.10,
    /// `Config::validate`).
    pub fn new(config: WakeConfig, sample_rate: u32, scorer: Box<dyn WakeScorer>) -> Self {
        let window_samples = (sample_rate as u64 * config.win_ms as u64 / 1000) as usize;
        let hop_samples = (sample_rate as u64 * config.hop_ms as u64 / 1000) as usize;
        Self {
            config,
            window_samples,
            hop_samples,
            ring: VecDeque::with_capacity(window_samples * 2),
            scorer,
            state: Arming::Armed,
            last_fire: None,
            tts_done_at: None,
            low_count: 0,
        }
    }

    /// Feed one captured frame's worth of samples. Returns a `WakeEvent`
    /// at most once per rearmed cycle.
    pub fn push_frame(&mut self, samples: &[i16]) -> Option<WakeEvent> {
        self.ring.extend(samples.iter().copied());
        let mut fired = None;
        while self.ring.len() >= self.window_samples {
            let window: Vec<i16> = self.ring.iter().take(self.window_samples).copied().collect();
            for _ in 0..self.hop_samples.min(self.ring.len()) {
                self.ring.pop_front();
            }
            if let Some(ev) = self.step(&window) {
                fired = Some(ev);
            }
        }
        fired
    }

    fn step(&mut self, window: &[i16]) -> Option<WakeEvent> {
        let score = self.scorer.score(window);
        let now = Instant::now();

        match self.state {
            Arming::CoolingDown => {
                if score <= self.config.rearm_ratio * self.config.threshold {
                    self.low_count += 1;
                } else {
                    self.low_count = 0;
                }
                if self.low_count >= self.config.rearm_low_count {
                    self.state = Arming::Armed;
                    self.low_count = 0;
                }
                None
            }
            Arming::Armed => {
                let gap_ok = self
                    .last_fire
                    .map(|t| now.duration_since(t).as_secs_f32() >= self.config.min_gap_s)
                    .unwrap_or(true);
                let suppressed = self
                    .tts_done_at
                    .map(|t| now.duration_since(t).as_secs_f32() < self.config.suppress_after_tts_s)
                    .unwrap_or(false);

                if score >= self.config.threshold && gap_ok && !suppressed {
                    self.last_fire = Some(now);
                    self.state = Arming::CoolingDown;
                    self.low_count = 0;
                    let _ = Uuid::new_v4();
                    Some(WakeEvent { detected_at: now, confidence: score })
                } else {
                    None
                }
            }
        }
    }

    /// Forces immediate rearm — called when TTS playback completes so a
    /// stale cooldown from the confirmation chime doesn't linger.
    pub fn reset_after_tts(&mut self) {
        self.tts_done_at = Some(Instant::now());
        self.state = Arming::Armed;
        self.low_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedScorer(VecDeque<f32>);
    impl WakeScorer for ScriptedScorer {
        fn score(&mut self, _window: &[i16]) -> f32 {
            self.0.pop_front().unwrap_or(0.0)
        }
    }

    fn detector(scores: Vec<f32>) -> WakeWordDetector {
        let config = WakeConfig::default();
        WakeWordDetector::new(config, 16_000, Box::new(ScriptedScorer(scores.into())))
    }

    /// Same as `detector`, but with `min_gap_s` zeroed so a rearm is free to
    /// refire immediately instead of being held back by the gap gate.
    fn detector_no_gap(scores: Vec<f32>) -> WakeWordDetector {
        let config = WakeConfig { min_gap_s: 0.0, ..WakeConfig::default() };
        WakeWordDetector::new(config, 16_000, Box::new(ScriptedScorer(scores.into())))
    }

    fn window_of(n: usize) -> Vec<i16> {
        vec![0i16; n]
    }

    #[test]
    fn no_second_fire_until_rearmed() {
        // threshold=0.3, rearm_ratio=0.6 => rearm needs score <= 0.18.
        let mut det = detector_no_gap(vec![0.9, 0.9, 0.9, 0.1, 0.1, 0.1, 0.9]);
        let win = window_of(1280);
        assert!(det.push_frame(&win).is_some(), "first window should fire");
        assert!(det.push_frame(&win).is_none(), "still cooling down");
        assert!(det.push_frame(&win).is_none(), "still cooling down");
        assert!(det.push_frame(&win).is_none(), "one low sample insufficient to rearm");
        assert!(det.push_frame(&win).is_none(), "two low samples insufficient to rearm");
        // Third consecutive low sample (rearm_low_count=3) rearms this step.
        assert!(det.push_frame(&win).is_none());
        assert!(det.push_frame(&win).is_some(), "should fire again once rearmed");
    }

    #[test]
    fn reset_after_tts_forces_rearm() {
        let mut det = detector(vec![0.9, 0.9]);
        let win = window_of(1280);
        assert!(det.push_frame(&win).is_some());
        det.reset_after_tts();
        assert!(det.push_frame(&win).is_some(), "reset should allow an immediate refire");
    }
}

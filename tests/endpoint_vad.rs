//! Endpointing state machine (spec.md §4.9, §8) exercised end-to-end
//! through `SpeechEndpoint::with_classifier` with scripted frame source
//! and VAD classifier doubles — no real capture device or VAD model
//! involved.

use coglet_core::audio::{FrameSource, SpeechEndpoint, VadClassifier};
use coglet_core::config::{AudioConfig, EndpointConfig};
use coglet_core::error::EndpointReason;
use std::collections::VecDeque;
use std::time::Duration;

struct ScriptedFrameSource {
    frame_bytes: usize,
    sleep: Duration,
    frames_served: usize,
}

impl ScriptedFrameSource {
    fn new(frame_bytes: usize, sleep: Duration) -> Self {
        Self { frame_bytes, sleep, frames_served: 0 }
    }
}

impl FrameSource for ScriptedFrameSource {
    fn read_bytes(&mut self, n: usize) -> Vec<u8> {
        assert_eq!(n, self.frame_bytes);
        self.frames_served += 1;
        if !self.sleep.is_zero() {
            std::thread::sleep(self.sleep);
        }
        vec![0u8; n]
    }
}

struct ScriptedVad(VecDeque<bool>);

impl VadClassifier for ScriptedVad {
    fn is_speech(&mut self, _samples: &[i16]) -> bool {
        self.0.pop_front().unwrap_or(false)
    }
}

fn frame_bytes(audio: &AudioConfig) -> usize {
    2 * (audio.sample_rate as usize * audio.frame_ms as usize) / 1000
}

#[test]
fn clean_start_then_hangover_end_includes_preroll_and_end_frame() {
    let audio = AudioConfig::default();
    let endpoint_cfg = EndpointConfig {
        start_win: 2,
        start_min: 1,
        start_consec_min: 1,
        end_hang_ms: 1,
        end_guard_ms: 0,
        ..Default::default()
    };
    let mut ep = SpeechEndpoint::with_classifier(
        &audio,
        &endpoint_cfg,
        Box::new(ScriptedVad(vec![true, true, false].into())),
    );
    let fb = frame_bytes(&audio);
    let mut source = ScriptedFrameSource::new(fb, Duration::ZERO);

    let (pcm, reason) = ep.record(&mut source, 5.0);
    assert_eq!(reason, EndpointReason::SpeechEnded);
    // Two preroll frames (both consumed by the start trigger) plus the
    // hangover frame that closed the utterance.
    assert_eq!(pcm.len(), 3 * fb);
}

#[test]
fn silence_throughout_times_out_as_no_speech() {
    let audio = AudioConfig::default();
    let endpoint_cfg = EndpointConfig { no_speech_timeout_s: 0.01, ..Default::default() };
    let mut ep = SpeechEndpoint::with_classifier(&audio, &endpoint_cfg, Box::new(ScriptedVad(VecDeque::new())));
    let fb = frame_bytes(&audio);
    let mut source = ScriptedFrameSource::new(fb, Duration::from_millis(4));

    let (pcm, reason) = ep.record(&mut source, endpoint_cfg.no_speech_timeout_s);
    assert_eq!(reason, EndpointReason::NoSpeech);
    assert!(pcm.is_empty());
}

#[test]
fn continuous_speech_is_capped_at_max_utterance() {
    let audio = AudioConfig::default();
    let endpoint_cfg = EndpointConfig {
        start_win: 3,
        start_min: 2,
        start_consec_min: 2,
        end_hang_ms: 1_000_000,
        end_guard_ms: 0,
        max_utter_s: 0.02,
        ..Default::default()
    };
    let mut ep = SpeechEndpoint::with_classifier(&audio, &endpoint_cfg, Box::new(AllSpeech));
    let fb = frame_bytes(&audio);
    let mut source = ScriptedFrameSource::new(fb, Duration::from_millis(4));

    let (pcm, reason) = ep.record(&mut source, 5.0);
    assert_eq!(reason, EndpointReason::MaxUtterance);
    assert!(!pcm.is_empty());
}

struct AllSpeech;
impl VadClassifier for AllSpeech {
    fn is_speech(&mut self, _samples: &[i16]) -> bool {
        true
    }
}

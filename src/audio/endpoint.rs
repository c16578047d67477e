//! Speech Endpoint (VAD) — wraps the recorder; majority-vote start
//! detection, hangover-based end detection, preroll buffer, guard and
//! absolute caps (spec.md §4.9). The external VAD is `webrtc-vad`,
//! following the teacher's `audio::processing::AudioProcessor` usage.

use super::recorder::AudioRecorder;
use crate::config::{AudioConfig, EndpointConfig};
use crate::error::EndpointReason;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use webrtc_vad::{SampleRate as VadSampleRate, Vad, VadMode};

/// Seam between the endpoint's framing/VAD logic and a byte source, so
/// tests can feed scripted frames without a real capture device
/// (mirrors `PwmTransport`/`VisionTransport`'s test-double pattern).
pub trait FrameSource {
    fn read_bytes(&mut self, n: usize) -> Vec<u8>;
}

impl FrameSource for AudioRecorder {
    fn read_bytes(&mut self, n: usize) -> Vec<u8> {
        AudioRecorder::read_bytes(self, n)
    }
}

/// Per-frame speech/non-speech classifier. `WebrtcVadClassifier` is the
/// real backend; tests substitute a scripted double the same way
/// `WakeScorer` is stubbed for the wake detector.
pub trait VadClassifier: Send {
    fn is_speech(&mut self, samples: &[i16]) -> bool;
}

struct WebrtcVadClassifier(Vad);

impl VadClassifier for WebrtcVadClassifier {
    fn is_speech(&mut self, samples: &[i16]) -> bool {
        self.0.is_voice_segment(samples).unwrap_or(false)
    }
}

fn vad_mode(aggressiveness: u8) -> VadMode {
    match aggressiveness {
        0 => VadMode::Quality,
        1 => VadMode::LowBitrate,
        2 => VadMode::Aggressive,
        _ => VadMode::VeryAggressive,
    }
}

fn vad_sample_rate(sr: u32) -> VadSampleRate {
    match sr {
        8000 => VadSampleRate::Rate8kHz,
        32000 => VadSampleRate::Rate32kHz,
        48000 => VadSampleRate::Rate48kHz,
        _ => VadSampleRate::Rate16kHz,
    }
}

pub struct SpeechEndpoint {
    frame_bytes: usize,
    hang_frames: usize,
    preroll_frames: usize,
    start_win: usize,
    start_min: usize,
    start_consec_min: usize,
    no_speech_timeout_s: f32,
    max_utter_s: f32,
    end_guard_ms: u64,
    vad: Box<dyn VadClassifier>,
    pub stop: Arc<AtomicBool>,
}

impl SpeechEndpoint {
    pub fn new(audio: &AudioConfig, endpoint: &EndpointConfig) -> Self {
        let mut vad = Vad::new();
        vad.set_sample_rate(vad_sample_rate(audio.sample_rate));
        vad.set_mode(vad_mode(audio.vad_aggressiveness));
        Self::with_classifier(audio, endpoint, Box::new(WebrtcVadClassifier(vad)))
    }

    /// Builds the endpoint with an injected classifier, bypassing the real
    /// `webrtc-vad` backend — used by tests to script deterministic
    /// speech/non-speech sequences.
    pub fn with_classifier(audio: &AudioConfig, endpoint: &EndpointConfig, vad: Box<dyn VadClassifier>) -> Self {
        let frame_samples = (audio.sample_rate as usize * audio.frame_ms as usize) / 1000;
        Self {
            frame_bytes: 2 * frame_samples,
            hang_frames: div_ceil(endpoint.end_hang_ms, audio.frame_ms as u64) as usize,
            preroll_frames: (endpoint.preroll_ms / audio.frame_ms as u64) as usize,
            start_win: endpoint.start_win,
            start_min: endpoint.start_min,
            start_consec_min: endpoint.start_consec_min,
            no_speech_timeout_s: endpoint.no_speech_timeout_s,
            max_utter_s: endpoint.max_utter_s,
            end_guard_ms: endpoint.end_guard_ms,
            vad,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Records one utterance. Blocks reading exact frames from `recorder`
    /// until a start/end/timeout/cancel condition is reached (spec.md §4.9).
    pub fn record<R: FrameSource>(&mut self, recorder: &mut R, no_speech_timeout_s: f32) -> (Vec<u8>, EndpointReason) {
        let mut preroll: VecDeque<Vec<u8>> = VecDeque::with_capacity(self.preroll_frames);
        let mut votes: VecDeque<u8> = VecDeque::with_capacity(self.start_win);
        let mut consec_speech = 0usize;
        let mut started_at: Option<Instant> = None;
        let mut frames_since_voice = 0usize;
        let mut output: Vec<u8> = Vec::new();
        let start_ts = Instant::now();

        loop {
            if self.stop.load(Ordering::SeqCst) {
                return (output, EndpointReason::Cancelled);
            }

            let frame = recorder.read_bytes(self.frame_bytes);
            if frame.len() < self.frame_bytes {
                // Recorder closed mid-read.
                return (output, EndpointReason::Cancelled);
            }
            let is_speech = self.classify(&frame);

            if started_at.is_none() {
                if preroll.len() == self.preroll_frames {
                    preroll.pop_front();
                }
                preroll.push_back(frame.clone());

                if votes.len() == self.start_win {
                    votes.pop_front();
                }
                votes.push_back(if is_speech { 1 } else { 0 });
                if is_speech {
                    consec_speech += 1;
                } else {
                    consec_speech = 0;
                }

                let sum: u32 = votes.iter().map(|&v| v as u32).sum();
                if votes.len() == self.start_win
                    && sum as usize >= self.start_min
                    && consec_speech >= self.start_consec_min
                {
                    for f in preroll.drain(..) {
                        output.extend_from_slice(&f);
                    }
                    started_at = Some(Instant::now());
                    frames_since_voice = 0;
                    info!("speech start triggered");
                } else if start_ts.elapsed().as_secs_f32() > no_speech_timeout_s {
                    return (output, EndpointReason::NoSpeech);
                }
            } else {
                output.extend_from_slice(&frame);
                if is_speech {
                    frames_since_voice = 0;
                } else {
                    frames_since_voice += 1;
                }

                let started = started_at.unwrap();
                let guard_elapsed = started.elapsed().as_millis() as u64 >= self.end_guard_ms;
                if frames_since_voice >= self.hang_frames && guard_elapsed {
                    info!("speech end triggered (hangover)");
                    return (output, EndpointReason::SpeechEnded);
                }
                if started.elapsed().as_secs_f32() > self.max_utter_s {
                    info!("max utterance cap reached");
                    return (output, EndpointReason::MaxUtterance);
                }
            }
        }
    }

    fn classify(&mut self, frame: &[u8]) -> bool {
        let samples: Vec<i16> = frame.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect();
        self.vad.is_speech(&samples)
    }
}

fn div_ceil(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hang_frames_rounds_up() {
        let audio = AudioConfig { frame_ms: 30, ..Default::default() };
        let endpoint = EndpointConfig { end_hang_ms: 250, ..Default::default() };
        let ep = SpeechEndpoint::new(&audio, &endpoint);
        assert_eq!(ep.hang_frames, 9); // ceil(250/30) = 9
    }

    #[test]
    fn preroll_frames_computed() {
        let audio = AudioConfig { frame_ms: 30, ..Default::default() };
        let endpoint = EndpointConfig { preroll_ms: 240, ..Default::default() };
        let ep = SpeechEndpoint::new(&audio, &endpoint);
        assert_eq!(ep.preroll_frames, 8);
    }
}

//! Capture thread — owns the Audio Recorder, runs VAD-endpointing and
//! wake-word inference synchronously on every captured frame (spec.md §5:
//! "wake inference runs on the capture thread per frame"). The dialogue
//! controller commands it over a bounded channel rather than sharing the
//! recorder directly.

use crate::audio::{AudioRecorder, SpeechEndpoint};
use crate::config::Config;
use crate::error::EndpointReason;
use crate::wake::{WakeEvent, WakeWordDetector};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info, warn};

pub enum CaptureCommand {
    /// Record one utterance with the given no-speech timeout, replying with
    /// the PCM and the reason recording ended.
    Record { no_speech_timeout_s: f32, reply: Sender<(Vec<u8>, EndpointReason)> },
    /// Forces the wake detector to rearm immediately (spec.md §4.10, §4.11).
    ResetWakeAfterTts,
    /// Discards any queued mic frames (spec.md §4.11, follow-up re-arm).
    Flush,
}

pub struct CaptureThread {
    pub wake_rx: Receiver<WakeEvent>,
    pub commands: Sender<CaptureCommand>,
    pub mute: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureThread {
    pub fn start(config: &Config, mut wake_detector: WakeWordDetector) -> Result<Self, crate::error::AudioDeviceError> {
        let mut recorder = AudioRecorder::open(config.audio.device.as_deref(), config.audio.sample_rate, 1)?;
        recorder.gain_db = config.audio.gain_db;
        if config.audio.agc_enabled {
            recorder.agc = Some(crate::audio::Agc::new(config.audio.agc_target_dbfs, config.audio.agc_max_gain_db));
        }
        let mute = recorder.mute_handle();

        let (wake_tx, wake_rx) = bounded(8);
        let (cmd_tx, cmd_rx) = bounded::<CaptureCommand>(4);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let frame_bytes = config.frame_bytes();
        let mut endpoint = SpeechEndpoint::new(&config.audio, &config.endpoint);
        endpoint.stop = stop.clone();

        let handle = std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                info!("capture thread started");
                run(&mut recorder, &mut wake_detector, &mut endpoint, frame_bytes, &wake_tx, &cmd_rx, &stop_thread);
                info!("capture thread stopped");
            })
            .expect("failed to spawn capture thread");

        Ok(Self { wake_rx, commands: cmd_tx, mute, stop, handle: Some(handle) })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    recorder: &mut AudioRecorder,
    wake_detector: &mut WakeWordDetector,
    endpoint: &mut SpeechEndpoint,
    frame_bytes: usize,
    wake_tx: &Sender<WakeEvent>,
    cmd_rx: &Receiver<CaptureCommand>,
    stop: &Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        match cmd_rx.try_recv() {
            Ok(CaptureCommand::Record { no_speech_timeout_s, reply }) => {
                let (pcm, reason) = endpoint.record(recorder, no_speech_timeout_s);
                if reply.send((pcm, reason)).is_err() {
                    warn!("dialogue thread gone, dropping capture reply");
                }
                continue;
            }
            Ok(CaptureCommand::ResetWakeAfterTts) => {
                wake_detector.reset_after_tts();
                continue;
            }
            Ok(CaptureCommand::Flush) => {
                recorder.flush();
                continue;
            }
            Err(crossbeam_channel::TryRecvError::Disconnected) => break,
            Err(crossbeam_channel::TryRecvError::Empty) => {}
        }

        let frame = recorder.read_bytes(frame_bytes);
        if frame.len() < frame_bytes {
            continue;
        }
        let samples: Vec<i16> = frame.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect();
        if let Some(event) = wake_detector.push_frame(&samples) {
            if wake_tx.send(event).is_err() {
                break;
            }
        }
    }
}

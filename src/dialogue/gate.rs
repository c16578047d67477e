//! Half-duplex TTS gate — a scoped acquisition around TTS playback
//! (spec.md §4.11). Re-entrant only from the dialogue thread that owns it;
//! a second concurrent acquisition blocks on the same mutex.

use super::capture::CaptureCommand;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct TtsGate {
    lock: Mutex<()>,
    mute: Arc<AtomicBool>,
    commands: Sender<CaptureCommand>,
    barge_in: bool,
    cooldown_after_tts_s: f32,
}

impl TtsGate {
    pub fn new(mute: Arc<AtomicBool>, commands: Sender<CaptureCommand>, barge_in: bool, cooldown_after_tts_s: f32) -> Self {
        Self { lock: Mutex::new(()), mute, commands, barge_in, cooldown_after_tts_s }
    }

    /// Enters the gate for the duration of one TTS utterance. Blocks if
    /// another acquisition is in progress.
    pub fn enter(&self) -> TtsGateGuard<'_> {
        let guard = self.lock.lock();
        if !self.barge_in {
            self.mute.store(true, Ordering::SeqCst);
            debug!("tts gate entered: mic muted");
        }
        TtsGateGuard { gate: self, _lock: guard }
    }
}

pub struct TtsGateGuard<'a> {
    gate: &'a TtsGate,
    _lock: parking_lot::MutexGuard<'a, ()>,
}

impl Drop for TtsGateGuard<'_> {
    fn drop(&mut self) {
        if !self.gate.barge_in {
            std::thread::sleep(Duration::from_secs_f32(self.gate.cooldown_after_tts_s));
            self.gate.mute.store(false, Ordering::SeqCst);
        }
        let _ = self.gate.commands.send(CaptureCommand::ResetWakeAfterTts);
        debug!("tts gate exited: mic unmuted, wake detector rearmed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn mutes_mic_while_barge_in_disabled() {
        let mute = Arc::new(AtomicBool::new(false));
        let (tx, rx) = unbounded();
        let gate = TtsGate::new(mute.clone(), tx, false, 0.0);
        {
            let _g = gate.enter();
            assert!(mute.load(Ordering::SeqCst));
        }
        assert!(!mute.load(Ordering::SeqCst));
        assert!(matches!(rx.try_recv().unwrap(), CaptureCommand::ResetWakeAfterTts));
    }

    #[test]
    fn leaves_mic_unmuted_when_barge_in_enabled() {
        let mute = Arc::new(AtomicBool::new(false));
        let (tx, _rx) = unbounded();
        let gate = TtsGate::new(mute.clone(), tx, true, 0.0);
        let _g = gate.enter();
        assert!(!mute.load(Ordering::SeqCst));
    }
}

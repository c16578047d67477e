//! Half-duplex TTS gate (spec.md §4.11, §8 scenario 5): while barge-in is
//! disabled, entering the gate must mute the mic and rearm the wake
//! detector exactly once per utterance on exit; with barge-in enabled the
//! mic must stay live throughout.

use coglet_core::dialogue::capture::CaptureCommand;
use coglet_core::dialogue::TtsGate;
use crossbeam_channel::unbounded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[test]
fn barge_in_disabled_mutes_for_the_gated_scope_only() {
    let mute = Arc::new(AtomicBool::new(false));
    let (tx, rx) = unbounded();
    let gate = TtsGate::new(mute.clone(), tx, false, 0.0);

    assert!(!mute.load(Ordering::SeqCst));
    {
        let _guard = gate.enter();
        assert!(mute.load(Ordering::SeqCst), "mic must be muted for the duration of TTS playback");
    }
    assert!(!mute.load(Ordering::SeqCst), "mic must be unmuted once playback ends");
    assert!(matches!(rx.try_recv().unwrap(), CaptureCommand::ResetWakeAfterTts));
    assert!(rx.try_recv().is_err(), "exactly one rearm command per gated utterance");
}

#[test]
fn barge_in_enabled_never_mutes() {
    let mute = Arc::new(AtomicBool::new(false));
    let (tx, rx) = unbounded();
    let gate = TtsGate::new(mute.clone(), tx, true, 0.0);

    {
        let _guard = gate.enter();
        assert!(!mute.load(Ordering::SeqCst));
    }
    assert!(!mute.load(Ordering::SeqCst));
    assert!(matches!(rx.try_recv().unwrap(), CaptureCommand::ResetWakeAfterTts));
}

#[test]
fn sequential_utterances_each_rearm_once() {
    let mute = Arc::new(AtomicBool::new(false));
    let (tx, rx) = unbounded();
    let gate = TtsGate::new(mute.clone(), tx, false, 0.0);

    for _ in 0..3 {
        let _guard = gate.enter();
    }
    let rearm_count = std::iter::from_fn(|| rx.try_recv().ok()).count();
    assert_eq!(rearm_count, 3);
}

//! Dialogue Controller — the top-level state machine gluing wake → record
//! → STT → LLM → TTS → follow-up, driving animations and the LED
//! (spec.md §4.12). Owns the only long-lived handles to NRL, MOU, EAL, and
//! EAR; everything else (eyes, pitch, wheels, lids) belongs to the face
//! tracker and eyelid controller for the process lifetime.

use super::capture::{CaptureCommand, CaptureThread};
use super::gate::TtsGate;
use super::turn::{History, Turn};
use crate::animation::{listening, talking, thinking, AnimationHandle};
use crate::config::{Config, DialogueConfig};
use crate::error::EndpointReason;
use crate::eyelid::EyelidController;
use crate::led::{LedSink, LedState};
use crate::servo::Servo;
use crate::services::tts::TtsEventKind;
use crate::services::{ChatMessage, LlmClient, SttClient, TtsBackend};
use crate::vision::FaceTrackerHandle;
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const FALLBACK_PHRASE: &str = "Sorry, I'm having trouble right now.";
const CONFIRMATION_PHRASE: &str = "Mm?";
const TTS_EVENT_WAIT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Recording,
    Followup,
    DeepSleep,
}

pub struct DialogueController {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DialogueController {
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        config: Config,
        capture: CaptureThread,
        stt: SttClient,
        llm: LlmClient,
        tts: Box<dyn TtsBackend>,
        led: Box<dyn LedSink>,
        eyelid: Arc<EyelidController>,
        tracker: FaceTrackerHandle,
        nrl: Servo,
        mou: Servo,
        eal: Servo,
        ear: Servo,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let handle = std::thread::Builder::new()
            .name("dialogue".into())
            .spawn(move || {
                info!("dialogue controller started");
                let mut inner = Inner {
                    dialogue_cfg: config.dialogue.clone(),
                    no_speech_timeout_s: config.endpoint.no_speech_timeout_s,
                    capture,
                    gate_mute: None,
                    stt,
                    llm,
                    tts,
                    led,
                    eyelid,
                    tracker,
                    history: History::new(config.dialogue.ctx_turns),
                    nrl: Some(nrl),
                    mou: Some(mou),
                    eal: Some(eal),
                    ear: Some(ear),
                    listening_anim: None,
                    thinking_anim: None,
                    talking_anim: None,
                };
                inner.run(stop_thread);
                info!("dialogue controller stopped");
            })
            .expect("failed to spawn dialogue thread");
        Self { stop, handle: Some(handle) }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for DialogueController {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Inner {
    dialogue_cfg: DialogueConfig,
    no_speech_timeout_s: f32,
    capture: CaptureThread,
    gate_mute: Option<TtsGate>,
    stt: SttClient,
    llm: LlmClient,
    tts: Box<dyn TtsBackend>,
    led: Box<dyn LedSink>,
    eyelid: Arc<EyelidController>,
    tracker: FaceTrackerHandle,
    history: History,
    nrl: Option<Servo>,
    mou: Option<Servo>,
    eal: Option<Servo>,
    ear: Option<Servo>,
    listening_anim: Option<AnimationHandle<Servo>>,
    thinking_anim: Option<AnimationHandle<(Servo, Servo)>>,
    talking_anim: Option<AnimationHandle<Servo>>,
}

impl Inner {
    fn run(&mut self, stop: Arc<AtomicBool>) {
        let gate_mute = self.capture.mute.clone();
        let gate_commands = self.capture.commands.clone();
        self.gate_mute = Some(TtsGate::new(
            gate_mute,
            gate_commands,
            self.dialogue_cfg.barge_in,
            self.dialogue_cfg.cooldown_after_tts_s,
        ));

        let mut state = State::Idle;
        let mut idle_since = Instant::now();
        let mut followup_turns: u32 = 0;

        while !stop.load(Ordering::SeqCst) {
            match state {
                State::Idle | State::DeepSleep => {
                    match self.capture.wake_rx.recv_timeout(Duration::from_millis(250)) {
                        Ok(event) => {
                            info!(confidence = event.confidence, "wake event");
                            if state == State::DeepSleep {
                                self.eyelid.set_auto();
                            }
                            if self.dialogue_cfg.reset_on_wake {
                                self.history.clear();
                            }
                            followup_turns = 0;
                            self.led.set(LedState::Listening);
                            self.play_confirmation();
                            self.start_listening_animation();
                            state = State::Recording;
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if state == State::Idle
                                && idle_since.elapsed().as_secs_f32() >= self.dialogue_cfg.deep_sleep_timeout_s
                            {
                                info!("entering deep sleep");
                                self.eyelid.set_sleep(1.0);
                                self.led.set(LedState::Off);
                                state = State::DeepSleep;
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                State::Recording => {
                    let (pcm, reason) = self.record_utterance(self.no_speech_timeout_s);
                    self.stop_listening_animation();
                    state = self.after_recording(pcm, reason, &mut followup_turns);
                    if state == State::Idle {
                        idle_since = Instant::now();
                    }
                }
                State::Followup => {
                    std::thread::sleep(Duration::from_secs_f32(self.dialogue_cfg.followup_cooldown_s));
                    let _ = self.capture.commands.send(CaptureCommand::Flush);
                    self.start_listening_animation();
                    let (pcm, reason) = self.record_utterance(self.dialogue_cfg.followup_arm_s);
                    self.stop_listening_animation();
                    state = self.after_recording(pcm, reason, &mut followup_turns);
                    if state == State::Idle {
                        idle_since = Instant::now();
                        self.led.set(LedState::Off);
                    }
                }
            }
        }

        self.stop_listening_animation();
        self.stop_thinking_animation();
        self.stop_talking_animation();
        self.park_and_release_servos();
        self.capture.stop();
    }

    /// Drives NRL/MOU/EAL/EAR back to neutral and releases their PWM
    /// channels as this controller's own shutdown step (spec.md §6, §8
    /// scenario 6) — they are never returned to the shared registry.
    fn park_and_release_servos(&mut self) {
        let mut servos: Vec<Servo> =
            [self.nrl.take(), self.mou.take(), self.eal.take(), self.ear.take()].into_iter().flatten().collect();
        for servo in servos.iter_mut() {
            let neutral = servo.config().neutral_deg;
            servo.set_target(neutral);
        }
        let deadline = Instant::now() + Duration::from_millis(800);
        while Instant::now() < deadline {
            let now = Instant::now();
            for servo in servos.iter_mut() {
                let _ = servo.update(now);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        for servo in servos.iter_mut() {
            let _ = servo.release();
        }
    }

    fn after_recording(&mut self, pcm: Vec<u8>, reason: EndpointReason, followup_turns: &mut u32) -> State {
        match reason {
            EndpointReason::SpeechEnded | EndpointReason::MaxUtterance if !pcm.is_empty() => {
                match self.handle_utterance(pcm) {
                    Ok(()) => {
                        *followup_turns += 1;
                        let unlimited = self.dialogue_cfg.followup_max_turns == 0;
                        if self.dialogue_cfg.followup_enable
                            && (unlimited || *followup_turns < self.dialogue_cfg.followup_max_turns)
                        {
                            self.led.set(LedState::AwaitFollowup);
                            State::Followup
                        } else {
                            self.led.set(LedState::Off);
                            State::Idle
                        }
                    }
                    Err(()) => {
                        self.led.set(LedState::Off);
                        State::Idle
                    }
                }
            }
            _ => {
                self.led.set(LedState::Off);
                State::Idle
            }
        }
    }

    fn record_utterance(&mut self, no_speech_timeout_s: f32) -> (Vec<u8>, EndpointReason) {
        let (reply_tx, reply_rx) = bounded(1);
        if self
            .capture
            .commands
            .send(CaptureCommand::Record { no_speech_timeout_s, reply: reply_tx })
            .is_err()
        {
            return (Vec::new(), EndpointReason::Cancelled);
        }
        reply_rx.recv_timeout(Duration::from_secs_f32(no_speech_timeout_s + 30.0)).unwrap_or((Vec::new(), EndpointReason::Cancelled))
    }

    /// RECORDING→THINKING→SPEAKING, inline. Returns `Err(())` on any
    /// external-service failure after speaking the local fallback phrase.
    fn handle_utterance(&mut self, pcm: Vec<u8>) -> Result<(), ()> {
        self.led.set(LedState::Thinking);
        self.tracker.set_enabled(false);
        self.start_thinking_animation();

        let text = match self.stt.transcribe(&pcm, None) {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "stt failed");
                self.stop_thinking_animation();
                self.tracker.set_enabled(true);
                self.speak(FALLBACK_PHRASE);
                return Err(());
            }
        };

        let mut messages: Vec<ChatMessage> = self.history.as_chat_messages();
        messages.push(ChatMessage::user(text.clone()));
        let reply = if self.dialogue_cfg.use_chat {
            self.llm.chat(&messages)
        } else {
            self.llm.complete(&text)
        };
        let reply = match reply {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "llm failed");
                self.stop_thinking_animation();
                self.tracker.set_enabled(true);
                self.speak(FALLBACK_PHRASE);
                return Err(());
            }
        };

        self.stop_thinking_animation();
        self.tracker.set_enabled(true);
        self.led.set(LedState::Speaking);
        self.speak(&reply);
        self.history.push(Turn { user: text, assistant: reply });
        Ok(())
    }

    fn speak(&mut self, text: &str) {
        let gate = self.gate_mute.as_ref().expect("gate initialized in run()");
        let _guard = gate.enter();
        self.start_talking_animation();
        match self.tts.say(text) {
            Ok(id) => {
                let deadline = Instant::now() + TTS_EVENT_WAIT;
                loop {
                    if Instant::now() >= deadline {
                        warn!("tts event wait timed out");
                        break;
                    }
                    match self.tts.next_event(Duration::from_millis(200)) {
                        Some(ev) if ev.id == id && matches!(ev.kind, TtsEventKind::Done | TtsEventKind::Cancelled | TtsEventKind::Error) => break,
                        Some(_) | None => continue,
                    }
                }
            }
            Err(e) => warn!(error = %e, "tts say failed"),
        }
        self.stop_talking_animation();
    }

    fn play_confirmation(&mut self) {
        self.speak(CONFIRMATION_PHRASE);
    }

    fn start_listening_animation(&mut self) {
        if let Some(nrl) = self.nrl.take() {
            self.listening_anim = Some(listening::start(nrl, self.eyelid.clone(), Default::default()));
        }
    }

    fn stop_listening_animation(&mut self) {
        if let Some(mut anim) = self.listening_anim.take() {
            if let Some(nrl) = anim.stop() {
                self.nrl = Some(nrl);
            }
        }
    }

    fn start_thinking_animation(&mut self) {
        if let (Some(eal), Some(ear)) = (self.eal.take(), self.ear.take()) {
            self.thinking_anim = Some(thinking::start(eal, ear, Default::default()));
        }
    }

    fn stop_thinking_animation(&mut self) {
        if let Some(mut anim) = self.thinking_anim.take() {
            if let Some((eal, ear)) = anim.stop() {
                self.eal = Some(eal);
                self.ear = Some(ear);
            }
        }
    }

    fn start_talking_animation(&mut self) {
        if let Some(mou) = self.mou.take() {
            self.talking_anim = Some(talking::start(mou, Default::default()));
        }
    }

    fn stop_talking_animation(&mut self) {
        if let Some(mut anim) = self.talking_anim.take() {
            if let Some(mou) = anim.stop() {
                self.mou = Some(mou);
            }
        }
    }
}

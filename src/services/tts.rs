//! Local TTS bridge — tagged-variant dispatcher over a small `{say, cancel,
//! events}` capability (spec.md §6, §9). The publish/subscribe transport
//! itself (MQTT broker) is an external collaborator out of this core's
//! scope (spec.md §1); only the trait boundary and its narrow fallbacks —
//! a named pipe and a last-resort subprocess — are implemented here.

use crate::error::ExternalServiceFailure;
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TtsEventKind {
    Ready,
    Start,
    Speaking,
    Done,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsEvent {
    pub id: Uuid,
    pub kind: TtsEventKind,
}

pub trait TtsBackend: Send {
    fn say(&mut self, text: &str) -> Result<Uuid, ExternalServiceFailure>;
    fn cancel(&mut self, id: Option<Uuid>) -> Result<(), ExternalServiceFailure>;
    /// Blocks for up to `timeout` waiting for the next lifecycle event.
    fn next_event(&mut self, timeout: Duration) -> Option<TtsEvent>;
}

/// Line-delimited JSON over a named pipe (or any writer exposing the same
/// shape), with events read back from a sibling reader channel. Used when a
/// full pub/sub broker isn't available.
pub struct NamedPipeTtsBackend {
    writer: std::fs::File,
    events: Receiver<TtsEvent>,
}

impl NamedPipeTtsBackend {
    pub fn new(pipe_path: &str, events: Receiver<TtsEvent>) -> std::io::Result<Self> {
        let writer = std::fs::OpenOptions::new().write(true).open(pipe_path)?;
        Ok(Self { writer, events })
    }
}

#[derive(Serialize)]
struct PipeCommand<'a> {
    op: &'a str,
    id: Uuid,
    text: Option<&'a str>,
}

impl TtsBackend for NamedPipeTtsBackend {
    fn say(&mut self, text: &str) -> Result<Uuid, ExternalServiceFailure> {
        let id = Uuid::new_v4();
        let line = serde_json::to_string(&PipeCommand { op: "say", id, text: Some(text) })
            .map_err(|e| ExternalServiceFailure::Tts(e.to_string()))?;
        writeln!(self.writer, "{line}").map_err(|e| ExternalServiceFailure::Tts(e.to_string()))?;
        Ok(id)
    }

    fn cancel(&mut self, id: Option<Uuid>) -> Result<(), ExternalServiceFailure> {
        let line = serde_json::to_string(&PipeCommand { op: "cancel", id: id.unwrap_or_default(), text: None })
            .map_err(|e| ExternalServiceFailure::Tts(e.to_string()))?;
        writeln!(self.writer, "{line}").map_err(|e| ExternalServiceFailure::Tts(e.to_string()))?;
        Ok(())
    }

    fn next_event(&mut self, timeout: Duration) -> Option<TtsEvent> {
        self.events.recv_timeout(timeout).ok()
    }
}

/// Last-resort backend: spawns a one-shot subprocess per utterance that
/// writes WAV to the audio device directly. No lifecycle streaming beyond
/// process exit, which is reported as `Done`.
pub struct SubprocessTtsBackend {
    program: String,
    args: Vec<String>,
    last_id: Option<Uuid>,
    pending_done: bool,
}

impl SubprocessTtsBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args, last_id: None, pending_done: false }
    }
}

impl TtsBackend for SubprocessTtsBackend {
    fn say(&mut self, text: &str) -> Result<Uuid, ExternalServiceFailure> {
        let id = Uuid::new_v4();
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| ExternalServiceFailure::Tts(e.to_string()))?;
        if !status.success() {
            return Err(ExternalServiceFailure::Tts(format!("subprocess exited with {status}")));
        }
        self.last_id = Some(id);
        self.pending_done = true;
        Ok(id)
    }

    fn cancel(&mut self, _id: Option<Uuid>) -> Result<(), ExternalServiceFailure> {
        // The subprocess runs to completion synchronously; nothing to cancel.
        Ok(())
    }

    fn next_event(&mut self, _timeout: Duration) -> Option<TtsEvent> {
        if self.pending_done {
            self.pending_done = false;
            self.last_id.map(|id| TtsEvent { id, kind: TtsEventKind::Done })
        } else {
            None
        }
    }
}

/// In-memory test double driven entirely by the test: `say`/`cancel` push to
/// a script the test reads back via `next_event`.
pub struct ChannelTtsBackend {
    tx: Sender<TtsEvent>,
    rx: Receiver<TtsEvent>,
    last_id: Option<Uuid>,
}

impl ChannelTtsBackend {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx, last_id: None }
    }

    /// Test hook: enqueue an event as if the backend produced it.
    pub fn push_event(&self, kind: TtsEventKind) {
        if let Some(id) = self.last_id {
            let _ = self.tx.send(TtsEvent { id, kind });
        }
    }
}

impl Default for ChannelTtsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TtsBackend for ChannelTtsBackend {
    fn say(&mut self, _text: &str) -> Result<Uuid, ExternalServiceFailure> {
        let id = Uuid::new_v4();
        self.last_id = Some(id);
        let _ = self.tx.send(TtsEvent { id, kind: TtsEventKind::Ready });
        Ok(id)
    }

    fn cancel(&mut self, id: Option<Uuid>) -> Result<(), ExternalServiceFailure> {
        let id = id.or(self.last_id).unwrap_or_default();
        let _ = self.tx.send(TtsEvent { id, kind: TtsEventKind::Cancelled });
        Ok(())
    }

    fn next_event(&mut self, timeout: Duration) -> Option<TtsEvent> {
        self.rx.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_backend_roundtrips_say_and_done() {
        let mut backend = ChannelTtsBackend::new();
        let id = backend.say("hello").unwrap();
        let ev = backend.next_event(Duration::from_millis(50)).unwrap();
        assert_eq!(ev.id, id);
        assert_eq!(ev.kind, TtsEventKind::Ready);
        backend.push_event(TtsEventKind::Done);
        let ev = backend.next_event(Duration::from_millis(50)).unwrap();
        assert_eq!(ev.kind, TtsEventKind::Done);
    }
}

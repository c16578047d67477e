//! LED status indicator — an external collaborator (spec.md §1); only the
//! small state mapping and sink trait live in this core (spec.md §4.12).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedState {
    Off,
    Listening,
    Thinking,
    Speaking,
    AwaitFollowup,
}

pub trait LedSink: Send {
    fn set(&mut self, state: LedState);
}

/// Default sink when no physical indicator is wired up.
pub struct NullLedSink;

impl LedSink for NullLedSink {
    fn set(&mut self, _state: LedState) {}
}

//! Dialogue Controller — top-level state machine (spec.md §4.12).

pub mod capture;
pub mod controller;
pub mod gate;
pub mod turn;

pub use controller::DialogueController;
pub use gate::TtsGate;
pub use turn::{History, Turn};

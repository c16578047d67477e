//! External collaborators: STT, LLM, and TTS (spec.md §1, §6). Narrow
//! clients/trait boundaries only — no protocol servers live here.

pub mod llm;
pub mod stt;
pub mod tts;

pub use llm::{ChatMessage, LlmClient};
pub use stt::SttClient;
pub use tts::{TtsBackend, TtsEvent, TtsEventKind};

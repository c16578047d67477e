pub mod endpoint;
pub mod recorder;

pub use endpoint::{FrameSource, SpeechEndpoint, VadClassifier};
pub use recorder::{AudioRecorder, Agc};

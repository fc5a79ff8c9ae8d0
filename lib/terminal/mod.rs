//! Terminal text handling: escape stripping, prompt recognition and output transcripts.

mod ansi;
mod prompt;
mod transcript;

pub use ansi::strip_ansi;
pub use prompt::PromptDetector;
pub use transcript::Transcript;

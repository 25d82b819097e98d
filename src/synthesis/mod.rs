//! Notation to audio synthesis.
//!
//! Converts ABC notation documents into rendered audio by chaining external
//! tools, with per-stage timeouts and scoped temporary files.

mod models;
mod pipeline;
mod soundfont;
mod stage;
mod temp_files;

#[cfg(all(test, unix))]
pub(crate) mod test_support;

pub use models::{AudioFormat, NotationDocument, SynthesizedAudio};
pub use pipeline::{
    PipelineError, SynthesisPipeline, SynthesisPipelineConfig, Synthesizer,
    SOUNDFONT_DOWNLOAD_URL,
};
pub use soundfont::{SoundFontLocator, SoundFontReference};
pub use stage::{ConversionResult, ConversionStage, StageError, StageExit};
pub use temp_files::TempFileSet;

//! Data models for the synthesis pipeline.
//!
//! A request flows through the pipeline as follows:
//! 1. A `NotationDocument` is submitted (ABC text plus requested format)
//! 2. The notation is converted to MIDI, then rendered against a SoundFont
//! 3. The rendered file is handed back as `SynthesizedAudio`

use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// Output format requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// Uncompressed PCM wave, rendered directly by the synthesizer.
    #[default]
    Wav,
    /// MPEG layer 3, encoded from the rendered wave.
    Mp3,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
        }
    }

    /// File suffix used for the temporary output file.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Wav => ".wav",
            Self::Mp3 => ".mp3",
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
        }
    }

    /// Filename suggested to clients downloading the result.
    pub fn suggested_filename(&self) -> &'static str {
        match self {
            Self::Wav => "legato_output.wav",
            Self::Mp3 => "legato_output.mp3",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notation document submitted for synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotationDocument {
    pub content: String,
    pub format: AudioFormat,
}

impl NotationDocument {
    pub fn new(content: impl Into<String>, format: AudioFormat) -> Self {
        Self {
            content: content.into(),
            format,
        }
    }

    /// The content stripped of surrounding whitespace, or `None` if nothing is left.
    pub fn trimmed_content(&self) -> Option<&str> {
        let trimmed = self.content.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }
}

/// Rendered audio produced by a successful synthesis.
///
/// The audio lives in a temporary file owned by this value. The file is removed
/// when the value (or the body stream created from it) is dropped.
#[derive(Debug)]
pub struct SynthesizedAudio {
    path: TempPath,
    size: u64,
    format: AudioFormat,
}

impl SynthesizedAudio {
    pub fn new(path: TempPath, size: u64, format: AudioFormat) -> Self {
        Self { path, size, format }
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn media_type(&self) -> &'static str {
        self.format.media_type()
    }

    pub fn suggested_filename(&self) -> &'static str {
        self.format.suggested_filename()
    }

    /// Read the whole rendered file into memory.
    #[cfg(test)]
    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    /// Open the rendered file as a byte stream.
    ///
    /// Returns the stream together with the temp path guard; the file is deleted
    /// once the guard is dropped, so callers must keep it alive for as long as
    /// the stream is being consumed.
    pub async fn into_stream(self) -> std::io::Result<(ReaderStream<File>, TempPath)> {
        let file = File::open(&self.path).await?;
        Ok((ReaderStream::new(file), self.path))
    }
}

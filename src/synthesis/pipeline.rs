//! ABC notation to audio synthesis.
//!
//! The pipeline drives three external tools in sequence:
//! 1. `abc2midi` turns the notation into a MIDI file
//! 2. `fluidsynth` renders the MIDI file against a SoundFont into a wave file
//! 3. `ffmpeg` encodes the wave file to MP3, only when MP3 output was requested
//!
//! Each run owns its temporary files through a [`TempFileSet`], so every exit
//! path leaves nothing behind except the audio handed back to the caller.

use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

use super::models::{AudioFormat, NotationDocument, SynthesizedAudio};
use super::soundfont::{SoundFontLocator, SoundFontReference};
use super::stage::{ConversionResult, ConversionStage, StageError};
use super::temp_files::TempFileSet;
use crate::server::metrics;

/// Where operators can get a SoundFont when none is installed.
pub const SOUNDFONT_DOWNLOAD_URL: &str = "https://musical-artifacts.com/artifacts?formats=sf2";

/// Classified synthesis failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Empty notation; the caller has to fix the request.
    #[error("ABC notation is empty")]
    InvalidInput,

    /// Missing SoundFont or missing external tool; the operator has to fix the host.
    #[error("{0}")]
    Configuration(String),

    /// abc2midi failed or timed out.
    #[error("{0}")]
    Conversion(String),

    /// fluidsynth (or the mp3 encoder) failed or timed out.
    #[error("{0}")]
    Synthesis(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Configuration(_) => "configuration",
            Self::Conversion(_) => "conversion",
            Self::Synthesis(_) => "synthesis",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the failure is caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput)
    }
}

/// Converts notation documents to audio.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Run a full conversion for one document.
    async fn synthesize(
        &self,
        document: NotationDocument,
    ) -> Result<SynthesizedAudio, PipelineError>;

    /// The SoundFont a run started now would use.
    async fn soundfont(&self) -> Option<SoundFontReference>;

    /// Directory scanned for SoundFonts.
    fn soundfont_dir(&self) -> &Path;
}

/// Settings for [`SynthesisPipeline`].
#[derive(Debug, Clone)]
pub struct SynthesisPipelineConfig {
    /// Directory scanned for `.sf2` files on every run.
    pub soundfont_dir: PathBuf,
    /// Directory for temporary files, the platform temp directory if `None`.
    pub temp_dir: Option<PathBuf>,
    pub abc2midi_path: PathBuf,
    pub fluidsynth_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub abc2midi_timeout: Duration,
    pub fluidsynth_timeout: Duration,
    pub ffmpeg_timeout: Duration,
    /// Rendering sample rate in Hz.
    pub sample_rate: u32,
    /// Synthesizer master gain.
    pub gain: f32,
    /// Target bitrate for mp3 encoding (kbps).
    pub mp3_bitrate_kbps: u32,
}

impl Default for SynthesisPipelineConfig {
    fn default() -> Self {
        Self {
            soundfont_dir: PathBuf::from("soundfonts"),
            temp_dir: None,
            abc2midi_path: PathBuf::from("abc2midi"),
            fluidsynth_path: PathBuf::from("fluidsynth"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            abc2midi_timeout: Duration::from_secs(10),
            fluidsynth_timeout: Duration::from_secs(60),
            ffmpeg_timeout: Duration::from_secs(60),
            sample_rate: 44100,
            gain: 1.0,
            mp3_bitrate_kbps: 192,
        }
    }
}

/// Synthesizer backed by the `abc2midi`, `fluidsynth` and `ffmpeg` binaries.
pub struct SynthesisPipeline {
    locator: SoundFontLocator,
    temp_dir: PathBuf,
    abc2midi: ConversionStage,
    fluidsynth: ConversionStage,
    ffmpeg: ConversionStage,
    sample_rate: u32,
    gain: f32,
    mp3_bitrate_kbps: u32,
}

impl SynthesisPipeline {
    pub fn new(config: SynthesisPipelineConfig) -> Self {
        Self {
            locator: SoundFontLocator::new(config.soundfont_dir),
            temp_dir: config.temp_dir.unwrap_or_else(std::env::temp_dir),
            abc2midi: ConversionStage::new(
                "abc2midi",
                config.abc2midi_path,
                config.abc2midi_timeout,
            ),
            fluidsynth: ConversionStage::new(
                "fluidsynth",
                config.fluidsynth_path,
                config.fluidsynth_timeout,
            ),
            ffmpeg: ConversionStage::new("ffmpeg", config.ffmpeg_path, config.ffmpeg_timeout),
            sample_rate: config.sample_rate,
            gain: config.gain,
            mp3_bitrate_kbps: config.mp3_bitrate_kbps,
        }
    }

    async fn run(&self, document: &NotationDocument) -> Result<SynthesizedAudio, PipelineError> {
        let content = document
            .trimmed_content()
            .ok_or(PipelineError::InvalidInput)?;

        let soundfont = self.locator.locate().await.ok_or_else(|| {
            PipelineError::Configuration(format!(
                "No SoundFont (.sf2) found in {}. Download one from {}",
                self.locator.dir().display(),
                SOUNDFONT_DOWNLOAD_URL
            ))
        })?;

        let format = document.format;
        let mut temp_files = TempFileSet::new(&self.temp_dir);
        let abc_path = temp_files
            .acquire(".abc")
            .map_err(|e| internal("create ABC temp file", e))?;
        let midi_path = temp_files
            .acquire(".mid")
            .map_err(|e| internal("create MIDI temp file", e))?;
        let audio_path = temp_files
            .acquire(format.suffix())
            .map_err(|e| internal("create audio temp file", e))?;
        // fluidsynth can only write wave here; mp3 is encoded from an intermediate render
        let render_path = match format {
            AudioFormat::Wav => audio_path.clone(),
            AudioFormat::Mp3 => temp_files
                .acquire(".wav")
                .map_err(|e| internal("create render temp file", e))?,
        };

        tokio::fs::write(&abc_path, content)
            .await
            .map_err(|e| internal("write ABC temp file", e))?;

        info!("Converting ABC to MIDI: {:?} -> {:?}", abc_path, midi_path);
        let result = self
            .abc2midi
            .run(
                [abc_path.as_os_str(), OsStr::new("-o"), midi_path.as_os_str()],
                &midi_path,
            )
            .await
            .map_err(classify_stage_error)?;
        ensure_success(&result, PipelineError::Conversion)?;
        temp_files.discard(&abc_path);

        info!("Synthesizing with SoundFont: {:?}", soundfont.path());
        let sample_rate = self.sample_rate.to_string();
        let gain = format_gain(self.gain);
        let result = self
            .fluidsynth
            .run(
                [
                    OsStr::new("-ni"),
                    OsStr::new("-F"),
                    render_path.as_os_str(),
                    OsStr::new("-r"),
                    OsStr::new(&sample_rate),
                    OsStr::new("-g"),
                    OsStr::new(&gain),
                    soundfont.path().as_os_str(),
                    midi_path.as_os_str(),
                ],
                &render_path,
            )
            .await
            .map_err(classify_stage_error)?;
        ensure_success(&result, PipelineError::Synthesis)?;
        temp_files.discard(&midi_path);

        if format == AudioFormat::Mp3 {
            info!("Encoding MP3: {:?} -> {:?}", render_path, audio_path);
            let bitrate = format!("{}k", self.mp3_bitrate_kbps);
            let result = self
                .ffmpeg
                .run(
                    [
                        OsStr::new("-y"),
                        OsStr::new("-i"),
                        render_path.as_os_str(),
                        OsStr::new("-vn"),
                        OsStr::new("-c:a"),
                        OsStr::new("libmp3lame"),
                        OsStr::new("-b:a"),
                        OsStr::new(&bitrate),
                        audio_path.as_os_str(),
                    ],
                    &audio_path,
                )
                .await
                .map_err(classify_stage_error)?;
            ensure_success(&result, PipelineError::Synthesis)?;
            temp_files.discard(&render_path);
        }

        let size = tokio::fs::metadata(&audio_path)
            .await
            .map_err(|e| internal("stat audio output", e))?
            .len();
        let audio = temp_files.release(&audio_path).ok_or_else(|| {
            PipelineError::Internal("audio output is not tracked by this run".to_string())
        })?;

        Ok(SynthesizedAudio::new(audio, size, format))
    }
}

#[async_trait]
impl Synthesizer for SynthesisPipeline {
    async fn synthesize(
        &self,
        document: NotationDocument,
    ) -> Result<SynthesizedAudio, PipelineError> {
        let start = Instant::now();
        let format = document.format;
        let result = self.run(&document).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(audio) => {
                info!(
                    "Synthesized {} ({} bytes) in {}ms",
                    audio.suggested_filename(),
                    audio.size(),
                    elapsed.as_millis()
                );
                metrics::record_synthesis("success", format.as_str(), elapsed);
            }
            Err(err) if err.is_client_error() => {
                warn!("Rejected synthesis request: {}", err);
                metrics::record_synthesis(err.kind(), format.as_str(), elapsed);
            }
            Err(err) => {
                error!("Synthesis error ({}): {}", err.kind(), err);
                metrics::record_synthesis(err.kind(), format.as_str(), elapsed);
            }
        }

        result
    }

    async fn soundfont(&self) -> Option<SoundFontReference> {
        self.locator.locate().await
    }

    fn soundfont_dir(&self) -> &Path {
        self.locator.dir()
    }
}

/// Gain as fluidsynth is usually invoked with it, always with a decimal point.
fn format_gain(gain: f32) -> String {
    format!("{:?}", gain)
}

fn internal(action: &str, err: std::io::Error) -> PipelineError {
    PipelineError::Internal(format!("failed to {}: {}", action, err))
}

fn classify_stage_error(err: StageError) -> PipelineError {
    match err {
        StageError::ToolMissing { .. } => PipelineError::Configuration(err.to_string()),
        StageError::Io { .. } => PipelineError::Internal(err.to_string()),
    }
}

fn ensure_success(
    result: &ConversionResult,
    classify: fn(String) -> PipelineError,
) -> Result<(), PipelineError> {
    let outcome = match result.failure_detail() {
        None => "success",
        Some(_) if result.timed_out() => "timeout",
        Some(_) => "failure",
    };
    metrics::record_stage(&result.tool, outcome, result.elapsed);

    match result.failure_detail() {
        None => Ok(()),
        Some(detail) => {
            error!("{} error: {}", result.tool, detail);
            Err(classify(format!("{} failed: {}", result.tool, detail)))
        }
    }
}

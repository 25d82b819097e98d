mod file_config;

pub use file_config::{FileConfig, SynthesisConfig, ToolsConfig};

use crate::server::{RequestsLoggingLevel, ServerConfig};
use crate::synthesis::SynthesisPipelineConfig;
use anyhow::{bail, Result};
use axum::http::HeaderValue;
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub soundfont_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub cors_origin: String,
    pub temp_dir: Option<PathBuf>,
    pub abc2midi_path: PathBuf,
    pub fluidsynth_path: PathBuf,
    pub ffmpeg_path: PathBuf,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            soundfont_dir: PathBuf::from("soundfonts"),
            host: "0.0.0.0".to_string(),
            port: 8000,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::Path,
            cors_origin: "http://localhost:3000".to_string(),
            temp_dir: None,
            abc2midi_path: PathBuf::from("abc2midi"),
            fluidsynth_path: PathBuf::from("fluidsynth"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub soundfont_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub cors_origin: String,
    pub temp_dir: Option<PathBuf>,

    // Feature configs (with defaults)
    pub synthesis: SynthesisSettings,
}

#[derive(Debug, Clone)]
pub struct SynthesisSettings {
    pub abc2midi_path: PathBuf,
    pub fluidsynth_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub abc2midi_timeout_sec: u64,
    pub fluidsynth_timeout_sec: u64,
    pub ffmpeg_timeout_sec: u64,
    pub sample_rate: u32,
    pub gain: f32,
    pub mp3_bitrate_kbps: u32,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            abc2midi_path: PathBuf::from("abc2midi"),
            fluidsynth_path: PathBuf::from("fluidsynth"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            abc2midi_timeout_sec: 10,
            fluidsynth_timeout_sec: 60,
            ffmpeg_timeout_sec: 60,
            sample_rate: 44100,
            gain: 1.0,
            mp3_bitrate_kbps: 192,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let soundfont_dir = file
            .soundfont_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.soundfont_dir.clone());

        let host = file.host.unwrap_or_else(|| cli.host.clone());
        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        if port == metrics_port {
            bail!("port and metrics_port must differ (both are {})", port);
        }

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let cors_origin = file.cors_origin.unwrap_or_else(|| cli.cors_origin.clone());
        if HeaderValue::from_str(&cors_origin).is_err() {
            bail!("Invalid cors_origin: {:?}", cors_origin);
        }

        let temp_dir = file
            .temp_dir
            .map(PathBuf::from)
            .or_else(|| cli.temp_dir.clone());
        if let Some(dir) = &temp_dir {
            if !dir.exists() {
                bail!("Temp directory does not exist: {:?}", dir);
            }
            if !dir.is_dir() {
                bail!("temp_dir is not a directory: {:?}", dir);
            }
        }

        // Synthesis settings - merge file config with defaults
        let defaults = SynthesisSettings::default();
        let synthesis_file = file.synthesis.unwrap_or_default();
        let tools_file = file.tools.unwrap_or_default();
        let synthesis = SynthesisSettings {
            abc2midi_path: tools_file
                .abc2midi
                .map(PathBuf::from)
                .unwrap_or_else(|| cli.abc2midi_path.clone()),
            fluidsynth_path: tools_file
                .fluidsynth
                .map(PathBuf::from)
                .unwrap_or_else(|| cli.fluidsynth_path.clone()),
            ffmpeg_path: tools_file
                .ffmpeg
                .map(PathBuf::from)
                .unwrap_or_else(|| cli.ffmpeg_path.clone()),
            abc2midi_timeout_sec: synthesis_file
                .abc2midi_timeout_sec
                .unwrap_or(defaults.abc2midi_timeout_sec),
            fluidsynth_timeout_sec: synthesis_file
                .fluidsynth_timeout_sec
                .unwrap_or(defaults.fluidsynth_timeout_sec),
            ffmpeg_timeout_sec: synthesis_file
                .ffmpeg_timeout_sec
                .unwrap_or(defaults.ffmpeg_timeout_sec),
            sample_rate: synthesis_file.sample_rate.unwrap_or(defaults.sample_rate),
            gain: synthesis_file.gain.unwrap_or(defaults.gain),
            mp3_bitrate_kbps: synthesis_file
                .mp3_bitrate_kbps
                .unwrap_or(defaults.mp3_bitrate_kbps),
        };
        synthesis.validate()?;

        Ok(Self {
            soundfont_dir,
            host,
            port,
            metrics_port,
            logging_level,
            cors_origin,
            temp_dir,
            synthesis,
        })
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            requests_logging_level: self.logging_level.clone(),
            host: self.host.clone(),
            port: self.port,
            cors_origin: self.cors_origin.clone(),
        }
    }

    pub fn pipeline_config(&self) -> SynthesisPipelineConfig {
        let synthesis = &self.synthesis;
        SynthesisPipelineConfig {
            soundfont_dir: self.soundfont_dir.clone(),
            temp_dir: self.temp_dir.clone(),
            abc2midi_path: synthesis.abc2midi_path.clone(),
            fluidsynth_path: synthesis.fluidsynth_path.clone(),
            ffmpeg_path: synthesis.ffmpeg_path.clone(),
            abc2midi_timeout: Duration::from_secs(synthesis.abc2midi_timeout_sec),
            fluidsynth_timeout: Duration::from_secs(synthesis.fluidsynth_timeout_sec),
            ffmpeg_timeout: Duration::from_secs(synthesis.ffmpeg_timeout_sec),
            sample_rate: synthesis.sample_rate,
            gain: synthesis.gain,
            mp3_bitrate_kbps: synthesis.mp3_bitrate_kbps,
        }
    }
}

impl SynthesisSettings {
    fn validate(&self) -> Result<()> {
        if self.abc2midi_timeout_sec == 0
            || self.fluidsynth_timeout_sec == 0
            || self.ffmpeg_timeout_sec == 0
        {
            bail!("Tool timeouts must be greater than zero");
        }
        if !(8000..=96000).contains(&self.sample_rate) {
            bail!(
                "sample_rate must be between 8000 and 96000 Hz, got {}",
                self.sample_rate
            );
        }
        // fluidsynth accepts gains in 0.0..=10.0
        if !(0.0..=10.0).contains(&self.gain) {
            bail!("gain must be between 0.0 and 10.0, got {}", self.gain);
        }
        if !(32..=320).contains(&self.mp3_bitrate_kbps) {
            bail!(
                "mp3_bitrate_kbps must be between 32 and 320, got {}",
                self.mp3_bitrate_kbps
            );
        }
        Ok(())
    }
}

fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

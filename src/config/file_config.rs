use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub soundfont_dir: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub cors_origin: Option<String>,
    pub temp_dir: Option<String>,

    // Feature configs
    pub synthesis: Option<SynthesisConfig>,
    pub tools: Option<ToolsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SynthesisConfig {
    pub sample_rate: Option<u32>,
    pub gain: Option<f32>,
    pub mp3_bitrate_kbps: Option<u32>,
    pub abc2midi_timeout_sec: Option<u64>,
    pub fluidsynth_timeout_sec: Option<u64>,
    pub ffmpeg_timeout_sec: Option<u64>,
}

/// Paths to the external binaries; bare names are looked up on PATH.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ToolsConfig {
    pub abc2midi: Option<String>,
    pub fluidsynth: Option<String>,
    pub ffmpeg: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

//! Fake conversion tools for unit tests.
//!
//! Each fake is a small shell script honoring the real tool's command line.
//! The output of each fake embeds its input, so tests can check what reached
//! the next stage. Magic words in the notation trigger failures:
//! - `BROKEN`: abc2midi reports a syntax error on stdout and exits 1
//! - `SILENT`: fluidsynth exits 0 without writing anything
//! - `HANG`: fluidsynth never finishes
//! - `NOENC`: ffmpeg fails with a message on stderr

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use super::pipeline::SynthesisPipelineConfig;

const ABC2MIDI_SCRIPT: &str = r#"#!/bin/sh
echo "$*" >> "__LOG_DIR__/abc2midi.calls"
if grep -q BROKEN "$1"; then
    echo "Error in line 2 : unrecognized token BROKEN"
    exit 1
fi
{ printf 'MThd'; cat "$1"; } > "$3"
"#;

const FLUIDSYNTH_SCRIPT: &str = r#"#!/bin/sh
echo "$*" >> "__LOG_DIR__/fluidsynth.calls"
if grep -q HANG "$9"; then
    exec sleep 30
fi
if grep -q SILENT "$9"; then
    exit 0
fi
[ -s "$8" ] || { echo "fluidsynth: error: Failed to load SoundFont $8" >&2; exit 1; }
{ printf 'RIFF'; cat "$9"; } > "$3"
"#;

const FFMPEG_SCRIPT: &str = r#"#!/bin/sh
echo "$*" >> "__LOG_DIR__/ffmpeg.calls"
for last; do :; done
if grep -q NOENC "$3"; then
    echo "Unknown encoder 'libmp3lame'" >&2
    exit 1
fi
{ printf 'ID3'; cat "$3"; } > "$last"
"#;

/// A sandbox with fake tools, a SoundFont directory and a private temp directory.
pub struct FakeTools {
    root: TempDir,
}

impl FakeTools {
    pub fn new() -> Self {
        let root = TempDir::new().expect("Failed to create fake tools dir");
        let tools = Self { root };

        std::fs::create_dir_all(tools.bin_dir()).unwrap();
        std::fs::create_dir_all(tools.soundfont_dir()).unwrap();
        std::fs::create_dir_all(tools.temp_dir()).unwrap();
        std::fs::create_dir_all(tools.log_dir()).unwrap();
        std::fs::write(tools.soundfont_dir().join("test.sf2"), b"sfbk").unwrap();

        tools.write_script("abc2midi", ABC2MIDI_SCRIPT);
        tools.write_script("fluidsynth", FLUIDSYNTH_SCRIPT);
        tools.write_script("ffmpeg", FFMPEG_SCRIPT);
        tools
    }

    pub fn dir(&self) -> &Path {
        self.root.path()
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.path().join("bin")
    }

    pub fn soundfont_dir(&self) -> PathBuf {
        self.root.path().join("soundfonts")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.path().join("tmp")
    }

    fn log_dir(&self) -> PathBuf {
        self.root.path().join("log")
    }

    pub fn pipeline_config(&self) -> SynthesisPipelineConfig {
        SynthesisPipelineConfig {
            soundfont_dir: self.soundfont_dir(),
            temp_dir: Some(self.temp_dir()),
            abc2midi_path: self.bin_dir().join("abc2midi"),
            fluidsynth_path: self.bin_dir().join("fluidsynth"),
            ffmpeg_path: self.bin_dir().join("ffmpeg"),
            abc2midi_timeout: Duration::from_secs(10),
            fluidsynth_timeout: Duration::from_secs(10),
            ffmpeg_timeout: Duration::from_secs(10),
            ..Default::default()
        }
    }

    pub fn remove_soundfonts(&self) {
        std::fs::remove_dir_all(self.soundfont_dir()).unwrap();
        std::fs::create_dir_all(self.soundfont_dir()).unwrap();
    }

    /// Number of files currently in the pipeline temp directory.
    pub fn temp_file_count(&self) -> usize {
        std::fs::read_dir(self.temp_dir()).unwrap().count()
    }

    /// Number of times the named fake tool was invoked.
    pub fn calls(&self, tool: &str) -> usize {
        self.call_args(tool).len()
    }

    /// Space-joined arguments of every invocation of the named fake tool.
    pub fn call_args(&self, tool: &str) -> Vec<String> {
        std::fs::read_to_string(self.log_dir().join(format!("{}.calls", tool)))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn write_script(&self, name: &str, template: &str) {
        let path = self.bin_dir().join(name);
        let script = template.replace("__LOG_DIR__", &self.log_dir().to_string_lossy());
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}

//! Fake conversion tools for end-to-end tests
//!
//! The real abc2midi, fluidsynth and ffmpeg are not needed to run the suite.
//! Each fake is a shell script honoring the real command line and embedding
//! its input into its output.

use legato_server::synthesis::SynthesisPipelineConfig;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const ABC2MIDI_SCRIPT: &str = r#"#!/bin/sh
if grep -q BROKEN "$1"; then
    echo "Error in line 4 : unrecognized token BROKEN"
    exit 1
fi
{ printf 'MThd'; cat "$1"; } > "$3"
"#;

const FLUIDSYNTH_SCRIPT: &str = r#"#!/bin/sh
if grep -q HANG "$9"; then
    exec sleep 30
fi
if grep -q SILENT "$9"; then
    exit 0
fi
{ printf 'RIFF'; cat "$9"; } > "$3"
"#;

const FFMPEG_SCRIPT: &str = r#"#!/bin/sh
for last; do :; done
if grep -q NOENC "$3"; then
    echo "Unknown encoder 'libmp3lame'" >&2
    exit 1
fi
{ printf 'ID3'; cat "$3"; } > "$last"
"#;

/// Creates a sandbox holding fake tools, a SoundFont directory with one
/// SoundFont and a private temp directory.
///
/// Returns the sandbox and a pipeline config pointing into it.
pub fn create_test_toolchain() -> anyhow::Result<(TempDir, SynthesisPipelineConfig)> {
    let root = TempDir::new()?;
    let bin_dir = root.path().join("bin");
    let soundfont_dir = root.path().join("soundfonts");
    let temp_dir = root.path().join("tmp");

    std::fs::create_dir_all(&bin_dir)?;
    std::fs::create_dir_all(&soundfont_dir)?;
    std::fs::create_dir_all(&temp_dir)?;
    std::fs::write(soundfont_dir.join("GeneralUser.sf2"), b"sfbk-test-soundfont")?;

    write_script(&bin_dir.join("abc2midi"), ABC2MIDI_SCRIPT)?;
    write_script(&bin_dir.join("fluidsynth"), FLUIDSYNTH_SCRIPT)?;
    write_script(&bin_dir.join("ffmpeg"), FFMPEG_SCRIPT)?;

    let config = SynthesisPipelineConfig {
        soundfont_dir,
        temp_dir: Some(temp_dir),
        abc2midi_path: bin_dir.join("abc2midi"),
        fluidsynth_path: bin_dir.join("fluidsynth"),
        ffmpeg_path: bin_dir.join("ffmpeg"),
        abc2midi_timeout: Duration::from_secs(10),
        fluidsynth_timeout: Duration::from_secs(10),
        ffmpeg_timeout: Duration::from_secs(10),
        ..Default::default()
    };

    Ok((root, config))
}

fn write_script(path: &Path, content: &str) -> anyhow::Result<()> {
    std::fs::write(path, content)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

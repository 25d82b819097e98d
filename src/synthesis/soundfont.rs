//! SoundFont discovery.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Extension of sample bank files the synthesizer understands.
const SOUNDFONT_EXTENSION: &str = "sf2";

/// A discovered SoundFont file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundFontReference {
    path: PathBuf,
}

impl SoundFontReference {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Looks up SoundFont files in a fixed directory.
///
/// Nothing is cached: every call re-reads the directory, so files dropped in
/// while the server is running are picked up by the next request.
#[derive(Debug, Clone)]
pub struct SoundFontLocator {
    dir: PathBuf,
}

impl SoundFontLocator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory being scanned.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Check if a file name carries the SoundFont extension.
    pub fn is_soundfont(filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(SOUNDFONT_EXTENSION))
            .unwrap_or(false)
    }

    /// Find a usable SoundFont.
    ///
    /// Candidates are non-empty regular files with the `.sf2` extension; when
    /// several exist, the lexicographically first file name wins. A missing
    /// directory is not an error, it simply yields `None`.
    pub async fn locate(&self) -> Option<SoundFontReference> {
        match self.list_candidates().await {
            Ok(candidates) => candidates
                .into_iter()
                .next()
                .map(|path| SoundFontReference { path }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("SoundFont directory {:?} does not exist", self.dir);
                None
            }
            Err(err) => {
                warn!("Failed to scan SoundFont directory {:?}: {}", self.dir, err);
                None
            }
        }
    }

    async fn list_candidates(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut candidates = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !Self::is_soundfont(name) {
                continue;
            }

            // Follows symlinks, so a linked SoundFont counts as long as its target is valid
            let metadata = match fs::metadata(entry.path()).await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if metadata.is_file() && metadata.len() > 0 {
                candidates.push(entry.path());
            }
        }

        candidates.sort();
        Ok(candidates)
    }
}

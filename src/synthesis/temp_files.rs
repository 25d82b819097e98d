//! Scoped temporary files for a single synthesis run.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempPath};
use tracing::{debug, warn};

const TEMP_FILE_PREFIX: &str = "legato-";

/// A group of uniquely named temporary files owned by one pipeline run.
///
/// Every file acquired through the set is removed when the set is dropped,
/// whatever the exit path: normal return, early `?` return, panic or a
/// cancelled future. A file can be handed out of the set with [`release`],
/// after which removing it is the receiver's job.
///
/// [`release`]: TempFileSet::release
#[derive(Debug)]
pub struct TempFileSet {
    dir: PathBuf,
    entries: Vec<TempPath>,
}

impl TempFileSet {
    /// Create an empty set whose files will live in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            entries: Vec::new(),
        }
    }

    /// Number of files currently owned by the set.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Allocate a new empty file with the given suffix (e.g. `".mid"`).
    ///
    /// The name is generated by the platform's unique temp name facility, so
    /// concurrent runs never collide.
    pub fn acquire(&mut self, suffix: &str) -> io::Result<PathBuf> {
        let file = Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .suffix(suffix)
            .tempfile_in(&self.dir)?;
        let temp_path = file.into_temp_path();
        let path = temp_path.to_path_buf();
        debug!("Acquired temp file {:?}", path);
        self.entries.push(temp_path);
        Ok(path)
    }

    /// Remove one file right away, before the set itself goes out of scope.
    ///
    /// Returns `false` if the path is not owned by this set.
    pub fn discard(&mut self, path: &Path) -> bool {
        match self.take(path) {
            Some(temp_path) => {
                remove_quietly(temp_path);
                true
            }
            None => false,
        }
    }

    /// Transfer ownership of a file out of the set.
    ///
    /// The returned [`TempPath`] deletes the file when dropped, so the caller
    /// decides when that happens.
    pub fn release(&mut self, path: &Path) -> Option<TempPath> {
        self.take(path)
    }

    fn take(&mut self, path: &Path) -> Option<TempPath> {
        let index = self
            .entries
            .iter()
            .position(|entry| AsRef::<Path>::as_ref(entry) == path)?;
        Some(self.entries.swap_remove(index))
    }
}

impl Drop for TempFileSet {
    fn drop(&mut self) {
        for temp_path in self.entries.drain(..) {
            remove_quietly(temp_path);
        }
    }
}

/// Delete a temp file; a file that is already gone is fine, anything else is
/// logged and otherwise ignored.
fn remove_quietly(temp_path: TempPath) {
    let path = temp_path.to_path_buf();
    match temp_path.close() {
        Ok(()) => debug!("Removed temp file {:?}", path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!("Failed to remove temp file {:?}: {}", path, err),
    }
}

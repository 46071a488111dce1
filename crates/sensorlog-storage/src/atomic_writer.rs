//! Atomic file writer for finished archives
//!
//! Archives are written to a sibling `.partial` file and renamed into place
//! once synced, so a crash never leaves a truncated `.zip` behind under the
//! final name. An existing file under the final name is never replaced.

use crate::error::StorageResult;
use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Writes to a temporary file and moves it into place on commit
pub struct AtomicWriter {
    partial_path: PathBuf,
    final_path: PathBuf,
    file: Option<File>,
}

impl AtomicWriter {
    /// Start writing `path`, creating its parent directory if needed
    pub fn create<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let final_path = path.as_ref().to_path_buf();

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let partial_path = Self::partial_path(&final_path);
        let file = File::create(&partial_path)?;

        Ok(Self {
            partial_path,
            final_path,
            file: Some(file),
        })
    }

    /// Write `bytes` to `path` in one step
    pub fn write_file<P: AsRef<Path>>(path: P, bytes: &[u8]) -> StorageResult<PathBuf> {
        let mut writer = Self::create(path)?;
        writer.write_all(bytes)?;
        writer.commit()
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> StorageResult<()> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(bytes)?;
        }
        Ok(())
    }

    /// Sync and move the file into place, returning the final path
    ///
    /// Fails with [`ErrorKind::AlreadyExists`] if the final path is taken.
    pub fn commit(mut self) -> StorageResult<PathBuf> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }

        let moved = match self.final_path.try_exists() {
            Ok(true) => Err(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("{} already exists", self.final_path.display()),
            )),
            Ok(false) => fs::rename(&self.partial_path, &self.final_path),
            Err(e) => Err(e),
        };
        if let Err(e) = moved {
            let _ = fs::remove_file(&self.partial_path);
            return Err(e.into());
        }
        Ok(self.final_path.clone())
    }

    fn partial_path(final_path: &Path) -> PathBuf {
        let mut partial = final_path.as_os_str().to_owned();
        partial.push(".partial");
        PathBuf::from(partial)
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        // Uncommitted: discard the partial file
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.partial_path);
        }
    }
}

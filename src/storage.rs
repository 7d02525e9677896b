// File: ./src/storage.rs
// Low-level file helpers shared by everything that persists state.
//
// All writers go through `with_lock` + `atomic_write` so that the notification
// driver and the CLI can run at the same time without tearing the store.
// The lock is an advisory OS lock on a sibling `.lock` file; the OS drops it
// when the holding process exits, so a crash never leaves the store locked.
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs;
use std::path::{Path, PathBuf};

pub struct LocalStorage;

impl LocalStorage {
    /// `calendars.txt` -> `calendars.txt.lock`, `config` -> `config.lock`.
    pub fn get_lock_path(file_path: &Path) -> PathBuf {
        let mut lock_path = file_path.to_path_buf();
        if let Some(ext) = lock_path.extension() {
            let mut new_ext = ext.to_os_string();
            new_ext.push(".lock");
            lock_path.set_extension(new_ext);
        } else {
            lock_path.set_extension("lock");
        }
        lock_path
    }

    /// Runs `f` while holding an exclusive lock for `file_path`.
    ///
    /// The lock is per open file description: calling `with_lock` for the same
    /// path from inside `f` blocks forever.
    pub fn with_lock<F, T>(file_path: &Path, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let lock_path = Self::get_lock_path(file_path);
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {:?}", lock_path))?;

        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {:?}", lock_path))?;
        let result = f();
        file.unlock()?;
        result
    }

    /// Atomic write: Write to .tmp file then rename
    pub fn atomic_write<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, contents: C) -> Result<()> {
        let path = path.as_ref();
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, contents)
            .with_context(|| format!("Failed to write {:?}", tmp_path))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to move {:?} into place", tmp_path))?;
        Ok(())
    }

    /// Reads a file, treating a missing file as `None`.
    pub fn read_optional(path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", path)),
        }
    }
}

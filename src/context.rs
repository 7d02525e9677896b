// File: ./src/context.rs
/*! Application context abstraction for filesystem paths.

The `AppContext` trait encapsulates where LinCal keeps its settings, the
calendar config store and its log file. Two implementations are provided:

- `StandardContext`: uses `directories::ProjectDirs`, or an override root
  given on the command line.
- `TestContext`: a unique temporary directory, removed on drop.

Code that touches the filesystem takes a `&dyn AppContext`; there are no
global path helpers.
*/

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub const SETTINGS_FILE_NAME: &str = "config.toml";
pub const CALENDAR_STORE_FILE_NAME: &str = "calendars.txt";
pub const LOG_FILE_NAME: &str = "lincal.log";

/// Defines the file system context for the application.
///
/// The trait is object-safe so callers can hold `Arc<dyn AppContext>`.
pub trait AppContext: Send + Sync + std::fmt::Debug {
    fn get_data_dir(&self) -> Result<PathBuf>;
    fn get_config_dir(&self) -> Result<PathBuf>;
    fn get_cache_dir(&self) -> Result<PathBuf>;

    fn get_settings_file_path(&self) -> Result<PathBuf> {
        Ok(self.get_config_dir()?.join(SETTINGS_FILE_NAME))
    }

    fn get_calendar_store_path(&self) -> Result<PathBuf> {
        Ok(self.get_data_dir()?.join(CALENDAR_STORE_FILE_NAME))
    }

    fn get_log_file_path(&self) -> Result<PathBuf> {
        Ok(self.get_cache_dir()?.join(LOG_FILE_NAME))
    }
}

// --- Production Implementation ---

#[derive(Clone, Debug)]
pub struct StandardContext {
    override_root: Option<PathBuf>,
}

impl StandardContext {
    /// When `override_root` is `Some(path)`, all directories are created under
    /// that root as `data`, `config` and `cache`.
    pub fn new(override_root: Option<PathBuf>) -> Self {
        Self { override_root }
    }

    fn ensure_exists(path: PathBuf) -> Result<PathBuf> {
        if !path.exists() {
            std::fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(path)
    }

    fn get_proj_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("org", "lincal", "lincal")
            .ok_or_else(|| anyhow::anyhow!("No home directory"))
    }

    fn resolve(&self, subdir: &str) -> Result<PathBuf> {
        if let Some(root) = &self.override_root {
            return Self::ensure_exists(root.join(subdir));
        }
        let proj = Self::get_proj_dirs()?;
        let dir = match subdir {
            "data" => proj.data_dir(),
            "config" => proj.config_dir(),
            _ => proj.cache_dir(),
        };
        Self::ensure_exists(dir.to_path_buf())
    }
}

impl AppContext for StandardContext {
    fn get_data_dir(&self) -> Result<PathBuf> {
        self.resolve("data")
    }

    fn get_config_dir(&self) -> Result<PathBuf> {
        self.resolve("config")
    }

    fn get_cache_dir(&self) -> Result<PathBuf> {
        self.resolve("cache")
    }
}

// --- Test Implementation ---

#[derive(Clone, Debug)]
pub struct TestContext {
    pub root: PathBuf,
}

impl TestContext {
    /// Creates a new TestContext backed by a unique temporary directory.
    pub fn new() -> Self {
        let uuid = uuid::Uuid::new_v4();
        let root = std::env::temp_dir().join(format!("lincal_test_{}", uuid));
        // Best-effort create; tests will panic if this fails.
        std::fs::create_dir_all(&root).expect("failed to create TestContext temp dir");
        Self { root }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AppContext for TestContext {
    fn get_data_dir(&self) -> Result<PathBuf> {
        let p = self.root.join("data");
        std::fs::create_dir_all(&p)?;
        Ok(p)
    }

    fn get_config_dir(&self) -> Result<PathBuf> {
        let p = self.root.join("config");
        std::fs::create_dir_all(&p)?;
        Ok(p)
    }

    fn get_cache_dir(&self) -> Result<PathBuf> {
        let p = self.root.join("cache");
        std::fs::create_dir_all(&p)?;
        Ok(p)
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

pub type SharedContext = std::sync::Arc<dyn AppContext>;

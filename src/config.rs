//! Configuration for conversion managers.

use std::path::PathBuf;

/// Container format used when a converter asks for a Storage artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    /// Zip archive container.
    #[default]
    Zip,
    /// Plain directory tree.
    Directory,
}

/// Conversion manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Never consult the interactive chooser or the error reporter.
    pub batch_mode: bool,

    /// Directory for temporary artifacts (system default when `None`).
    pub temp_dir: Option<PathBuf>,

    /// File name prefix for temporary artifacts.
    pub temp_prefix: String,

    /// Container format for Storage artifacts.
    pub store_kind: StoreKind,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagerConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            batch_mode: false,
            temp_dir: None,
            temp_prefix: "filter-chain-".to_string(),
            store_kind: StoreKind::Zip,
        }
    }

    /// Enable batch mode.
    pub fn with_batch_mode(mut self, enable: bool) -> Self {
        self.batch_mode = enable;
        self
    }

    /// Place temporary artifacts in `dir`.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Set the temporary file prefix.
    pub fn with_temp_prefix(mut self, prefix: &str) -> Self {
        self.temp_prefix = prefix.to_string();
        self
    }

    /// Set the Storage container format.
    pub fn with_store_kind(mut self, kind: StoreKind) -> Self {
        self.store_kind = kind;
        self
    }
}

//! Temporary artifacts exchanged between chain links.

use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// A uniquely named temporary file owned by a chain.
///
/// The file is removed when the artifact is dropped, unless it was kept with
/// [`TempArtifact::keep`]. Directory stores may turn the reserved file into
/// a directory; those are removed recursively.
pub(crate) struct TempArtifact {
    path: Option<TempPath>,
    survive: bool,
}

impl TempArtifact {
    /// Reserve a new temporary file.
    ///
    /// `survive` marks the artifact as a final result that the chain hands to
    /// its caller on success.
    pub fn create(config: &ManagerConfig, extension: Option<&str>, survive: bool) -> Result<Self> {
        let dir = config.temp_dir.clone().unwrap_or_else(std::env::temp_dir);
        let suffix = extension.map(|ext| format!(".{}", ext)).unwrap_or_default();
        let file = tempfile::Builder::new()
            .prefix(&config.temp_prefix)
            .suffix(&suffix)
            .tempfile_in(&dir)
            .map_err(|e| Error::TempFile(format!("cannot create a temporary file in {}: {}", dir.display(), e)))?;
        let path = file.into_temp_path();
        log::debug!("Created temporary artifact {} (survive={})", path.display(), survive);
        Ok(Self {
            path: Some(path),
            survive,
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    pub fn survives(&self) -> bool {
        self.survive
    }

    /// Release ownership; the file stays on disk.
    pub fn keep(mut self) -> Result<PathBuf> {
        match self.path.take() {
            Some(path) => Ok(path.keep()?),
            None => Err(Error::TempFile("temporary artifact already released".to_string())),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        log::debug!("Removing temporary artifact {}", path.display());
        if path.is_dir() {
            if let Err(e) = fs::remove_dir_all(&path) {
                log::warn!("Could not remove temporary directory {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(dir: &Path) -> ManagerConfig {
        ManagerConfig::new().with_temp_dir(dir).with_temp_prefix("t-")
    }

    #[test]
    fn test_dropped_artifact_is_removed() {
        let dir = tempdir().unwrap();
        let artifact = TempArtifact::create(&config(dir.path()), Some("csv"), false).unwrap();
        let path = artifact.path().to_path_buf();
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("t-"));
        assert_eq!(path.extension().unwrap(), "csv");
        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn test_kept_artifact_survives() {
        let dir = tempdir().unwrap();
        let artifact = TempArtifact::create(&config(dir.path()), None, true).unwrap();
        assert!(artifact.survives());
        let path = artifact.keep().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_directory_artifact_is_removed() {
        let dir = tempdir().unwrap();
        let artifact = TempArtifact::create(&config(dir.path()), None, false).unwrap();
        let path = artifact.path().to_path_buf();
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        fs::write(path.join("content"), b"x").unwrap();
        drop(artifact);
        assert!(!path.exists());
    }
}

//! Directory tree store.

use super::{join_path, Store, StoreMode, MIMETYPE_STREAM};
use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Store backed by a plain directory, one file per stream.
///
/// Creating a write store on a path that is an existing empty file (a
/// freshly reserved temporary file, typically) replaces it by a directory.
pub struct DirectoryStore {
    root: PathBuf,
    mode: StoreMode,
    dirs: Vec<String>,
    stream: Option<File>,
}

impl DirectoryStore {
    /// Open an existing directory for reading.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::Storage(format!("{} is not a directory", root.display())));
        }
        Ok(Self {
            root: root.to_path_buf(),
            mode: StoreMode::Read,
            dirs: Vec::new(),
            stream: None,
        })
    }

    /// Create a directory store at `root`.
    pub fn create(root: &Path, app_id: &str) -> Result<Self> {
        if root.is_file() {
            if fs::metadata(root)?.len() > 0 {
                return Err(Error::Storage(format!("refusing to replace non-empty file {}", root.display())));
            }
            fs::remove_file(root)?;
        }
        fs::create_dir_all(root)?;
        if !app_id.is_empty() {
            fs::write(root.join(MIMETYPE_STREAM), app_id.as_bytes())?;
        }
        Ok(Self {
            root: root.to_path_buf(),
            mode: StoreMode::Write,
            dirs: Vec::new(),
            stream: None,
        })
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for part in join_path(&self.dirs, name)?.split('/') {
            path.push(part);
        }
        Ok(path)
    }
}

impl Store for DirectoryStore {
    fn mode(&self) -> StoreMode {
        self.mode
    }

    fn open(&mut self, name: &str) -> Result<()> {
        self.stream = None;
        let path = self.resolve(name)?;
        let file = match self.mode {
            StoreMode::Read => File::open(&path)?,
            StoreMode::Write => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                File::create(&path)?
            },
        };
        self.stream = Some(file);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.stream.take() {
            if self.mode == StoreMode::Write {
                file.flush()?;
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn enter_directory(&mut self, dir: &str) -> Result<()> {
        let path = self.resolve(dir)?;
        if self.mode == StoreMode::Read && !path.is_dir() {
            return Err(Error::Storage(format!("no directory '{}' in {}", dir, self.root.display())));
        }
        self.dirs.push(dir.to_string());
        Ok(())
    }

    fn leave_directory(&mut self) -> Result<()> {
        self.dirs
            .pop()
            .map(|_| ())
            .ok_or_else(|| Error::Storage("leave_directory called at the store root".to_string()))
    }

    fn current_path(&self) -> String {
        self.dirs.join("/")
    }

    fn finish(&mut self) -> Result<()> {
        self.close()
    }
}

impl Read for DirectoryStore {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match (&mut self.stream, self.mode) {
            (Some(file), StoreMode::Read) => file.read(buf),
            _ => Err(io::Error::new(io::ErrorKind::Other, "no stream open for reading")),
        }
    }
}

impl Write for DirectoryStore {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match (&mut self.stream, self.mode) {
            (Some(file), StoreMode::Write) => file.write(buf),
            _ => Err(io::Error::new(io::ErrorKind::Other, "no stream open for writing")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.stream {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

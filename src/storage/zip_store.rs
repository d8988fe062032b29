//! Zip archive store.

use super::{join_path, Store, StoreMode, MIMETYPE_STREAM};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

enum Backend {
    Read {
        archive: ZipArchive<File>,
        stream: Option<Cursor<Vec<u8>>>,
    },
    Write {
        writer: Option<ZipWriter<File>>,
        stream_open: bool,
    },
}

/// Store backed by a zip archive.
///
/// Read streams are buffered in memory when opened. Write streams are
/// deflated, except the `mimetype` entry which is stored uncompressed as the
/// first entry so the container type can be recognised without inflating.
pub struct ZipStore {
    path: PathBuf,
    backend: Backend,
    dirs: Vec<String>,
}

impl ZipStore {
    /// Open an existing archive for reading.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(file)?;
        Ok(Self {
            path: path.to_path_buf(),
            backend: Backend::Read {
                archive,
                stream: None,
            },
            dirs: Vec::new(),
        })
    }

    /// Create a new archive, truncating `path`.
    pub fn create(path: &Path, app_id: &str) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = ZipWriter::new(file);
        if !app_id.is_empty() {
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            writer.start_file(MIMETYPE_STREAM, options)?;
            writer.write_all(app_id.as_bytes())?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            backend: Backend::Write {
                writer: Some(writer),
                stream_open: false,
            },
            dirs: Vec::new(),
        })
    }

    /// Path of the underlying archive.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of all entries (read mode only).
    pub fn entry_names(&self) -> Vec<String> {
        match &self.backend {
            Backend::Read { archive, .. } => archive.file_names().map(str::to_string).collect(),
            Backend::Write { .. } => Vec::new(),
        }
    }
}

impl Store for ZipStore {
    fn mode(&self) -> StoreMode {
        match self.backend {
            Backend::Read { .. } => StoreMode::Read,
            Backend::Write { .. } => StoreMode::Write,
        }
    }

    fn open(&mut self, name: &str) -> Result<()> {
        let full = join_path(&self.dirs, name)?;
        match &mut self.backend {
            Backend::Read { archive, stream } => {
                *stream = None;
                let mut entry = archive.by_name(&full)?;
                let mut data = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut data)?;
                *stream = Some(Cursor::new(data));
            },
            Backend::Write {
                writer,
                stream_open,
            } => {
                let writer = writer
                    .as_mut()
                    .ok_or_else(|| Error::Storage(format!("{} is already finished", self.path.display())))?;
                writer.start_file(full, SimpleFileOptions::default())?;
                *stream_open = true;
            },
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match &mut self.backend {
            Backend::Read { stream, .. } => *stream = None,
            Backend::Write { stream_open, .. } => *stream_open = false,
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        match &self.backend {
            Backend::Read { stream, .. } => stream.is_some(),
            Backend::Write { stream_open, .. } => *stream_open,
        }
    }

    fn enter_directory(&mut self, dir: &str) -> Result<()> {
        let prefix = format!("{}/", join_path(&self.dirs, dir)?);
        if let Backend::Read { archive, .. } = &self.backend {
            if !archive.file_names().any(|n| n.starts_with(&prefix)) {
                return Err(Error::Storage(format!("no directory '{}' in {}", prefix, self.path.display())));
            }
        }
        self.dirs.push(dir.to_string());
        Ok(())
    }

    fn leave_directory(&mut self) -> Result<()> {
        self.dirs
            .pop()
            .map(|_| ())
            .ok_or_else(|| Error::Storage("leave_directory called at the archive root".to_string()))
    }

    fn current_path(&self) -> String {
        self.dirs.join("/")
    }

    fn finish(&mut self) -> Result<()> {
        if let Backend::Write {
            writer,
            stream_open,
        } = &mut self.backend
        {
            *stream_open = false;
            if let Some(writer) = writer.take() {
                writer.finish()?;
            }
        }
        Ok(())
    }
}

impl Read for ZipStore {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.backend {
            Backend::Read {
                stream: Some(stream),
                ..
            } => stream.read(buf),
            _ => Err(io::Error::new(io::ErrorKind::Other, "no stream open for reading")),
        }
    }
}

impl Write for ZipStore {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.backend {
            Backend::Write {
                writer: Some(writer),
                stream_open: true,
            } => writer.write(buf),
            _ => Err(io::Error::new(io::ErrorKind::Other, "no stream open for writing")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.backend {
            Backend::Write {
                writer: Some(writer),
                ..
            } => writer.flush(),
            _ => Ok(()),
        }
    }
}

//! Structured multi-stream storage artifacts.
//!
//! A [`Store`] is an open handle into an archive container addressed by
//! stream name. Converters that read or write structured data ask the chain
//! for a store instead of a flat file. Exactly one stream is open at a time;
//! [`std::io::Read`] and [`std::io::Write`] operate on that stream.
//!
//! Two containers are provided:
//! - [`ZipStore`]: zip archive with a leading `mimetype` entry
//! - [`DirectoryStore`]: plain directory tree, one file per stream

mod directory;
mod zip_store;

pub use directory::DirectoryStore;
pub use zip_store::ZipStore;

use crate::config::StoreKind;
use crate::error::{Error, Result};
use std::io::{Read, Write};
use std::path::Path;

/// Name of the stream carrying the application identifier.
pub const MIMETYPE_STREAM: &str = "mimetype";

/// Access mode of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Streams are read.
    Read,
    /// Streams are written.
    Write,
}

/// Open handle into a structured archive container.
pub trait Store: Read + Write {
    /// Mode this store was opened in.
    fn mode(&self) -> StoreMode;

    /// Open stream `name` relative to the current directory, closing any
    /// stream that is still open.
    fn open(&mut self, name: &str) -> Result<()>;

    /// Close the open stream, if any.
    fn close(&mut self) -> Result<()>;

    /// True while a stream is open.
    fn is_open(&self) -> bool;

    /// Descend into `dir`.
    fn enter_directory(&mut self, dir: &str) -> Result<()>;

    /// Return to the parent of the current directory.
    fn leave_directory(&mut self) -> Result<()>;

    /// Current directory, `/`-separated, empty at the root.
    fn current_path(&self) -> String;

    /// Flush the container. No stream may be opened afterwards.
    fn finish(&mut self) -> Result<()>;
}

/// Create a store on `path`.
///
/// Write stores use `kind`. Read stores detect the container: directories
/// open as [`DirectoryStore`], files as [`ZipStore`]. `app_id` is written to
/// the [`MIMETYPE_STREAM`] of new containers when non-empty.
pub fn create_store(kind: StoreKind, path: &Path, mode: StoreMode, app_id: &str) -> Result<Box<dyn Store>> {
    log::debug!("Creating {:?} store on {} ({:?})", kind, path.display(), mode);
    match mode {
        StoreMode::Read if path.is_dir() => Ok(Box::new(DirectoryStore::open(path)?)),
        StoreMode::Read => Ok(Box::new(ZipStore::open(path)?)),
        StoreMode::Write => match kind {
            StoreKind::Zip => Ok(Box::new(ZipStore::create(path, app_id)?)),
            StoreKind::Directory => Ok(Box::new(DirectoryStore::create(path, app_id)?)),
        },
    }
}

/// Join directory components and a stream name into a container path.
///
/// Every component must stay inside the container: absolute paths,
/// backslashes and `.` or `..` segments are rejected.
pub(crate) fn join_path(dirs: &[String], name: &str) -> Result<String> {
    let mut parts = Vec::new();
    for component in dirs.iter().map(String::as_str).chain(std::iter::once(name)) {
        parts.extend(relative_segments(component)?);
    }
    Ok(parts.join("/"))
}

fn relative_segments(path: &str) -> Result<Vec<&str>> {
    if path.starts_with('/') || path.contains('\\') {
        return Err(Error::Storage(format!("'{}' is not a relative container path", path)));
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(Error::Storage(format!("'{}' leaves the container", path)));
    }
    Ok(segments)
}

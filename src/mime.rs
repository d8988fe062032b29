//! MIME type identifiers and file sniffing.
//!
//! A [`MimeType`] is an opaque, case-sensitive string. It is the vertex key of
//! the conversion graph and the label of every converter edge.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// MIME type reported when nothing better is known.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Case-sensitive MIME type identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MimeType(String);

impl MimeType {
    /// Wrap a MIME type string.
    pub fn new(mime: impl Into<String>) -> Self {
        Self(mime.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for an empty identifier.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for MimeType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for MimeType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MimeType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MimeType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for MimeType {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for MimeType {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Determines the MIME type of a file on disk.
pub trait MimeSniffer: Send + Sync {
    /// MIME type of `path`, or `None` when it cannot be determined.
    fn sniff(&self, path: &Path) -> Option<MimeType>;

    /// Preferred file extension (without dot) for a MIME type.
    fn extension_for(&self, _mime: &str) -> Option<String> {
        None
    }
}

lazy_static! {
    static ref DEFAULT_EXTENSIONS: Vec<(&'static str, &'static str)> = vec![
        ("csv", "text/csv"),
        ("txt", "text/plain"),
        ("md", "text/markdown"),
        ("html", "text/html"),
        ("htm", "text/html"),
        ("xml", "application/xml"),
        ("json", "application/json"),
        ("pdf", "application/pdf"),
        ("zip", "application/zip"),
        ("png", "image/png"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("tif", "image/tiff"),
        ("tiff", "image/tiff"),
        ("svg", "image/svg+xml"),
        ("odt", "application/vnd.oasis.opendocument.text"),
        ("ods", "application/vnd.oasis.opendocument.spreadsheet"),
        ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ];
}

/// Sniffs MIME types from file extensions.
///
/// Matching is case-insensitive on the extension. Extension lookups for a
/// MIME type return the first extension registered for it.
#[derive(Debug, Clone)]
pub struct ExtensionSniffer {
    by_extension: HashMap<String, MimeType>,
    by_mime: HashMap<MimeType, String>,
}

impl ExtensionSniffer {
    /// Sniffer with the built-in extension table.
    pub fn new() -> Self {
        let mut sniffer = Self::empty();
        for (ext, mime) in DEFAULT_EXTENSIONS.iter() {
            sniffer.insert(ext, mime);
        }
        sniffer
    }

    /// Sniffer without any mapping.
    pub fn empty() -> Self {
        Self {
            by_extension: HashMap::new(),
            by_mime: HashMap::new(),
        }
    }

    /// Add or replace a mapping (builder pattern).
    pub fn with_mapping(mut self, extension: &str, mime: &str) -> Self {
        self.insert(extension, mime);
        self
    }

    fn insert(&mut self, extension: &str, mime: &str) {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        let mime = MimeType::from(mime);
        self.by_mime.entry(mime.clone()).or_insert_with(|| ext.clone());
        self.by_extension.insert(ext, mime);
    }
}

impl Default for ExtensionSniffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MimeSniffer for ExtensionSniffer {
    fn sniff(&self, path: &Path) -> Option<MimeType> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.by_extension
            .get(&ext)
            .filter(|mime| mime.as_str() != DEFAULT_MIME_TYPE)
            .cloned()
    }

    fn extension_for(&self, mime: &str) -> Option<String> {
        self.by_mime.get(mime).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_mime_type_is_case_sensitive() {
        assert_ne!(MimeType::from("text/CSV"), MimeType::from("text/csv"));
    }

    #[test]
    fn test_mime_type_display_and_compare() {
        let mime = MimeType::new("text/csv");
        assert_eq!(mime.to_string(), "text/csv");
        assert!(mime == "text/csv");
    }

    #[test]
    fn test_sniff_known_extension() {
        let sniffer = ExtensionSniffer::new();
        assert_eq!(
            sniffer.sniff(&PathBuf::from("/data/Report.CSV")),
            Some(MimeType::from("text/csv"))
        );
    }

    #[test]
    fn test_sniff_unknown_extension() {
        let sniffer = ExtensionSniffer::new();
        assert_eq!(sniffer.sniff(&PathBuf::from("archive.qqq")), None);
        assert_eq!(sniffer.sniff(&PathBuf::from("no_extension")), None);
    }

    #[test]
    fn test_custom_mapping_and_extension_lookup() {
        let sniffer = ExtensionSniffer::empty().with_mapping(".kra", "application/x-krita");
        assert_eq!(
            sniffer.sniff(&PathBuf::from("a.kra")),
            Some(MimeType::from("application/x-krita"))
        );
        assert_eq!(sniffer.extension_for("application/x-krita"), Some("kra".to_string()));
    }

    #[test]
    fn test_default_mime_type_is_not_reported() {
        let sniffer = ExtensionSniffer::empty().with_mapping("bin", DEFAULT_MIME_TYPE);
        assert_eq!(sniffer.sniff(&PathBuf::from("x.bin")), None);
    }
}

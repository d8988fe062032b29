//! Error types for the conversion library.
//!
//! Two layers live here. [`Error`] covers infrastructure failures (I/O,
//! archives, manifests, misuse of the chain I/O API). [`ConversionStatus`]
//! is the status vocabulary shared with converters and callers; every
//! [`Error`] maps onto one status via [`Error::status`].

use std::path::PathBuf;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while resolving or executing a conversion.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Converter manifest could not be deserialized
    #[error("Invalid converter manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// Archive container error
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Converter descriptor violates a registration rule
    #[error("Invalid converter descriptor '{name}': {reason}")]
    InvalidDescriptor {
        /// Converter name
        name: String,
        /// Rule that was violated
        reason: String,
    },

    /// Storage could not be created, opened or navigated
    #[error("Storage error: {0}")]
    Storage(String),

    /// A converter used the chain I/O API incorrectly
    #[error("Usage error: {0}")]
    Usage(String),

    /// No MIME type could be determined for a file
    #[error("No mimetype found for {}", .0.display())]
    UnknownMimeType(PathBuf),

    /// No registered document handler accepts a MIME type
    #[error("No document handler for mimetype {0}")]
    NoDocumentHandler(String),

    /// Predecessor walk did not reach the source vertex
    #[error("Inconsistent conversion graph: {0}")]
    InconsistentGraph(String),

    /// Temporary artifact could not be created or persisted
    #[error("Temporary file error: {0}")]
    TempFile(String),

    /// A nested conversion for an embedded part failed
    #[error("Embedded conversion failed: {0}")]
    EmbeddedConversion(ConversionStatus),
}

impl Error {
    /// Map this error onto the conversion status reported to callers.
    pub fn status(&self) -> ConversionStatus {
        match self {
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ConversionStatus::FileNotFound,
                std::io::ErrorKind::OutOfMemory => ConversionStatus::OutOfMemory,
                std::io::ErrorKind::UnexpectedEof => ConversionStatus::UnexpectedEof,
                _ => ConversionStatus::InternalError,
            },
            Error::Manifest(_) | Error::InvalidDescriptor { .. } => ConversionStatus::InvalidFormat,
            Error::Archive(_) | Error::Storage(_) => ConversionStatus::StorageCreationError,
            Error::Usage(_) => ConversionStatus::UsageError,
            Error::UnknownMimeType(_) => ConversionStatus::BadMimeType,
            Error::NoDocumentHandler(_) => ConversionStatus::CreationError,
            Error::InconsistentGraph(_) | Error::TempFile(_) => ConversionStatus::InternalError,
            Error::EmbeddedConversion(_) => ConversionStatus::EmbeddedDocError,
        }
    }
}

impl From<tempfile::PathPersistError> for Error {
    fn from(err: tempfile::PathPersistError) -> Self {
        Error::TempFile(err.error.to_string())
    }
}

/// Outcome of a converter invocation or of a whole conversion.
///
/// `Ok` lets a chain proceed; any other value aborts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionStatus {
    /// Conversion succeeded
    Ok,

    // Structural failures
    /// The converter instance could not be created
    CreationError,
    /// A storage artifact could not be created
    StorageCreationError,
    /// The source MIME type could not be determined or is unusable
    BadMimeType,
    /// No usable path exists through the conversion graph
    BadConversionGraph,

    // Data failures
    /// The input is not in the expected format
    WrongFormat,
    /// The input could not be parsed
    ParsingError,
    /// The input ended prematurely
    UnexpectedEof,
    /// The input contained an unknown instruction
    UnexpectedOpcode,
    /// The input is structurally invalid
    InvalidFormat,

    // Environment failures
    /// A required file does not exist
    FileNotFound,
    /// Memory was exhausted
    OutOfMemory,

    // Policy failures
    /// The requested conversion is not implemented
    NotImplemented,
    /// A converter misused the chain I/O API
    UsageError,
    /// The input is password protected
    PasswordProtected,

    // User driven
    /// The user cancelled the conversion
    UserCancelled,

    // Nested conversions
    /// An embedded sub-conversion failed
    EmbeddedDocError,

    /// Catch-all
    InternalError,
}

impl ConversionStatus {
    /// True for [`ConversionStatus::Ok`].
    pub fn is_ok(self) -> bool {
        self == ConversionStatus::Ok
    }

    /// `Ok(())` for a successful status, `Err(self)` otherwise.
    pub fn into_result(self) -> std::result::Result<(), ConversionStatus> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Statuses that are never shown to the user because the user already
    /// knows about them.
    pub fn is_silent(self) -> bool {
        matches!(self, ConversionStatus::UserCancelled | ConversionStatus::BadConversionGraph)
    }

    /// Short user-facing reason text. Empty for `Ok` and silent statuses.
    pub fn message(self) -> &'static str {
        match self {
            ConversionStatus::Ok
            | ConversionStatus::UserCancelled
            | ConversionStatus::BadConversionGraph => "",
            ConversionStatus::CreationError => "Creation error",
            ConversionStatus::FileNotFound => "File not found",
            ConversionStatus::StorageCreationError => "Cannot create storage",
            ConversionStatus::BadMimeType => "Bad MIME type",
            ConversionStatus::EmbeddedDocError => "Error in embedded document",
            ConversionStatus::WrongFormat => "Format not recognized",
            ConversionStatus::NotImplemented => "Not implemented",
            ConversionStatus::ParsingError => "Parsing error",
            ConversionStatus::PasswordProtected => "Document is password protected",
            ConversionStatus::InvalidFormat => "Invalid format",
            ConversionStatus::InternalError
            | ConversionStatus::UnexpectedEof
            | ConversionStatus::UnexpectedOpcode
            | ConversionStatus::UsageError => "Internal error",
            ConversionStatus::OutOfMemory => "Out of memory",
        }
    }
}

impl std::fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.message() {
            "" => write!(f, "{:?}", self),
            msg => write!(f, "{} ({:?})", msg, self),
        }
    }
}

impl From<Error> for ConversionStatus {
    fn from(err: Error) -> Self {
        err.status()
    }
}

impl From<&Error> for ConversionStatus {
    fn from(err: &Error) -> Self {
        err.status()
    }
}

//! In-memory native documents.
//!
//! The document model itself is owned by the host application. The chain
//! only needs to create documents, load and save them in their native
//! format, and hand them to converters that can work on the model directly.

use crate::error::Result;
use crate::mime::MimeType;
use std::any::Any;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

/// A live document shared between the caller, the chain and converters.
pub type SharedDocument = Rc<RefCell<dyn NativeDocument>>;

/// Host-side document model, seen through its native (de)serialization.
pub trait NativeDocument {
    /// MIME type this document saves as natively.
    fn native_mime_type(&self) -> &str;

    /// Additional MIME types this document reads and writes without a converter.
    fn extra_native_mime_types(&self) -> Vec<MimeType> {
        Vec::new()
    }

    /// Replace the contents of this document from a native file.
    fn load_native(&mut self, path: &Path) -> Result<()>;

    /// Write this document to `path` in its native format.
    fn save_native(&self, path: &Path) -> Result<()>;

    /// Downcast support for converters that know the concrete model.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Native plus extra-native MIME types of a document, native first.
pub fn native_mime_types(document: &dyn NativeDocument) -> Vec<MimeType> {
    let mut mimes = vec![MimeType::from(document.native_mime_type())];
    for extra in document.extra_native_mime_types() {
        if !extra.is_empty() && !mimes.contains(&extra) {
            mimes.push(extra);
        }
    }
    mimes
}

/// Creates empty documents of one document type.
pub trait DocumentFactory: Send + Sync {
    /// A fresh, empty document.
    fn create(&self) -> Option<SharedDocument>;
}

impl<F> DocumentFactory for F
where
    F: Fn() -> Option<SharedDocument> + Send + Sync,
{
    fn create(&self) -> Option<SharedDocument> {
        self()
    }
}

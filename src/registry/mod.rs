//! Converter and document-handler registry.
//!
//! The registry is the graph's only source of topology. It stores converter
//! descriptors with their factories, the document handlers that define the
//! native MIME types, and a memo of availability probe results.
//!
//! Registration order is significant: converter ids follow it, and every
//! tie between equally cheap alternatives is broken in favour of the
//! converter registered first.

mod descriptor;

pub use descriptor::{Availability, ConverterDescriptor};

use crate::converter::Converter;
use crate::document::{DocumentFactory, SharedDocument};
use crate::error::Result;
use crate::graph::Direction;
use crate::mime::MimeType;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Creates converter instances and answers availability probes.
pub trait ConverterFactory: Send + Sync {
    /// A fresh converter instance, or `None` if one cannot be created.
    fn create(&self) -> Option<Box<dyn Converter>>;

    /// Runtime availability check, consulted for [`Availability::Probe`].
    fn probe(&self) -> bool {
        true
    }
}

impl<F> ConverterFactory for F
where
    F: Fn() -> Option<Box<dyn Converter>> + Send + Sync,
{
    fn create(&self) -> Option<Box<dyn Converter>> {
        self()
    }
}

/// Registration-order identifier of a converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConverterId(pub usize);

/// A registered converter: descriptor plus factory.
pub struct ConverterEntry {
    id: ConverterId,
    descriptor: ConverterDescriptor,
    factory: Arc<dyn ConverterFactory>,
}

impl ConverterEntry {
    /// Registration id.
    pub fn id(&self) -> ConverterId {
        self.id
    }

    /// Converter name from the descriptor.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Static descriptor.
    pub fn descriptor(&self) -> &ConverterDescriptor {
        &self.descriptor
    }

    /// Create a converter instance.
    pub fn create(&self) -> Option<Box<dyn Converter>> {
        self.factory.create()
    }
}

impl fmt::Debug for ConverterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterEntry")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// A document type that can be created natively.
pub struct DocumentHandler {
    native: MimeType,
    extra_native: Vec<MimeType>,
    factory: Arc<dyn DocumentFactory>,
}

impl DocumentHandler {
    /// Primary native MIME type.
    pub fn native_mime_type(&self) -> &MimeType {
        &self.native
    }

    /// Additional native MIME types.
    pub fn extra_native_mime_types(&self) -> &[MimeType] {
        &self.extra_native
    }

    /// Native MIME type followed by the extra ones.
    pub fn all_native_mime_types(&self) -> impl Iterator<Item = &MimeType> {
        std::iter::once(&self.native).chain(self.extra_native.iter())
    }

    /// Whether this handler reads `mime` natively.
    pub fn accepts(&self, mime: &str) -> bool {
        self.all_native_mime_types().any(|m| m.as_str() == mime)
    }
}

/// Registry of converters and document handlers.
pub struct ConverterRegistry {
    converters: Vec<Arc<ConverterEntry>>,
    handlers: Vec<DocumentHandler>,
    probe_cache: Mutex<HashMap<ConverterId, bool>>,
    generation: AtomicU64,
}

impl ConverterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            converters: Vec::new(),
            handlers: Vec::new(),
            probe_cache: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Register a converter.
    pub fn register_converter(
        &mut self,
        descriptor: ConverterDescriptor,
        factory: Arc<dyn ConverterFactory>,
    ) -> Result<ConverterId> {
        descriptor.validate()?;
        if descriptor.edge_weight().is_none() {
            log::warn!(
                "Converter '{}' has unusable weight {}; it will not connect any formats",
                descriptor.name,
                descriptor.weight
            );
        }
        let id = ConverterId(self.converters.len());
        self.converters.push(Arc::new(ConverterEntry {
            id,
            descriptor,
            factory,
        }));
        *self.generation.get_mut() += 1;
        Ok(id)
    }

    /// Register a converter described by a JSON manifest.
    pub fn register_manifest_json(&mut self, json: &str, factory: Arc<dyn ConverterFactory>) -> Result<ConverterId> {
        let descriptor = ConverterDescriptor::from_json(json)?;
        self.register_converter(descriptor, factory)
    }

    /// Register a document type with its native MIME types.
    pub fn register_document_handler(
        &mut self,
        native: &str,
        extra_native: &[&str],
        factory: Arc<dyn DocumentFactory>,
    ) {
        self.handlers.push(DocumentHandler {
            native: MimeType::from(native),
            extra_native: extra_native
                .iter()
                .filter(|m| !m.is_empty())
                .map(|m| MimeType::from(*m))
                .collect(),
            factory,
        });
        *self.generation.get_mut() += 1;
    }

    /// Registered converters in registration order.
    pub fn converters(&self) -> &[Arc<ConverterEntry>] {
        &self.converters
    }

    /// Registered document handlers in registration order.
    pub fn document_handlers(&self) -> &[DocumentHandler] {
        &self.handlers
    }

    /// All native MIME types of all handlers, deduplicated, in handler order.
    pub fn native_mime_types(&self) -> Vec<MimeType> {
        let mut mimes: Vec<MimeType> = Vec::new();
        for mime in self.handlers.iter().flat_map(DocumentHandler::all_native_mime_types) {
            if !mime.is_empty() && !mimes.contains(mime) {
                mimes.push(mime.clone());
            }
        }
        mimes
    }

    /// Create an empty document of the first handler that accepts `mime`.
    pub fn create_document(&self, mime: &str) -> Option<SharedDocument> {
        let handler = self.handlers.iter().find(|h| h.accepts(mime))?;
        handler.factory.create()
    }

    /// Whether a converter may be used, probing it once if required.
    pub fn is_available(&self, entry: &ConverterEntry) -> bool {
        if entry.descriptor.availability == Availability::Always {
            return true;
        }
        let mut cache = self.probe_cache.lock().unwrap_or_else(|e| e.into_inner());
        *cache.entry(entry.id).or_insert_with(|| {
            let available = entry.factory.probe();
            log::debug!("Probed converter '{}': available={}", entry.name(), available);
            available
        })
    }

    /// Forget all probe results. Graphs built earlier become stale.
    pub fn invalidate_probes(&self) {
        self.probe_cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Counter bumped on every topology-relevant change.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Every MIME type some available converter imports (or exports).
    pub fn supported_mime_types(&self, direction: Direction) -> BTreeSet<MimeType> {
        self.converters
            .iter()
            .filter(|entry| self.is_available(entry))
            .flat_map(|entry| match direction {
                Direction::Import => entry.descriptor.import.iter(),
                Direction::Export => entry.descriptor.export.iter(),
            })
            .cloned()
            .collect()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

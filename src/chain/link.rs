//! A single converter invocation.

use super::io::ChainIo;
use crate::converter::ConversionContext;
use crate::error::ConversionStatus;
use crate::mime::MimeType;
use crate::registry::ConverterEntry;
use std::sync::Arc;

/// One hop of a chain: a converter and the `(from, to)` pair it runs for.
#[derive(Debug, Clone)]
pub struct ChainLink {
    entry: Arc<ConverterEntry>,
    from: MimeType,
    to: MimeType,
}

impl ChainLink {
    /// Create a link.
    pub fn new(entry: Arc<ConverterEntry>, from: MimeType, to: MimeType) -> Self {
        Self { entry, from, to }
    }

    /// Registered converter this link runs.
    pub fn entry(&self) -> &Arc<ConverterEntry> {
        &self.entry
    }

    /// Input MIME type.
    pub fn from(&self) -> &MimeType {
        &self.from
    }

    /// Output MIME type.
    pub fn to(&self) -> &MimeType {
        &self.to
    }

    /// Converter name.
    pub fn name(&self) -> &str {
        self.entry.name()
    }

    /// Converter weight.
    pub fn weight(&self) -> u32 {
        self.entry.descriptor().weight
    }

    /// Create the converter, run it once and drop it.
    pub(crate) fn invoke(&self, io: &mut ChainIo<'_>) -> ConversionStatus {
        let Some(mut converter) = self.entry.create() else {
            log::error!("Couldn't create converter '{}'", self.name());
            return ConversionStatus::CreationError;
        };

        let peer = converter.embedding_peer();
        let parent_peer = io.parent_peer();
        if let (Some(child), Some(parent)) = (&peer, &parent_peer) {
            log::debug!("Bridging converter '{}' with its parent converter", self.name());
            parent.attach(child.clone());
            child.attach(parent.clone());
        }

        log::debug!("Invoking converter '{}' ({} -> {})", self.name(), self.from, self.to);
        io.begin_link(&self.from, &self.to, peer.clone());
        let status = {
            let mut ctx = ConversionContext::new(io);
            converter.convert(&mut ctx, &self.from, &self.to)
        };
        drop(converter);
        io.end_link();

        if let (Some(child), Some(parent)) = (&peer, &parent_peer) {
            child.detach();
            parent.detach();
        }

        if io.take_usage_violation() && status.is_ok() {
            log::warn!("Converter '{}' misused the chain I/O API", self.name());
            return ConversionStatus::UsageError;
        }
        if !status.is_ok() {
            log::debug!("Converter '{}' failed: {:?}", self.name(), status);
        }
        status
    }

    /// Log this link at debug level.
    pub fn dump(&self) {
        log::debug!("   Link: {} ({} -> {}, weight {})", self.name(), self.from, self.to, self.weight());
    }
}

//! Conversion chains.
//!
//! A [`ConversionChain`] is the executable form of a
//! [`ResolvedPath`](crate::graph::ResolvedPath): an ordered list of
//! [`ChainLink`]s where each link's output MIME type is the next link's
//! input. Running a chain feeds every link's output to its successor and
//! releases intermediate artifacts as soon as they are consumed, on success
//! and on failure alike.

pub(crate) mod io;
mod link;
mod temp;

pub use io::ChainState;
pub use link::ChainLink;

pub(crate) use io::{ChainEnv, ChainIo, ChainOutput, EmbeddingHost};
pub(crate) use temp::TempArtifact;

use crate::error::ConversionStatus;
use crate::graph::ResolvedPath;
use crate::mime::MimeType;
use crate::registry::ConverterEntry;
use std::sync::Arc;

/// Ordered sequence of converter invocations.
#[derive(Debug, Clone, Default)]
pub struct ConversionChain {
    links: Vec<ChainLink>,
}

impl ConversionChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain executing the steps of `path`.
    pub fn from_path(path: &ResolvedPath) -> Self {
        let links = path
            .steps
            .iter()
            .map(|step| ChainLink::new(step.entry.clone(), step.from.clone(), step.to.clone()))
            .collect();
        Self { links }
    }

    /// Add a link at the end.
    pub fn append_link(&mut self, entry: Arc<ConverterEntry>, from: MimeType, to: MimeType) {
        self.links.push(ChainLink::new(entry, from, to));
    }

    /// Add a link at the front.
    pub fn prepend_link(&mut self, entry: Arc<ConverterEntry>, from: MimeType, to: MimeType) {
        self.links.insert(0, ChainLink::new(entry, from, to));
    }

    /// Links in execution order.
    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    /// Number of links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True for a chain without links.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Sum of the link weights.
    pub fn total_weight(&self) -> u32 {
        self.links.iter().fold(0u32, |acc, link| acc.saturating_add(link.weight()))
    }

    /// Whether every link consumes what the previous one produces.
    pub fn is_contiguous(&self) -> bool {
        self.links.windows(2).all(|pair| pair[0].to() == pair[1].from())
    }

    /// Run all links in order.
    ///
    /// The first non-`Ok` status aborts the chain. Cancellation is checked
    /// before every link. All temporaries except a surviving final import
    /// artifact are gone when this returns.
    pub(crate) fn invoke<'p>(
        &self,
        env: ChainEnv,
        parent: Option<&'p mut (dyn EmbeddingHost + 'p)>,
    ) -> std::result::Result<ChainOutput, ConversionStatus> {
        if self.links.is_empty() {
            log::warn!("Refusing to run an empty conversion chain");
            return Err(ConversionStatus::InternalError);
        }

        let mut io = ChainIo::new(env, parent);
        io.prepare_progress(self.links.iter().map(|link| link.weight()));
        let status = self.run_links(&mut io);
        io.set_state(ChainState::DONE);
        status.into_result()?;

        if let Err(e) = io.finalize() {
            log::error!("Could not finalize the conversion: {}", e);
            return Err(e.status());
        }
        io.take_output().map_err(|e| {
            log::error!("Could not hand over the conversion result: {}", e);
            e.status()
        })
    }

    fn run_links(&self, io: &mut ChainIo<'_>) -> ConversionStatus {
        let count = self.links.len();
        io.set_state(ChainState::BEGINNING);

        for (i, link) in self.links.iter().enumerate() {
            if io.is_cancelled() {
                log::info!("Conversion cancelled before '{}'", link.name());
                return ConversionStatus::UserCancelled;
            }

            let last = i + 1 == count;
            if last {
                if io.state().contains(ChainState::BEGINNING) {
                    io.set_state(io.state() | ChainState::END);
                } else {
                    io.set_state(ChainState::END);
                }
            }

            let mut status = link.invoke(io);
            if !last {
                io.set_state(ChainState::MIDDLE);
            }
            if io.settle().is_err() && status.is_ok() {
                status = ConversionStatus::StorageCreationError;
            }
            if !status.is_ok() {
                return status;
            }
        }
        ConversionStatus::Ok
    }

    /// Log the chain at debug level.
    pub fn dump(&self) {
        log::debug!("########## ConversionChain with {} links:", self.links.len());
        for link in &self.links {
            link.dump();
        }
        log::debug!("########## ConversionChain (done) ##########");
    }
}

//! The converter contract.
//!
//! A converter transforms one MIME type into another. It never sees the
//! chain directly: everything it needs (input, output, progress,
//! cancellation, nested conversions) is reached through the
//! [`ConversionContext`] handed to [`Converter::convert`].
//!
//! Each link may request its input in exactly one representation and its
//! output in exactly one representation:
//!
//! | Representation | Input                         | Output                          |
//! |----------------|-------------------------------|---------------------------------|
//! | File           | [`ConversionContext::input_file`]     | [`ConversionContext::output_file`]     |
//! | Storage        | [`ConversionContext::storage_file`] (read) | [`ConversionContext::storage_file`] (write) |
//! | Document       | [`ConversionContext::input_document`] | [`ConversionContext::output_document`] |
//!
//! Asking for a second, different representation is a usage error; the
//! link then fails with [`ConversionStatus::UsageError`] even if the
//! converter reports success.

use crate::chain::io::{ChainIo, ChainState};
use crate::document::SharedDocument;
use crate::error::{ConversionStatus, Result};
use crate::graph::Direction;
use crate::manager::embed;
use crate::mime::MimeType;
use crate::storage::{Store, StoreMode};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

/// One format transformation.
///
/// Instances are created per invocation and dropped right after
/// [`Converter::convert`] returns.
pub trait Converter {
    /// Convert from `from` to `to`.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Access to the chain's input, output and services
    /// * `from` - MIME type of the input
    /// * `to` - MIME type to produce
    ///
    /// # Returns
    ///
    /// [`ConversionStatus::Ok`] to let the chain continue, anything else to
    /// abort it.
    fn convert(&mut self, ctx: &mut ConversionContext<'_, '_>, from: &MimeType, to: &MimeType) -> ConversionStatus;

    /// Peer interface for converters that cooperate with the converter of
    /// an enclosing chain during embedding.
    fn embedding_peer(&self) -> Option<Rc<dyn EmbeddingPeer>> {
        None
    }
}

/// Named message exchanged between cooperating converters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSignal {
    /// Signal name, agreed upon by both converters.
    pub name: String,
    /// Arbitrary payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EmbeddingSignal {
    /// Create a signal.
    pub fn new(name: &str, payload: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            payload,
        }
    }
}

/// Typed bridge between a converter and the converter of its parent chain.
///
/// When a nested chain runs inside a link whose converter exposes a peer,
/// and the nested link's converter exposes one too, both are attached to
/// each other for the duration of the nested invocation.
pub trait EmbeddingPeer {
    /// Handle a signal sent by the attached peer.
    fn receive(&self, signal: &EmbeddingSignal);

    /// Start talking to `peer`.
    fn attach(&self, peer: Rc<dyn EmbeddingPeer>);

    /// Forget the attached peer.
    fn detach(&self);
}

/// Holder for the currently attached peer.
///
/// Helper for [`EmbeddingPeer`] implementations.
#[derive(Default)]
pub struct PeerSlot {
    peer: RefCell<Option<Rc<dyn EmbeddingPeer>>>,
}

impl PeerSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `peer`.
    pub fn set(&self, peer: Rc<dyn EmbeddingPeer>) {
        *self.peer.borrow_mut() = Some(peer);
    }

    /// Drop the remembered peer.
    pub fn clear(&self) {
        self.peer.borrow_mut().take();
    }

    /// Whether a peer is attached.
    pub fn is_attached(&self) -> bool {
        self.peer.borrow().is_some()
    }

    /// Deliver `signal` to the attached peer. Returns false if none is attached.
    pub fn send(&self, signal: &EmbeddingSignal) -> bool {
        let peer = self.peer.borrow().clone();
        match peer {
            Some(peer) => {
                peer.receive(signal);
                true
            },
            None => false,
        }
    }
}

/// Reference to a part converted by a nested chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedPart {
    /// Part number within the running link, starting at 1.
    pub index: usize,
    /// Caller-chosen key identifying the part.
    pub key: String,
    /// Directory inside the output store holding the part.
    pub directory: String,
    /// MIME type the part was converted to.
    pub mime: MimeType,
}

/// A converter's view of the running chain.
pub struct ConversionContext<'c, 'p> {
    io: &'c mut ChainIo<'p>,
}

impl<'c, 'p> ConversionContext<'c, 'p> {
    pub(crate) fn new(io: &'c mut ChainIo<'p>) -> Self {
        Self { io }
    }

    /// Path of the input file.
    ///
    /// On the first link this is the caller's file (import) or the caller's
    /// document saved to a temporary file (export).
    pub fn input_file(&mut self) -> Result<PathBuf> {
        self.io.input_file()
    }

    /// Path to write the output to.
    ///
    /// The last link of an export writes straight to the destination file;
    /// every other link gets a temporary file owned by the chain.
    pub fn output_file(&mut self) -> Result<PathBuf> {
        self.io.output_file()
    }

    /// Open stream `name` of the input store (`Read`) or output store
    /// (`Write`), creating the store on first use.
    pub fn storage_file(&mut self, name: &str, mode: StoreMode) -> Result<&mut dyn Store> {
        self.io.storage_file(name, mode)
    }

    /// The input as a live document.
    pub fn input_document(&mut self) -> Result<SharedDocument> {
        self.io.input_document()
    }

    /// A live document to write the output into.
    pub fn output_document(&mut self) -> Result<SharedDocument> {
        self.io.output_document()
    }

    /// Descend into `dir` of the output store, now or once it is created.
    pub fn enter_directory(&mut self, dir: &str) -> Result<()> {
        self.io.enter_directory(dir)
    }

    /// Undo the last [`ConversionContext::enter_directory`].
    pub fn leave_directory(&mut self) -> Result<()> {
        self.io.leave_directory()
    }

    /// Convert an embedded part with a nested chain.
    ///
    /// `write_contents` writes the part's data in format `from`. The part is
    /// converted to `to`, or to the cheapest native type when `to` is
    /// `None`, and stored under `part<N>` inside this link's output store.
    pub fn embed_part<F>(&mut self, key: &str, from: &str, to: Option<&str>, write_contents: F) -> Result<EmbeddedPart>
    where
        F: FnOnce(&mut dyn Write) -> Result<()>,
    {
        embed::embed_part(self.io, key, from, to, write_contents)
    }

    /// Parts embedded by this link so far.
    pub fn embedded_parts(&self) -> &[EmbeddedPart] {
        self.io.embedded_parts()
    }

    /// Report progress in percent.
    pub fn set_progress(&self, percent: u32) {
        self.io.report_progress(percent);
    }

    /// Whether the user asked to cancel. Converters should return
    /// [`ConversionStatus::UserCancelled`] promptly when this is true.
    pub fn is_cancelled(&self) -> bool {
        self.io.is_cancelled()
    }

    /// Lifecycle position of the chain.
    pub fn state(&self) -> ChainState {
        self.io.state()
    }

    /// Direction of the whole conversion.
    pub fn direction(&self) -> Direction {
        self.io.env().direction
    }

    /// Whether this chain runs nested inside another chain's link.
    pub fn is_embedded(&self) -> bool {
        self.io.is_embedded()
    }

    /// Peer of the parent chain's running converter, if any.
    pub fn parent_peer(&self) -> Option<Rc<dyn EmbeddingPeer>> {
        self.io.parent_peer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counter {
        received: Cell<usize>,
        slot: PeerSlot,
    }

    impl EmbeddingPeer for Counter {
        fn receive(&self, _signal: &EmbeddingSignal) {
            self.received.set(self.received.get() + 1);
        }
        fn attach(&self, peer: Rc<dyn EmbeddingPeer>) {
            self.slot.set(peer);
        }
        fn detach(&self) {
            self.slot.clear();
        }
    }

    fn counter() -> Rc<Counter> {
        Rc::new(Counter {
            received: Cell::new(0),
            slot: PeerSlot::new(),
        })
    }

    #[test]
    fn test_peer_slot_delivers_to_attached_peer() {
        let parent = counter();
        let child = counter();
        child.attach(parent.clone());
        assert!(child.slot.is_attached());
        assert!(child.slot.send(&EmbeddingSignal::new("picture", serde_json::json!({"id": 3}))));
        assert_eq!(parent.received.get(), 1);

        child.detach();
        assert!(!child.slot.send(&EmbeddingSignal::new("picture", serde_json::Value::Null)));
        assert_eq!(parent.received.get(), 1);
    }

    #[test]
    fn test_signal_payload_defaults_to_null() {
        let signal: EmbeddingSignal = serde_json::from_str(r#"{"name":"done"}"#).unwrap();
        assert_eq!(signal.name, "done");
        assert!(signal.payload.is_null());
    }
}

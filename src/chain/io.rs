//! Chain I/O state machine.
//!
//! Each link may ask for its input as a file, a store or a document, and
//! likewise for its output. [`ChainIo`] hands out the requested
//! representation, manufactures temporary files where representations have
//! to be bridged, and settles everything between links: the output of one
//! link becomes the input of the next, and whatever the finished link left
//! behind is closed and deleted.

use super::temp::TempArtifact;
use crate::config::ManagerConfig;
use crate::converter::{EmbeddedPart, EmbeddingPeer};
use crate::document::SharedDocument;
use crate::error::{Error, Result};
use crate::graph::Direction;
use crate::mime::{MimeSniffer, MimeType};
use crate::progress::{CancellationToken, ProgressChannel, ProgressTarget};
use crate::registry::ConverterRegistry;
use crate::storage::{create_store, Store, StoreMode};
use bitflags::bitflags;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

bitflags! {
    /// Lifecycle position of a running chain.
    ///
    /// A single-link chain runs with `BEGINNING | END`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChainState: u8 {
        /// The first link is running.
        const BEGINNING = 0b0001;
        /// A link between the first and the last is running.
        const MIDDLE = 0b0010;
        /// The last link is running.
        const END = 0b0100;
        /// All links have run.
        const DONE = 0b1000;
    }
}

/// Representation a link has asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IoQuery {
    Nil,
    File,
    Storage,
    Document,
}

/// Everything a chain needs to know about the request that started it.
#[derive(Clone)]
pub(crate) struct ChainEnv {
    pub registry: Arc<ConverterRegistry>,
    pub sniffer: Arc<dyn MimeSniffer>,
    pub config: ManagerConfig,
    pub direction: Direction,
    pub import_file: PathBuf,
    pub export_file: Option<PathBuf>,
    pub document: Option<SharedDocument>,
    pub progress: ProgressTarget,
    pub cancel: CancellationToken,
    /// Directory inside the parent's output store for embedded chains.
    pub part_dir: Option<String>,
}

/// What a finished chain produced.
pub(crate) enum ChainOutput {
    File(PathBuf),
    Document(SharedDocument),
    Nothing,
}

/// Access a nested chain has to the chain that spawned it.
pub(crate) trait EmbeddingHost {
    /// The host's output store, created on first use.
    fn embedding_store(&mut self) -> Result<&mut dyn Store>;

    /// Leave `depth` directories the nested chain entered on the host store.
    fn leave_embedding_dirs(&mut self, depth: usize);

    /// Peer interface of the host's running converter.
    fn running_peer(&self) -> Option<Rc<dyn EmbeddingPeer>>;
}

enum OutputStore {
    Own(Box<dyn Store>),
    /// Writes go to the parent chain's output store.
    Parent,
}

struct LinkIo {
    from: MimeType,
    to: MimeType,
    progress: ProgressChannel,
    peer: Option<Rc<dyn EmbeddingPeer>>,
}

pub(crate) struct ChainIo<'p> {
    env: ChainEnv,
    parent: Option<&'p mut (dyn EmbeddingHost + 'p)>,
    state: ChainState,
    link: Option<LinkIo>,
    progress: VecDeque<ProgressChannel>,

    input_queried: IoQuery,
    output_queried: IoQuery,
    input_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    input_temp: Option<TempArtifact>,
    output_temp: Option<TempArtifact>,
    input_store: Option<Box<dyn Store>>,
    output_store: Option<OutputStore>,
    input_document: Option<SharedDocument>,
    output_document: Option<SharedDocument>,

    internal_dirs: Vec<String>,
    /// Directories entered on the parent's store by this chain.
    parent_depth: usize,
    part_index: usize,
    parts: Vec<EmbeddedPart>,
    usage_violation: bool,
}

impl<'p> ChainIo<'p> {
    pub fn new(env: ChainEnv, parent: Option<&'p mut (dyn EmbeddingHost + 'p)>) -> Self {
        Self {
            env,
            parent,
            state: ChainState::BEGINNING,
            link: None,
            progress: VecDeque::new(),
            input_queried: IoQuery::Nil,
            output_queried: IoQuery::Nil,
            input_file: None,
            output_file: None,
            input_temp: None,
            output_temp: None,
            input_store: None,
            output_store: None,
            input_document: None,
            output_document: None,
            internal_dirs: Vec::new(),
            parent_depth: 0,
            part_index: 0,
            parts: Vec::new(),
            usage_violation: false,
        }
    }

    pub fn env(&self) -> &ChainEnv {
        &self.env
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn set_state(&mut self, state: ChainState) {
        self.state = state;
    }

    pub fn is_embedded(&self) -> bool {
        self.parent.is_some()
    }

    /// Register the progress shares of all links about to run.
    pub fn prepare_progress(&mut self, weights: impl IntoIterator<Item = u32>) {
        self.progress = self.env.progress.channels_for_links(weights);
    }

    pub fn begin_link(&mut self, from: &MimeType, to: &MimeType, peer: Option<Rc<dyn EmbeddingPeer>>) {
        self.link = Some(LinkIo {
            from: from.clone(),
            to: to.clone(),
            progress: self.progress.pop_front().unwrap_or(ProgressChannel::Silent),
            peer,
        });
    }

    pub fn end_link(&mut self) {
        if let Some(link) = self.link.take() {
            link.progress.finish();
        }
    }

    fn link_from(&self) -> MimeType {
        self.link.as_ref().map(|l| l.from.clone()).unwrap_or_default()
    }

    fn link_to(&self) -> MimeType {
        self.link.as_ref().map(|l| l.to.clone()).unwrap_or_default()
    }

    pub fn report_progress(&self, percent: u32) {
        if let Some(link) = &self.link {
            link.progress.report(percent);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.env.cancel.is_cancelled()
    }

    /// Peer of the parent chain's running converter.
    pub fn parent_peer(&self) -> Option<Rc<dyn EmbeddingPeer>> {
        self.parent.as_deref().and_then(|host| host.running_peer())
    }

    /// Whether the running link misused the I/O API. Clears the flag.
    pub fn take_usage_violation(&mut self) -> bool {
        std::mem::take(&mut self.usage_violation)
    }

    fn conflict(&mut self, message: &str) -> Error {
        self.usage_violation = true;
        log::warn!("{}", message);
        Error::Usage(message.to_string())
    }

    fn create_temp(&self, mime: &MimeType, survive: bool) -> Result<TempArtifact> {
        let extension = self.env.sniffer.extension_for(mime.as_str());
        TempArtifact::create(&self.env.config, extension.as_deref(), survive)
    }

    /// Path of the current input, bridging from a document if necessary.
    pub fn input_file(&mut self) -> Result<PathBuf> {
        match self.input_queried {
            IoQuery::File => {
                return self
                    .input_file
                    .clone()
                    .ok_or_else(|| Error::Usage("no input file available".to_string()))
            },
            IoQuery::Nil => {},
            _ => return Err(self.conflict("input was already requested as a different representation")),
        }
        self.input_queried = IoQuery::File;

        if self.state.contains(ChainState::BEGINNING) {
            match (self.env.direction, self.env.document.clone()) {
                (Direction::Export, Some(document)) => self.input_file_from_document(&document)?,
                _ => self.input_file = Some(self.env.import_file.clone()),
            }
        } else if self.input_file.is_none() {
            if let Some(document) = self.input_document.clone() {
                self.input_file_from_document(&document)?;
            }
        }

        self.input_file
            .clone()
            .ok_or_else(|| Error::Usage("the previous link produced no output".to_string()))
    }

    fn input_file_from_document(&mut self, document: &SharedDocument) -> Result<()> {
        let temp = self.create_temp(&self.link_from(), false)?;
        document.borrow().save_native(temp.path())?;
        self.input_file = Some(temp.path().to_path_buf());
        self.input_temp = Some(temp);
        Ok(())
    }

    /// Path the current link writes its output to.
    pub fn output_file(&mut self) -> Result<PathBuf> {
        if self.is_embedded() && self.state.contains(ChainState::END) {
            return Err(self.conflict("an embedded conversion has to write through storage_file"));
        }
        match self.output_queried {
            IoQuery::File => {
                return self
                    .output_file
                    .clone()
                    .ok_or_else(|| Error::Usage("no output file available".to_string()))
            },
            IoQuery::Nil => {},
            _ => return Err(self.conflict("output was already requested as a different representation")),
        }
        self.output_queried = IoQuery::File;

        if self.state.contains(ChainState::END) && self.env.direction == Direction::Export {
            let export = self
                .env
                .export_file
                .clone()
                .ok_or_else(|| Error::Usage("no export file for this conversion".to_string()))?;
            self.output_file = Some(export.clone());
            return Ok(export);
        }

        // The last output of an import is handed to the caller
        let survive = self.state.contains(ChainState::END);
        let temp = self.create_temp(&self.link_to(), survive)?;
        let path = temp.path().to_path_buf();
        self.output_file = Some(path.clone());
        self.output_temp = Some(temp);
        Ok(path)
    }

    /// Open stream `name` of the input or output store.
    pub fn storage_file(&mut self, name: &str, mode: StoreMode) -> Result<&mut dyn Store> {
        if self.output_queried == IoQuery::Nil && mode == StoreMode::Write && self.is_embedded() {
            return self.storage_init_embedding(name);
        }

        let input_ready = self.input_queried == IoQuery::Storage
            && mode == StoreMode::Read
            && self.input_store.as_ref().is_some_and(|s| s.mode() == StoreMode::Read);
        let output_ready =
            self.output_queried == IoQuery::Storage && mode == StoreMode::Write && self.output_store.is_some();

        if input_ready {
            let store = self.input_store_mut()?;
            open_next_stream(store, name)
        } else if output_ready {
            let store = self.output_store_mut()?;
            open_next_stream(store, name)
        } else if self.input_queried == IoQuery::Nil && mode == StoreMode::Read {
            let file = self.input_file()?;
            let store = create_store(self.env.config.store_kind, &file, StoreMode::Read, "")?;
            self.input_queried = IoQuery::Storage;
            self.input_store = Some(store);
            let dirs = self.internal_dirs.clone();
            let store = self.input_store_mut()?;
            replay_directories(store, &dirs);
            store.open(name)?;
            Ok(store)
        } else if self.output_queried == IoQuery::Nil && mode == StoreMode::Write {
            let file = self.output_file()?;
            let app_id = self.link_to();
            let store = create_store(self.env.config.store_kind, &file, StoreMode::Write, app_id.as_str())?;
            self.output_queried = IoQuery::Storage;
            self.output_store = Some(OutputStore::Own(store));
            let dirs = self.internal_dirs.clone();
            let store = self.output_store_mut()?;
            replay_directories(store, &dirs);
            store.open(name)?;
            Ok(store)
        } else {
            Err(self.conflict("source or destination was already requested as a different representation"))
        }
    }

    fn input_store_mut(&mut self) -> Result<&mut dyn Store> {
        match self.input_store.as_mut() {
            Some(store) => Ok(&mut **store),
            None => Err(Error::Storage("no input store".to_string())),
        }
    }

    fn output_store_mut(&mut self) -> Result<&mut dyn Store> {
        match self.output_store.as_mut() {
            Some(OutputStore::Own(store)) => Ok(&mut **store),
            Some(OutputStore::Parent) => match self.parent.as_deref_mut() {
                Some(host) => host.embedding_store(),
                None => Err(Error::Storage("embedded store without a parent chain".to_string())),
            },
            None => Err(Error::Storage("no output store".to_string())),
        }
    }

    fn storage_init_embedding(&mut self, name: &str) -> Result<&mut dyn Store> {
        if self.output_store.is_some() {
            return Err(Error::Storage("output store of an embedded conversion is already set up".to_string()));
        }
        let part_dir = self
            .env
            .part_dir
            .clone()
            .ok_or_else(|| Error::Usage("embedded conversion without a part directory".to_string()))?;
        let dirs = self.internal_dirs.clone();

        let host = self
            .parent
            .as_deref_mut()
            .ok_or_else(|| Error::Storage("embedded store without a parent chain".to_string()))?;
        let store = host.embedding_store()?;
        if store.is_open() {
            store.close()?;
        }
        store.enter_directory(&part_dir)?;
        let depth = 1 + replay_directories(store, &dirs);

        self.output_store = Some(OutputStore::Parent);
        self.output_queried = IoQuery::Storage;
        self.parent_depth = depth;
        log::debug!("Embedding into {} of the parent store", store.current_path());

        store.open(name)?;
        Ok(store)
    }

    /// The current input as a live document.
    pub fn input_document(&mut self) -> Result<SharedDocument> {
        match self.input_queried {
            IoQuery::Document => {
                return self
                    .input_document
                    .clone()
                    .ok_or_else(|| Error::Usage("no input document available".to_string()))
            },
            IoQuery::Nil => {},
            _ => return Err(self.conflict("input was already requested as a different representation")),
        }

        let from_caller = match self.env.direction {
            Direction::Export if self.state.contains(ChainState::BEGINNING) => self.env.document.clone(),
            _ => None,
        };
        let document = match from_caller.or_else(|| self.input_document.clone()) {
            Some(document) => document,
            None => {
                let file = self.input_file()?;
                self.create_document_from_file(&file)?
            },
        };
        self.input_document = Some(document.clone());
        self.input_queried = IoQuery::Document;
        Ok(document)
    }

    fn create_document_from_file(&self, file: &Path) -> Result<SharedDocument> {
        let mime = self.link_from();
        let document = self
            .env
            .registry
            .create_document(mime.as_str())
            .ok_or_else(|| Error::NoDocumentHandler(mime.to_string()))?;
        document.borrow_mut().load_native(file)?;
        Ok(document)
    }

    /// A live document the current link writes its output into.
    pub fn output_document(&mut self) -> Result<SharedDocument> {
        if self.is_embedded() {
            return Err(self.conflict("an embedded conversion has to write through storage_file"));
        }
        match self.output_queried {
            IoQuery::Document => {
                return self
                    .output_document
                    .clone()
                    .ok_or_else(|| Error::Usage("no output document available".to_string()))
            },
            IoQuery::Nil => {},
            _ => return Err(self.conflict("output was already requested as a different representation")),
        }

        let into_caller = match self.env.direction {
            Direction::Import if self.state.contains(ChainState::END) => self.env.document.clone(),
            _ => None,
        };
        let document = match into_caller {
            Some(document) => document,
            None => {
                let mime = self.link_to();
                self.env
                    .registry
                    .create_document(mime.as_str())
                    .ok_or_else(|| Error::NoDocumentHandler(mime.to_string()))?
            },
        };
        self.output_document = Some(document.clone());
        self.output_queried = IoQuery::Document;
        Ok(document)
    }

    pub fn enter_directory(&mut self, dir: &str) -> Result<()> {
        if self.output_store.is_some() {
            self.output_store_mut()?.enter_directory(dir)?;
            if matches!(self.output_store, Some(OutputStore::Parent)) {
                self.parent_depth += 1;
            }
        }
        self.internal_dirs.push(dir.to_string());
        Ok(())
    }

    pub fn leave_directory(&mut self) -> Result<()> {
        if self.output_store.is_some() {
            self.output_store_mut()?.leave_directory()?;
            if matches!(self.output_store, Some(OutputStore::Parent)) {
                self.parent_depth = self.parent_depth.saturating_sub(1);
            }
        }
        self.internal_dirs.pop();
        Ok(())
    }

    /// Allocate the next part index of the running link, starting at 1.
    pub fn next_part_index(&mut self) -> usize {
        self.part_index += 1;
        self.part_index
    }

    pub fn record_part(&mut self, part: EmbeddedPart) {
        self.parts.push(part);
    }

    pub fn embedded_parts(&self) -> &[EmbeddedPart] {
        &self.parts
    }

    /// Hand the finished link's output to the next link.
    ///
    /// Closes the input store, deletes input temporaries, finishes an own
    /// output store and promotes output to input. Errors finishing the
    /// output store are returned after everything else has been settled.
    pub fn settle(&mut self) -> Result<()> {
        self.input_queried = IoQuery::Nil;
        self.output_queried = IoQuery::Nil;
        let mut result = Ok(());

        if let Some(mut store) = self.input_store.take() {
            if store.is_open() {
                if let Err(e) = store.close() {
                    log::debug!("Closing input store failed: {}", e);
                }
            }
        }
        self.input_temp = None;
        self.input_file = None;

        if self.output_file.is_some() {
            self.input_file = self.output_file.take();
            self.input_temp = self.output_temp.take();
            match self.output_store.take() {
                Some(OutputStore::Own(mut store)) => {
                    if let Err(e) = store.close().and_then(|_| store.finish()) {
                        log::error!("Could not finish the output store: {}", e);
                        result = Err(e);
                    }
                },
                Some(OutputStore::Parent) => self.release_parent_store(),
                None => {},
            }
        } else if matches!(self.output_store, Some(OutputStore::Parent)) {
            self.output_store = None;
            self.release_parent_store();
        }

        self.input_document = self.output_document.take();
        self.part_index = 0;
        self.parts.clear();
        result
    }

    fn release_parent_store(&mut self) {
        if self.parent_depth == 0 {
            return;
        }
        if let Some(host) = self.parent.as_deref_mut() {
            host.leave_embedding_dirs(self.parent_depth);
        }
        self.parent_depth = 0;
    }

    /// Export ends in a file: save a final document to the export file.
    pub fn finalize(&mut self) -> Result<()> {
        if self.env.direction != Direction::Export {
            return Ok(());
        }
        let Some(document) = self.input_document.take() else {
            return Ok(());
        };
        let export = self
            .env
            .export_file
            .clone()
            .ok_or_else(|| Error::Usage("no export file for this conversion".to_string()))?;
        log::debug!("Saving the output document to {}", export.display());
        document.borrow().save_native(&export)?;
        self.input_file = Some(export);
        self.input_temp = None;
        Ok(())
    }

    /// Take the chain's final artifact. Surviving temporaries are kept.
    pub fn take_output(&mut self) -> Result<ChainOutput> {
        if let Some(document) = self.input_document.take() {
            return Ok(ChainOutput::Document(document));
        }
        let Some(path) = self.input_file.take() else {
            return Ok(ChainOutput::Nothing);
        };
        match self.input_temp.take() {
            Some(temp) if temp.survives() => Ok(ChainOutput::File(temp.keep()?)),
            Some(_) => Ok(ChainOutput::Nothing),
            None => Ok(ChainOutput::File(path)),
        }
    }
}

impl EmbeddingHost for ChainIo<'_> {
    fn embedding_store(&mut self) -> Result<&mut dyn Store> {
        if self.output_store.is_none() {
            let file = self.output_file()?;
            let app_id = self.link_to();
            let store = create_store(self.env.config.store_kind, &file, StoreMode::Write, app_id.as_str())?;
            self.output_store = Some(OutputStore::Own(store));
            self.output_queried = IoQuery::Storage;
            let dirs = self.internal_dirs.clone();
            replay_directories(self.output_store_mut()?, &dirs);
        }
        self.output_store_mut()
    }

    fn leave_embedding_dirs(&mut self, depth: usize) {
        let Ok(store) = self.output_store_mut() else {
            return;
        };
        if store.is_open() {
            if let Err(e) = store.close() {
                log::debug!("Closing embedded stream failed: {}", e);
            }
        }
        for _ in 0..depth {
            if let Err(e) = store.leave_directory() {
                log::warn!("Could not leave embedding directory: {}", e);
                break;
            }
        }
    }

    fn running_peer(&self) -> Option<Rc<dyn EmbeddingPeer>> {
        self.link.as_ref().and_then(|l| l.peer.clone())
    }
}

impl Drop for ChainIo<'_> {
    fn drop(&mut self) {
        self.release_parent_store();
        // Stores first: their files may be temporaries dropped below
        self.input_store = None;
        self.output_store = None;
        self.input_document = None;
        self.output_document = None;
        self.input_temp = None;
        self.output_temp = None;
    }
}

/// Close the open stream, then open `name`.
fn open_next_stream<'s>(store: &'s mut dyn Store, name: &str) -> Result<&'s mut dyn Store> {
    if store.is_open() {
        store.close()?;
    }
    store.open(name)?;
    Ok(store)
}

/// Enter the internal embedding directories; stops at the first failure.
/// Returns how many were entered.
fn replay_directories(store: &mut dyn Store, dirs: &[String]) -> usize {
    let mut entered = 0;
    for dir in dirs {
        if let Err(e) = store.enter_directory(dir) {
            log::debug!("Could not enter internal directory {}: {}", dir, e);
            break;
        }
        entered += 1;
    }
    entered
}

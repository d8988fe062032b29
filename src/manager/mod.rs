//! Conversion manager: the entry point for imports and exports.
//!
//! The manager sniffs source types, resolves the cheapest chain through its
//! [`ConversionGraph`], falls back to an interactive [`MimeTypeChooser`]
//! when no chain exists, runs the chain and reports failures.
//!
//! ```ignore
//! let mut manager = ConversionManager::new(registry.clone()).with_document(doc.clone());
//! match manager.import_document(Path::new("table.csv")) {
//!     Ok(ImportArtifact::Converted(native)) => doc.borrow_mut().load_native(&native)?,
//!     Ok(ImportArtifact::Native(path)) => doc.borrow_mut().load_native(&path)?,
//!     Ok(_) => {},
//!     Err(status) => eprintln!("{}", status),
//! }
//! ```

pub(crate) mod embed;

use crate::chain::{ChainEnv, ChainOutput, ConversionChain};
use crate::config::ManagerConfig;
use crate::document::{native_mime_types, SharedDocument};
use crate::error::{ConversionStatus, Result};
use crate::graph::{ConversionGraph, Direction, ResolvedPath, Route};
use crate::mime::{ExtensionSniffer, MimeSniffer, MimeType};
use crate::progress::{CancellationToken, ProgressTarget};
use crate::registry::ConverterRegistry;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

/// Lets the user pick a MIME type when no conversion path exists.
pub trait MimeTypeChooser {
    /// Pick one of `candidates`, or `None` to give up.
    ///
    /// `hint` is the MIME type that could not be handled.
    fn choose(&self, candidates: &BTreeSet<MimeType>, hint: Option<&str>) -> Option<MimeType>;
}

impl<F> MimeTypeChooser for F
where
    F: Fn(&BTreeSet<MimeType>, Option<&str>) -> Option<MimeType>,
{
    fn choose(&self, candidates: &BTreeSet<MimeType>, hint: Option<&str>) -> Option<MimeType> {
        self(candidates, hint)
    }
}

/// Shows failed conversions to the user.
pub trait ErrorReporter {
    /// Report that converting `path` in `direction` failed with `status`.
    fn report(&self, direction: Direction, path: &Path, status: ConversionStatus);
}

impl<F> ErrorReporter for F
where
    F: Fn(Direction, &Path, ConversionStatus),
{
    fn report(&self, direction: Direction, path: &Path, status: ConversionStatus) {
        self(direction, path, status)
    }
}

/// Default reporter writing to the error log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, direction: Direction, path: &Path, status: ConversionStatus) {
        let verb = match direction {
            Direction::Import => "open",
            Direction::Export => "save",
        };
        log::error!("Could not {} {}. Reason: {}", verb, path.display(), status.message());
    }
}

/// Result of a successful import.
pub enum ImportArtifact {
    /// The file already is in a native format; load it directly.
    Native(PathBuf),
    /// A converted native file. The caller owns it and should delete it.
    Converted(PathBuf),
    /// The manager's document was filled in place.
    InPlace,
    /// A new document was created by the last converter.
    Document(SharedDocument),
}

impl ImportArtifact {
    /// File to load, if the import produced one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ImportArtifact::Native(path) | ImportArtifact::Converted(path) => Some(path.as_path()),
            ImportArtifact::InPlace | ImportArtifact::Document(_) => None,
        }
    }
}

impl fmt::Debug for ImportArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportArtifact::Native(path) => f.debug_tuple("Native").field(path).finish(),
            ImportArtifact::Converted(path) => f.debug_tuple("Converted").field(path).finish(),
            ImportArtifact::InPlace => f.write_str("InPlace"),
            ImportArtifact::Document(doc) => f
                .debug_tuple("Document")
                .field(&doc.borrow().native_mime_type())
                .finish(),
        }
    }
}

/// Façade over graph resolution and chain execution.
pub struct ConversionManager {
    registry: Arc<ConverterRegistry>,
    graph: Option<ConversionGraph>,
    document: Option<SharedDocument>,
    config: ManagerConfig,
    sniffer: Arc<dyn MimeSniffer>,
    chooser: Option<Box<dyn MimeTypeChooser>>,
    reporter: Box<dyn ErrorReporter>,
    progress: ProgressTarget,
    cancel: CancellationToken,
}

impl ConversionManager {
    /// Create a manager over `registry` with default configuration.
    pub fn new(registry: Arc<ConverterRegistry>) -> Self {
        Self {
            registry,
            graph: None,
            document: None,
            config: ManagerConfig::default(),
            sniffer: Arc::new(ExtensionSniffer::new()),
            chooser: None,
            reporter: Box::new(LogReporter),
            progress: ProgressTarget::None,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the document imports go into and exports come from.
    pub fn with_document(mut self, document: SharedDocument) -> Self {
        self.document = Some(document);
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the MIME sniffer.
    pub fn with_sniffer(mut self, sniffer: Arc<dyn MimeSniffer>) -> Self {
        self.sniffer = sniffer;
        self
    }

    /// Set the interactive chooser.
    pub fn with_chooser(mut self, chooser: impl MimeTypeChooser + 'static) -> Self {
        self.chooser = Some(Box::new(chooser));
        self
    }

    /// Set the error reporter.
    pub fn with_error_reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// Share an existing cancellation token.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Set where chain progress goes.
    pub fn with_progress(mut self, progress: ProgressTarget) -> Self {
        self.progress = progress;
        self
    }

    /// Enable or disable batch mode.
    ///
    /// In batch mode the chooser and the error reporter are never called.
    pub fn set_batch_mode(&mut self, batch: bool) {
        self.config.batch_mode = batch;
    }

    /// Whether batch mode is active.
    pub fn is_batch_mode(&self) -> bool {
        self.config.batch_mode
    }

    /// The registry this manager resolves against.
    pub fn registry(&self) -> &Arc<ConverterRegistry> {
        &self.registry
    }

    /// Current configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The document, if one is set.
    pub fn document(&self) -> Option<&SharedDocument> {
        self.document.as_ref()
    }

    /// Token to cancel running and future conversions of this manager.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The conversion graph, rebuilt if the registry changed.
    pub fn graph(&mut self) -> &mut ConversionGraph {
        let generation = self.registry.generation();
        let stale = self.graph.as_ref().map_or(true, |g| g.generation() != generation);
        if stale {
            log::debug!("Building conversion graph for registry generation {}", generation);
            self.graph = Some(ConversionGraph::new(&self.registry));
        }
        self.graph.get_or_insert_with(|| ConversionGraph::new(&self.registry))
    }

    /// Native MIME types of the document, or of all handlers without one.
    pub fn native_mime_types(&self) -> Vec<MimeType> {
        match &self.document {
            Some(document) => native_mime_types(&*document.borrow()),
            None => self.registry.native_mime_types(),
        }
    }

    /// Resolve the cheapest route from `from` to `to` (or the nearest
    /// native type).
    pub fn route(&mut self, from: &str, to: Option<&str>) -> Result<Route> {
        let graph = self.graph();
        graph.set_source_mime_type(from);
        graph.route(to)
    }

    /// MIME types connected to `mime` in `direction`, ignoring weights.
    pub fn mime_filter(&mut self, mime: &str, direction: Direction) -> BTreeSet<MimeType> {
        self.graph().reachable(mime, direction)
    }

    /// Union of [`ConversionManager::mime_filter`] over all native types.
    ///
    /// With [`Direction::Import`] this lists every type that can be opened,
    /// with [`Direction::Export`] every type that can be saved.
    pub fn mime_filter_for_natives(&mut self, direction: Direction) -> BTreeSet<MimeType> {
        let natives = self.native_mime_types();
        self.mime_filter_union(&natives, direction)
    }

    fn mime_filter_union(&mut self, mimes: &[MimeType], direction: Direction) -> BTreeSet<MimeType> {
        let graph = self.graph();
        mimes
            .iter()
            .flat_map(|mime| graph.reachable(mime.as_str(), direction))
            .collect()
    }

    /// Import `path` into a native format.
    ///
    /// Files already in a native format are returned untouched. Otherwise the
    /// cheapest chain to any native type of the document (native or extra
    /// native) is run; ties go to the type declared first.
    pub fn import_document(&mut self, path: &Path) -> std::result::Result<ImportArtifact, ConversionStatus> {
        log::info!("Importing {}", path.display());
        let result = self.import_inner(path);
        if let Err(status) = result {
            self.report(Direction::Import, path, status);
        }
        result
    }

    fn import_inner(&mut self, path: &Path) -> std::result::Result<ImportArtifact, ConversionStatus> {
        if !path.exists() {
            log::warn!("{} does not exist", path.display());
            return Err(ConversionStatus::FileNotFound);
        }
        let Some(mime) = self.sniffer.sniff(path) else {
            log::warn!("No mimetype found for {}", path.display());
            return Err(ConversionStatus::BadMimeType);
        };

        let natives = self.native_mime_types();
        if natives.is_empty() {
            log::error!("No native document type to import {} into", path.display());
            return Err(ConversionStatus::CreationError);
        }
        if natives.contains(&mime) {
            log::debug!("{} already is native ({})", path.display(), mime);
            return Ok(ImportArtifact::Native(path.to_path_buf()));
        }

        let mut route = self.cheapest_route(std::slice::from_ref(&mime), &natives)?;
        if matches!(route, Route::NoPath) && self.can_choose() {
            match self.choose(Direction::Import, &natives, mime.as_str()) {
                Some(choice) if natives.contains(&choice) => {
                    return Ok(ImportArtifact::Native(path.to_path_buf()));
                },
                Some(choice) => route = self.cheapest_route(&[choice], &natives)?,
                None => return Err(ConversionStatus::BadConversionGraph),
            }
        }

        let resolved = match route {
            Route::Path(resolved) => resolved,
            Route::AlreadyNative(_) => return Ok(ImportArtifact::Native(path.to_path_buf())),
            Route::NoPath => {
                log::warn!("No conversion path from {} to a native type", mime);
                return Err(ConversionStatus::BadConversionGraph);
            },
        };

        let env = self.chain_env(Direction::Import, path.to_path_buf(), None);
        match self.run_chain(&resolved, env)? {
            ChainOutput::File(output) => Ok(ImportArtifact::Converted(output)),
            ChainOutput::Document(document) => {
                let in_place = self.document.as_ref().is_some_and(|d| Rc::ptr_eq(d, &document));
                if in_place {
                    Ok(ImportArtifact::InPlace)
                } else {
                    Ok(ImportArtifact::Document(document))
                }
            },
            ChainOutput::Nothing => {
                log::error!("Import of {} produced no output", path.display());
                Err(ConversionStatus::InternalError)
            },
        }
    }

    /// Export the document to `path` as `mime`.
    ///
    /// Without `mime` the destination type is sniffed from `path`, then asked
    /// from the chooser. Native destinations are saved directly.
    pub fn export_document(&mut self, path: &Path, mime: Option<&str>) -> std::result::Result<(), ConversionStatus> {
        log::info!("Exporting to {}", path.display());
        let result = self.export_inner(path, mime);
        if let Err(status) = result {
            self.report(Direction::Export, path, status);
        }
        result
    }

    fn export_inner(&mut self, path: &Path, mime: Option<&str>) -> std::result::Result<(), ConversionStatus> {
        let Some(document) = self.document.clone() else {
            log::error!("No document to export");
            return Err(ConversionStatus::InternalError);
        };
        let natives = native_mime_types(&*document.borrow());

        let requested = mime
            .filter(|m| !m.is_empty())
            .map(MimeType::from)
            .or_else(|| self.sniffer.sniff(path));
        let target = match requested {
            Some(target) => target,
            None if self.can_choose() => match self.choose(Direction::Export, &natives, "") {
                Some(choice) => choice,
                None => return Err(ConversionStatus::BadConversionGraph),
            },
            None => {
                log::warn!("No destination mimetype for {}", path.display());
                return Err(ConversionStatus::BadMimeType);
            },
        };

        if natives.contains(&target) {
            return save_native(&document, path);
        }

        let mut route = self.cheapest_route(&natives, std::slice::from_ref(&target))?;
        if matches!(route, Route::NoPath) && self.can_choose() {
            match self.choose(Direction::Export, &natives, target.as_str()) {
                Some(choice) if natives.contains(&choice) => return save_native(&document, path),
                Some(choice) => route = self.cheapest_route(&natives, &[choice])?,
                None => return Err(ConversionStatus::BadConversionGraph),
            }
        }

        let resolved = match route {
            Route::Path(resolved) => resolved,
            Route::AlreadyNative(_) => return save_native(&document, path),
            Route::NoPath => {
                log::warn!("No conversion path from the document to {}", target);
                return Err(ConversionStatus::BadConversionGraph);
            },
        };

        let env = self.chain_env(Direction::Export, PathBuf::new(), Some(path.to_path_buf()));
        self.run_chain(&resolved, env).map(|_| ())
    }

    /// Cheapest route from any of `sources` to any of `targets`.
    ///
    /// Earlier sources and targets win ties.
    fn cheapest_route(
        &mut self,
        sources: &[MimeType],
        targets: &[MimeType],
    ) -> std::result::Result<Route, ConversionStatus> {
        let graph = self.graph();
        let mut best = Route::NoPath;
        for source in sources {
            graph.set_source_mime_type(source.as_str());
            for target in targets {
                let route = graph.route(Some(target.as_str())).map_err(|e| {
                    log::error!("{}", e);
                    e.status()
                })?;
                let better = match (route.total_weight(), best.total_weight()) {
                    (Some(weight), Some(current)) => weight < current,
                    (Some(_), None) => true,
                    (None, _) => false,
                };
                if better {
                    best = route;
                }
            }
        }
        Ok(best)
    }

    fn can_choose(&self) -> bool {
        !self.config.batch_mode && self.chooser.is_some()
    }

    fn choose(&mut self, direction: Direction, natives: &[MimeType], hint: &str) -> Option<MimeType> {
        let candidates = self.mime_filter_union(natives, direction);
        let chooser = self.chooser.as_ref()?;
        log::debug!("Asking the chooser among {} candidates for {}", candidates.len(), hint);
        let hint = (!hint.is_empty()).then_some(hint);
        chooser.choose(&candidates, hint).filter(|choice| !choice.is_empty())
    }

    fn chain_env(&self, direction: Direction, import_file: PathBuf, export_file: Option<PathBuf>) -> ChainEnv {
        ChainEnv {
            registry: self.registry.clone(),
            sniffer: self.sniffer.clone(),
            config: self.config.clone(),
            direction,
            import_file,
            export_file,
            document: self.document.clone(),
            progress: self.progress.clone(),
            cancel: self.cancel.clone(),
            part_dir: None,
        }
    }

    fn run_chain(&self, path: &ResolvedPath, env: ChainEnv) -> std::result::Result<ChainOutput, ConversionStatus> {
        let chain = ConversionChain::from_path(path);
        chain.dump();
        chain.invoke(env, None)
    }

    fn report(&self, direction: Direction, path: &Path, status: ConversionStatus) {
        if status.is_silent() || self.config.batch_mode {
            log::debug!("Conversion of {} ended with {:?}", path.display(), status);
            return;
        }
        self.reporter.report(direction, path, status);
    }
}

fn save_native(document: &SharedDocument, path: &Path) -> std::result::Result<(), ConversionStatus> {
    document.borrow().save_native(path).map_err(|e| {
        log::error!("Could not save {}: {}", path.display(), e);
        e.status()
    })
}

//! Nested conversions for embedded parts.

use crate::chain::{ChainEnv, ChainIo, ConversionChain, EmbeddingHost, TempArtifact};
use crate::converter::EmbeddedPart;
use crate::error::{ConversionStatus, Error, Result};
use crate::graph::{ConversionGraph, Direction, Route};
use crate::progress::ProgressTarget;
use std::fs::File;
use std::io::Write;

/// Convert one embedded part into the output store of the running link.
///
/// The part is written to a temporary file, converted by a nested
/// export-direction chain and stored under `part<N>` of the parent's
/// output store.
pub(crate) fn embed_part<F>(
    io: &mut ChainIo<'_>,
    key: &str,
    from: &str,
    to: Option<&str>,
    write_contents: F,
) -> Result<EmbeddedPart>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let env = io.env().clone();
    let extension = env.sniffer.extension_for(from);
    let source = TempArtifact::create(&env.config, extension.as_deref(), false)?;
    {
        let mut file = File::create(source.path())?;
        write_contents(&mut file)?;
        file.flush()?;
    }

    let mut graph = ConversionGraph::new(&env.registry);
    graph.set_source_mime_type(from);
    let path = match graph.route(to)? {
        Route::Path(path) => path,
        Route::AlreadyNative(mime) => {
            return Err(Error::Usage(format!(
                "part '{}' is already in {} and needs no conversion",
                key, mime
            )))
        },
        Route::NoPath => {
            log::warn!("No conversion path for embedded part '{}' from {}", key, from);
            return Err(Error::EmbeddedConversion(ConversionStatus::BadConversionGraph));
        },
    };

    let index = io.next_part_index();
    let directory = format!("part{}", index);
    log::debug!("Embedding part '{}' ({} -> {}) into {}", key, from, path.target, directory);

    let nested = ChainEnv {
        direction: Direction::Export,
        import_file: source.path().to_path_buf(),
        export_file: None,
        document: None,
        progress: ProgressTarget::None,
        part_dir: Some(directory.clone()),
        ..env
    };
    let chain = ConversionChain::from_path(&path);
    chain.dump();
    let host: &mut dyn EmbeddingHost = &mut *io;
    if let Err(status) = chain.invoke(nested, Some(host)) {
        log::warn!("Embedded conversion of part '{}' failed: {:?}", key, status);
        return Err(Error::EmbeddedConversion(status));
    }
    drop(source);

    let part = EmbeddedPart {
        index,
        key: key.to_string(),
        directory,
        mime: path.target.clone(),
    };
    io.record_part(part.clone());
    Ok(part)
}

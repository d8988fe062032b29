//! Shared fixtures for integration tests: a plain-text native document and
//! a handful of small converters exercising each chain representation.

#![allow(dead_code)]

use filter_chain::{
    ConversionContext, ConversionStatus, Converter, ConverterDescriptor, ConverterFactory, ConverterRegistry,
    DocumentFactory, ExtensionSniffer, MimeType, NativeDocument, Result, SharedDocument, StoreMode,
};
use std::any::Any;
use std::cell::RefCell;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const NOTE: &str = "application/x-note";
pub const NOTE_LEGACY: &str = "application/x-note-legacy";

/// Native document holding plain text.
pub struct Note {
    pub text: String,
    pub extra: Vec<MimeType>,
}

impl NativeDocument for Note {
    fn native_mime_type(&self) -> &str {
        NOTE
    }

    fn extra_native_mime_types(&self) -> Vec<MimeType> {
        self.extra.clone()
    }

    fn load_native(&mut self, path: &Path) -> Result<()> {
        self.text = fs::read_to_string(path)?;
        Ok(())
    }

    fn save_native(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.text)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub fn note(text: &str) -> SharedDocument {
    Rc::new(RefCell::new(Note {
        text: text.to_string(),
        extra: Vec::new(),
    }))
}

pub fn note_text(document: &SharedDocument) -> String {
    let document = document.borrow();
    document
        .as_any()
        .downcast_ref::<Note>()
        .map(|n| n.text.clone())
        .unwrap_or_default()
}

pub fn note_factory() -> Arc<dyn DocumentFactory> {
    Arc::new(|| -> Option<SharedDocument> { Some(note("")) })
}

/// Sniffer knowing the formats used by the tests.
pub fn sniffer() -> Arc<ExtensionSniffer> {
    Arc::new(
        ExtensionSniffer::new()
            .with_mapping("note", NOTE)
            .with_mapping("oldnote", NOTE_LEGACY)
            .with_mapping("a", "text/x-a")
            .with_mapping("b", "text/x-b")
            .with_mapping("c", "text/x-c")
            .with_mapping("raw", "image/x-raw")
            .with_mapping("packed", "image/x-packed"),
    )
}

/// Factory for any converter type.
pub fn factory<C, F>(make: F) -> Arc<dyn ConverterFactory>
where
    C: Converter + 'static,
    F: Fn() -> C + Send + Sync + 'static,
{
    Arc::new(move || Some(Box::new(make()) as Box<dyn Converter>))
}

/// Factory that counts created converters.
pub fn counting_factory<C, F>(make: F, counter: Arc<AtomicUsize>) -> Arc<dyn ConverterFactory>
where
    C: Converter + 'static,
    F: Fn() -> C + Send + Sync + 'static,
{
    Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(make()) as Box<dyn Converter>)
    })
}

pub fn register(registry: &mut ConverterRegistry, name: &str, from: &str, to: &str, weight: u32, f: Arc<dyn ConverterFactory>) {
    registry
        .register_converter(ConverterDescriptor::new(name, &[from], &[to]).with_weight(weight), f)
        .unwrap();
}

fn try_status(result: Result<ConversionStatus>) -> ConversionStatus {
    result.unwrap_or_else(|e| e.status())
}

/// File to file, appending a tag.
pub struct Append(pub &'static str);

impl Converter for Append {
    fn convert(&mut self, ctx: &mut ConversionContext<'_, '_>, _from: &MimeType, _to: &MimeType) -> ConversionStatus {
        try_status((|| -> Result<ConversionStatus> {
            let input = ctx.input_file()?;
            let text = fs::read_to_string(input)?;
            let output = ctx.output_file()?;
            fs::write(output, format!("{}{}", text, self.0))?;
            Ok(ConversionStatus::Ok)
        })())
    }
}

/// Always fails with the given status.
pub struct Fail(pub ConversionStatus);

impl Converter for Fail {
    fn convert(&mut self, ctx: &mut ConversionContext<'_, '_>, _from: &MimeType, _to: &MimeType) -> ConversionStatus {
        // Touch the output so a temporary exists when failing
        let _ = ctx.output_file();
        self.0
    }
}

/// File input to a `content.txt` stream of the output store.
pub struct StoreWriter;

impl Converter for StoreWriter {
    fn convert(&mut self, ctx: &mut ConversionContext<'_, '_>, _from: &MimeType, _to: &MimeType) -> ConversionStatus {
        try_status((|| -> Result<ConversionStatus> {
            let text = fs::read_to_string(ctx.input_file()?)?;
            let store = ctx.storage_file("content.txt", StoreMode::Write)?;
            store.write_all(text.as_bytes())?;
            Ok(ConversionStatus::Ok)
        })())
    }
}

/// `content.txt` of the input store to a plain output file.
pub struct StoreReader(pub &'static str);

impl Converter for StoreReader {
    fn convert(&mut self, ctx: &mut ConversionContext<'_, '_>, _from: &MimeType, _to: &MimeType) -> ConversionStatus {
        try_status((|| -> Result<ConversionStatus> {
            let mut text = String::new();
            ctx.storage_file("content.txt", StoreMode::Read)?.read_to_string(&mut text)?;
            let output = ctx.output_file()?;
            fs::write(output, format!("{}{}", text, self.0))?;
            Ok(ConversionStatus::Ok)
        })())
    }
}

/// File input into the output document.
pub struct IntoDocument;

impl Converter for IntoDocument {
    fn convert(&mut self, ctx: &mut ConversionContext<'_, '_>, _from: &MimeType, _to: &MimeType) -> ConversionStatus {
        try_status((|| -> Result<ConversionStatus> {
            let text = fs::read_to_string(ctx.input_file()?)?;
            let document = ctx.output_document()?;
            let mut document = document.borrow_mut();
            if let Some(note) = document.as_any_mut().downcast_mut::<Note>() {
                note.text = format!("{}+doc", text);
            }
            Ok(ConversionStatus::Ok)
        })())
    }
}

/// Input document to an output file.
pub struct FromDocument;

impl Converter for FromDocument {
    fn convert(&mut self, ctx: &mut ConversionContext<'_, '_>, _from: &MimeType, _to: &MimeType) -> ConversionStatus {
        try_status((|| -> Result<ConversionStatus> {
            let document = ctx.input_document()?;
            let text = document.borrow().as_any().downcast_ref::<Note>().map(|n| n.text.clone());
            let output = ctx.output_file()?;
            fs::write(output, format!("{}+file", text.unwrap_or_default()))?;
            Ok(ConversionStatus::Ok)
        })())
    }
}

/// Asks for its input twice in different representations, then claims success.
pub struct Confused;

impl Converter for Confused {
    fn convert(&mut self, ctx: &mut ConversionContext<'_, '_>, _from: &MimeType, _to: &MimeType) -> ConversionStatus {
        let _ = ctx.input_file();
        let _ = ctx.input_document();
        ConversionStatus::Ok
    }
}

/// Files in `dir`, sorted.
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    files.sort();
    files
}

/// Write `contents` to `dir/name`.
pub fn write_input(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

//! Import/export façade: shortcuts, chooser fallback and error reporting.

mod common;

use common::*;
use filter_chain::{
    ConversionManager, ConversionStatus, ConverterRegistry, Direction, ImportArtifact, ManagerConfig, MimeType,
};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use tempfile::tempdir;

fn set(mimes: &[&str]) -> BTreeSet<MimeType> {
    mimes.iter().map(|m| MimeType::from(*m)).collect()
}

fn manager(registry: ConverterRegistry, tmp: &Path) -> ConversionManager {
    ConversionManager::new(Arc::new(registry))
        .with_sniffer(sniffer())
        .with_config(ManagerConfig::new().with_temp_dir(tmp))
}

type Calls = Rc<RefCell<Vec<(BTreeSet<MimeType>, Option<String>)>>>;

/// Chooser recording its calls and always answering `answer`.
fn recording_chooser(
    answer: Option<&'static str>,
) -> (Calls, impl Fn(&BTreeSet<MimeType>, Option<&str>) -> Option<MimeType>) {
    let calls: Calls = Rc::new(RefCell::new(Vec::new()));
    let seen = calls.clone();
    let chooser = move |candidates: &BTreeSet<MimeType>, hint: Option<&str>| {
        seen.borrow_mut().push((candidates.clone(), hint.map(str::to_string)));
        answer.map(MimeType::from)
    };
    (calls, chooser)
}

type Reports = Rc<RefCell<Vec<(Direction, PathBuf, ConversionStatus)>>>;

fn recording_reporter() -> (Reports, impl Fn(Direction, &Path, ConversionStatus)) {
    let reports: Reports = Rc::new(RefCell::new(Vec::new()));
    let seen = reports.clone();
    let reporter = move |direction: Direction, path: &Path, status: ConversionStatus| {
        seen.borrow_mut().push((direction, path.to_path_buf(), status));
    };
    (reports, reporter)
}

#[test]
fn test_native_file_is_returned_untouched() {
    let dir = tempdir().unwrap();
    let mut registry = ConverterRegistry::new();
    registry.register_document_handler(NOTE, &[], note_factory());
    let input = write_input(dir.path(), "x.note", "native");

    let mut manager = manager(registry, dir.path());
    let artifact = manager.import_document(&input).unwrap();

    assert!(matches!(artifact, ImportArtifact::Native(ref p) if *p == input));
    assert_eq!(files_in(dir.path()), vec![input]);
}

#[test]
fn test_missing_file_and_unknown_type() {
    let dir = tempdir().unwrap();
    let mut registry = ConverterRegistry::new();
    registry.register_document_handler(NOTE, &[], note_factory());
    let unknown = write_input(dir.path(), "x.qqq", "?");

    let mut manager = manager(registry, dir.path());
    manager.set_batch_mode(true);

    assert_eq!(
        manager.import_document(&dir.path().join("gone.a")).unwrap_err(),
        ConversionStatus::FileNotFound
    );
    assert_eq!(manager.import_document(&unknown).unwrap_err(), ConversionStatus::BadMimeType);
}

#[test]
fn test_extra_native_with_lowest_weight_wins() {
    let dir = tempdir().unwrap();
    let mut registry = ConverterRegistry::new();
    registry.register_document_handler(NOTE, &[NOTE_LEGACY], note_factory());
    register(&mut registry, "a-to-note", "text/x-a", NOTE, 5, factory(|| Append("+note")));
    register(&mut registry, "a-to-legacy", "text/x-a", NOTE_LEGACY, 2, factory(|| Append("+legacy")));
    let input = write_input(dir.path(), "x.a", "in");

    let mut manager = manager(registry, dir.path());
    let artifact = manager.import_document(&input).unwrap();
    let output = artifact.path().unwrap();

    assert_eq!(fs::read_to_string(output).unwrap(), "in+legacy");
    assert_eq!(output.extension().unwrap(), "oldnote");
}

#[test]
fn test_equal_native_weights_prefer_declared_first() {
    let dir = tempdir().unwrap();
    let mut registry = ConverterRegistry::new();
    registry.register_document_handler(NOTE, &[NOTE_LEGACY], note_factory());
    register(&mut registry, "a-to-legacy", "text/x-a", NOTE_LEGACY, 2, factory(|| Append("+legacy")));
    register(&mut registry, "a-to-note", "text/x-a", NOTE, 2, factory(|| Append("+note")));
    let input = write_input(dir.path(), "x.a", "in");

    let mut manager = manager(registry, dir.path());
    let artifact = manager.import_document(&input).unwrap();

    assert_eq!(fs::read_to_string(artifact.path().unwrap()).unwrap(), "in+note");
}

#[test]
fn test_import_without_document_creates_one() {
    let dir = tempdir().unwrap();
    let mut registry = ConverterRegistry::new();
    registry.register_document_handler(NOTE, &[], note_factory());
    register(&mut registry, "a-to-note", "text/x-a", NOTE, 1, factory(|| IntoDocument));
    let input = write_input(dir.path(), "x.a", "fresh");

    let mut manager = manager(registry, dir.path());
    match manager.import_document(&input).unwrap() {
        ImportArtifact::Document(document) => assert_eq!(note_text(&document), "fresh+doc"),
        other => panic!("unexpected artifact {:?}", other),
    }
}

#[test]
fn test_export_chooser_candidates_follow_edges_forward() {
    let dir = tempdir().unwrap();
    let mut registry = ConverterRegistry::new();
    registry.register_document_handler(NOTE, &[], note_factory());
    register(&mut registry, "note-to-a", NOTE, "text/x-a", 1, factory(|| Append("")));
    register(&mut registry, "a-to-b", "text/x-a", "text/x-b", 1, factory(|| Append("")));
    register(&mut registry, "c-to-note", "text/x-c", NOTE, 1, factory(|| Append("")));

    let (calls, chooser) = recording_chooser(None);
    let mut manager = manager(registry, dir.path())
        .with_document(note("body"))
        .with_chooser(chooser);
    let status = manager
        .export_document(&dir.path().join("out.x"), Some("application/x-unknown"))
        .unwrap_err();

    assert_eq!(status, ConversionStatus::BadConversionGraph);
    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, set(&[NOTE, "text/x-a", "text/x-b"]));
    assert_eq!(calls[0].1.as_deref(), Some("application/x-unknown"));
}

#[test]
fn test_batch_mode_never_asks_chooser() {
    let dir = tempdir().unwrap();
    let mut registry = ConverterRegistry::new();
    registry.register_document_handler(NOTE, &[], note_factory());
    register(&mut registry, "note-to-a", NOTE, "text/x-a", 1, factory(|| Append("")));

    let (calls, chooser) = recording_chooser(Some("text/x-a"));
    let mut manager = manager(registry, dir.path())
        .with_document(note("body"))
        .with_chooser(chooser);
    manager.set_batch_mode(true);
    let status = manager
        .export_document(&dir.path().join("out.x"), Some("application/x-unknown"))
        .unwrap_err();

    assert_eq!(status, ConversionStatus::BadConversionGraph);
    assert!(calls.borrow().is_empty());
}

#[test]
fn test_export_chooser_pick_is_converted() {
    let dir = tempdir().unwrap();
    let mut registry = ConverterRegistry::new();
    registry.register_document_handler(NOTE, &[], note_factory());
    register(&mut registry, "note-to-a", NOTE, "text/x-a", 1, factory(|| Append("+a")));

    let (calls, chooser) = recording_chooser(Some("text/x-a"));
    let destination = dir.path().join("out.x");
    let mut manager = manager(registry, dir.path())
        .with_document(note("body"))
        .with_chooser(chooser);
    manager.export_document(&destination, Some("application/x-unknown")).unwrap();

    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(fs::read_to_string(&destination).unwrap(), "body+a");
}

#[test]
fn test_import_chooser_retry_with_picked_type() {
    let dir = tempdir().unwrap();
    let mut registry = ConverterRegistry::new();
    registry.register_document_handler(NOTE, &[], note_factory());
    register(&mut registry, "b-to-note", "text/x-b", NOTE, 1, factory(|| Append("+b")));
    // Sniffs as text/x-c, which nothing converts
    let input = write_input(dir.path(), "x.c", "mislabelled");

    let (calls, chooser) = recording_chooser(Some("text/x-b"));
    let mut manager = manager(registry, dir.path()).with_chooser(chooser);
    let artifact = manager.import_document(&input).unwrap();

    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, set(&[NOTE, "text/x-b"]));
    assert_eq!(calls[0].1.as_deref(), Some("text/x-c"));
    assert_eq!(fs::read_to_string(artifact.path().unwrap()).unwrap(), "mislabelled+b");
}

#[test]
fn test_import_chooser_native_pick_returns_file() {
    let dir = tempdir().unwrap();
    let mut registry = ConverterRegistry::new();
    registry.register_document_handler(NOTE, &[], note_factory());
    let input = write_input(dir.path(), "x.c", "actually a note");

    let (_calls, chooser) = recording_chooser(Some(NOTE));
    let mut manager = manager(registry, dir.path()).with_chooser(chooser);

    assert!(matches!(manager.import_document(&input).unwrap(), ImportArtifact::Native(_)));
}

#[test]
fn test_native_export_saves_directly() {
    let dir = tempdir().unwrap();
    let mut registry = ConverterRegistry::new();
    registry.register_document_handler(NOTE, &[], note_factory());
    let destination = dir.path().join("copy.note");

    let mut manager = manager(registry, dir.path()).with_document(note("as is"));
    manager.export_document(&destination, None).unwrap();

    assert_eq!(fs::read_to_string(&destination).unwrap(), "as is");
}

#[test]
fn test_export_without_type_or_chooser_is_bad_mime_type() {
    let dir = tempdir().unwrap();
    let mut registry = ConverterRegistry::new();
    registry.register_document_handler(NOTE, &[], note_factory());

    let mut manager = manager(registry, dir.path()).with_document(note("x"));
    assert_eq!(
        manager.export_document(&dir.path().join("noext"), None).unwrap_err(),
        ConversionStatus::BadMimeType
    );
}

#[test]
fn test_export_without_document_is_internal_error() {
    let dir = tempdir().unwrap();
    let registry = ConverterRegistry::new();

    let mut manager = manager(registry, dir.path());
    assert_eq!(
        manager.export_document(&dir.path().join("x.a"), None).unwrap_err(),
        ConversionStatus::InternalError
    );
}

#[test]
fn test_mime_filter_for_natives() {
    let dir = tempdir().unwrap();
    let mut registry = ConverterRegistry::new();
    registry.register_document_handler(NOTE, &[], note_factory());
    register(&mut registry, "a-to-note", "text/x-a", NOTE, 1, factory(|| Append("")));
    register(&mut registry, "b-to-a", "text/x-b", "text/x-a", 1, factory(|| Append("")));
    register(&mut registry, "note-to-c", NOTE, "text/x-c", 1, factory(|| Append("")));

    let mut manager = manager(registry, dir.path());

    assert_eq!(
        manager.mime_filter_for_natives(Direction::Import),
        set(&[NOTE, "text/x-a", "text/x-b"])
    );
    assert_eq!(manager.mime_filter_for_natives(Direction::Export), set(&[NOTE, "text/x-c"]));
    assert_eq!(manager.mime_filter("text/x-b", Direction::Export), set(&["text/x-b", "text/x-a", NOTE, "text/x-c"]));
}

#[test]
fn test_reporter_called_for_visible_failures_only() {
    let dir = tempdir().unwrap();
    let mut registry = ConverterRegistry::new();
    registry.register_document_handler(NOTE, &[], note_factory());
    register(
        &mut registry,
        "a-to-note",
        "text/x-a",
        NOTE,
        1,
        factory(|| Fail(ConversionStatus::ParsingError)),
    );
    let broken = write_input(dir.path(), "x.a", "bad");
    let unconvertible = write_input(dir.path(), "x.b", "none");

    let (reports, reporter) = recording_reporter();
    let mut manager = manager(registry, dir.path()).with_error_reporter(reporter);

    assert_eq!(manager.import_document(&broken).unwrap_err(), ConversionStatus::ParsingError);
    // No path: silent
    assert_eq!(
        manager.import_document(&unconvertible).unwrap_err(),
        ConversionStatus::BadConversionGraph
    );

    {
        let reports = reports.borrow();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0], (Direction::Import, broken.clone(), ConversionStatus::ParsingError));
    }

    manager.set_batch_mode(true);
    let _ = manager.import_document(&broken);
    assert_eq!(reports.borrow().len(), 1);
}

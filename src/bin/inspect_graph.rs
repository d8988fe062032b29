//! Inspect a Conversion Graph
//!
//! Loads converter manifests and prints the cheapest chain between two MIME
//! types together with the import and export reachability of the source.
//!
//! Usage:
//!   cargo run --bin inspect_graph -- --manifests converters.json --from text/csv --to application/pdf
//!   cargo run --bin inspect_graph -- --manifests converters.json --from text/csv --native application/x-sheet

use filter_chain::{
    ConversionChain, ConversionStatus, Converter, ConverterDescriptor, ConverterFactory, ConverterRegistry, Direction,
    MimeType, Route, SharedDocument,
};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

struct InspectConfig {
    manifests: PathBuf,
    from: String,
    to: Option<String>,
    natives: Vec<String>,
    verbose: bool,
}

impl InspectConfig {
    fn from_args() -> Option<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut manifests = None;
        let mut from = None;
        let mut to = None;
        let mut natives = Vec::new();
        let mut verbose = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--manifests" | "-m" => {
                    i += 1;
                    manifests = args.get(i).map(PathBuf::from);
                },
                "--from" => {
                    i += 1;
                    from = args.get(i).cloned();
                },
                "--to" => {
                    i += 1;
                    to = args.get(i).cloned();
                },
                "--native" => {
                    i += 1;
                    if let Some(native) = args.get(i) {
                        natives.push(native.clone());
                    }
                },
                "--verbose" | "-v" => {
                    verbose = true;
                },
                other => eprintln!("Ignoring unknown argument {}", other),
            }
            i += 1;
        }

        Some(Self {
            manifests: manifests?,
            from: from?,
            to,
            natives,
            verbose,
        })
    }
}

/// Converters are only described, never run.
struct DescribedOnly;

impl ConverterFactory for DescribedOnly {
    fn create(&self) -> Option<Box<dyn Converter>> {
        None
    }
}

fn print_set(title: &str, mimes: &std::collections::BTreeSet<MimeType>) {
    println!("{} ({}):", title, mimes.len());
    for mime in mimes {
        println!("  {}", mime);
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let Some(config) = InspectConfig::from_args() else {
        eprintln!("Usage: inspect_graph --manifests <file.json> --from <mime> [--to <mime>] [--native <mime>]...");
        return ExitCode::from(2);
    };

    let json = match fs::read_to_string(&config.manifests) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error reading {}: {}", config.manifests.display(), e);
            return ExitCode::FAILURE;
        },
    };
    let descriptors = match ConverterDescriptor::list_from_json(&json) {
        Ok(descriptors) => descriptors,
        Err(e) => {
            eprintln!("Error parsing manifests: {}", e);
            return ExitCode::FAILURE;
        },
    };

    let mut registry = ConverterRegistry::new();
    let factory: Arc<dyn ConverterFactory> = Arc::new(DescribedOnly);
    for descriptor in descriptors {
        let name = descriptor.name.clone();
        if let Err(e) = registry.register_converter(descriptor, factory.clone()) {
            eprintln!("Skipping converter '{}': {}", name, e);
        }
    }
    for native in &config.natives {
        registry.register_document_handler(native, &[], Arc::new(|| -> Option<SharedDocument> { None }));
    }

    let mut graph = filter_chain::ConversionGraph::new(&registry);
    println!(
        "Loaded {} converters: {} MIME types, {} edges",
        registry.converters().len(),
        graph.vertex_count(),
        graph.edge_count()
    );

    graph.set_source_mime_type(&config.from);
    if config.verbose {
        graph.dump();
    }

    let status = match graph.route(config.to.as_deref()) {
        Ok(Route::Path(path)) => {
            let chain = ConversionChain::from_path(&path);
            println!(
                "Cheapest chain {} -> {} (weight {}):",
                path.source, path.target, path.total_weight
            );
            for link in chain.links() {
                println!("  {:<24} {} -> {}  [weight {}]", link.name(), link.from(), link.to(), link.weight());
            }
            ConversionStatus::Ok
        },
        Ok(Route::AlreadyNative(mime)) => {
            println!("{} needs no conversion (already {})", config.from, mime);
            ConversionStatus::Ok
        },
        Ok(Route::NoPath) => {
            println!("No conversion path from {}", config.from);
            ConversionStatus::BadConversionGraph
        },
        Err(e) => {
            eprintln!("Error resolving chain: {}", e);
            e.status()
        },
    };

    print_set("Can be converted into", &graph.reachable(&config.from, Direction::Export));
    print_set("Can be produced from", &graph.reachable(&config.from, Direction::Import));

    if status.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

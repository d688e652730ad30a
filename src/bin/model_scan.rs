//! Model Scan CLI
//!
//! Loads type descriptions, scans them into a registry and inspects the result.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use fhir_metamodel::config::ScannerConfig;
use fhir_metamodel::descriptor::ChildDescriptor;
use fhir_metamodel::model::{load_from_directory, LoadConfig};
use fhir_metamodel::{ModelLibrary, ModelRegistry, ModelScanner, TypeDescriptor};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "model-scan")]
#[command(about = "Scan model type descriptions into a sealed descriptor registry")]
struct Cli {
    /// Config file (defaults to metamodel.toml lookup)
    #[arg(short, long)]
    config: Option<String>,

    /// Model directory; overrides the configured library paths
    #[arg(short, long)]
    model_dir: Vec<PathBuf>,

    /// Root type ids; overrides the configured roots
    #[arg(short, long)]
    root: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print counts and the library fingerprint
    Summary,

    /// Write the registry as JSON
    Export {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Compact JSON regardless of config
        #[arg(long)]
        compact: bool,
    },

    /// Write the reference graph in DOT format
    Dot {
        /// Output file (defaults to registry.dot)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fuzzy search descriptors by name
    Find {
        query: String,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show one descriptor by type id or resource name
    Show { query: String },

    /// List groups of mutually referencing types
    Cycles,

    /// Print the effective configuration as TOML
    Config {
        /// Write it to this file instead
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_library(cli: &Cli, config: &ScannerConfig) -> anyhow::Result<ModelLibrary> {
    let paths = if cli.model_dir.is_empty() {
        config.library_paths()
    } else {
        cli.model_dir.clone()
    };

    let load_config = config.load_config();
    let mut library = if load_config.include_builtins {
        ModelLibrary::with_builtins()
    } else {
        ModelLibrary::new()
    };

    // Built-ins are merged once, not per directory
    let per_dir = LoadConfig {
        include_builtins: false,
        ..load_config
    };
    for path in &paths {
        let loaded = load_from_directory(path, &per_dir)
            .with_context(|| format!("loading model descriptions from {}", path.display()))?;
        library.merge(loaded)?;
    }

    Ok(library)
}

fn scan(cli: &Cli, config: &ScannerConfig, library: &ModelLibrary) -> anyhow::Result<ModelRegistry> {
    let registry = if !cli.root.is_empty() {
        ModelScanner::scan(library, cli.root.iter().cloned())?
    } else if config.scan.scan_all_resources {
        ModelScanner::scan_all(library)?
    } else {
        ModelScanner::scan(library, config.scan.roots.iter().cloned())?
    };
    Ok(registry)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ScannerConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    // Needs no model
    if let Commands::Config { save } = &cli.command {
        match save {
            Some(path) => {
                config.save(path)?;
                println!("Saved configuration to: {}", path.display());
            }
            None => print!("{}", config.to_toml()?),
        }
        return Ok(());
    }

    let library = load_library(&cli, &config)?;
    let registry = scan(&cli, &config, &library)?;

    match &cli.command {
        Commands::Summary => {
            let abstract_types = library.types().filter(|d| d.is_abstract).count();
            println!("Model library: {} type description(s), {} abstract", library.len(), abstract_types);
            println!("  Fingerprint: {}", library.fingerprint());
            println!("Registry: {} descriptor(s)", registry.len());
            println!("  Resources: {}", registry.resources().count());
            println!("  Links: {}", registry.link_count());
            println!("  Reference cycles: {}", registry.cycles().len());
            println!("  Code tables referenced: {}", registry.referenced_code_tables().len());
            println!("  Fingerprint: {}", registry.fingerprint());
        }
        Commands::Export { output, compact } => {
            let json = registry.to_json(config.pretty_output() && !compact)?;
            match output {
                Some(path) => {
                    std::fs::write(path, json)?;
                    println!("Exported registry to: {}", path.display());
                }
                None => println!("{}", json),
            }
        }
        Commands::Dot { output } => {
            let path = output.clone().unwrap_or_else(|| PathBuf::from("registry.dot"));
            std::fs::write(&path, registry.to_dot())?;
            println!("Exported DOT to: {}", path.display());
        }
        Commands::Find { query, limit } => {
            let results = registry.search(query, *limit);
            if results.is_empty() {
                println!("No matches for '{}'", query);
            }
            for result in results {
                println!("{:>5}  {:<10} {:<24} {}", result.score, result.kind, result.name, result.type_id);
            }
        }
        Commands::Show { query } => {
            let Some(descriptor) = registry
                .get(query)
                .or_else(|| registry.resource_by_name_ignore_case(query))
            else {
                bail!("no descriptor for '{}'", query);
            };
            print_descriptor(&registry, descriptor);
        }
        Commands::Cycles => {
            let cycles = registry.cycles();
            if cycles.is_empty() {
                println!("No reference cycles");
            }
            for (i, group) in cycles.iter().enumerate() {
                println!("Cycle {}: {}", i + 1, group.join(" <-> "));
            }
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn cardinality(child: &ChildDescriptor) -> String {
    match child.slot() {
        Some(slot) => match slot.max {
            Some(max) => format!("{}..{}", slot.min, max),
            None => format!("{}..*", slot.min),
        },
        None => "-".to_string(),
    }
}

fn print_descriptor(registry: &ModelRegistry, descriptor: &TypeDescriptor) {
    println!("{} ({}, {})", descriptor.name, descriptor.kind.label(), descriptor.type_id);
    if descriptor.is_datatype() {
        let extension = registry.undeclared_extension();
        let wire_name = registry
            .handle(&descriptor.type_id)
            .and_then(|handle| extension.child_name_for(handle));
        if let Some(wire_name) = wire_name {
            println!("  usable as undeclared extension value: {}", wire_name);
        }
    }
    for child in descriptor.children() {
        let order = child
            .order()
            .map(|o| o.to_string())
            .unwrap_or_else(|| "-".to_string());
        let targets: Vec<&str> = child
            .links()
            .into_iter()
            .map(|(_, link)| {
                registry
                    .resolve(link)
                    .map(|d| d.name.as_str())
                    .unwrap_or(link.target.as_str())
            })
            .collect();
        let marker = if child.is_extension() { "ext" } else { "" };
        println!(
            "  [{:>3}] {:<20} {:<6} {:<3} {}",
            order,
            child.name(),
            cardinality(child),
            marker,
            targets.join(" | ")
        );
    }
}

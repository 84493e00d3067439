//! X4 Catalogue
//!
//! Canonical ware catalogue and hull matcher for X4: Foundations.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use x4_catalogue::{BuildConfig, pipeline, store};

#[derive(Parser)]
#[command(name = "x4-catalogue")]
#[command(about = "Canonical ware catalogue and hull matcher for X4: Foundations")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "x4_catalogue.db")]
    database: PathBuf,

    /// Build configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// Source location plus overrides for the config file.
#[derive(Args)]
struct SourceArgs {
    /// X4 installation (or unpacked data) directory
    x4_root: PathBuf,

    /// Extension precedence, comma separated; overrides the config file
    #[arg(long, value_delimiter = ',')]
    extension_order: Option<Vec<String>>,

    /// Minimum shared tokens for an archetype/macro match
    #[arg(long)]
    min_overlap: Option<usize>,

    /// Ignore every extension
    #[arg(long)]
    base_only: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full build and store the result
    Build {
        #[command(flatten)]
        source: SourceArgs,

        /// Also write the canonical catalogue as JSON
        #[arg(long)]
        catalogue_json: Option<PathBuf>,
    },

    /// Merge production data only and write the canonical JSON
    Catalogue {
        #[command(flatten)]
        source: SourceArgs,

        /// Output file
        #[arg(short, long)]
        out: PathBuf,
    },

    /// List wares from the last build
    ListWares {
        /// Only wares with at least one production method
        #[arg(long)]
        buildable: bool,

        /// Only wares with this transport type (ship, equipment, container, ...)
        #[arg(long)]
        transport: Option<String>,
    },

    /// Show one ware with its production methods
    Ware {
        /// Ware ID
        id: String,
    },

    /// List matched hulls
    Hulls,

    /// List buildable equipment
    Equipment,

    /// List archetypes without a hull
    Unmatched,

    /// Initialize empty database with schema
    Init,
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(path: Option<&Path>, source: &SourceArgs) -> Result<BuildConfig> {
    let mut config = match path {
        Some(path) => BuildConfig::load(path)?,
        None => BuildConfig::default(),
    };
    if let Some(order) = &source.extension_order {
        config.extension_order = order.clone();
    }
    if let Some(min_overlap) = source.min_overlap {
        config.min_overlap = min_overlap;
    }
    if source.base_only {
        config.extensions_enabled = false;
    }
    config.validate()?;
    Ok(config)
}

fn write_json(path: &Path, json: &str) -> Result<()> {
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "wrote catalogue JSON");
    Ok(())
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match &cli.command {
        Commands::Build {
            source,
            catalogue_json,
        } => {
            let config = resolve_config(cli.config.as_deref(), source)?;
            let build = pipeline::build(&source.x4_root, &config)?;

            let mut conn = store::open(&cli.database)?;
            store::write_build(&mut conn, &build)?;
            info!(database = %cli.database.display(), "stored build");

            if let Some(path) = catalogue_json {
                write_json(path, &build.catalogue.to_json()?)?;
            }
            if !build.diagnostics.is_empty() {
                warn!(warnings = build.diagnostics.len(), "see summary for skipped records");
            }
            println!("\n{}", build);
        }

        Commands::Catalogue { source, out } => {
            let config = resolve_config(cli.config.as_deref(), source)?;
            let (catalogue, diagnostics) = pipeline::build_catalogue(&source.x4_root, &config)?;
            write_json(out, &catalogue.to_json()?)?;
            println!(
                "Wrote {} wares ({} buildable) to {}",
                catalogue.len(),
                catalogue.buildable_count(),
                out.display()
            );
            print!("{}", diagnostics);
        }

        Commands::ListWares {
            buildable,
            transport,
        } => {
            let conn = store::open(&cli.database)?;
            let wares = store::list_wares(&conn, *buildable, transport.as_deref())?;
            if wares.is_empty() {
                println!("No wares in database. Run 'build' first.");
            } else {
                println!("{:<45} {:<12} {:<10} {}", "Ware", "Transport", "Buildable", "Source");
                println!("{}", "-".repeat(80));
                for w in wares {
                    println!(
                        "{:<45} {:<12} {:<10} {}",
                        w.id,
                        w.transport,
                        if w.buildable { "yes" } else { "no" },
                        w.defined_in
                    );
                }
            }
        }

        Commands::Ware { id } => {
            let conn = store::open(&cli.database)?;
            match store::get_ware(&conn, id)? {
                Some(ware) => {
                    println!("Ware: {}", ware.summary.id);
                    println!("  Transport: {}", ware.summary.transport);
                    if let Some(name) = &ware.summary.name {
                        println!("  Name: {}", name);
                    }
                    println!("  Defined in: {}", ware.summary.defined_in);
                    if let Some((min, avg, max)) = ware.price {
                        println!("  Price: {} / {} / {}", min, avg, max);
                    }
                    if let Some(component) = &ware.component {
                        println!("  Component: {}", component);
                    }
                    if ware.methods.is_empty() {
                        println!("  Not buildable");
                    }
                    for m in ware.methods {
                        println!(
                            "  Method '{}' ({}): {}s, yields {}",
                            m.method, m.provenance, m.time_s, m.amount
                        );
                        for (resource, amount) in m.resources {
                            println!("    {} x {}", amount, resource);
                        }
                    }
                }
                None => println!("Ware '{}' not found", id),
            }
        }

        Commands::Hulls => {
            let conn = store::open(&cli.database)?;
            let hulls = store::list_hulls(&conn)?;
            if hulls.is_empty() {
                println!("No hulls in database. Run 'build' first.");
            } else {
                println!(
                    "{:<32} {:<4} {:<3} {:<10} {:<9} {:>8} {:>4} {:>3} {:>3} {:>3} {:>4} {:>4}",
                    "Archetype", "Race", "Sz", "Role", "Variant", "Hull", "Crew", "Eng", "Shd",
                    "Wpn", "TurM", "TurL"
                );
                println!("{}", "-".repeat(100));
                for h in hulls {
                    println!(
                        "{:<32} {:<4} {:<3} {:<10} {:<9} {:>8} {:>4} {:>3} {:>3} {:>3} {:>4} {:>4}",
                        h.archetype_id,
                        h.race,
                        h.size,
                        h.role,
                        h.variant,
                        opt(h.hull_hp),
                        opt(h.crew),
                        h.engines,
                        h.shields,
                        h.weapons,
                        h.turrets_m,
                        h.turrets_l
                    );
                }
            }
        }

        Commands::Equipment => {
            let conn = store::open(&cli.database)?;
            let items = store::list_equipment(&conn)?;
            if items.is_empty() {
                println!("No equipment in database. Run 'build' first.");
            } else {
                println!("{:<10} {:<40} {:<30} {:>10}", "Category", "Equipment", "Name", "Price");
                println!("{}", "-".repeat(93));
                for e in items {
                    println!(
                        "{:<10} {:<40} {:<30} {:>10}",
                        e.category,
                        e.equipment_id,
                        e.name,
                        opt(e.price_avg)
                    );
                }
            }
        }

        Commands::Unmatched => {
            let conn = store::open(&cli.database)?;
            let issues = store::list_match_issues(&conn)?;
            if issues.is_empty() {
                println!("Every archetype has a hull.");
            } else {
                for i in issues {
                    print!("  [{}] {}: {}", i.provenance, i.archetype_id, i.reason);
                    match i.tied {
                        Some(tied) => println!(" ({})", tied),
                        None => println!(),
                    }
                }
            }
        }

        Commands::Init => {
            store::open(&cli.database)?;
            println!("Database initialized at: {}", cli.database.display());
        }
    }

    Ok(())
}

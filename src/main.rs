//! Factorio Production Calculator
//!
//! Production rates, machine counts and reactor sizing from recipe-lister dumps.

mod calculator;
mod chain;
mod db;
mod loader;
mod models;
mod modules;
mod power;
mod rates;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use regex::Regex;
use rusqlite::Connection;
use tracing_subscriber::{EnvFilter, fmt};

use crate::calculator::PlanSettings;
use crate::chain::{Process, ProcessChain};
use crate::models::{Catalog, Machine};
use crate::power::SizingConfig;

#[derive(Parser)]
#[command(name = "factorio-calculator")]
#[command(about = "Production rate calculator for Factorio recipe-lister dumps")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "factorio_data.db", global = true)]
    database: PathBuf,

    /// Net rates smaller than this are dropped from totals
    #[arg(long, default_value_t = rates::DEFAULT_EPSILON, global = true)]
    epsilon: f64,

    /// Log debug output to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Import a recipe-lister dump
    Import {
        /// Directory containing (or above) recipe.json
        source_dir: PathBuf,

        /// Clear existing data before import
        #[arg(long)]
        clear: bool,
    },

    /// Show per-process and total I/O with module effects
    Io {
        /// Recipe to run (with --machine)
        #[arg(short, long)]
        recipe: Option<String>,

        /// Machine running the recipe
        #[arg(short, long)]
        machine: Option<String>,

        /// Number of machines
        #[arg(short, long, default_value = "1.0")]
        count: f64,

        /// Chain file (JSON or TOML) instead of a single recipe
        #[arg(short, long, conflicts_with_all = ["recipe", "machine"])]
        file: Option<PathBuf>,

        /// Productivity bonus per module slot
        #[arg(short, long, default_value = "0.0")]
        productivity: f64,
    },

    /// Resolve machine counts for a chain file and show its I/O
    Chain {
        /// Chain file (JSON or TOML)
        file: PathBuf,

        /// Fail when a parent link cannot be matched
        #[arg(long)]
        strict: bool,
    },

    /// Pick the best builder for a recipe and show its rates
    Plan {
        recipe: String,

        /// Number of machines
        #[arg(short, long, default_value = "1.0")]
        count: f64,

        /// Productivity bonus per module slot
        #[arg(short, long, default_value = "0.0")]
        productivity: f64,

        /// Speed multiplier
        #[arg(short, long, default_value = "1.0")]
        speed: f64,

        /// Builder whitelist, one machine per line (ignored if absent)
        #[arg(short, long, default_value = "builders.txt")]
        builders: PathBuf,
    },

    /// List recipes whose name matches a regular expression
    Search { pattern: String },

    /// List machines with their power draw
    Machines,

    /// Size a 3xN reactor block
    Power {
        /// Number of reactors (rounded down to a multiple of three)
        #[arg(short, long, default_value = "9")]
        count: u32,

        #[arg(long, default_value = "nuclear-reactor")]
        reactor: String,

        #[arg(long, default_value = "heat-exchanger")]
        boiler: String,

        #[arg(long, default_value = "steam-turbine")]
        generator: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_catalog(conn: &Connection) -> Result<Catalog> {
    let catalog = db::load_catalog(conn)?;
    if catalog.recipes.is_empty() {
        bail!("No recipes in database. Run 'import' first.");
    }
    Ok(catalog)
}

fn load_chain(path: &Path, catalog: &Catalog) -> Result<ProcessChain> {
    let config = loader::load_chain_config(path)?;
    ProcessChain::from_config(&config, catalog)
        .with_context(|| format!("Invalid chain in {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut conn = Connection::open(&cli.database)
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::Import { source_dir, clear } => {
            let stats = db::import_dump(&mut conn, &source_dir, clear)?;
            println!("{}", stats);
        }

        Commands::Io {
            recipe,
            machine,
            count,
            file,
            productivity,
        } => {
            let catalog = load_catalog(&conn)?;
            let chain = match (file, recipe, machine) {
                (Some(file), _, _) => load_chain(&file, &catalog)?,
                (None, Some(recipe), Some(machine)) => {
                    let process = Process::new(
                        &recipe,
                        catalog.recipe(&recipe)?.clone(),
                        catalog.builder(&machine)?.clone(),
                    )
                    .with_count(count);
                    ProcessChain::new(vec![process])?
                }
                _ => bail!("Give either --file or both --recipe and --machine"),
            };
            let report = chain.module_report(productivity, cli.epsilon)?;
            println!("{}", report);
        }

        Commands::Chain { file, strict } => {
            let catalog = load_catalog(&conn)?;
            let mut chain = load_chain(&file, &catalog)?;
            let mismatches = chain.compute_machine_counts()?;
            if strict && !mismatches.is_empty() {
                bail!("{} parent link(s) could not be matched", mismatches.len());
            }
            println!("{}", chain.report(cli.epsilon));
        }

        Commands::Plan {
            recipe,
            count,
            productivity,
            speed,
            builders,
        } => {
            let catalog = load_catalog(&conn)?;
            let whitelist = calculator::load_builder_whitelist(&builders)?;
            let settings = PlanSettings {
                machine_count: count,
                productivity_per_slot: productivity,
                speed_multiplier: speed,
            };
            let plan = calculator::plan_recipe(&catalog, &recipe, settings, whitelist.as_ref())?;
            println!("{}", plan);
        }

        Commands::Search { pattern } => {
            let catalog = load_catalog(&conn)?;
            let re = Regex::new(&pattern)
                .with_context(|| format!("Invalid pattern '{}'", pattern))?;
            let found = calculator::search_recipes(&catalog, &re);
            if found.is_empty() {
                println!("No recipes match '{}'", pattern);
            } else {
                println!("{:<40} {:<20} {:>8}", "Recipe", "Category", "Time (s)");
                println!("{}", "-".repeat(70));
                for r in found {
                    println!("{:<40} {:<20} {:>8.2}", r.name, r.category, r.energy);
                }
            }
        }

        Commands::Machines => {
            let catalog = db::load_catalog(&conn)?;
            let inserters = db::load_inserters(&conn)?;
            let mut machines: Vec<(&str, &dyn Machine)> = Vec::new();
            for b in catalog.builders.values() {
                let m: &dyn Machine = b;
                machines.push((b.kind(), m));
            }
            for i in &inserters {
                machines.push(("inserter", i));
            }

            if machines.is_empty() {
                println!("No machines in database. Run 'import' first.");
            } else {
                println!(
                    "{:<30} {:<20} {:>10} {:>10}",
                    "Machine", "Kind", "Power (kW)", "Idle (W)"
                );
                println!("{}", "-".repeat(73));
                for (kind, m) in machines {
                    println!(
                        "{:<30} {:<20} {:>10.1} {:>10.0}",
                        m.name(),
                        kind,
                        m.operating_kilowatts(),
                        m.idle_watts()
                    );
                }
            }
        }

        Commands::Power {
            count,
            reactor,
            boiler,
            generator,
        } => {
            let entities = db::load_power_entities(&conn)?;
            let config = SizingConfig::select(&entities, &reactor, &boiler, &generator)?;
            let result = power::calc_3xn(&config, count)?;
            print!("{}", result);
        }
    }

    Ok(())
}

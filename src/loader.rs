//! Recipe-lister dump loading and process chain config parsing
//!
//! The recipe-lister mod writes one JSON object per prototype type, keyed by
//! prototype name (`recipe.json`, `assembling-machine.json`, ...).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::debug;
use walkdir::WalkDir;

use crate::chain::ChainConfig;
use crate::models::{
    AssemblingMachine, Boiler, Catalog, CraftingMachine, Furnace, Generator, Inserter,
    MachineName, PowerEntities, Reactor, Recipe, RecipeName,
};

pub const RECIPE_FILE: &str = "recipe.json";
pub const ASSEMBLER_FILE: &str = "assembling-machine.json";
pub const FURNACE_FILE: &str = "furnace.json";
pub const INSERTER_FILE: &str = "inserter.json";
pub const REACTOR_FILE: &str = "reactor.json";
pub const BOILER_FILE: &str = "boiler.json";
pub const GENERATOR_FILE: &str = "generator.json";

/// Every dump file this tool understands
pub const DUMP_FILES: [&str; 7] = [
    RECIPE_FILE,
    ASSEMBLER_FILE,
    FURNACE_FILE,
    INSERTER_FILE,
    REACTOR_FILE,
    BOILER_FILE,
    GENERATOR_FILE,
];

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: &'static str, dir: PathBuf },

    #[error("no recipe-lister dump (recipe.json) found under {0}")]
    NoDump(PathBuf),

    #[error("unsupported format for file: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error("failed to read {file}: {source}")]
    Io {
        file: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
}

pub fn detect_format(path: &Path) -> Result<Format, LoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        _ => Err(LoadError::UnsupportedFormat(path.to_path_buf())),
    }
}

fn read(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        file: path.to_path_buf(),
        source,
    })
}

fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let content = read(path)?;
    let parse_err = |detail: String| LoadError::Parse {
        file: path.to_path_buf(),
        detail,
    };
    match detect_format(path)? {
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string())),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_err(e.to_string())),
    }
}

fn require(dir: &Path, file: &'static str) -> Result<PathBuf, LoadError> {
    let path = dir.join(file);
    if path.is_file() {
        Ok(path)
    } else {
        Err(LoadError::MissingRequired {
            file,
            dir: dir.to_path_buf(),
        })
    }
}

/// Load a `{name: record}` dump file; a missing optional file yields an empty map.
fn load_records<T: DeserializeOwned>(
    dir: &Path,
    file: &'static str,
    required: bool,
) -> Result<BTreeMap<String, T>, LoadError> {
    let path = dir.join(file);
    if !path.is_file() {
        if required {
            return Err(LoadError::MissingRequired {
                file,
                dir: dir.to_path_buf(),
            });
        }
        debug!(file, dir = %dir.display(), "optional dump file absent");
        return Ok(BTreeMap::new());
    }
    deserialize_file(&path)
}

pub fn load_recipes(dir: &Path) -> Result<BTreeMap<RecipeName, Recipe>, LoadError> {
    let path = require(dir, RECIPE_FILE)?;
    let raw: BTreeMap<String, Recipe> = deserialize_file(&path)?;
    Ok(raw.into_values().map(|r| (r.name.clone(), r)).collect())
}

/// Union of assembling machines and furnaces, keyed by machine name.
pub fn load_builders(dir: &Path) -> Result<BTreeMap<MachineName, CraftingMachine>, LoadError> {
    let assemblers: BTreeMap<String, AssemblingMachine> = load_records(dir, ASSEMBLER_FILE, true)?;
    let furnaces: BTreeMap<String, Furnace> = load_records(dir, FURNACE_FILE, false)?;

    let mut builders = BTreeMap::new();
    for m in assemblers.into_values() {
        builders.insert(m.name.clone(), CraftingMachine::from(m));
    }
    for m in furnaces.into_values() {
        builders.insert(m.name.clone(), CraftingMachine::from(m));
    }
    Ok(builders)
}

pub fn load_inserters(dir: &Path) -> Result<BTreeMap<MachineName, Inserter>, LoadError> {
    let raw: BTreeMap<String, Inserter> = load_records(dir, INSERTER_FILE, false)?;
    Ok(raw.into_values().map(|m| (m.name.clone(), m)).collect())
}

pub fn load_power_entities(dir: &Path) -> Result<PowerEntities, LoadError> {
    let reactors: BTreeMap<String, Reactor> = load_records(dir, REACTOR_FILE, false)?;
    let boilers: BTreeMap<String, Boiler> = load_records(dir, BOILER_FILE, false)?;
    let generators: BTreeMap<String, Generator> = load_records(dir, GENERATOR_FILE, false)?;
    Ok(PowerEntities {
        reactors: reactors.into_values().map(|r| (r.name.clone(), r)).collect(),
        boilers: boilers.into_values().map(|b| (b.name.clone(), b)).collect(),
        generators: generators.into_values().map(|g| (g.name.clone(), g)).collect(),
    })
}

pub fn load_catalog(dir: &Path) -> Result<Catalog, LoadError> {
    Ok(Catalog {
        recipes: load_recipes(dir)?,
        builders: load_builders(dir)?,
    })
}

/// Find the dump directory under `root`: the first directory, in sorted
/// walk order, that contains `recipe.json`.
pub fn find_dump_dir(root: &Path) -> Result<PathBuf, LoadError> {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name() == RECIPE_FILE)
        .and_then(|e| e.path().parent().map(Path::to_path_buf))
        .ok_or_else(|| LoadError::NoDump(root.to_path_buf()))
}

/// Which of the known dump files exist in `dir`
pub fn present_dump_files(dir: &Path) -> Vec<&'static str> {
    DUMP_FILES
        .into_iter()
        .filter(|f| dir.join(f).is_file())
        .collect()
}

/// Load a process chain description (JSON or TOML, by extension).
pub fn load_chain_config(path: &Path) -> Result<ChainConfig, LoadError> {
    deserialize_file(path)
}

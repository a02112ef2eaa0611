//! Process chains: machine count resolution and whole-chain I/O
//!
//! A process may name a parent process and an item. Resolution sizes the
//! child so that it produces exactly what the parent consumes of that item.
//! Only direct parent links are followed, in chain order.

use std::collections::HashSet;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::calculator::{self, CalcError};
use crate::models::{
    Builder, Catalog, CraftingMachine, ItemName, Machine, MachineName, NotFound, Recipe, RecipeName,
};
use crate::modules::{self, ModuleConfig};
use crate::rates::{self, RecipeRates};

/// `parent: {id, component}` in a chain file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParentLink {
    pub id: String,
    #[serde(default)]
    pub component: ItemName,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessConfig {
    pub id: String,
    pub recipe: RecipeName,
    pub machine: MachineName,
    #[serde(default, rename = "machinecount")]
    pub machine_count: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub modules: Option<ModuleConfig>,
    #[serde(default, rename = "beaconmodules")]
    pub beacon_modules: Option<ModuleConfig>,
    #[serde(default)]
    pub parent: Option<ParentLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub processes: Vec<ProcessConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("duplicate process id '{0}'")]
    DuplicateProcessId(String),

    #[error("computing counts for process '{process}': no component given for parent '{parent}'")]
    MissingComponentId { process: String, parent: String },

    #[error("process '{process}': {source}")]
    InvalidProcess {
        process: String,
        #[source]
        source: CalcError,
    },

    #[error(transparent)]
    NotFound(#[from] NotFound),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchReason {
    ParentDoesNotConsume,
    ChildDoesNotProduce,
}

impl std::fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MismatchReason::ParentDoesNotConsume => write!(f, "parent does not consume item"),
            MismatchReason::ChildDoesNotProduce => write!(f, "child does not produce item"),
        }
    }
}

/// A parent link that could not be satisfied. The child keeps its count.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unable to match production of '{item}' by '{child}' for '{parent}': {reason}")]
pub struct ProductionMismatch {
    pub child: String,
    pub parent: String,
    pub item: ItemName,
    pub reason: MismatchReason,
}

/// One recipe running on some number of identical machines
#[derive(Debug, Clone, PartialEq)]
pub struct Process {
    pub id: String,
    pub recipe: Recipe,
    pub machine: CraftingMachine,
    pub machine_count: f64,
    pub modules: Option<ModuleConfig>,
    pub beacon_modules: Option<ModuleConfig>,
    pub notes: Option<String>,
    pub parent: Option<ParentLink>,
}

impl Process {
    pub fn new(id: &str, recipe: Recipe, machine: CraftingMachine) -> Self {
        Process {
            id: id.to_string(),
            recipe,
            machine,
            machine_count: 1.0,
            modules: None,
            beacon_modules: None,
            notes: None,
            parent: None,
        }
    }

    pub fn with_count(mut self, machine_count: f64) -> Self {
        self.machine_count = machine_count;
        self
    }

    #[cfg(test)]
    pub fn with_parent(mut self, parent_id: &str, component: &str) -> Self {
        self.parent = Some(ParentLink {
            id: parent_id.to_string(),
            component: component.to_string(),
        });
        self
    }

    pub fn seconds_per_cycle(&self) -> f64 {
        self.recipe.energy / self.machine.crafting_speed()
    }

    pub fn items_per_cycle_per_machine(&self) -> RecipeRates {
        let mut rates = RecipeRates::new();
        for item in &self.recipe.ingredients {
            *rates.inputs.entry(item.name.clone()).or_default() += item.expected_per_cycle();
        }
        for item in &self.recipe.products {
            *rates.outputs.entry(item.name.clone()).or_default() += item.expected_per_cycle();
        }
        rates
    }

    pub fn items_per_second_per_machine(&self) -> RecipeRates {
        let seconds = self.seconds_per_cycle();
        self.items_per_cycle_per_machine().map(|x| x / seconds)
    }

    pub fn items_per_second(&self) -> RecipeRates {
        self.items_per_second_per_machine().scale(self.machine_count)
    }

    pub fn module_speed_multiplier(&self) -> f64 {
        modules::combined_speed(self.modules.as_ref(), self.beacon_modules.as_ref())
    }

    /// Total rates with the process's module loadout applied.
    pub fn rates_with_modules(&self, productivity_per_slot: f64) -> Result<RecipeRates, CalcError> {
        let per_machine = calculator::calculate_rates(
            &self.recipe,
            &self.machine,
            productivity_per_slot,
            self.module_speed_multiplier(),
        )?;
        Ok(per_machine.scale(self.machine_count))
    }

    /// Size this process to cover `parent`'s consumption of `item`.
    pub fn match_production(
        &mut self,
        parent: &Process,
        item: &str,
    ) -> Result<f64, ProductionMismatch> {
        let mismatch = |reason| ProductionMismatch {
            child: self.id.clone(),
            parent: parent.id.clone(),
            item: item.to_string(),
            reason,
        };

        let Some(&target) = parent.items_per_second().inputs.get(item) else {
            return Err(mismatch(MismatchReason::ParentDoesNotConsume));
        };
        let produced = self
            .items_per_second_per_machine()
            .outputs
            .get(item)
            .copied()
            .filter(|rate| *rate > 0.0);
        let Some(produced) = produced else {
            return Err(mismatch(MismatchReason::ChildDoesNotProduce));
        };

        self.machine_count = target / produced;
        Ok(self.machine_count)
    }

    fn validate(&self) -> Result<(), ChainError> {
        calculator::cycles_per_second(&self.recipe, &self.machine)
            .map(|_| ())
            .map_err(|source| ChainError::InvalidProcess {
                process: self.id.clone(),
                source,
            })
    }
}

/// Ordered processes with unique ids
#[derive(Debug, Clone, Default)]
pub struct ProcessChain {
    processes: Vec<Process>,
}

impl ProcessChain {
    pub fn new(processes: Vec<Process>) -> Result<Self, ChainError> {
        let mut seen = HashSet::new();
        for p in &processes {
            if !seen.insert(p.id.as_str()) {
                return Err(ChainError::DuplicateProcessId(p.id.clone()));
            }
            p.validate()?;
        }
        Ok(ProcessChain { processes })
    }

    /// Resolve recipe and machine names against the catalog.
    pub fn from_config(config: &ChainConfig, catalog: &Catalog) -> Result<Self, ChainError> {
        let mut processes = Vec::with_capacity(config.processes.len());
        for pc in &config.processes {
            let recipe = catalog.recipe(&pc.recipe)?.clone();
            let machine = catalog.builder(&pc.machine)?.clone();
            processes.push(Process {
                id: pc.id.clone(),
                recipe,
                machine,
                machine_count: pc.machine_count.unwrap_or(1.0),
                modules: pc.modules,
                beacon_modules: pc.beacon_modules,
                notes: pc.notes.clone(),
                parent: pc.parent.clone(),
            });
        }
        Self::new(processes)
    }

    fn index_of(&self, id: &str) -> Result<usize, NotFound> {
        self.processes
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| NotFound::new("process", id))
    }

    #[cfg(test)]
    pub fn process(&self, id: &str) -> Result<&Process, NotFound> {
        self.index_of(id).map(|i| &self.processes[i])
    }

    /// Parent index for every linked process, checking links before anything changes.
    fn resolve_links(&self) -> Result<Vec<(usize, usize, ItemName)>, ChainError> {
        let mut links = Vec::new();
        for (i, p) in self.processes.iter().enumerate() {
            let Some(link) = p.parent.as_ref().filter(|l| !l.id.is_empty()) else {
                continue;
            };
            if link.component.is_empty() {
                return Err(ChainError::MissingComponentId {
                    process: p.id.clone(),
                    parent: link.id.clone(),
                });
            }
            links.push((i, self.index_of(&link.id)?, link.component.clone()));
        }
        Ok(links)
    }

    /// Size every child process to feed its parent.
    ///
    /// Configuration problems abort before any count changes. Links that
    /// cannot be matched are logged and returned; those processes keep
    /// their previous count.
    pub fn compute_machine_counts(&mut self) -> Result<Vec<ProductionMismatch>, ChainError> {
        let mut mismatches = Vec::new();
        for (child, parent, item) in self.resolve_links()? {
            let parent = self.processes[parent].clone();
            match self.processes[child].match_production(&parent, &item) {
                Ok(count) => {
                    debug!(
                        child_process = %self.processes[child].id,
                        parent_process = %parent.id,
                        %item,
                        count,
                        "matched production"
                    );
                }
                Err(mismatch) => {
                    warn!(
                        item = %mismatch.item,
                        child_process = %mismatch.child,
                        parent_process = %mismatch.parent,
                        "{}",
                        mismatch.reason
                    );
                    mismatches.push(mismatch);
                }
            }
        }
        Ok(mismatches)
    }

    /// Net chain inputs and outputs; flows between processes cancel out.
    pub fn total_io(&self, epsilon: f64) -> RecipeRates {
        let per_process: Vec<RecipeRates> =
            self.processes.iter().map(Process::items_per_second).collect();
        rates::split(&rates::sum(&per_process).merge(), epsilon)
    }

    /// Per-process rates from the chain resolver plus the net total.
    pub fn report(&self, epsilon: f64) -> ChainReport {
        let processes = self
            .processes
            .iter()
            .map(|p| ProcessSummary::new(p, p.items_per_second()))
            .collect();
        ChainReport {
            processes,
            total: self.total_io(epsilon),
        }
    }

    /// Per-process rates with module speed and productivity applied.
    pub fn module_report(
        &self,
        productivity_per_slot: f64,
        epsilon: f64,
    ) -> Result<ChainReport, ChainError> {
        let mut processes = Vec::with_capacity(self.processes.len());
        for p in &self.processes {
            let rates = p
                .rates_with_modules(productivity_per_slot)
                .map_err(|source| ChainError::InvalidProcess {
                    process: p.id.clone(),
                    source,
                })?;
            processes.push(ProcessSummary::new(p, rates));
        }
        let total = rates::split(&rates::sum(processes.iter().map(|s| &s.rates)).merge(), epsilon);
        Ok(ChainReport { processes, total })
    }
}

#[derive(Debug)]
pub struct ProcessSummary {
    pub id: String,
    pub recipe: RecipeName,
    pub machine: MachineName,
    pub machine_count: f64,
    pub notes: Option<String>,
    pub modules: Vec<ModuleConfig>,
    pub rates: RecipeRates,
}

impl ProcessSummary {
    fn new(p: &Process, rates: RecipeRates) -> Self {
        ProcessSummary {
            id: p.id.clone(),
            recipe: p.recipe.name.clone(),
            machine: p.machine.name().to_string(),
            machine_count: p.machine_count,
            notes: p.notes.clone(),
            modules: p.modules.into_iter().chain(p.beacon_modules).collect(),
            rates,
        }
    }
}

#[derive(Debug)]
pub struct ChainReport {
    pub processes: Vec<ProcessSummary>,
    pub total: RecipeRates,
}

fn write_rates(
    f: &mut std::fmt::Formatter<'_>,
    rates: &RecipeRates,
    indent: &str,
) -> std::fmt::Result {
    if rates.is_empty() {
        return writeln!(f, "{indent}(nothing in or out)");
    }
    writeln!(f, "{indent}Inputs:")?;
    for (name, rate) in &rates.inputs {
        writeln!(f, "{indent}  {} @ {:.6}/s", name, rate)?;
    }
    writeln!(f, "{indent}Outputs:")?;
    for (name, rate) in &rates.outputs {
        writeln!(f, "{indent}  {} @ {:.6}/s", name, rate)?;
    }
    Ok(())
}

impl std::fmt::Display for ChainReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for p in &self.processes {
            let notes = p.notes.as_deref().map(|n| format!(" ({n})")).unwrap_or_default();
            writeln!(
                f,
                "===== {}: {:.6}x {} running {}{} =====",
                p.id, p.machine_count, p.machine, p.recipe, notes
            )?;
            for m in &p.modules {
                writeln!(f, "  Modules: {m}")?;
            }
            write_rates(f, &p.rates, "  ")?;
            writeln!(f)?;
        }
        writeln!(f, "=== Chain Total ===")?;
        write_rates(f, &self.total, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader;
    use crate::rates::DEFAULT_EPSILON;
    use std::path::PathBuf;

    const EPS: f64 = 1e-6;

    fn testdata() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
    }

    fn catalog() -> Catalog {
        loader::load_catalog(&testdata().join("recipe-lister")).unwrap()
    }

    fn process(catalog: &Catalog, id: &str, recipe: &str, machine: &str) -> Process {
        Process::new(
            id,
            catalog.recipe(recipe).unwrap().clone(),
            catalog.builder(machine).unwrap().clone(),
        )
    }

    fn washing(catalog: &Catalog) -> Process {
        process(catalog, "mud production", "washing-1", "washing-plant-2")
    }

    fn soil(catalog: &Catalog) -> Process {
        process(catalog, "soil manufacturing", "solid-soil", "assembling-machine-2")
    }

    fn soil_chain(catalog: &Catalog) -> ProcessChain {
        ProcessChain::new(vec![
            soil(catalog).with_count(1.0),
            washing(catalog)
                .with_count(0.0)
                .with_parent("soil manufacturing", "solid-mud"),
        ])
        .unwrap()
    }

    fn rates(inputs: &[(&str, f64)], outputs: &[(&str, f64)]) -> RecipeRates {
        RecipeRates {
            inputs: inputs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            outputs: outputs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn seconds_per_cycle_for_washing() {
        let catalog = catalog();
        assert!((washing(&catalog).seconds_per_cycle() - 2.222222).abs() < EPS);
    }

    #[test]
    fn items_per_cycle_ignore_machine() {
        let catalog = catalog();
        let expected = rates(
            &[("water-viscous-mud", 200.0), ("water", 50.0)],
            &[
                ("solid-mud", 0.75),
                ("water-heavy-mud", 200.0),
                ("gas-hydrogen-sulfide", 2.0),
            ],
        );
        let per_cycle = washing(&catalog).with_count(7.0).items_per_cycle_per_machine();
        assert!(per_cycle.approx_eq(&expected, EPS));
    }

    #[test]
    fn items_per_second_for_one_washing_plant() {
        let catalog = catalog();
        let expected = rates(
            &[("water-viscous-mud", 90.0), ("water", 22.5)],
            &[
                ("solid-mud", 0.3375),
                ("water-heavy-mud", 90.0),
                ("gas-hydrogen-sulfide", 0.9),
            ],
        );
        let p = washing(&catalog);
        assert!(p.items_per_second_per_machine().approx_eq(&expected, EPS));
        assert!(p.items_per_second().approx_eq(&expected, EPS));
        assert!(p.with_count(2.0).items_per_second().approx_eq(&expected.scale(2.0), EPS));
    }

    #[test]
    fn match_production_mud_for_soil() {
        let catalog = catalog();
        let parent = soil(&catalog);
        let mut child = washing(&catalog);
        let count = child.match_production(&parent, "solid-mud").unwrap();
        assert!((count - 0.555556).abs() < EPS);
        assert_eq!(count, child.machine_count);
    }

    #[test]
    fn mismatch_leaves_count_unchanged() {
        let catalog = catalog();
        let parent = soil(&catalog);
        let mut child = washing(&catalog).with_count(3.0);

        let err = child.match_production(&parent, "water").unwrap_err();
        assert_eq!(err.reason, MismatchReason::ParentDoesNotConsume);

        let err = child.match_production(&parent, "solid-sand").unwrap_err();
        assert_eq!(err.reason, MismatchReason::ChildDoesNotProduce);
        assert_eq!(child.machine_count, 3.0);
    }

    #[test]
    fn two_process_chain() {
        let catalog = catalog();
        let mut chain = soil_chain(&catalog);
        let mismatches = chain.compute_machine_counts().unwrap();
        assert!(mismatches.is_empty());

        let child = chain.process("mud production").unwrap();
        assert!((child.machine_count - 0.555556).abs() < EPS);
        assert_eq!(chain.process("soil manufacturing").unwrap().machine_count, 1.0);
    }

    #[test]
    fn total_io_cancels_intermediate() {
        let catalog = catalog();
        let mut chain = soil_chain(&catalog);
        chain.compute_machine_counts().unwrap();

        let total = chain.total_io(DEFAULT_EPSILON);
        assert!(!total.inputs.contains_key("solid-mud"));
        assert!(!total.outputs.contains_key("solid-mud"));

        let expected = rates(
            &[
                ("water-viscous-mud", 50.0),
                ("water", 12.5),
                ("solid-sand", 0.1875),
            ],
            &[
                ("solid-soil", 0.1875),
                ("water-heavy-mud", 50.0),
                ("gas-hydrogen-sulfide", 0.5),
            ],
        );
        assert!(total.approx_eq(&expected, EPS), "got {total:?}");
    }

    #[test]
    fn duplicate_ids_rejected() {
        let catalog = catalog();
        let err = ProcessChain::new(vec![washing(&catalog), washing(&catalog)]).unwrap_err();
        assert!(matches!(err, ChainError::DuplicateProcessId(id) if id == "mud production"));
    }

    #[test]
    fn zero_energy_recipe_rejected() {
        let catalog = catalog();
        let mut p = washing(&catalog);
        p.recipe.energy = 0.0;
        let err = ProcessChain::new(vec![p]).unwrap_err();
        assert!(matches!(
            err,
            ChainError::InvalidProcess {
                source: CalcError::InvalidRecipe { .. },
                ..
            }
        ));
    }

    #[test]
    fn stalled_machine_rejected() {
        let catalog = catalog();
        let mut p = washing(&catalog);
        if let CraftingMachine::Assembler(m) = &mut p.machine {
            m.crafting_speed = 0.0;
        }
        let err = ProcessChain::new(vec![p]).unwrap_err();
        assert!(matches!(
            err,
            ChainError::InvalidProcess {
                ref process,
                source: CalcError::InvalidBuilder { .. },
            } if process == "mud production"
        ));
    }

    #[test]
    fn missing_component_is_an_error() {
        let catalog = catalog();
        let mut chain = ProcessChain::new(vec![
            soil(&catalog),
            washing(&catalog).with_count(4.0).with_parent("soil manufacturing", ""),
        ])
        .unwrap();
        let err = chain.compute_machine_counts().unwrap_err();
        assert!(matches!(err, ChainError::MissingComponentId { .. }));
        assert_eq!(chain.process("mud production").unwrap().machine_count, 4.0);
    }

    #[test]
    fn unknown_parent_is_not_found() {
        let catalog = catalog();
        let mut chain =
            ProcessChain::new(vec![washing(&catalog).with_parent("nowhere", "solid-mud")]).unwrap();
        let err = chain.compute_machine_counts().unwrap_err();
        match err {
            ChainError::NotFound(nf) => assert_eq!(nf, NotFound::new("process", "nowhere")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn mismatch_does_not_stop_other_links() {
        let catalog = catalog();
        let mut chain = ProcessChain::new(vec![
            soil(&catalog),
            washing(&catalog).with_count(0.0).with_parent("soil manufacturing", "solid-mud"),
            process(&catalog, "second washer", "washing-1", "washing-plant-2")
                .with_count(2.0)
                .with_parent("soil manufacturing", "water-heavy-mud"),
        ])
        .unwrap();

        let mismatches = chain.compute_machine_counts().unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].child, "second washer");
        assert_eq!(chain.process("second washer").unwrap().machine_count, 2.0);
        assert!((chain.process("mud production").unwrap().machine_count - 0.555556).abs() < EPS);
    }

    #[test]
    fn from_config_resolves_catalog_names() {
        let catalog = catalog();
        let config = loader::load_chain_config(&testdata().join("soil.toml")).unwrap();
        let mut chain = ProcessChain::from_config(&config, &catalog).unwrap();

        let washer = chain.process("mud production").unwrap();
        assert_eq!(washer.notes.as_deref(), Some("feeds the soil assemblers"));
        assert_eq!(washer.machine_count, 1.0);

        chain.compute_machine_counts().unwrap();
        assert!((chain.process("mud production").unwrap().machine_count - 0.555556).abs() < EPS);
    }

    #[test]
    fn module_report_from_config_applies_loadout() {
        let catalog = catalog();
        let config = loader::load_chain_config(&testdata().join("soil.toml")).unwrap();
        let chain = ProcessChain::from_config(&config, &catalog).unwrap();
        let report = chain.module_report(0.0, DEFAULT_EPSILON).unwrap();

        let washer = &report.processes[1];
        assert_eq!(washer.id, "mud production");
        assert!((washer.rates.inputs["water"] - 22.5 * 1.3).abs() < EPS);
        assert!(report.to_string().contains("  Modules: 1x speed-1\n"));
    }

    #[test]
    fn from_config_unknown_machine() {
        let catalog = catalog();
        let config = ChainConfig {
            processes: vec![ProcessConfig {
                id: "p".to_string(),
                recipe: "washing-1".to_string(),
                machine: "washing-plant-9".to_string(),
                machine_count: None,
                notes: None,
                modules: None,
                beacon_modules: None,
                parent: None,
            }],
        };
        let err = ProcessChain::from_config(&config, &catalog).unwrap_err();
        assert!(matches!(err, ChainError::NotFound(nf) if nf.kind == "machine"));
    }

    #[test]
    fn module_report_applies_speed() {
        let catalog = catalog();
        let mut p = washing(&catalog);
        p.modules = Some(ModuleConfig {
            module: modules::ModuleKind::Speed,
            level: 1,
            count: 2,
            from_beacon: false,
        });
        let chain = ProcessChain::new(vec![p]).unwrap();
        let report = chain.module_report(0.0, DEFAULT_EPSILON).unwrap();
        assert!((report.processes[0].rates.inputs["water"] - 22.5 * 1.5).abs() < EPS);
        assert!((report.total.inputs["water"] - 22.5 * 1.5).abs() < EPS);
        assert!(report.to_string().contains("  Modules: 2x speed-1\n"));
    }

    #[test]
    fn report_renders_totals() {
        let catalog = catalog();
        let mut chain = soil_chain(&catalog);
        chain.compute_machine_counts().unwrap();
        let text = chain.report(DEFAULT_EPSILON).to_string();
        assert!(text.contains("=== Chain Total ==="));
        assert!(text.contains("solid-soil @ 0.187500/s"));
    }
}

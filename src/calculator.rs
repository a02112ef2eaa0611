//! Recipe rate calculation and builder selection

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use crate::models::{Builder, Catalog, CraftingMachine, Machine, MachineName, NotFound, Recipe};
use crate::rates::RecipeRates;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalcError {
    #[error("recipe '{recipe}' has invalid energy {energy}")]
    InvalidRecipe { recipe: String, energy: f64 },

    #[error("machine '{machine}' has invalid crafting speed {speed}")]
    InvalidBuilder { machine: String, speed: f64 },

    #[error("no builders out of {considered} considered support recipe '{recipe}' (category '{category}')")]
    NoBuilderFound {
        recipe: String,
        category: String,
        considered: usize,
    },

    #[error(transparent)]
    NotFound(#[from] NotFound),
}

/// Builder names allowed during selection. Empty means "any".
pub type BuilderWhitelist = BTreeSet<MachineName>;

/// Crafting cycles per second, rejecting data that would divide by zero.
pub fn cycles_per_second(recipe: &Recipe, builder: &dyn Builder) -> Result<f64, CalcError> {
    if !(recipe.energy.is_finite() && recipe.energy > 0.0) {
        return Err(CalcError::InvalidRecipe {
            recipe: recipe.name.clone(),
            energy: recipe.energy,
        });
    }
    let speed = builder.crafting_speed();
    if !(speed.is_finite() && speed > 0.0) {
        return Err(CalcError::InvalidBuilder {
            machine: builder.name().to_string(),
            speed,
        });
    }
    Ok(speed / recipe.energy)
}

/// Steady-state per-second rates for one builder running `recipe`.
///
/// Productivity (`module_inventory_size * productivity_per_slot`) only
/// boosts outputs. The speed multiplier scales both sides.
pub fn calculate_rates(
    recipe: &Recipe,
    builder: &dyn Builder,
    productivity_per_slot: f64,
    speed_multiplier: f64,
) -> Result<RecipeRates, CalcError> {
    let cycles = cycles_per_second(recipe, builder)?;
    let productivity = 1.0 + f64::from(builder.module_inventory_size()) * productivity_per_slot;

    let mut rates = RecipeRates::new();
    for ingredient in &recipe.ingredients {
        *rates.inputs.entry(ingredient.name.clone()).or_default() +=
            cycles * ingredient.amount * speed_multiplier;
    }
    for product in &recipe.products {
        *rates.outputs.entry(product.name.clone()).or_default() +=
            cycles * product.expected_per_cycle() * speed_multiplier * productivity;
    }
    Ok(rates)
}

/// Pick the builder for `recipe`: most module slots, then fastest.
///
/// Ties keep the first builder visited, and the catalog visits in name order.
pub fn find_best_builder<'a>(
    catalog: &'a Catalog,
    recipe: &Recipe,
    whitelist: Option<&BuilderWhitelist>,
) -> Result<&'a CraftingMachine, CalcError> {
    let whitelist = whitelist.filter(|w| !w.is_empty());
    let mut considered = 0;
    let mut best: Option<&CraftingMachine> = None;

    for builder in catalog.builders.values() {
        if !builder.supports_category(&recipe.category) {
            continue;
        }
        considered += 1;
        debug!(builder = builder.name(), recipe = %recipe.name, "considered");

        if whitelist.is_some_and(|w| !w.contains(builder.name())) {
            continue;
        }

        best = match best {
            None => Some(builder),
            Some(current) if outranks(builder, current) => Some(builder),
            keep => keep,
        };
    }

    best.ok_or_else(|| CalcError::NoBuilderFound {
        recipe: recipe.name.clone(),
        category: recipe.category.clone(),
        considered,
    })
}

fn outranks(candidate: &CraftingMachine, current: &CraftingMachine) -> bool {
    let slots = (candidate.module_inventory_size(), current.module_inventory_size());
    if slots.0 != slots.1 {
        return slots.0 > slots.1;
    }
    candidate.crafting_speed() > current.crafting_speed()
}

/// Load a whitelist file: one machine name per line.
///
/// A path that is not a file means no whitelist.
pub fn load_builder_whitelist(path: &Path) -> Result<Option<BuilderWhitelist>> {
    if !path.is_file() {
        debug!(path = %path.display(), "no builder whitelist, considering all builders");
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read builder whitelist {}", path.display()))?;
    let whitelist = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    Ok(Some(whitelist))
}

/// Recipes whose name matches `pattern`, in name order.
pub fn search_recipes<'a>(catalog: &'a Catalog, pattern: &Regex) -> Vec<&'a Recipe> {
    catalog
        .recipes
        .values()
        .filter(|r| pattern.is_match(&r.name))
        .collect()
}

/// Knobs for the `plan` command
#[derive(Debug, Clone, Copy)]
pub struct PlanSettings {
    pub machine_count: f64,
    pub productivity_per_slot: f64,
    pub speed_multiplier: f64,
}

impl Default for PlanSettings {
    fn default() -> Self {
        PlanSettings {
            machine_count: 1.0,
            productivity_per_slot: 0.0,
            speed_multiplier: 1.0,
        }
    }
}

/// Result of planning a recipe on its best builder
#[derive(Debug)]
pub struct Plan<'a> {
    pub recipe: &'a Recipe,
    pub builder: &'a CraftingMachine,
    pub machine_count: f64,
    pub rates: RecipeRates,
}

/// Select a builder for `recipe_name` and compute total rates for `machine_count` of them.
pub fn plan_recipe<'a>(
    catalog: &'a Catalog,
    recipe_name: &str,
    settings: PlanSettings,
    whitelist: Option<&BuilderWhitelist>,
) -> Result<Plan<'a>, CalcError> {
    let recipe = catalog.recipe(recipe_name)?;
    let builder = find_best_builder(catalog, recipe, whitelist)?;
    let per_machine = calculate_rates(
        recipe,
        builder,
        settings.productivity_per_slot,
        settings.speed_multiplier,
    )?;

    Ok(Plan {
        recipe,
        builder,
        machine_count: settings.machine_count,
        rates: per_machine.scale(settings.machine_count),
    })
}

impl std::fmt::Display for Plan<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Producing {} in {:.2}x {}",
            self.recipe.name,
            self.machine_count,
            self.builder.name()
        )?;
        writeln!(f)?;
        writeln!(f, "{:>25}", "----- Inputs: -----")?;
        for (name, rate) in &self.rates.inputs {
            writeln!(f, "{:>25}\t{:.6}", name, rate)?;
        }
        writeln!(f)?;
        writeln!(f, "{:>25}", "----- Outputs: -----")?;
        for (name, rate) in &self.rates.outputs {
            writeln!(f, "{:>25}\t{:.6}", name, rate)?;
        }
        Ok(())
    }
}

//! Data models for recipe-lister game data

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer};

pub type ItemName = String;
pub type RecipeName = String;
pub type MachineName = String;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    #[default]
    Item,
    Fluid,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Item => "item",
            ComponentType::Fluid => "fluid",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "fluid" {
            ComponentType::Fluid
        } else {
            ComponentType::Item
        }
    }
}

/// An ingredient or product of a recipe
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Component {
    #[serde(rename = "type", default)]
    pub kind: ComponentType,
    pub name: ItemName,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub probability: f64, // 0 means "always"
    #[serde(default)]
    pub amount_min: f64,
    #[serde(default)]
    pub amount_max: f64,
}

impl Component {
    #[cfg(test)]
    pub fn fixed(name: &str, amount: f64) -> Self {
        Component {
            name: name.to_string(),
            amount,
            ..Default::default()
        }
    }

    /// Average quantity produced or consumed per crafting cycle.
    ///
    /// A fixed `amount` wins over the `[amount_min, amount_max]` range, and
    /// an unset probability counts as certain.
    pub fn expected_per_cycle(&self) -> f64 {
        let probability = if self.probability > 0.0 {
            self.probability
        } else {
            1.0
        };
        let quantity = if self.amount > 0.0 {
            self.amount
        } else {
            (self.amount_min + self.amount_max) / 2.0
        };
        probability * quantity
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Recipe {
    pub name: RecipeName,
    #[serde(default)]
    pub category: String,
    pub energy: f64,
    #[serde(default)]
    pub ingredients: Vec<Component>,
    #[serde(default)]
    pub products: Vec<Component>,
}

/// Anything placed in the world that draws power
pub trait Machine {
    fn name(&self) -> &str;
    fn operating_watts(&self) -> f64;
    fn idle_watts(&self) -> f64;

    fn operating_kilowatts(&self) -> f64 {
        self.operating_watts() / 1000.0
    }
}

/// A machine that can execute recipes
pub trait Builder: Machine {
    fn crafting_speed(&self) -> f64;
    fn module_inventory_size(&self) -> u32;
    fn supports_category(&self, category: &str) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AssemblingMachine {
    pub name: MachineName,
    #[serde(default)]
    pub energy_usage: f64,
    #[serde(default)]
    pub drain: f64,
    pub crafting_speed: f64,
    #[serde(default)]
    pub module_inventory_size: u32,
    #[serde(default, deserialize_with = "enabled_categories")]
    pub crafting_categories: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Furnace {
    pub name: MachineName,
    #[serde(default)]
    pub energy_usage: f64,
    #[serde(default)]
    pub drain: f64,
    pub crafting_speed: f64,
    #[serde(default)]
    pub module_inventory_size: u32,
    #[serde(default)]
    pub source_inventory_size: u32,
    #[serde(default, deserialize_with = "enabled_categories")]
    pub crafting_categories: BTreeSet<String>,
}

/// Power-only machine, never crafts
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Inserter {
    pub name: MachineName,
    #[serde(rename = "max_energy_usage", default)]
    pub energy_usage: f64,
    #[serde(default)]
    pub drain: f64,
}

/// The dump stores categories as `{"crafting": true, ...}`
fn enabled_categories<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = BTreeMap::<String, bool>::deserialize(deserializer)?;
    Ok(map
        .into_iter()
        .filter(|(_, enabled)| *enabled)
        .map(|(name, _)| name)
        .collect())
}

impl Machine for AssemblingMachine {
    fn name(&self) -> &str {
        &self.name
    }
    fn operating_watts(&self) -> f64 {
        self.energy_usage
    }
    fn idle_watts(&self) -> f64 {
        self.drain
    }
}

impl Builder for AssemblingMachine {
    fn crafting_speed(&self) -> f64 {
        self.crafting_speed
    }
    fn module_inventory_size(&self) -> u32 {
        self.module_inventory_size
    }
    fn supports_category(&self, category: &str) -> bool {
        self.crafting_categories.contains(category)
    }
}

impl Machine for Furnace {
    fn name(&self) -> &str {
        &self.name
    }
    fn operating_watts(&self) -> f64 {
        self.energy_usage
    }
    fn idle_watts(&self) -> f64 {
        self.drain
    }
}

impl Builder for Furnace {
    fn crafting_speed(&self) -> f64 {
        self.crafting_speed
    }
    fn module_inventory_size(&self) -> u32 {
        self.module_inventory_size
    }
    fn supports_category(&self, category: &str) -> bool {
        self.crafting_categories.contains(category)
    }
}

impl Machine for Inserter {
    fn name(&self) -> &str {
        &self.name
    }
    fn operating_watts(&self) -> f64 {
        self.energy_usage
    }
    fn idle_watts(&self) -> f64 {
        self.drain
    }
}

/// Any craft-capable machine in the catalog
#[derive(Debug, Clone, PartialEq)]
pub enum CraftingMachine {
    Assembler(AssemblingMachine),
    Furnace(Furnace),
}

impl CraftingMachine {
    fn as_builder(&self) -> &dyn Builder {
        match self {
            CraftingMachine::Assembler(m) => m,
            CraftingMachine::Furnace(m) => m,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CraftingMachine::Assembler(_) => "assembling-machine",
            CraftingMachine::Furnace(_) => "furnace",
        }
    }

    pub fn categories(&self) -> &BTreeSet<String> {
        match self {
            CraftingMachine::Assembler(m) => &m.crafting_categories,
            CraftingMachine::Furnace(m) => &m.crafting_categories,
        }
    }
}

impl Machine for CraftingMachine {
    fn name(&self) -> &str {
        self.as_builder().name()
    }
    fn operating_watts(&self) -> f64 {
        self.as_builder().operating_watts()
    }
    fn idle_watts(&self) -> f64 {
        self.as_builder().idle_watts()
    }
}

impl Builder for CraftingMachine {
    fn crafting_speed(&self) -> f64 {
        self.as_builder().crafting_speed()
    }
    fn module_inventory_size(&self) -> u32 {
        self.as_builder().module_inventory_size()
    }
    fn supports_category(&self, category: &str) -> bool {
        self.as_builder().supports_category(category)
    }
}

impl From<AssemblingMachine> for CraftingMachine {
    fn from(m: AssemblingMachine) -> Self {
        CraftingMachine::Assembler(m)
    }
}

impl From<Furnace> for CraftingMachine {
    fn from(m: Furnace) -> Self {
        CraftingMachine::Furnace(m)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Reactor {
    pub name: String,
    pub max_energy_usage: f64, // W of heat
    #[serde(default)]
    pub neighbour_bonus: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Boiler {
    pub name: String,
    pub max_energy_usage: f64,
    #[serde(default)]
    pub target_temperature: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Generator {
    pub name: String,
    pub max_energy_production: f64,
    #[serde(default)]
    pub fluid_usage_per_tick: f64,
    #[serde(default)]
    pub maximum_temperature: f64,
}

/// Failed lookup of a named entity
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} '{name}' not found")]
pub struct NotFound {
    pub kind: &'static str,
    pub name: String,
}

impl NotFound {
    pub fn new(kind: &'static str, name: &str) -> Self {
        NotFound {
            kind,
            name: name.to_string(),
        }
    }
}

/// Recipes and builders loaded once per run
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub recipes: BTreeMap<RecipeName, Recipe>,
    pub builders: BTreeMap<MachineName, CraftingMachine>,
}

impl Catalog {
    pub fn recipe(&self, name: &str) -> Result<&Recipe, NotFound> {
        self.recipes
            .get(name)
            .ok_or_else(|| NotFound::new("recipe", name))
    }

    pub fn builder(&self, name: &str) -> Result<&CraftingMachine, NotFound> {
        self.builders
            .get(name)
            .ok_or_else(|| NotFound::new("machine", name))
    }
}

/// Reactor, heat exchanger and turbine records
#[derive(Debug, Clone, Default)]
pub struct PowerEntities {
    pub reactors: BTreeMap<String, Reactor>,
    pub boilers: BTreeMap<String, Boiler>,
    pub generators: BTreeMap<String, Generator>,
}

//! SQLite catalog store
//!
//! `import` copies a recipe-lister dump into the database once; every other
//! command reloads the catalog from here.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::loader;
use crate::models::{
    AssemblingMachine, Boiler, Catalog, Component, ComponentType, CraftingMachine, Furnace,
    Generator, Inserter, PowerEntities, Reactor, Recipe,
};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS recipes (
            name TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            energy REAL NOT NULL
        );

        -- Ingredients and products, in dump order
        CREATE TABLE IF NOT EXISTS recipe_components (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recipe_name TEXT NOT NULL,
            role TEXT NOT NULL,
            position INTEGER NOT NULL,
            item_name TEXT NOT NULL,
            item_type TEXT NOT NULL,
            amount REAL NOT NULL,
            probability REAL NOT NULL,
            amount_min REAL NOT NULL,
            amount_max REAL NOT NULL
        );

        -- Assembling machines, furnaces and inserters
        CREATE TABLE IF NOT EXISTS machines (
            name TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            energy_usage REAL NOT NULL,
            drain REAL NOT NULL,
            crafting_speed REAL,
            module_inventory_size INTEGER,
            source_inventory_size INTEGER
        );

        CREATE TABLE IF NOT EXISTS machine_categories (
            machine_name TEXT,
            category TEXT,
            PRIMARY KEY (machine_name, category)
        );

        CREATE TABLE IF NOT EXISTS reactors (
            name TEXT PRIMARY KEY,
            max_energy_usage REAL NOT NULL,
            neighbour_bonus REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS boilers (
            name TEXT PRIMARY KEY,
            max_energy_usage REAL NOT NULL,
            target_temperature REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS generators (
            name TEXT PRIMARY KEY,
            max_energy_production REAL NOT NULL,
            fluid_usage_per_tick REAL NOT NULL,
            maximum_temperature REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_components_recipe ON recipe_components(recipe_name);
        CREATE INDEX IF NOT EXISTS idx_categories_category ON machine_categories(category);
        "#,
    )?;
    Ok(())
}

/// Clear all imported data
pub fn clear_data(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM recipe_components;
        DELETE FROM recipes;
        DELETE FROM machine_categories;
        DELETE FROM machines;
        DELETE FROM reactors;
        DELETE FROM boilers;
        DELETE FROM generators;
        "#,
    )?;
    Ok(())
}

fn insert_components(
    conn: &Connection,
    recipe: &str,
    role: &str,
    components: &[Component],
) -> Result<()> {
    for (position, c) in components.iter().enumerate() {
        conn.execute(
            "INSERT INTO recipe_components
                (recipe_name, role, position, item_name, item_type, amount, probability, amount_min, amount_max)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                recipe,
                role,
                position as i64,
                c.name,
                c.kind.as_str(),
                c.amount,
                c.probability,
                c.amount_min,
                c.amount_max,
            ],
        )?;
    }
    Ok(())
}

/// Insert or replace a recipe with its components
pub fn upsert_recipe(conn: &Connection, recipe: &Recipe) -> Result<()> {
    conn.execute(
        "DELETE FROM recipe_components WHERE recipe_name = ?1",
        [&recipe.name],
    )?;
    conn.execute(
        "INSERT OR REPLACE INTO recipes (name, category, energy) VALUES (?1, ?2, ?3)",
        params![recipe.name, recipe.category, recipe.energy],
    )?;
    insert_components(conn, &recipe.name, "ingredient", &recipe.ingredients)?;
    insert_components(conn, &recipe.name, "product", &recipe.products)?;
    Ok(())
}

/// Insert or replace a crafting machine and its categories
pub fn upsert_builder(conn: &Connection, machine: &CraftingMachine) -> Result<()> {
    let (name, energy_usage, drain, speed, slots, source_slots) = match machine {
        CraftingMachine::Assembler(m) => (
            &m.name,
            m.energy_usage,
            m.drain,
            m.crafting_speed,
            m.module_inventory_size,
            None,
        ),
        CraftingMachine::Furnace(m) => (
            &m.name,
            m.energy_usage,
            m.drain,
            m.crafting_speed,
            m.module_inventory_size,
            Some(m.source_inventory_size),
        ),
    };
    conn.execute(
        "INSERT OR REPLACE INTO machines
            (name, kind, energy_usage, drain, crafting_speed, module_inventory_size, source_inventory_size)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![name, machine.kind(), energy_usage, drain, speed, slots, source_slots],
    )?;
    conn.execute("DELETE FROM machine_categories WHERE machine_name = ?1", [name])?;
    for category in machine.categories() {
        conn.execute(
            "INSERT INTO machine_categories (machine_name, category) VALUES (?1, ?2)",
            [name, category],
        )?;
    }
    Ok(())
}

pub fn upsert_inserter(conn: &Connection, inserter: &Inserter) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO machines (name, kind, energy_usage, drain) VALUES (?1, 'inserter', ?2, ?3)",
        params![inserter.name, inserter.energy_usage, inserter.drain],
    )?;
    Ok(())
}

pub fn upsert_power_entities(conn: &Connection, power: &PowerEntities) -> Result<()> {
    for r in power.reactors.values() {
        conn.execute(
            "INSERT OR REPLACE INTO reactors (name, max_energy_usage, neighbour_bonus) VALUES (?1, ?2, ?3)",
            params![r.name, r.max_energy_usage, r.neighbour_bonus],
        )?;
    }
    for b in power.boilers.values() {
        conn.execute(
            "INSERT OR REPLACE INTO boilers (name, max_energy_usage, target_temperature) VALUES (?1, ?2, ?3)",
            params![b.name, b.max_energy_usage, b.target_temperature],
        )?;
    }
    for g in power.generators.values() {
        conn.execute(
            "INSERT OR REPLACE INTO generators (name, max_energy_production, fluid_usage_per_tick, maximum_temperature)
             VALUES (?1, ?2, ?3, ?4)",
            params![g.name, g.max_energy_production, g.fluid_usage_per_tick, g.maximum_temperature],
        )?;
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub recipes: usize,
    pub builders: usize,
    pub inserters: usize,
    pub power_entities: usize,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} recipes, {} builders, {} inserters, {} power entities",
            self.recipes, self.builders, self.inserters, self.power_entities
        )
    }
}

/// Load a recipe-lister dump found under `root` and store it.
///
/// Records with the same name are replaced; `clear` drops everything else first.
pub fn import_dump(conn: &mut Connection, root: &Path, clear: bool) -> Result<ImportStats> {
    let dir = loader::find_dump_dir(root)?;
    info!(dir = %dir.display(), files = ?loader::present_dump_files(&dir), "importing dump");

    let catalog = loader::load_catalog(&dir)
        .with_context(|| format!("Failed to load catalog from {}", dir.display()))?;
    let inserters = loader::load_inserters(&dir)?;
    let power = loader::load_power_entities(&dir)?;

    let tx = conn.transaction()?;
    if clear {
        clear_data(&tx)?;
    }
    for recipe in catalog.recipes.values() {
        upsert_recipe(&tx, recipe)?;
    }
    for builder in catalog.builders.values() {
        upsert_builder(&tx, builder)?;
    }
    for inserter in inserters.values() {
        upsert_inserter(&tx, inserter)?;
    }
    upsert_power_entities(&tx, &power)?;
    tx.commit()?;

    Ok(ImportStats {
        recipes: catalog.recipes.len(),
        builders: catalog.builders.len(),
        inserters: inserters.len(),
        power_entities: power.reactors.len() + power.boilers.len() + power.generators.len(),
    })
}

fn load_components(conn: &Connection) -> Result<BTreeMap<(String, String), Vec<Component>>> {
    let mut stmt = conn.prepare(
        "SELECT recipe_name, role, item_name, item_type, amount, probability, amount_min, amount_max
         FROM recipe_components
         ORDER BY recipe_name, role, position",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            (row.get::<_, String>(0)?, row.get::<_, String>(1)?),
            Component {
                name: row.get(2)?,
                kind: ComponentType::parse(&row.get::<_, String>(3)?),
                amount: row.get(4)?,
                probability: row.get(5)?,
                amount_min: row.get(6)?,
                amount_max: row.get(7)?,
            },
        ))
    })?;

    let mut components: BTreeMap<(String, String), Vec<Component>> = BTreeMap::new();
    for row in rows {
        let (key, component) = row?;
        components.entry(key).or_default().push(component);
    }
    Ok(components)
}

fn load_recipes(conn: &Connection) -> Result<BTreeMap<String, Recipe>> {
    let mut components = load_components(conn)?;
    let mut stmt = conn.prepare("SELECT name, category, energy FROM recipes ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(Recipe {
            name: row.get(0)?,
            category: row.get(1)?,
            energy: row.get(2)?,
            ..Default::default()
        })
    })?;

    let mut recipes = BTreeMap::new();
    for row in rows {
        let mut recipe = row?;
        let key = |role: &str| (recipe.name.clone(), role.to_string());
        recipe.ingredients = components.remove(&key("ingredient")).unwrap_or_default();
        recipe.products = components.remove(&key("product")).unwrap_or_default();
        recipes.insert(recipe.name.clone(), recipe);
    }
    Ok(recipes)
}

fn load_builders(conn: &Connection) -> Result<BTreeMap<String, CraftingMachine>> {
    let mut categories: BTreeMap<String, Vec<String>> = BTreeMap::new();
    {
        let mut stmt = conn.prepare("SELECT machine_name, category FROM machine_categories")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (machine, category) = row?;
            categories.entry(machine).or_default().push(category);
        }
    }

    let mut stmt = conn.prepare(
        "SELECT name, kind, energy_usage, drain, crafting_speed, module_inventory_size, source_inventory_size
         FROM machines
         WHERE kind != 'inserter'
         ORDER BY name",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, f64>(2)?,
            row.get::<_, f64>(3)?,
            row.get::<_, Option<f64>>(4)?,
            row.get::<_, Option<u32>>(5)?,
            row.get::<_, Option<u32>>(6)?,
        ))
    })?;

    let mut builders = BTreeMap::new();
    for row in rows {
        let (name, kind, energy_usage, drain, speed, slots, source_slots) = row?;
        let Some(crafting_speed) = speed else {
            bail!("machine '{}' of kind '{}' has no crafting speed", name, kind);
        };
        let crafting_categories = categories
            .remove(&name)
            .unwrap_or_default()
            .into_iter()
            .collect();
        let machine = match kind.as_str() {
            "assembling-machine" => CraftingMachine::Assembler(AssemblingMachine {
                name: name.clone(),
                energy_usage,
                drain,
                crafting_speed,
                module_inventory_size: slots.unwrap_or(0),
                crafting_categories,
            }),
            "furnace" => CraftingMachine::Furnace(Furnace {
                name: name.clone(),
                energy_usage,
                drain,
                crafting_speed,
                module_inventory_size: slots.unwrap_or(0),
                source_inventory_size: source_slots.unwrap_or(0),
                crafting_categories,
            }),
            other => bail!("machine '{}' has unknown kind '{}'", name, other),
        };
        builders.insert(name, machine);
    }
    Ok(builders)
}

/// Load recipes and builders
pub fn load_catalog(conn: &Connection) -> Result<Catalog> {
    let catalog = Catalog {
        recipes: load_recipes(conn)?,
        builders: load_builders(conn)?,
    };
    debug!(recipes = catalog.recipes.len(), builders = catalog.builders.len(), "catalog loaded");
    Ok(catalog)
}

pub fn load_inserters(conn: &Connection) -> Result<Vec<Inserter>> {
    let mut stmt = conn.prepare(
        "SELECT name, energy_usage, drain FROM machines WHERE kind = 'inserter' ORDER BY name",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Inserter {
            name: row.get(0)?,
            energy_usage: row.get(1)?,
            drain: row.get(2)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

pub fn load_power_entities(conn: &Connection) -> Result<PowerEntities> {
    let mut power = PowerEntities::default();

    let mut stmt = conn.prepare("SELECT name, max_energy_usage, neighbour_bonus FROM reactors")?;
    for row in stmt.query_map([], |row| {
        Ok(Reactor {
            name: row.get(0)?,
            max_energy_usage: row.get(1)?,
            neighbour_bonus: row.get(2)?,
        })
    })? {
        let r = row?;
        power.reactors.insert(r.name.clone(), r);
    }

    let mut stmt = conn.prepare("SELECT name, max_energy_usage, target_temperature FROM boilers")?;
    for row in stmt.query_map([], |row| {
        Ok(Boiler {
            name: row.get(0)?,
            max_energy_usage: row.get(1)?,
            target_temperature: row.get(2)?,
        })
    })? {
        let b = row?;
        power.boilers.insert(b.name.clone(), b);
    }

    let mut stmt = conn.prepare(
        "SELECT name, max_energy_production, fluid_usage_per_tick, maximum_temperature FROM generators",
    )?;
    for row in stmt.query_map([], |row| {
        Ok(Generator {
            name: row.get(0)?,
            max_energy_production: row.get(1)?,
            fluid_usage_per_tick: row.get(2)?,
            maximum_temperature: row.get(3)?,
        })
    })? {
        let g = row?;
        power.generators.insert(g.name.clone(), g);
    }

    Ok(power)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Builder, Machine};
    use std::path::PathBuf;

    fn testdata() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
    }

    fn imported() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        import_dump(&mut conn, &testdata(), true).unwrap();
        conn
    }

    #[test]
    fn import_counts_everything() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let stats = import_dump(&mut conn, &testdata(), false).unwrap();
        assert_eq!(stats.recipes, 4);
        assert_eq!(stats.builders, 5);
        assert_eq!(stats.inserters, 2);
        assert_eq!(stats.power_entities, 3);
    }

    #[test]
    fn catalog_round_trips_through_sqlite() {
        let conn = imported();
        let from_db = load_catalog(&conn).unwrap();
        let from_files = loader::load_catalog(&testdata().join("recipe-lister")).unwrap();
        assert_eq!(from_db.recipes, from_files.recipes);
        assert_eq!(from_db.builders, from_files.builders);
    }

    #[test]
    fn component_order_is_preserved() {
        let conn = imported();
        let catalog = load_catalog(&conn).unwrap();
        let names: Vec<_> = catalog.recipes["washing-1"]
            .products
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["water-heavy-mud", "solid-mud", "gas-hydrogen-sulfide"]);
    }

    #[test]
    fn inserters_stay_out_of_the_catalog() {
        let conn = imported();
        let catalog = load_catalog(&conn).unwrap();
        assert!(!catalog.builders.contains_key("inserter"));

        let inserters = load_inserters(&conn).unwrap();
        assert_eq!(inserters.len(), 2);
        assert_eq!(inserters[0].name(), "fast-inserter");
    }

    #[test]
    fn reimport_replaces_data() {
        let mut conn = imported();
        import_dump(&mut conn, &testdata(), false).unwrap();
        let catalog = load_catalog(&conn).unwrap();
        assert_eq!(catalog.recipes["washing-1"].ingredients.len(), 2);
        assert!(catalog.builders["electric-furnace"].supports_category("smelting"));
    }

    #[test]
    fn clear_drops_stale_records() {
        let mut conn = imported();
        upsert_inserter(
            &conn,
            &Inserter {
                name: "stack-inserter".to_string(),
                energy_usage: 133_000.0,
                drain: 1000.0,
            },
        )
        .unwrap();
        import_dump(&mut conn, &testdata(), false).unwrap();
        assert_eq!(load_inserters(&conn).unwrap().len(), 3);

        import_dump(&mut conn, &testdata(), true).unwrap();
        assert_eq!(load_inserters(&conn).unwrap().len(), 2);
    }

    #[test]
    fn power_entities_round_trip() {
        let conn = imported();
        let power = load_power_entities(&conn).unwrap();
        assert_eq!(power.reactors["nuclear-reactor"].max_energy_usage, 40_000_000.0);
        assert_eq!(power.generators["steam-turbine"].maximum_temperature, 500.0);
    }

    #[test]
    fn import_without_dump_fails() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let missing = testdata().join("recipe-lister").join("missing");
        assert!(import_dump(&mut conn, &missing, true).is_err());
    }
}

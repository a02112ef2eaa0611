//! Reactor, heat exchanger and turbine sizing
//!
//! Reactors are laid out in a grid three wide. Each reactor gains
//! `neighbour_bonus` of its base heat for every adjacent reactor.

use crate::models::{Boiler, Generator, NotFound, PowerEntities, Reactor};

/// Water per heat exchanger, per second. Not part of the data dump.
pub const WATER_PER_EXCHANGER: u64 = 120;

const GRID_WIDTH: u32 = 3;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PowerError {
    #[error("{kind} '{name}' has non-positive rating {rating}")]
    InvalidRating {
        kind: &'static str,
        name: String,
        rating: f64,
    },
}

impl Reactor {
    /// Heat output in watts with `neighbours` adjacent reactors.
    pub fn power_out(&self, neighbours: u32) -> u64 {
        let multiplier = 1.0 + f64::from(neighbours) * self.neighbour_bonus;
        (multiplier * self.max_energy_usage) as u64
    }
}

#[derive(Debug, Clone)]
pub struct SizingConfig {
    pub reactor: Reactor,
    pub boiler: Boiler,
    pub generator: Generator,
}

impl SizingConfig {
    pub fn select(
        entities: &PowerEntities,
        reactor: &str,
        boiler: &str,
        generator: &str,
    ) -> Result<Self, NotFound> {
        Ok(SizingConfig {
            reactor: entities
                .reactors
                .get(reactor)
                .cloned()
                .ok_or_else(|| NotFound::new("reactor", reactor))?,
            boiler: entities
                .boilers
                .get(boiler)
                .cloned()
                .ok_or_else(|| NotFound::new("boiler", boiler))?,
            generator: entities
                .generators
                .get(generator)
                .cloned()
                .ok_or_else(|| NotFound::new("generator", generator))?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizingResult {
    pub reactor_qty: u32,
    pub boiler_qty: u64,
    pub generator_qty: u64,
    pub water_required: u64,
    pub heat_watts: u64,
    pub mw_yield: u64,
    pub fuel_consumed_mw: u64,
}

/// Neighbour count of every cell in a `GRID_WIDTH` x `rows` grid.
fn neighbour_counts(rows: u32) -> impl Iterator<Item = u32> {
    (0..rows).flat_map(move |r| {
        (0..GRID_WIDTH).map(move |c| {
            let vertical = u32::from(r > 0) + u32::from(r + 1 < rows);
            let horizontal = u32::from(c > 0) + u32::from(c + 1 < GRID_WIDTH);
            vertical + horizontal
        })
    })
}

/// Size a 3xN reactor block. `reactor_count` is rounded down to a multiple of three.
pub fn calc_3xn(config: &SizingConfig, reactor_count: u32) -> Result<SizingResult, PowerError> {
    let boiler_rating = config.boiler.max_energy_usage;
    if boiler_rating <= 0.0 {
        return Err(PowerError::InvalidRating {
            kind: "boiler",
            name: config.boiler.name.clone(),
            rating: boiler_rating,
        });
    }
    let generator_rating = config.generator.max_energy_production;
    if generator_rating <= 0.0 {
        return Err(PowerError::InvalidRating {
            kind: "generator",
            name: config.generator.name.clone(),
            rating: generator_rating,
        });
    }

    let rows = reactor_count / GRID_WIDTH;
    let reactor_qty = rows * GRID_WIDTH;
    let heat_watts: u64 = neighbour_counts(rows)
        .map(|n| config.reactor.power_out(n))
        .sum();

    let boiler_qty = (heat_watts as f64 / boiler_rating) as u64;
    Ok(SizingResult {
        reactor_qty,
        boiler_qty,
        generator_qty: (heat_watts as f64 / generator_rating) as u64,
        water_required: WATER_PER_EXCHANGER * boiler_qty,
        heat_watts,
        mw_yield: heat_watts / 1_000_000,
        fuel_consumed_mw: (config.reactor.max_energy_usage * f64::from(reactor_qty) / 1_000_000.0)
            as u64,
    })
}

impl std::fmt::Display for SizingResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Reactor Block ===")?;
        writeln!(f, "  Reactors:        {}", self.reactor_qty)?;
        writeln!(f, "  Heat exchangers: {}", self.boiler_qty)?;
        writeln!(f, "  Turbines:        {}", self.generator_qty)?;
        writeln!(f, "  Water:           {}/s", self.water_required)?;
        writeln!(f, "  Heat:            {} MW", self.mw_yield)?;
        writeln!(f, "  Fuel burn:       {} MW", self.fuel_consumed_mw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nuclear() -> SizingConfig {
        SizingConfig {
            reactor: Reactor {
                name: "nuclear-reactor".to_string(),
                max_energy_usage: 40_000_000.0,
                neighbour_bonus: 1.0,
            },
            boiler: Boiler {
                name: "heat-exchanger".to_string(),
                max_energy_usage: 10_000_000.0,
                target_temperature: 500.0,
            },
            generator: Generator {
                name: "steam-turbine".to_string(),
                max_energy_production: 5_820_000.0,
                ..Default::default()
            },
        }
    }

    #[test]
    fn neighbour_bonus() {
        let r = Reactor {
            name: String::new(),
            max_energy_usage: 1000.0,
            neighbour_bonus: 0.125,
        };
        assert_eq!(r.power_out(1), 1125);
        assert_eq!(r.power_out(0), 1000);
    }

    #[test]
    fn grid_neighbours() {
        let counts: Vec<u32> = neighbour_counts(2).collect();
        assert_eq!(counts, vec![2, 3, 2, 2, 3, 2]);
        assert_eq!(neighbour_counts(3).filter(|n| *n == 4).count(), 1);
    }

    #[test]
    fn two_by_three_block() {
        let res = calc_3xn(&nuclear(), 7).unwrap();
        assert_eq!(res.reactor_qty, 6);
        assert_eq!(res.mw_yield, 800);
        assert_eq!(res.boiler_qty, 80);
        assert_eq!(res.water_required, 9600);
        assert_eq!(res.generator_qty, 137);
        assert_eq!(res.fuel_consumed_mw, 240);
    }

    #[test]
    fn fewer_than_three_reactors_is_empty() {
        let res = calc_3xn(&nuclear(), 2).unwrap();
        assert_eq!(res, SizingResult::default());
    }

    #[test]
    fn zero_rated_boiler_rejected() {
        let mut cfg = nuclear();
        cfg.boiler.max_energy_usage = 0.0;
        assert!(matches!(
            calc_3xn(&cfg, 9),
            Err(PowerError::InvalidRating { kind: "boiler", .. })
        ));
    }

    #[test]
    fn select_reports_missing_entity() {
        let entities = PowerEntities::default();
        let err =
            SizingConfig::select(&entities, "fluid-reactor", "heat-exchanger", "steam-turbine")
                .unwrap_err();
        assert_eq!(err, NotFound::new("reactor", "fluid-reactor"));
    }
}

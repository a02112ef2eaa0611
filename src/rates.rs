//! Per-item flow accounting
//!
//! Rates are kept as two non-negative maps. The signed form (inputs
//! negative, outputs positive) is only used to net flows against each other.

use std::collections::BTreeMap;

use crate::models::ItemName;

/// Net rates below this are treated as zero
pub const DEFAULT_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeRates {
    pub inputs: BTreeMap<ItemName, f64>,
    pub outputs: BTreeMap<ItemName, f64>,
}

impl RecipeRates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Combine inputs and outputs in one map, inputs negative.
    pub fn merge(&self) -> BTreeMap<ItemName, f64> {
        let mut all: BTreeMap<ItemName, f64> = BTreeMap::new();
        for (name, rate) in &self.inputs {
            *all.entry(name.clone()).or_default() -= rate;
        }
        for (name, rate) in &self.outputs {
            *all.entry(name.clone()).or_default() += rate;
        }
        all
    }

    pub fn add(&mut self, more: &RecipeRates) {
        for (name, rate) in &more.inputs {
            *self.inputs.entry(name.clone()).or_default() += rate;
        }
        for (name, rate) in &more.outputs {
            *self.outputs.entry(name.clone()).or_default() += rate;
        }
    }

    pub fn scale(&self, factor: f64) -> RecipeRates {
        self.map(|x| x * factor)
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> RecipeRates {
        RecipeRates {
            inputs: self.inputs.iter().map(|(k, v)| (k.clone(), f(*v))).collect(),
            outputs: self.outputs.iter().map(|(k, v)| (k.clone(), f(*v))).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }

    /// Approximate equality, same keys on both sides.
    #[cfg(test)]
    pub fn approx_eq(&self, other: &RecipeRates, threshold: f64) -> bool {
        fn side_eq(a: &BTreeMap<ItemName, f64>, b: &BTreeMap<ItemName, f64>, t: f64) -> bool {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).is_some_and(|w| (v - w).abs() <= t))
        }
        side_eq(&self.inputs, &other.inputs, threshold)
            && side_eq(&self.outputs, &other.outputs, threshold)
    }
}

/// Sum any number of rate sets.
pub fn sum<'a>(all: impl IntoIterator<Item = &'a RecipeRates>) -> RecipeRates {
    let mut total = RecipeRates::new();
    for rates in all {
        total.add(rates);
    }
    total
}

/// Inverse of [`RecipeRates::merge`]. Entries with `|rate| < epsilon` are dropped.
pub fn split(signed: &BTreeMap<ItemName, f64>, epsilon: f64) -> RecipeRates {
    let mut rates = RecipeRates::new();
    for (name, rate) in signed {
        let abs = rate.abs();
        if abs < epsilon {
            continue;
        }
        if *rate < 0.0 {
            rates.inputs.insert(name.clone(), abs);
        } else {
            rates.outputs.insert(name.clone(), abs);
        }
    }
    rates
}

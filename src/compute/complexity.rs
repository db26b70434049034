//! Complexity measures of a trait population.
//!
//! All measures are pure functions of the current population and the trait
//! pool, and all of them return zero for an empty population.

use serde::{Deserialize, Serialize};

use crate::schema::MetricSet;

use super::lineage::{SeedSet, TraitId, TraitPool};

/// Column names of [`MetricSet::Extended`].
pub const EXTENDED_METRIC_NAMES: [&str; 10] = [
    "trait_number",
    "trait_complexity",
    "lineage_number",
    "lineage_complexity_mean",
    "lineage_complexity_max",
    "seed_trait_number",
    "modifications",
    "maximum_utility",
    "minimum_utility",
    "mean_utility",
];

/// Column names of [`MetricSet::Basic`].
pub const BASIC_METRIC_NAMES: [&str; 5] = [
    "trait_number",
    "trait_complexity",
    "lineage_number",
    "lineage_complexity",
    "maximum_utility",
];

/// Every complexity measure of one population snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityMetrics {
    /// Population size.
    pub trait_number: usize,
    /// Mean identifier length.
    pub trait_complexity: f64,
    /// Distinct first seed symbols.
    pub lineage_number: usize,
    /// Mean identifier length without modification markers.
    pub lineage_complexity_mean: f64,
    /// Maximum identifier length without modification markers.
    pub lineage_complexity_max: usize,
    /// Seed symbols appearing anywhere in the population.
    pub seed_trait_number: usize,
    /// Modification markers per trait.
    pub modifications: f64,
    pub maximum_utility: f64,
    pub minimum_utility: f64,
    pub mean_utility: f64,
}

impl ComplexityMetrics {
    /// Measure a population.
    pub fn measure(population: &[TraitId], pool: &TraitPool) -> Self {
        let (lineage_complexity_mean, lineage_complexity_max) =
            lineage_complexity(population, pool);
        let (maximum_utility, minimum_utility, mean_utility) = utility_summary(population, pool);

        Self {
            trait_number: trait_number(population),
            trait_complexity: trait_complexity(population, pool),
            lineage_number: lineage_number(population, pool),
            lineage_complexity_mean,
            lineage_complexity_max,
            seed_trait_number: seed_trait_number(population, pool),
            modifications: modifications(population, pool),
            maximum_utility,
            minimum_utility,
            mean_utility,
        }
    }

    /// Column names for a metric set.
    pub fn names(set: MetricSet) -> &'static [&'static str] {
        match set {
            MetricSet::Basic => &BASIC_METRIC_NAMES,
            MetricSet::Extended => &EXTENDED_METRIC_NAMES,
        }
    }

    /// Values in column order for a metric set.
    pub fn to_vec(&self, set: MetricSet) -> Vec<f64> {
        match set {
            MetricSet::Basic => vec![
                self.trait_number as f64,
                self.trait_complexity,
                self.lineage_number as f64,
                self.lineage_complexity_mean,
                self.maximum_utility,
            ],
            MetricSet::Extended => vec![
                self.trait_number as f64,
                self.trait_complexity,
                self.lineage_number as f64,
                self.lineage_complexity_mean,
                self.lineage_complexity_max as f64,
                self.seed_trait_number as f64,
                self.modifications,
                self.maximum_utility,
                self.minimum_utility,
                self.mean_utility,
            ],
        }
    }
}

/// Number of traits.
#[inline]
pub fn trait_number(population: &[TraitId]) -> usize {
    population.len()
}

/// Mean identifier length.
pub fn trait_complexity(population: &[TraitId], pool: &TraitPool) -> f64 {
    mean(population.iter().map(|&id| pool.get(id).length() as f64))
}

/// Number of lineages, counted by the first seed symbol of each identifier.
pub fn lineage_number(population: &[TraitId], pool: &TraitPool) -> usize {
    let firsts = population
        .iter()
        .fold(SeedSet::default(), |set, &id| {
            set.union(SeedSet::single(pool.get(id).first_seed()))
        });
    firsts.len()
}

/// Mean and maximum identifier length with modification markers stripped.
pub fn lineage_complexity(population: &[TraitId], pool: &TraitPool) -> (f64, usize) {
    let mean_len = mean(population.iter().map(|&id| pool.get(id).seed_count() as f64));
    let max_len = population
        .iter()
        .map(|&id| pool.get(id).seed_count())
        .max()
        .unwrap_or(0);
    (mean_len, max_len)
}

/// Number of distinct seed symbols across all traits.
pub fn seed_trait_number(population: &[TraitId], pool: &TraitPool) -> usize {
    population
        .iter()
        .fold(SeedSet::default(), |set, &id| set.union(pool.get(id).lineage()))
        .len()
}

/// Modification markers per trait.
pub fn modifications(population: &[TraitId], pool: &TraitPool) -> f64 {
    mean(population.iter().map(|&id| pool.get(id).modifications() as f64))
}

/// Maximum, minimum and mean utility of the population.
pub fn utility_summary(population: &[TraitId], pool: &TraitPool) -> (f64, f64, f64) {
    if population.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let mut max = f64::NEG_INFINITY;
    let mut min = f64::INFINITY;
    let mut sum = 0.0;
    for &id in population {
        let u = pool.utility(id);
        max = max.max(u);
        min = min.min(u);
        sum += u;
    }
    (max, min, sum / population.len() as f64)
}

/// Mean utility of the population, zero when empty.
pub fn mean_utility(population: &[TraitId], pool: &TraitPool) -> f64 {
    utility_summary(population, pool).2
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sum::<f64>() / n as f64
}

//! Trajectory engine: one stochastic run of trait evolution.
//!
//! Each iteration draws `r` in `[0, 1)` and fires exactly one event:
//!
//! - **Invention** (`r < rho1`, or whenever the population is empty): a missing
//!   seed trait joins the population.
//! - **Combination** (`r < rho1 + rho2`): two lineage-disjoint members are
//!   concatenated; the child inherits the better parent's utility plus an
//!   increment.
//! - **Modification** (`r < rho1 + rho2 + rho3`): a member gains a modified
//!   variant with the parent's utility plus an increment.
//! - **Loss** (otherwise, loss variant only): a member is dropped, low utility
//!   first.
//!
//! In the judgment-gated variant new composites must pass a judgment gate
//! before joining. When nothing of the drawn kind can be built the attempt is
//! retried with a fresh draw and does not count as an iteration.

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::schema::{ConfigError, JudgmentConfig, MetricSet, RATE_TOLERANCE, SimulationConfig};

use super::complexity::{ComplexityMetrics, mean_utility};
use super::lineage::{Origin, TraitId, TraitPool};
use super::population::Population;
use super::rng::{RandomSource, TraitRng};

/// Kind of event that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Invention,
    Combination,
    Modification,
    Loss,
}

/// Effect of one consumed iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A trait joined the population.
    Added { kind: EventKind, id: TraitId },
    /// A composite was built but failed the judgment gate.
    Rejected { kind: EventKind, id: TraitId },
    /// A trait left the population.
    Lost(TraitId),
}

/// Why an attempt could not fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degenerate {
    /// Invention drawn with every seed already present.
    AllSeedsPresent,
    /// No member is lineage-disjoint from the first combination parent.
    NoCombinationPartner,
    /// The drawn combination is already in the population.
    CombinationPresent,
    /// Every member already has its modified variant in the population.
    NothingToModify,
    /// Removal weights could not form a distribution.
    LossSamplingFailed,
}

/// Result of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Consumed(Event),
    Retry(Degenerate),
}

/// A freshly built composite awaiting acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub id: TraitId,
    pub kind: EventKind,
}

/// Outcome of the judgment gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub accepted: bool,
    /// Candidate utility.
    pub utility: f64,
    /// Population mean before the candidate was added.
    pub mean_utility: f64,
}

/// Event counters for one trajectory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrajectoryStats {
    pub inventions: usize,
    pub combinations: usize,
    pub modifications: usize,
    pub losses: usize,
    /// Composites refused by the judgment gate.
    pub rejections: usize,
    /// Degenerate attempts that were drawn again.
    pub retries: u64,
}

/// Trajectory errors.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("No event could fire at iteration {iteration} after {retries} retries")]
    Stalled { iteration: usize, retries: usize },
}

/// Output of a finished trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryResult {
    /// Columns exported by [`TrajectoryResult::matrix`].
    pub metric_set: MetricSet,
    /// One snapshot per consumed iteration.
    pub rows: Vec<ComplexityMetrics>,
    /// Reasoning quality at the end, when reinvestment is on.
    pub final_reason: Option<f64>,
    pub stats: TrajectoryStats,
    /// Seed of the random source, when the trajectory was seeded from one.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl TrajectoryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as `iterations x columns` values.
    pub fn matrix(&self) -> Vec<Vec<f64>> {
        self.rows
            .iter()
            .map(|row| row.to_vec(self.metric_set))
            .collect()
    }

    /// Metrics after the final iteration.
    pub fn last(&self) -> Option<&ComplexityMetrics> {
        self.rows.last()
    }

    /// Per-column mean over the last `fraction` of rows (at least one row).
    pub fn tail_mean(&self, fraction: f64) -> Vec<f64> {
        let columns = self.metric_set.columns();
        if self.rows.is_empty() {
            return vec![0.0; columns];
        }

        let n = self.rows.len();
        let tail = ((fraction * n as f64).round() as usize).clamp(1, n);
        let mut sums = vec![0.0; columns];
        for row in &self.rows[n - tail..] {
            for (sum, value) in sums.iter_mut().zip(row.to_vec(self.metric_set)) {
                *sum += value;
            }
        }
        sums.iter().map(|s| s / tail as f64).collect()
    }
}

/// Removal weights for the loss event: utilities clamped at zero, inverted
/// against their total and normalized, so low-utility traits go first.
///
/// Returns `None` when the clamped utilities sum to zero.
pub fn removal_weights(utilities: &[f64]) -> Option<Vec<f64>> {
    let clamped: Vec<f64> = utilities.iter().map(|u| u.max(0.0)).collect();
    let total: f64 = clamped.iter().sum();
    if !(total > 0.0) {
        return None;
    }

    let inverted: Vec<f64> = clamped.iter().map(|u| 1.0 - u / total).collect();
    let norm: f64 = inverted.iter().sum();
    if !(norm > 0.0) {
        return None;
    }
    Some(inverted.into_iter().map(|w| w / norm).collect())
}

/// Run one trajectory to completion.
pub fn run_simulation(config: &SimulationConfig) -> Result<TrajectoryResult, SimulationError> {
    Trajectory::new(config.clone())?.run()
}

/// State of one running trajectory.
pub struct Trajectory<R: RandomSource = TraitRng> {
    config: SimulationConfig,
    source: R,
    pool: TraitPool,
    population: Population,
    reason: f64,
    iteration: usize,
    rows: Vec<ComplexityMetrics>,
    stats: TrajectoryStats,
}

impl Trajectory<TraitRng> {
    /// Create a trajectory seeded from `config.random_seed`.
    ///
    /// Without a seed one is drawn from entropy and stored in the
    /// configuration, so the run can be reproduced.
    pub fn new(mut config: SimulationConfig) -> Result<Self, ConfigError> {
        let seed = *config.random_seed.get_or_insert_with(rand::random);
        Self::with_source(config, TraitRng::new(seed))
    }
}

impl<R: RandomSource> Trajectory<R> {
    /// Create a trajectory drawing seed utilities and the initial population
    /// from `source`.
    pub fn with_source(config: SimulationConfig, mut source: R) -> Result<Self, ConfigError> {
        config.validate()?;

        let seeds = &config.seeds;
        let (low, high) = seeds.utility_range;
        let utilities: Vec<f64> = (0..seeds.alphabet_size)
            .map(|_| source.uniform(low, high))
            .collect();

        let mut remaining: Vec<u8> = (0..seeds.alphabet_size as u8).collect();
        let mut initial = Vec::with_capacity(seeds.initial_traits);
        for _ in 0..seeds.initial_traits {
            let i = source.index(remaining.len());
            initial.push(remaining.remove(i));
        }

        Self::from_parts(config, source, &utilities, &initial)
    }

    /// Create a trajectory from explicit seed utilities (one per symbol) and
    /// initial seed symbols.
    pub fn from_parts(
        config: SimulationConfig,
        source: R,
        seed_utilities: &[f64],
        initial: &[u8],
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if seed_utilities.len() != config.seeds.alphabet_size {
            return Err(ConfigError::SeedUtilityCount {
                expected: config.seeds.alphabet_size,
                found: seed_utilities.len(),
            });
        }
        if let Some(&symbol) = initial
            .iter()
            .find(|&&s| s as usize >= config.seeds.alphabet_size)
        {
            return Err(ConfigError::UnknownSeed(symbol));
        }

        let pool = TraitPool::with_seeds(seed_utilities);
        let population = Population::from_ids(initial.iter().map(|&s| pool.seed(s)));
        let reason = config.increment.initial_reason().unwrap_or(0.5);
        let rows = Vec::with_capacity(config.iterations);

        Ok(Self {
            config,
            source,
            pool,
            population,
            reason,
            iteration: 0,
            rows,
            stats: TrajectoryStats::default(),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn pool(&self) -> &TraitPool {
        &self.pool
    }

    /// Current reasoning quality.
    pub fn reason(&self) -> f64 {
        self.reason
    }

    /// Consumed iterations so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn rows(&self) -> &[ComplexityMetrics] {
        &self.rows
    }

    pub fn stats(&self) -> &TrajectoryStats {
        &self.stats
    }

    /// Labels of the current population.
    pub fn labels(&self) -> Vec<String> {
        self.population.iter().map(|id| self.pool.label(id)).collect()
    }

    /// Make one attempt at an event. Nothing is recorded.
    pub fn step(&mut self) -> StepOutcome {
        let rates = self.config.rates;
        let r = self.source.unit();

        if r < rates.invention || self.population.is_empty() {
            return self.invent();
        }
        if r < rates.invention + rates.combination {
            return self.combine();
        }
        // Judgment-gated rates sum to one, so the remainder is modification.
        if self.config.judgment().is_some() || r < rates.total() {
            return self.modify();
        }
        self.lose()
    }

    /// Run one consumed iteration, retrying degenerate attempts, and record
    /// its metrics.
    ///
    /// Every `max_retries` consecutive retries the state is checked with
    /// [`Trajectory::is_deadlocked`]; only a deadlocked state is reported as
    /// [`SimulationError::Stalled`].
    pub fn advance(&mut self) -> Result<Event, SimulationError> {
        let mut retries = 0;
        loop {
            match self.step() {
                StepOutcome::Consumed(event) => {
                    self.record(event);
                    return Ok(event);
                }
                StepOutcome::Retry(reason) => {
                    retries += 1;
                    self.stats.retries += 1;
                    trace!("iteration {}: retry ({:?})", self.iteration, reason);
                    if retries < self.config.max_retries {
                        continue;
                    }
                    if self.is_deadlocked() {
                        warn!(
                            "Trajectory stalled at iteration {} after {} retries (last: {:?})",
                            self.iteration, retries, reason
                        );
                        return Err(SimulationError::Stalled {
                            iteration: self.iteration,
                            retries,
                        });
                    }
                    debug!(
                        "iteration {}: {} retries without a deadlock, continuing",
                        self.iteration, retries
                    );
                    retries = 0;
                }
            }
        }
    }

    /// True when no event with positive probability can fire from the
    /// current state, so every further attempt would be retried.
    ///
    /// Modification and loss masses below [`RATE_TOLERANCE`] count as zero.
    pub fn is_deadlocked(&self) -> bool {
        if self.population.is_empty() {
            return false;
        }

        let rates = self.config.rates;
        let modification = if self.config.judgment().is_some() {
            1.0 - rates.invention - rates.combination
        } else {
            rates.modification
        };
        let loss = if self.config.judgment().is_some() {
            0.0
        } else {
            1.0 - rates.total()
        };

        if rates.invention > 0.0
            && (0..self.pool.alphabet_size() as u8)
                .any(|s| !self.population.contains(self.pool.seed(s)))
        {
            return false;
        }
        if modification > RATE_TOLERANCE
            && self
                .population
                .iter()
                .any(|id| !self.is_present(&Origin::Modification(id)))
        {
            return false;
        }
        if loss > RATE_TOLERANCE {
            if self.population.len() == 1 {
                return false;
            }
            let utilities: Vec<f64> = self
                .population
                .iter()
                .map(|id| self.pool.utility(id))
                .collect();
            if removal_weights(&utilities).is_some_and(|w| w.iter().all(|x| x.is_finite())) {
                return false;
            }
        }
        if rates.combination > 0.0 {
            for first in self.population.iter() {
                let lineage = self.pool.get(first).lineage();
                let open = self.population.iter().any(|second| {
                    self.pool.get(second).lineage().is_disjoint(lineage)
                        && !self.is_present(&Origin::Combination(first, second))
                });
                if open {
                    return false;
                }
            }
        }
        true
    }

    /// Run the remaining iterations.
    pub fn run(mut self) -> Result<TrajectoryResult, SimulationError> {
        while self.iteration < self.config.iterations {
            self.advance()?;
        }
        debug!(
            "Trajectory finished: {} traits, {} retries, {:?}",
            self.population.len(),
            self.stats.retries,
            self.stats
        );
        Ok(self.into_result())
    }

    /// Finish without running further iterations.
    pub fn into_result(self) -> TrajectoryResult {
        let reinvest = self.judgment().is_some_and(|j| j.reinvest);
        TrajectoryResult {
            metric_set: self.config.metrics,
            rows: self.rows,
            final_reason: reinvest.then_some(self.reason),
            stats: self.stats,
            seed: self.config.random_seed,
        }
    }

    /// Build the combination `first ++ second`.
    ///
    /// Both must be members with disjoint lineages. Returns `None` if the
    /// combination is already in the population.
    pub fn propose_combination(&mut self, first: TraitId, second: TraitId) -> Option<Candidate> {
        debug_assert!(
            self.pool
                .get(first)
                .lineage()
                .is_disjoint(self.pool.get(second).lineage())
        );
        if self.is_present(&Origin::Combination(first, second)) {
            return None;
        }

        let utility = self.pool.utility(first).max(self.pool.utility(second)) + self.increment();
        let id = self.pool.combine(first, second, utility);
        Some(Candidate {
            id,
            kind: EventKind::Combination,
        })
    }

    /// Build the modified variant of `parent`. Returns `None` if it is already
    /// in the population.
    pub fn propose_modification(&mut self, parent: TraitId) -> Option<Candidate> {
        if self.is_present(&Origin::Modification(parent)) {
            return None;
        }

        let utility = self.pool.utility(parent) + self.increment();
        let id = self.pool.modify(parent, utility);
        Some(Candidate {
            id,
            kind: EventKind::Modification,
        })
    }

    /// Judge a trait against the current population mean.
    ///
    /// Traits at or above the mean pass when a uniform draw falls below
    /// `judge`; traits below it pass when the draw exceeds `judge`. Without a
    /// judgment gate everything passes and nothing is drawn.
    pub fn judge_candidate(&mut self, id: TraitId) -> Verdict {
        let utility = self.pool.utility(id);
        let mean = mean_utility(self.population.as_slice(), &self.pool);
        let Some(judgment) = self.judgment() else {
            return Verdict {
                accepted: true,
                utility,
                mean_utility: mean,
            };
        };

        let draw = self.source.unit();
        let accepted = if utility >= mean {
            draw < judgment.judge
        } else {
            draw > judgment.judge
        };
        Verdict {
            accepted,
            utility,
            mean_utility: mean,
        }
    }

    fn judgment(&self) -> Option<JudgmentConfig> {
        self.config.judgment().copied()
    }

    fn is_present(&self, origin: &Origin) -> bool {
        self.pool
            .find(origin)
            .is_some_and(|id| self.population.contains(id))
    }

    fn increment(&mut self) -> f64 {
        let (mean, std_dev) = self.config.increment.parameters(self.reason);
        mean + std_dev * self.source.standard_normal()
    }

    fn pick(&mut self, ids: &[TraitId]) -> TraitId {
        ids[self.source.index(ids.len())]
    }

    fn invent(&mut self) -> StepOutcome {
        let missing: Vec<TraitId> = (0..self.pool.alphabet_size() as u8)
            .map(|s| self.pool.seed(s))
            .filter(|&id| !self.population.contains(id))
            .collect();
        if missing.is_empty() {
            return StepOutcome::Retry(Degenerate::AllSeedsPresent);
        }

        let id = self.pick(&missing);
        self.population.push(id);
        StepOutcome::Consumed(Event::Added {
            kind: EventKind::Invention,
            id,
        })
    }

    fn combine(&mut self) -> StepOutcome {
        let first = self
            .population
            .get(self.source.index(self.population.len()));
        let lineage = self.pool.get(first).lineage();
        let partners: Vec<TraitId> = self
            .population
            .iter()
            .filter(|&id| self.pool.get(id).lineage().is_disjoint(lineage))
            .collect();
        if partners.is_empty() {
            return StepOutcome::Retry(Degenerate::NoCombinationPartner);
        }

        let second = self.pick(&partners);
        match self.propose_combination(first, second) {
            Some(candidate) => self.settle(candidate),
            None => StepOutcome::Retry(Degenerate::CombinationPresent),
        }
    }

    fn modify(&mut self) -> StepOutcome {
        let parents: Vec<TraitId> = self
            .population
            .iter()
            .filter(|&id| !self.is_present(&Origin::Modification(id)))
            .collect();
        if parents.is_empty() {
            return StepOutcome::Retry(Degenerate::NothingToModify);
        }

        let parent = self.pick(&parents);
        match self.propose_modification(parent) {
            Some(candidate) => self.settle(candidate),
            None => StepOutcome::Retry(Degenerate::NothingToModify),
        }
    }

    fn lose(&mut self) -> StepOutcome {
        if self.population.len() <= 1 {
            let id = self.population.remove_at(0);
            return StepOutcome::Consumed(Event::Lost(id));
        }

        let utilities: Vec<f64> = self
            .population
            .iter()
            .map(|id| self.pool.utility(id))
            .collect();
        let picked =
            removal_weights(&utilities).and_then(|weights| self.source.weighted(&weights));
        match picked {
            Some(index) => StepOutcome::Consumed(Event::Lost(self.population.remove_at(index))),
            None => StepOutcome::Retry(Degenerate::LossSamplingFailed),
        }
    }

    /// Add a candidate, through the judgment gate when there is one.
    fn settle(&mut self, candidate: Candidate) -> StepOutcome {
        let Some(judgment) = self.judgment() else {
            self.population.push(candidate.id);
            return StepOutcome::Consumed(Event::Added {
                kind: candidate.kind,
                id: candidate.id,
            });
        };

        let verdict = self.judge_candidate(candidate.id);
        if !verdict.accepted {
            return StepOutcome::Consumed(Event::Rejected {
                kind: candidate.kind,
                id: candidate.id,
            });
        }

        self.population.push(candidate.id);
        if judgment.reinvest {
            let fraction = self.source.integer(1, 10) as f64 / 100.0;
            self.reason += fraction * (verdict.utility - verdict.mean_utility);
        }
        StepOutcome::Consumed(Event::Added {
            kind: candidate.kind,
            id: candidate.id,
        })
    }

    fn record(&mut self, event: Event) {
        match event {
            Event::Added { kind, .. } => match kind {
                EventKind::Invention => self.stats.inventions += 1,
                EventKind::Combination => self.stats.combinations += 1,
                EventKind::Modification => self.stats.modifications += 1,
                EventKind::Loss => {}
            },
            Event::Rejected { .. } => self.stats.rejections += 1,
            Event::Lost(_) => self.stats.losses += 1,
        }
        trace!("iteration {}: {:?}", self.iteration, event);

        self.rows.push(ComplexityMetrics::measure(
            self.population.as_slice(),
            &self.pool,
        ));
        self.iteration += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;
    use crate::compute::rng::scripted::ScriptedSource;
    use crate::schema::{EventRates, IncrementModel, SelectionMode};

    const TEN_SEEDS: [f64; 10] = [0.9, 0.8, 0.85, 0.8, 0.8, 0.8, 0.8, 0.8, 0.8, 0.8];

    fn rates(invention: f64, combination: f64, modification: f64) -> EventRates {
        EventRates {
            invention,
            combination,
            modification,
        }
    }

    /// Loss variant over a..j with a neutral reasoning increment.
    fn loss_config(rates: EventRates) -> SimulationConfig {
        let mut config = SimulationConfig::cultural(0.0, 0.0, 0.0);
        config.rates = rates;
        config.increment = IncrementModel::Reasoning { reason: 0.5 };
        config
    }

    /// Judgment variant over a..j.
    fn judged_config(rates: EventRates, judge: f64, reinvest: bool) -> SimulationConfig {
        let mut config = SimulationConfig::ai(0.0, 0.0, 1.0, judge, 0.5, reinvest);
        config.rates = rates;
        config.seeds.alphabet_size = 10;
        config
    }

    fn scripted(
        config: SimulationConfig,
        source: ScriptedSource,
        initial: &[u8],
    ) -> Trajectory<ScriptedSource> {
        Trajectory::from_parts(config, source, &TEN_SEEDS, initial).unwrap()
    }

    #[test]
    fn test_iteration_count_contract() {
        // Invention-heavy runs retry often once every seed is present.
        let config = SimulationConfig::cultural(0.9, 0.0, 0.0)
            .with_iterations(300)
            .with_seed(42);
        let result = run_simulation(&config).unwrap();

        assert_eq!(result.len(), 300);
        assert_eq!(result.matrix().len(), 300);
        assert!(result.matrix().iter().all(|row| row.len() == 10));
        assert!(result.stats.retries > 0);
        assert_eq!(result.final_reason, None);
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let config = SimulationConfig::ai(0.2, 0.4, 0.4, 0.8, 0.7, true)
            .with_iterations(200)
            .with_seed(7);
        let a = run_simulation(&config).unwrap();
        let b = run_simulation(&config).unwrap();

        assert_eq!(a.rows, b.rows);
        assert_eq!(a.final_reason, b.final_reason);
        assert_eq!(a.stats, b.stats);
    }

    #[test]
    fn test_combination_utility_scenario() {
        // r = 0.5 selects combination, first = a, partner list [b] -> b, z = 0.
        let source = ScriptedSource::new()
            .units(&[0.5])
            .indices(&[0, 0])
            .normals(&[0.0]);
        let mut trajectory = scripted(loss_config(rates(0.0, 1.0, 0.0)), source, &[0, 1]);

        let outcome = trajectory.step();
        let StepOutcome::Consumed(Event::Added {
            kind: EventKind::Combination,
            id,
        }) = outcome
        else {
            panic!("expected a combination, got {outcome:?}");
        };

        assert_eq!(trajectory.pool().label(id), "ab");
        assert_eq!(trajectory.pool().utility(id), 0.9);
        assert_eq!(trajectory.labels(), vec!["a", "b", "ab"]);
    }

    #[test]
    fn test_below_mean_rejected_under_perfect_judge() {
        // Population a, b, ab with utilities 0.9, 0.8, 1.3 (mean 1.0).
        let source = ScriptedSource::new()
            .units(&[0.5, 0.0])
            .indices(&[0])
            .normals(&[0.5]);
        let mut trajectory = scripted(
            judged_config(rates(0.0, 0.0, 1.0), 1.0, false),
            source,
            &[0, 1],
        );
        let (a, b) = (trajectory.pool.seed(0), trajectory.pool.seed(1));
        let ab = trajectory.pool.combine(a, b, 1.3);
        trajectory.population.push(ab);

        // Modification of a: 0.9 + 0.1 * 0.5 = 0.95 < 1.0.
        let outcome = trajectory.step();
        let StepOutcome::Consumed(Event::Rejected {
            kind: EventKind::Modification,
            id,
        }) = outcome
        else {
            panic!("expected a rejection, got {outcome:?}");
        };

        assert!((trajectory.pool().utility(id) - 0.95).abs() < 1e-12);
        assert!(!trajectory.population().contains(id));
        assert_eq!(trajectory.population().len(), 3);
    }

    #[test]
    fn test_perfect_judge_is_deterministic() {
        let config = judged_config(rates(0.0, 0.0, 1.0), 1.0, false);
        let source = ScriptedSource::new().units(&[0.999_999, 0.0, 0.999_999, 0.0]);
        let mut trajectory = scripted(config, source, &[0, 1]);
        let a = trajectory.pool.seed(0);

        // Mean of a, b is 0.85.
        let good = trajectory.pool.modify(a, 0.86);
        assert!(trajectory.judge_candidate(good).accepted);
        assert!(trajectory.judge_candidate(good).accepted);

        trajectory.pool.set_utility(good, 0.84);
        assert!(!trajectory.judge_candidate(good).accepted);
        assert!(!trajectory.judge_candidate(good).accepted);
    }

    #[test]
    fn test_zero_judge_inverts_gate() {
        let config = judged_config(rates(0.0, 0.0, 1.0), 0.0, false);
        let source = ScriptedSource::new().units(&[0.5, 0.5]);
        let mut trajectory = scripted(config, source, &[0, 1]);
        let a = trajectory.pool.seed(0);

        let good = trajectory.pool.modify(a, 2.0);
        let verdict = trajectory.judge_candidate(good);
        assert!(!verdict.accepted);
        assert!((verdict.mean_utility - 0.85).abs() < 1e-12);

        trajectory.pool.set_utility(good, 0.1);
        assert!(trajectory.judge_candidate(good).accepted);
    }

    #[test]
    fn test_reinvestment_moves_reason() {
        // Modification of a with z = 1.5: 0.9 + 0.15 = 1.05 against mean 0.85.
        let source = ScriptedSource::new()
            .units(&[0.5, 0.0])
            .indices(&[0])
            .normals(&[1.5])
            .integers(&[5]);
        let mut trajectory = scripted(
            judged_config(rates(0.0, 0.0, 1.0), 1.0, true),
            source,
            &[0, 1],
        );

        let event = trajectory.advance().unwrap();
        assert!(matches!(
            event,
            Event::Added {
                kind: EventKind::Modification,
                ..
            }
        ));
        assert!((trajectory.reason() - (0.5 + 0.05 * 0.2)).abs() < 1e-12);

        let result = trajectory.into_result();
        assert_eq!(result.len(), 1);
        assert_eq!(result.stats.modifications, 1);
        assert!(result.final_reason.is_some());
    }

    #[test]
    fn test_reinvestment_lowers_reason_below_mean() {
        // judge = 0 accepts the below-mean modification 0.9 - 0.15 = 0.75.
        let source = ScriptedSource::new()
            .units(&[0.5, 0.5])
            .indices(&[0])
            .normals(&[-1.5])
            .integers(&[9]);
        let mut trajectory = scripted(
            judged_config(rates(0.0, 0.0, 1.0), 0.0, true),
            source,
            &[0, 1],
        );

        trajectory.advance().unwrap();
        assert!((trajectory.reason() - (0.5 - 0.09 * 0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_invention_bypasses_judgment() {
        // A perfect judge would drop a below-mean seed, but inventions are never judged.
        let source = ScriptedSource::new().units(&[0.1]).indices(&[0]);
        let mut trajectory = scripted(
            judged_config(rates(0.5, 0.0, 0.5), 1.0, false),
            source,
            &[0, 2],
        );

        let outcome = trajectory.step();
        assert_eq!(
            outcome,
            StepOutcome::Consumed(Event::Added {
                kind: EventKind::Invention,
                id: trajectory.pool().seed(1),
            })
        );
    }

    #[test]
    fn test_loss_from_singleton_then_forced_invention() {
        let source = ScriptedSource::new().units(&[0.5, 0.9]).indices(&[3]);
        let mut trajectory = scripted(loss_config(rates(0.0, 0.0, 0.0)), source, &[4]);

        let e = trajectory.pool().seed(4);
        assert_eq!(trajectory.step(), StepOutcome::Consumed(Event::Lost(e)));
        assert!(trajectory.population().is_empty());

        // r = 0.9 would be a loss, but an empty population forces invention.
        let outcome = trajectory.step();
        assert_eq!(
            outcome,
            StepOutcome::Consumed(Event::Added {
                kind: EventKind::Invention,
                id: trajectory.pool().seed(3),
            })
        );
    }

    #[test]
    fn test_loss_samples_by_inverted_utility() {
        // Utilities 0.9 (a) and 0.8 (b) give removal weights of about 0.47 and 0.53.
        let source = ScriptedSource::new().units(&[0.5, 0.99]);
        let mut trajectory = scripted(loss_config(rates(0.0, 0.0, 0.0)), source, &[0, 1]);
        let b = trajectory.pool().seed(1);

        assert_eq!(trajectory.step(), StepOutcome::Consumed(Event::Lost(b)));
        assert_eq!(trajectory.population().len(), 1);
    }

    #[test]
    fn test_removal_weights() {
        let weights = removal_weights(&[0.9, 0.1]).unwrap();
        assert!((weights[0] - 0.1).abs() < 1e-12);
        assert!((weights[1] - 0.9).abs() < 1e-12);

        // Negative utilities count as zero.
        let weights = removal_weights(&[-0.5, 1.0]).unwrap();
        assert_eq!(weights, vec![1.0, 0.0]);

        assert_eq!(removal_weights(&[0.0, -1.0]), None);
    }

    #[test]
    fn test_degenerate_attempts_retry() {
        let source = ScriptedSource::new().units(&[0.1, 0.1]).indices(&[0]);
        let mut trajectory = scripted(loss_config(rates(0.0, 1.0, 0.0)), source, &[0]);
        assert_eq!(
            trajectory.step(),
            StepOutcome::Retry(Degenerate::NoCombinationPartner)
        );

        // ab already present.
        let source = ScriptedSource::new().units(&[0.5]).indices(&[0, 0]);
        let mut trajectory = scripted(loss_config(rates(0.0, 1.0, 0.0)), source, &[0, 1]);
        let (a, b) = (trajectory.pool.seed(0), trajectory.pool.seed(1));
        let ab = trajectory.pool.combine(a, b, 1.0);
        trajectory.population.push(ab);
        assert_eq!(
            trajectory.step(),
            StepOutcome::Retry(Degenerate::CombinationPresent)
        );
        assert_eq!(trajectory.iteration(), 0);
    }

    #[test]
    fn test_modification_skips_modified_traits() {
        // a' is present, so a is skipped and the candidates are [b, a'].
        let source = ScriptedSource::new()
            .units(&[0.5])
            .indices(&[0])
            .normals(&[0.0]);
        let mut trajectory = scripted(loss_config(rates(0.0, 0.0, 1.0)), source, &[0, 1]);
        let a = trajectory.pool.seed(0);
        let a_mod = trajectory.pool.modify(a, 0.9);
        trajectory.population.push(a_mod);

        let outcome = trajectory.step();
        let StepOutcome::Consumed(Event::Added { id, .. }) = outcome else {
            panic!("expected a modification, got {outcome:?}");
        };
        assert_eq!(trajectory.pool().label(id), "b'");
    }

    #[test]
    fn test_stall_is_reported() {
        let mut config = SimulationConfig::cultural(1.0, 0.0, 0.0);
        config.seeds.alphabet_size = 2;
        config.max_retries = 50;
        let mut trajectory =
            Trajectory::from_parts(config, TraitRng::new(1), &[0.9, 0.8], &[0, 1]).unwrap();

        assert!(trajectory.is_deadlocked());
        assert!(matches!(
            trajectory.advance(),
            Err(SimulationError::Stalled {
                iteration: 0,
                retries: 50
            })
        ));
        assert_eq!(trajectory.stats().retries, 50);
    }

    #[test]
    fn test_rare_event_is_not_a_stall() {
        // Once every seed is present, leaving the invention branch takes
        // about 2000 draws per iteration.
        for seed in 0..5 {
            let config = SimulationConfig::cultural(0.9995, 0.0, 0.0005)
                .with_iterations(500)
                .with_seed(seed);
            let result = run_simulation(&config).unwrap();
            assert_eq!(result.len(), 500);
        }
    }

    #[test]
    fn test_retry_limit_only_triggers_deadlock_check() {
        let mut config = SimulationConfig::cultural(0.9, 0.0, 0.1)
            .with_iterations(300)
            .with_seed(3);
        config.max_retries = 1;
        let result = run_simulation(&config).unwrap();

        assert_eq!(result.len(), 300);
        assert!(result.stats.retries > 0);
    }

    #[test]
    fn test_deadlock_detection() {
        // Only combination can fire; a and b combine both ways, then nothing is left.
        let mut config = loss_config(rates(0.0, 1.0, 0.0));
        config.seeds.alphabet_size = 2;
        let mut trajectory =
            Trajectory::from_parts(config, TraitRng::new(0), &[0.9, 0.8], &[0, 1]).unwrap();
        assert!(!trajectory.is_deadlocked());

        let (a, b) = (trajectory.pool.seed(0), trajectory.pool.seed(1));
        let ab = trajectory.pool.combine(a, b, 1.0);
        trajectory.population.push(ab);
        assert!(!trajectory.is_deadlocked());

        let ba = trajectory.pool.combine(b, a, 1.0);
        trajectory.population.push(ba);
        assert!(trajectory.is_deadlocked());

        // An empty population always invents.
        let mut config = loss_config(rates(0.0, 0.0, 0.0));
        config.seeds.alphabet_size = 2;
        let empty = Trajectory::from_parts(config, TraitRng::new(0), &[0.9, 0.8], &[]).unwrap();
        assert!(!empty.is_deadlocked());
    }

    #[test]
    fn test_loss_retries_when_utilities_are_zero() {
        let source = ScriptedSource::new().units(&[0.5]);
        let mut trajectory = Trajectory::from_parts(
            loss_config(rates(0.0, 0.0, 0.0)),
            source,
            &[0.0; 10],
            &[0, 1],
        )
        .unwrap();
        let before = trajectory.population().as_slice().to_vec();

        assert_eq!(
            trajectory.step(),
            StepOutcome::Retry(Degenerate::LossSamplingFailed)
        );
        assert_eq!(trajectory.population().as_slice(), before.as_slice());
        assert!(trajectory.is_deadlocked());
    }

    #[test]
    fn test_zero_utility_loss_stalls() {
        let mut config = loss_config(rates(0.0, 0.0, 0.0));
        config.max_retries = 20;
        let mut trajectory =
            Trajectory::from_parts(config, TraitRng::new(2), &[0.0; 10], &[0, 1]).unwrap();

        assert!(matches!(
            trajectory.advance(),
            Err(SimulationError::Stalled { retries: 20, .. })
        ));
        assert_eq!(trajectory.population().len(), 2);
    }

    #[test]
    fn test_entropy_seed_is_recorded() {
        let config = SimulationConfig::cultural(0.4, 0.3, 0.2).with_iterations(30);
        let trajectory = Trajectory::new(config.clone()).unwrap();
        let seed = trajectory.config().random_seed.expect("seed drawn from entropy");

        let result = trajectory.run().unwrap();
        assert_eq!(result.seed, Some(seed));

        let replay = run_simulation(&config.with_seed(seed)).unwrap();
        assert_eq!(replay.rows, result.rows);
    }

    #[test]
    fn test_from_parts_checks_seeds() {
        let config = loss_config(rates(0.3, 0.3, 0.3));
        assert!(matches!(
            Trajectory::from_parts(config.clone(), TraitRng::new(0), &[0.9], &[0]),
            Err(ConfigError::SeedUtilityCount {
                expected: 10,
                found: 1
            })
        ));
        assert!(matches!(
            Trajectory::from_parts(config, TraitRng::new(0), &TEN_SEEDS, &[12]),
            Err(ConfigError::UnknownSeed(12))
        ));
    }

    #[test]
    fn test_initial_population() {
        let config = SimulationConfig::ai(0.4, 0.3, 0.3, 0.9, 0.5, false).with_seed(11);
        let trajectory = Trajectory::new(config).unwrap();
        let population = trajectory.population();

        assert_eq!(population.len(), 2);
        assert!(population.iter().all(|id| trajectory.pool().get(id).is_seed()));
        assert_eq!(trajectory.pool().len(), 20);
        for symbol in 0..20 {
            let u = trajectory.pool().utility(trajectory.pool().seed(symbol));
            assert!((0.75..1.0).contains(&u));
        }
    }

    #[test]
    fn test_tail_mean() {
        let result = TrajectoryResult {
            metric_set: MetricSet::Basic,
            rows: (1..=10)
                .map(|n| ComplexityMetrics {
                    trait_number: n,
                    ..Default::default()
                })
                .collect(),
            final_reason: None,
            stats: TrajectoryStats::default(),
            seed: None,
        };

        // Last two rows: 9 and 10.
        let tail = result.tail_mean(0.2);
        assert_eq!(tail.len(), 5);
        assert!((tail[0] - 9.5).abs() < 1e-12);

        // Tiny fractions still average one row.
        assert!((result.tail_mean(0.01)[0] - 10.0).abs() < 1e-12);
        assert!((result.tail_mean(1.0)[0] - 5.5).abs() < 1e-12);
    }

    #[test]
    fn test_basic_metric_set() {
        let mut config = SimulationConfig::cultural(0.4, 0.3, 0.2)
            .with_iterations(50)
            .with_seed(5);
        config.metrics = MetricSet::Basic;
        let result = run_simulation(&config).unwrap();
        assert!(result.matrix().iter().all(|row| row.len() == 5));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SimulationConfig::ai(0.2, 0.2, 0.2, 0.5, 0.5, false);
        assert!(matches!(
            run_simulation(&config),
            Err(SimulationError::Config(ConfigError::RatesMustSumToOne(_)))
        ));
    }

    fn normalized(raw: (f64, f64, f64), full: bool) -> EventRates {
        let (i, c, m) = (raw.0 + 0.01, raw.1 + 0.01, raw.2 + 0.01);
        let total = i + c + m;
        if full || total > 1.0 {
            rates(i / total, c / total, 1.0 - i / total - c / total)
        } else {
            rates(i, c, m)
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_event_invariants(
            seed in any::<u64>(),
            raw in (0.0..1.0f64, 0.0..1.0f64, 0.0..1.0f64),
            judged in any::<bool>(),
            judge in 0.0..=1.0f64,
        ) {
            let rates = normalized(raw, judged);
            let mut config = SimulationConfig::cultural(0.0, 0.0, 0.0);
            config.rates = rates;
            if judged {
                config.selection = SelectionMode::Judgment(JudgmentConfig { judge, reinvest: true });
                config.increment = IncrementModel::Reasoning { reason: 0.5 };
            }
            let mut trajectory = Trajectory::new(config.with_seed(seed)).unwrap();

            let mut consumed = 0;
            while consumed < 150 {
                let before: HashSet<TraitId> = trajectory.population().iter().collect();
                let outcome = trajectory.step();
                let StepOutcome::Consumed(event) = outcome else { continue };
                consumed += 1;

                match event {
                    Event::Added { kind, id } | Event::Rejected { kind, id } => {
                        let node = trajectory.pool().get(id);
                        match (kind, node.origin()) {
                            (EventKind::Invention, Origin::Seed(_)) => {
                                prop_assert!(!before.contains(&id));
                            }
                            (EventKind::Combination, Origin::Combination(a, b)) => {
                                let pool = trajectory.pool();
                                prop_assert!(pool.get(a).lineage().is_disjoint(pool.get(b).lineage()));
                                prop_assert!(!before.contains(&id));
                            }
                            (EventKind::Modification, Origin::Modification(_)) => {
                                prop_assert!(!before.contains(&id));
                            }
                            other => prop_assert!(false, "mismatched event {:?}", other),
                        }
                    }
                    Event::Lost(id) => {
                        prop_assert!(!judged);
                        prop_assert!(before.contains(&id));
                        prop_assert!(!trajectory.population().contains(id));
                    }
                }

                let members = trajectory.population().as_slice();
                let unique: HashSet<_> = members.iter().collect();
                prop_assert_eq!(unique.len(), members.len());
                for &id in members {
                    prop_assert!(id.index() < trajectory.pool().len());
                    prop_assert!(trajectory.pool().utility(id).is_finite());
                }
                if judged {
                    prop_assert!(trajectory.population().len() >= before.len());
                }
            }
        }

        #[test]
        fn prop_row_count_matches_iterations(seed in any::<u64>(), iterations in 1usize..200) {
            let config = SimulationConfig::cultural(0.5, 0.2, 0.1)
                .with_iterations(iterations)
                .with_seed(seed);
            let result = run_simulation(&config).unwrap();
            prop_assert_eq!(result.len(), iterations);
        }
    }
}

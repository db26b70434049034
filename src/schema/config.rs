//! Configuration types for trait evolution trajectories.

use serde::{Deserialize, Serialize};

/// Largest supported seed alphabet (one letter label per seed symbol).
pub const MAX_ALPHABET_SIZE: usize = 26;

/// Tolerance used when checking that event rates sum to one.
pub const RATE_TOLERANCE: f64 = 1e-9;

fn default_max_retries() -> usize {
    10_000
}

/// Top-level configuration of a single trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Event probabilities.
    pub rates: EventRates,
    /// What happens to new traits and where the remaining probability mass goes.
    pub selection: SelectionMode,
    /// Distribution of the utility gained by combination and modification.
    #[serde(default)]
    pub increment: IncrementModel,
    /// Seed alphabet and initial population.
    #[serde(default)]
    pub seeds: SeedConfig,
    /// Which metric columns are recorded.
    #[serde(default)]
    pub metrics: MetricSet,
    /// Number of consumed iterations (recorded rows).
    pub iterations: usize,
    /// Consecutive degenerate retries after which the trajectory checks
    /// whether any event can still fire.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::cultural(0.3, 0.3, 0.3)
    }
}

impl SimulationConfig {
    /// Cultural evolution preset: unconditional loss with rate `1 - (rho1 + rho2 + rho3)`,
    /// ten seed symbols and a fixed N(0, 0.1) utility increment.
    pub fn cultural(invention: f64, combination: f64, modification: f64) -> Self {
        Self {
            rates: EventRates {
                invention,
                combination,
                modification,
            },
            selection: SelectionMode::Loss,
            increment: IncrementModel::default(),
            seeds: SeedConfig {
                alphabet_size: 10,
                ..Default::default()
            },
            metrics: MetricSet::Extended,
            iterations: 500,
            max_retries: default_max_retries(),
            random_seed: None,
        }
    }

    /// AI evolution preset: judgment-gated acceptance, twenty seed symbols and a
    /// reasoning-dependent utility increment.
    pub fn ai(
        invention: f64,
        combination: f64,
        modification: f64,
        judge: f64,
        reason: f64,
        reinvest: bool,
    ) -> Self {
        Self {
            rates: EventRates {
                invention,
                combination,
                modification,
            },
            selection: SelectionMode::Judgment(JudgmentConfig { judge, reinvest }),
            increment: IncrementModel::Reasoning { reason },
            seeds: SeedConfig::default(),
            metrics: MetricSet::Extended,
            iterations: 500,
            max_retries: default_max_retries(),
            random_seed: None,
        }
    }

    /// Builder-style override of the iteration count.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Builder-style override of the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Judgment settings, if this is a judgment-gated run.
    #[inline]
    pub fn judgment(&self) -> Option<&JudgmentConfig> {
        match &self.selection {
            SelectionMode::Judgment(judgment) => Some(judgment),
            SelectionMode::Loss => None,
        }
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, rate) in self.rates.named() {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::RateOutOfRange { name, value: rate });
            }
        }

        let total = self.rates.total();
        match &self.selection {
            SelectionMode::Loss => {
                if total > 1.0 + RATE_TOLERANCE {
                    return Err(ConfigError::RatesExceedOne(total));
                }
            }
            SelectionMode::Judgment(judgment) => {
                if (total - 1.0).abs() > RATE_TOLERANCE {
                    return Err(ConfigError::RatesMustSumToOne(total));
                }
                if !(0.0..=1.0).contains(&judgment.judge) {
                    return Err(ConfigError::InvalidJudge(judgment.judge));
                }
                if judgment.reinvest && !matches!(self.increment, IncrementModel::Reasoning { .. })
                {
                    return Err(ConfigError::ReinvestWithoutReasoning);
                }
            }
        }

        match self.increment {
            IncrementModel::Fixed { mean, std_dev } => {
                if !mean.is_finite() || !std_dev.is_finite() || std_dev < 0.0 {
                    return Err(ConfigError::InvalidIncrement { mean, std_dev });
                }
            }
            IncrementModel::Reasoning { reason } => {
                if !reason.is_finite() {
                    return Err(ConfigError::InvalidReason(reason));
                }
            }
        }

        let seeds = &self.seeds;
        if seeds.alphabet_size == 0 || seeds.alphabet_size > MAX_ALPHABET_SIZE {
            return Err(ConfigError::InvalidAlphabetSize(seeds.alphabet_size));
        }
        if seeds.initial_traits > seeds.alphabet_size {
            return Err(ConfigError::TooManyInitialTraits {
                initial: seeds.initial_traits,
                alphabet: seeds.alphabet_size,
            });
        }
        let (low, high) = seeds.utility_range;
        if !low.is_finite() || !high.is_finite() || low >= high {
            return Err(ConfigError::InvalidUtilityRange { low, high });
        }

        if self.iterations == 0 {
            return Err(ConfigError::InvalidIterations);
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidRetryLimit);
        }
        Ok(())
    }
}

/// Probabilities of the creative events. Loss takes whatever is left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventRates {
    /// Novel invention of a missing seed trait (rho1).
    pub invention: f64,
    /// Combination of two lineage-disjoint traits (rho2).
    pub combination: f64,
    /// Modification of an existing trait (rho3).
    pub modification: f64,
}

impl EventRates {
    /// Sum of the creative event rates.
    #[inline]
    pub fn total(&self) -> f64 {
        self.invention + self.combination + self.modification
    }

    /// Implicit loss rate (rho4), never negative.
    #[inline]
    pub fn loss(&self) -> f64 {
        (1.0 - self.total()).max(0.0)
    }

    fn named(&self) -> [(&'static str, f64); 3] {
        [
            ("invention", self.invention),
            ("combination", self.combination),
            ("modification", self.modification),
        ]
    }
}

/// Variant of the event model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SelectionMode {
    /// Every new trait is kept; one trait is lost with probability `1 - (rho1 + rho2 + rho3)`.
    #[default]
    Loss,
    /// New composite traits pass a judgment gate; nothing is ever lost.
    Judgment(JudgmentConfig),
}

/// Judgment gate parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JudgmentConfig {
    /// Discrimination quality in [0, 1]. 1 keeps every above-average trait and
    /// drops every below-average one; 0 does the opposite.
    pub judge: f64,
    /// Feed the utility gained (or lost) by accepted traits back into `reason`.
    #[serde(default)]
    pub reinvest: bool,
}

/// Distribution of the utility increment added to new composite traits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IncrementModel {
    /// Normal(mean, std_dev), independent of reasoning.
    Fixed { mean: f64, std_dev: f64 },
    /// Normal(reason - 0.5, 0.1 + |reason - 0.5| / 2).
    Reasoning { reason: f64 },
}

impl Default for IncrementModel {
    fn default() -> Self {
        Self::Fixed {
            mean: 0.0,
            std_dev: 0.1,
        }
    }
}

impl IncrementModel {
    /// Starting reasoning quality, if the model uses one.
    pub fn initial_reason(&self) -> Option<f64> {
        match self {
            Self::Fixed { .. } => None,
            Self::Reasoning { reason } => Some(*reason),
        }
    }

    /// Mean and standard deviation of the increment.
    ///
    /// `reason` is the trajectory's current reasoning quality, which drifts away
    /// from the configured value when reinvestment is on.
    pub fn parameters(&self, reason: f64) -> (f64, f64) {
        match self {
            Self::Fixed { mean, std_dev } => (*mean, *std_dev),
            Self::Reasoning { .. } => reasoning_increment(reason),
        }
    }
}

/// Increment distribution for a given reasoning quality.
#[inline]
pub fn reasoning_increment(reason: f64) -> (f64, f64) {
    let mean = reason - 0.5;
    (mean, 0.1 + (mean / 2.0).abs())
}

/// Seed alphabet configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Number of seed symbols (`a`, `b`, ...).
    pub alphabet_size: usize,
    /// Seed utilities are drawn uniformly from `[low, high)`.
    pub utility_range: (f64, f64),
    /// Distinct seeds present when the trajectory starts.
    pub initial_traits: usize,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            alphabet_size: 20,
            utility_range: (0.75, 1.0),
            initial_traits: 2,
        }
    }
}

/// Metric columns recorded per iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricSet {
    /// trait_number, trait_complexity, lineage_number, lineage_complexity, maximum_utility.
    Basic,
    /// All ten complexity measures.
    #[default]
    Extended,
}

impl MetricSet {
    /// Number of columns.
    #[inline]
    pub fn columns(&self) -> usize {
        match self {
            Self::Basic => 5,
            Self::Extended => 10,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} rate {value} must lie in [0, 1]")]
    RateOutOfRange { name: &'static str, value: f64 },
    #[error("Event rates sum to {0}, which exceeds 1")]
    RatesExceedOne(f64),
    #[error("Judgment-gated runs need event rates summing to 1 (got {0})")]
    RatesMustSumToOne(f64),
    #[error("Judge quality {0} must lie in [0, 1]")]
    InvalidJudge(f64),
    #[error("Reinvestment requires the reasoning increment model")]
    ReinvestWithoutReasoning,
    #[error("Increment distribution N({mean}, {std_dev}) is invalid")]
    InvalidIncrement { mean: f64, std_dev: f64 },
    #[error("Reasoning quality {0} must be finite")]
    InvalidReason(f64),
    #[error("Seed alphabet size {0} must be between 1 and 26")]
    InvalidAlphabetSize(usize),
    #[error("Cannot start with {initial} traits from an alphabet of {alphabet}")]
    TooManyInitialTraits { initial: usize, alphabet: usize },
    #[error("Seed utility range [{low}, {high}) is empty or not finite")]
    InvalidUtilityRange { low: f64, high: f64 },
    #[error("Iteration count must be non-zero")]
    InvalidIterations,
    #[error("Retry limit must be non-zero")]
    InvalidRetryLimit,
    #[error("Expected {expected} seed utilities, got {found}")]
    SeedUtilityCount { expected: usize, found: usize },
    #[error("Seed symbol {0} is outside the alphabet")]
    UnknownSeed(u8),
}

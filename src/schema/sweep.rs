//! Parameter sweep configuration.
//!
//! A sweep expands a grid of event rates (and, for judgment-gated runs, judge
//! and reasoning quality) into parameter points and runs a fixed number of
//! independently seeded replicates of each.

use serde::{Deserialize, Serialize};

use super::{
    ConfigError, EventRates, IncrementModel, RATE_TOLERANCE, SelectionMode, SimulationConfig,
};

fn default_replicates() -> usize {
    10
}

/// Top-level configuration for a parameter sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Trajectory settings shared by every point. Grid values override its
    /// rates, judge and reason.
    pub base: SimulationConfig,
    /// Parameter values to combine.
    pub grid: ParameterGrid,
    /// Independent trajectories per parameter point.
    #[serde(default = "default_replicates")]
    pub replicates: usize,
    /// What is kept from each trajectory.
    #[serde(default)]
    pub summary: SweepSummary,
    /// Master seed from which every trajectory seed is derived.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        let rates = ParameterGrid::stepped(0.2, 0.6, 0.2);
        let quality = ParameterGrid::stepped(0.2, 1.0, 0.2);
        Self {
            base: SimulationConfig::ai(0.4, 0.3, 0.3, 0.5, 0.5, true),
            grid: ParameterGrid {
                invention: rates.clone(),
                combination: rates.clone(),
                modification: rates,
                judge: quality.clone(),
                reason: quality,
            },
            replicates: default_replicates(),
            summary: SweepSummary::default(),
            random_seed: None,
        }
    }
}

/// Value lists for each swept parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterGrid {
    pub invention: Vec<f64>,
    pub combination: Vec<f64>,
    pub modification: Vec<f64>,
    /// Judge values; empty keeps the base configuration's judge.
    #[serde(default)]
    pub judge: Vec<f64>,
    /// Reasoning values; empty keeps the base configuration's reason.
    #[serde(default)]
    pub reason: Vec<f64>,
}

impl ParameterGrid {
    /// Evenly spaced values from `start` to `stop` inclusive.
    ///
    /// Values are rounded to ten decimals so that sums such as
    /// `0.2 + 0.2 + 0.6` compare cleanly against one.
    pub fn stepped(start: f64, stop: f64, step: f64) -> Vec<f64> {
        if step <= 0.0 || stop < start {
            return vec![start];
        }
        let count = ((stop - start) / step + 1e-9).floor() as usize + 1;
        (0..count)
            .map(|i| ((start + step * i as f64) * 1e10).round() / 1e10)
            .collect()
    }

    /// Expand the cartesian product, keeping only points whose rates are
    /// admissible for the base configuration's variant.
    pub fn points(&self, base: &SimulationConfig) -> Vec<ParameterPoint> {
        let base_judge = base.judgment().map(|j| j.judge);
        let base_reason = base.increment.initial_reason();
        let judges = axis(&self.judge, base_judge);
        let reasons = axis(&self.reason, base_reason);

        let mut points = Vec::new();
        for &invention in &self.invention {
            for &combination in &self.combination {
                for &modification in &self.modification {
                    let rates = EventRates {
                        invention,
                        combination,
                        modification,
                    };
                    if !admits(&base.selection, &rates) {
                        continue;
                    }
                    for &judge in &judges {
                        for &reason in &reasons {
                            points.push(ParameterPoint {
                                rates,
                                judge,
                                reason,
                            });
                        }
                    }
                }
            }
        }
        points
    }
}

fn axis(values: &[f64], fallback: Option<f64>) -> Vec<Option<f64>> {
    if values.is_empty() {
        vec![fallback]
    } else {
        values.iter().copied().map(Some).collect()
    }
}

fn admits(selection: &SelectionMode, rates: &EventRates) -> bool {
    let total = rates.total();
    match selection {
        SelectionMode::Loss => total <= 1.0 + RATE_TOLERANCE,
        SelectionMode::Judgment(_) => (total - 1.0).abs() <= RATE_TOLERANCE,
    }
}

/// One point of the parameter grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterPoint {
    pub rates: EventRates,
    /// Judge quality (judgment-gated runs only).
    pub judge: Option<f64>,
    /// Initial reasoning quality (reasoning increment only).
    pub reason: Option<f64>,
}

impl ParameterPoint {
    /// Trajectory configuration for this point.
    pub fn apply(&self, base: &SimulationConfig) -> SimulationConfig {
        let mut config = base.clone();
        config.rates = self.rates;
        if let (Some(judge), SelectionMode::Judgment(judgment)) =
            (self.judge, &mut config.selection)
        {
            judgment.judge = judge;
        }
        if let (Some(value), IncrementModel::Reasoning { reason }) =
            (self.reason, &mut config.increment)
        {
            *reason = value;
        }
        config
    }
}

/// What a sweep keeps from each trajectory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SweepSummary {
    /// Every recorded row.
    #[default]
    Trajectory,
    /// Per-metric mean over the last `fraction` of rows.
    TailMean { fraction: f64 },
}

/// Sweep configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SweepConfigError {
    #[error("Parameter grid has no values for {0}")]
    EmptyAxis(&'static str),
    #[error("Replicate count must be non-zero")]
    NoReplicates,
    #[error("Tail fraction {0} must lie in (0, 1]")]
    InvalidTailFraction(f64),
    #[error("Judge values require a judgment-gated base configuration")]
    JudgeWithoutJudgment,
    #[error("Reason values require the reasoning increment model")]
    ReasonWithoutReasoning,
    #[error("No grid point satisfies the rate constraint of the base configuration")]
    NoValidPoints,
    #[error("Grid point is invalid: {0}")]
    InvalidPoint(ConfigError),
    #[error("Base config validation failed: {0}")]
    BaseConfigError(#[from] ConfigError),
}

impl SweepConfig {
    /// Validate sweep configuration.
    pub fn validate(&self) -> Result<(), SweepConfigError> {
        self.base.validate()?;

        let axes = [
            ("invention", &self.grid.invention),
            ("combination", &self.grid.combination),
            ("modification", &self.grid.modification),
        ];
        for (name, values) in axes {
            if values.is_empty() {
                return Err(SweepConfigError::EmptyAxis(name));
            }
        }

        if !self.grid.judge.is_empty() && self.base.judgment().is_none() {
            return Err(SweepConfigError::JudgeWithoutJudgment);
        }
        if !self.grid.reason.is_empty() && self.base.increment.initial_reason().is_none() {
            return Err(SweepConfigError::ReasonWithoutReasoning);
        }

        if self.replicates == 0 {
            return Err(SweepConfigError::NoReplicates);
        }
        if let SweepSummary::TailMean { fraction } = self.summary
            && !(fraction > 0.0 && fraction <= 1.0)
        {
            return Err(SweepConfigError::InvalidTailFraction(fraction));
        }

        let points = self.grid.points(&self.base);
        if points.is_empty() {
            return Err(SweepConfigError::NoValidPoints);
        }
        for point in &points {
            point
                .apply(&self.base)
                .validate()
                .map_err(SweepConfigError::InvalidPoint)?;
        }
        Ok(())
    }

    /// Total number of trajectories the sweep will run.
    pub fn job_count(&self) -> usize {
        self.grid.points(&self.base).len() * self.replicates
    }
}

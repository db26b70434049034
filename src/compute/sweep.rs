//! Parallel parameter sweeps over independent trajectories.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{
    MetricSet, ParameterPoint, SimulationConfig, SweepConfig, SweepConfigError, SweepSummary,
};

use super::engine::{SimulationError, Trajectory, TrajectoryResult, TrajectoryStats};
use super::rng::TraitRng;

/// One trajectory scheduled by a sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepJob {
    /// 1-based simulation id, in grid order.
    pub sim_id: usize,
    /// Replicate index within the parameter point.
    pub replicate: usize,
    pub point: ParameterPoint,
    /// Seed of this trajectory's random source.
    pub seed: u64,
}

/// Progress snapshot passed to the sweep callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepProgress {
    pub completed: usize,
    pub total: usize,
}

/// Output kept from one trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordOutput {
    /// Every metrics row, in iteration order.
    Rows(Vec<Vec<f64>>),
    /// Per-column mean over the trajectory tail.
    TailMean(Vec<f64>),
}

/// One finished trajectory of a sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRecord {
    pub sim_id: usize,
    pub replicate: usize,
    /// Seed of the trajectory's random source, if it had one.
    pub seed: Option<u64>,
    pub point: ParameterPoint,
    pub final_reason: Option<f64>,
    pub stats: TrajectoryStats,
    pub output: RecordOutput,
}

/// Collected sweep output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResult {
    /// Metric columns of every record.
    pub metric_set: MetricSet,
    /// Records ordered by `sim_id`.
    pub records: Vec<SweepRecord>,
    pub elapsed_seconds: f64,
}

impl SweepResult {
    /// Wrap a single trajectory as a one-record result.
    pub fn single(config: &SimulationConfig, result: TrajectoryResult) -> Self {
        let point = ParameterPoint {
            rates: config.rates,
            judge: config.judgment().map(|j| j.judge),
            reason: config.increment.initial_reason(),
        };
        Self {
            metric_set: result.metric_set,
            records: vec![SweepRecord {
                sim_id: 1,
                replicate: 0,
                seed: result.seed,
                point,
                final_reason: result.final_reason,
                stats: result.stats.clone(),
                output: RecordOutput::Rows(result.matrix()),
            }],
            elapsed_seconds: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Sweep errors.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("Invalid sweep configuration: {0}")]
    Config(#[from] SweepConfigError),
    #[error("Simulation {sim_id} failed: {source}")]
    Simulation {
        sim_id: usize,
        source: SimulationError,
    },
    #[error("Sweep was cancelled")]
    Cancelled,
}

/// Runs every (point, replicate) pair of a sweep in parallel.
pub struct SweepRunner {
    config: SweepConfig,
    cancelled: Arc<AtomicBool>,
}

impl SweepRunner {
    /// Create a runner for a validated configuration.
    pub fn new(config: SweepConfig) -> Result<Self, SweepConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Get cancellation handle. Jobs not yet started are skipped once set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Every job in grid order, with per-job seeds drawn from the master seed.
    pub fn jobs(&self) -> Vec<SweepJob> {
        let seed = self.config.random_seed.unwrap_or_else(rand::random);
        let mut master = TraitRng::new(seed);

        let points = self.config.grid.points(&self.config.base);
        let mut jobs = Vec::with_capacity(points.len() * self.config.replicates);
        for point in points {
            for replicate in 0..self.config.replicates {
                jobs.push(SweepJob {
                    sim_id: jobs.len() + 1,
                    replicate,
                    point,
                    seed: master.next_seed(),
                });
            }
        }
        jobs
    }

    /// Run the sweep (blocking).
    pub fn run(&self) -> Result<SweepResult, SweepError> {
        self.run_with_callback(|_| {})
    }

    /// Run the sweep, reporting progress after every finished trajectory.
    ///
    /// The callback is invoked from worker threads.
    pub fn run_with_callback<F>(&self, callback: F) -> Result<SweepResult, SweepError>
    where
        F: Fn(&SweepProgress) + Sync,
    {
        let start_time = Instant::now();
        let jobs = self.jobs();
        let total = jobs.len();
        let completed = AtomicUsize::new(0);
        info!(
            "Starting sweep: {} trajectories ({} replicates per point)",
            total, self.config.replicates
        );

        let records = jobs
            .par_iter()
            .map(|job| {
                let record = self.run_job(job)?;
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                callback(&SweepProgress {
                    completed: done,
                    total,
                });
                Ok(record)
            })
            .collect::<Result<Vec<_>, SweepError>>()?;

        let elapsed = start_time.elapsed().as_secs_f64();
        info!(
            "Sweep finished: {} trajectories in {:.2}s ({:.1} trajectories/s)",
            total,
            elapsed,
            total as f64 / elapsed.max(f64::EPSILON)
        );

        Ok(SweepResult {
            metric_set: self.config.base.metrics,
            records,
            elapsed_seconds: elapsed,
        })
    }

    fn run_job(&self, job: &SweepJob) -> Result<SweepRecord, SweepError> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(SweepError::Cancelled);
        }

        let config = job.point.apply(&self.config.base).with_seed(job.seed);
        let failed = |source: SimulationError| SweepError::Simulation {
            sim_id: job.sim_id,
            source,
        };
        let trajectory = Trajectory::new(config)
            .map_err(SimulationError::from)
            .map_err(failed)?;
        let result = trajectory.run().map_err(failed)?;
        debug!("Simulation {} done ({:?})", job.sim_id, job.point.rates);

        let output = match self.config.summary {
            SweepSummary::Trajectory => RecordOutput::Rows(result.matrix()),
            SweepSummary::TailMean { fraction } => {
                RecordOutput::TailMean(result.tail_mean(fraction))
            }
        };
        Ok(SweepRecord {
            sim_id: job.sim_id,
            replicate: job.replicate,
            seed: Some(job.seed),
            point: job.point,
            final_reason: result.final_reason,
            stats: result.stats,
            output,
        })
    }
}

//! Monte-Carlo estimation over banner state machines.

use crate::banner::BannerStateMachine;
use crate::error::{GachaError, Result};
use crate::rng::Rng;
use crate::worker::SimWorker;
use log::debug;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const DEFAULT_CHUNK_SIZE: usize = 64;

/// Order statistics of a pull-count sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSummary {
    pub trials: usize,
    pub mean: f64,
    pub median: f64,
    pub min: u32,
    pub max: u32,
    pub std_dev: f64,
}

impl SampleSummary {
    /// `None` for an empty sample.
    pub fn from_samples(samples: &[u32]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();
        let n = sorted.len();
        let mean = sorted.iter().map(|&x| x as f64).sum::<f64>() / n as f64;
        let var = sorted
            .iter()
            .map(|&x| (x as f64 - mean).powi(2))
            .sum::<f64>()
            / n as f64;
        let median = if n % 2 == 1 {
            sorted[n / 2] as f64
        } else {
            (sorted[n / 2 - 1] as f64 + sorted[n / 2] as f64) / 2.0
        };
        Some(SampleSummary {
            trials: n,
            mean,
            median,
            min: sorted[0],
            max: sorted[n - 1],
            std_dev: var.sqrt(),
        })
    }
}

/// Runs independent trials in seeded chunks on a `SimWorker`.
///
/// Chunk `i` always gets the generator `Rng::for_chunk(base, i)`, so a run is
/// reproducible from its seed whatever the thread count.
pub struct MonteCarlo<'a> {
    worker: &'a SimWorker,
    seed: u64,
    chunk_size: usize,
    progress: Option<&'a (dyn Fn(usize) + Sync)>,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> MonteCarlo<'a> {
    pub fn new(worker: &'a SimWorker, seed: u64) -> Self {
        MonteCarlo {
            worker,
            seed,
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress: None,
            cancel: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// `callback` receives the number of finished trials after every chunk.
    pub fn with_progress(mut self, callback: &'a (dyn Fn(usize) + Sync)) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Checked between trials; once set the run stops with `GachaError::Cancelled`.
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Runs `trials` calls of `trial`, each chunk on its own `state` built by `init`.
    /// Results come back in trial order.
    pub fn run_trials<S, T, I, F>(&self, trials: usize, init: I, trial: F) -> Result<Vec<T>>
    where
        T: Send,
        I: Fn() -> S + Sync,
        F: Fn(&mut S, &mut Rng) -> T + Sync,
    {
        if trials == 0 {
            return Err(GachaError::DomainRange(
                "trial count must be positive".to_string(),
            ));
        }
        let base_seed = Rng::from_seed(self.seed).next_u64();
        let chunk_size = self.chunk_size;
        let chunk_count = trials.div_ceil(chunk_size);
        let completed = AtomicUsize::new(0);

        debug!(
            "[MonteCarlo] {} trials in {} chunks on {} threads",
            trials,
            chunk_count,
            self.worker.thread_count()
        );

        let chunks: Vec<Option<Vec<T>>> = self.worker.execute(|| {
            (0..chunk_count)
                .into_par_iter()
                .map(|chunk_idx| {
                    let start = chunk_idx * chunk_size;
                    let end = (start + chunk_size).min(trials);
                    let mut rng = Rng::for_chunk(base_seed, chunk_idx);
                    let mut state = init();
                    let mut out = Vec::with_capacity(end - start);
                    for _ in start..end {
                        if self.cancelled() {
                            return None;
                        }
                        out.push(trial(&mut state, &mut rng));
                    }
                    let done = completed.fetch_add(out.len(), Ordering::Relaxed) + out.len();
                    if let Some(progress) = self.progress {
                        progress(done);
                    }
                    Some(out)
                })
                .collect()
        })?;

        let mut results = Vec::with_capacity(trials);
        for chunk in chunks {
            match chunk {
                Some(values) => results.extend(values),
                None => {
                    return Err(GachaError::Cancelled {
                        completed: completed.load(Ordering::Relaxed),
                    })
                }
            }
        }
        Ok(results)
    }

    /// Raw sample of pulls needed to obtain `target` wanted items.
    pub fn estimate_pulls_to_target(
        &self,
        banner: &BannerStateMachine,
        target: u32,
        trials: usize,
    ) -> Result<Vec<u32>> {
        self.run_trials(
            trials,
            || banner.clone(),
            |machine: &mut BannerStateMachine, rng| machine.pull_until_wanted(target, rng),
        )
    }

    /// Fraction of trials reaching `target` within `budget` wishes.
    pub fn estimate_budget_success_rate(
        &self,
        banner: &BannerStateMachine,
        budget: u32,
        target: u32,
        trials: usize,
    ) -> Result<f64> {
        let outcomes = self.run_trials(
            trials,
            || banner.clone(),
            |machine: &mut BannerStateMachine, rng| machine.try_pull(budget, target, rng).0,
        )?;
        Ok(success_fraction(&outcomes))
    }
}

pub fn success_fraction(outcomes: &[bool]) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    outcomes.iter().filter(|&&ok| ok).count() as f64 / outcomes.len() as f64
}

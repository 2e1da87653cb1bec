//! Independent repeated runs and distributional queries over them.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::SimRng;
use crate::error::{SimError, SimResult};
use crate::simulation::Simulation;
use crate::state::SimulationState;
use crate::trajectory::Trajectory;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleOptions {
    pub n_runs: usize,
    /// Master seed; run `i` uses a stream derived from `(seed, i)`.
    pub seed: u64,
    /// Worker threads; `None` uses the global rayon pool.
    pub n_threads: Option<usize>,
}

impl Default for EnsembleOptions {
    fn default() -> Self {
        Self {
            n_runs: 1,
            seed: 0xDEAD_BEEF_CAFE_BABE,
            n_threads: None,
        }
    }
}

impl EnsembleOptions {
    pub fn new(n_runs: usize, seed: u64) -> Self {
        Self {
            n_runs,
            seed,
            n_threads: None,
        }
    }

    pub fn with_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = Some(n_threads);
        self
    }
}

/// Seed of run `run` under master seed `seed` (SplitMix64 finaliser).
pub fn derive_seed(seed: u64, run: u64) -> u64 {
    const GOLDEN_GAMMA: u64 = 0x9E3779B97F4A7C15;
    let mut z = seed ^ run.wrapping_mul(GOLDEN_GAMMA);
    z = z.wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

#[derive(Debug)]
pub struct RunOutcome {
    pub run: usize,
    pub seed: u64,
    pub result: SimResult<Trajectory>,
}

/// Mean and unbiased variance of one species across successful runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeciesSummary {
    pub species: usize,
    pub samples: usize,
    pub mean: f64,
    pub variance: f64,
}

#[derive(Debug)]
pub struct Ensemble {
    n_species: usize,
    outcomes: Vec<RunOutcome>,
}

impl Ensemble {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn outcomes(&self) -> &[RunOutcome] {
        &self.outcomes
    }

    pub fn successful(&self) -> impl Iterator<Item = &Trajectory> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &SimError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|err| (o.run, err)))
    }

    pub fn n_successful(&self) -> usize {
        self.successful().count()
    }

    pub fn n_failed(&self) -> usize {
        self.len() - self.n_successful()
    }

    /// Count of `species` at time `t` in every successful run.
    pub fn samples_at(&self, species: usize, t: f64) -> Vec<u64> {
        self.successful()
            .filter_map(|traj| traj.species_at(species, t))
            .collect()
    }

    pub fn histogram_at(&self, species: usize, t: f64) -> BTreeMap<u64, usize> {
        let mut histogram = BTreeMap::new();
        for count in self.samples_at(species, t) {
            *histogram.entry(count).or_insert(0) += 1;
        }
        histogram
    }

    /// Empirical probability mass function, indexed by count.
    pub fn pmf_at(&self, species: usize, t: f64) -> Vec<f64> {
        let samples = self.samples_at(species, t);
        let Some(&max) = samples.iter().max() else {
            return Vec::new();
        };
        let mut pmf = vec![0.0; max as usize + 1];
        let weight = 1.0 / samples.len() as f64;
        for count in samples {
            pmf[count as usize] += weight;
        }
        pmf
    }

    pub fn mean_at(&self, species: usize, t: f64) -> Option<f64> {
        let samples = self.samples_at(species, t);
        (!samples.is_empty()).then(|| mean(&samples))
    }

    /// Unbiased sample variance; needs at least two runs.
    pub fn variance_at(&self, species: usize, t: f64) -> Option<f64> {
        let samples = self.samples_at(species, t);
        (samples.len() >= 2).then(|| variance(&samples))
    }

    pub fn summary_at(&self, t: f64) -> Vec<SpeciesSummary> {
        (0..self.n_species)
            .map(|species| {
                let samples = self.samples_at(species, t);
                SpeciesSummary {
                    species,
                    samples: samples.len(),
                    mean: if samples.is_empty() { f64::NAN } else { mean(&samples) },
                    variance: if samples.len() < 2 {
                        f64::NAN
                    } else {
                        variance(&samples)
                    },
                }
            })
            .collect()
    }

    /// Average over successful runs of the fraction of time `predicate` held.
    pub fn mean_time_fraction(&self, predicate: impl Fn(&[u64]) -> bool) -> Option<f64> {
        let fractions: Vec<f64> = self
            .successful()
            .map(|traj| traj.time_fraction(&predicate))
            .collect();
        (!fractions.is_empty()).then(|| fractions.iter().sum::<f64>() / fractions.len() as f64)
    }
}

fn mean(samples: &[u64]) -> f64 {
    samples.iter().map(|&x| x as f64).sum::<f64>() / samples.len() as f64
}

fn variance(samples: &[u64]) -> f64 {
    let m = mean(samples);
    samples
        .iter()
        .map(|&x| (x as f64 - m).powi(2))
        .sum::<f64>()
        / (samples.len() - 1) as f64
}

pub(crate) fn run_ensemble(
    simulation: &Simulation<'_>,
    initial: &SimulationState,
    options: &EnsembleOptions,
) -> SimResult<Ensemble> {
    if options.n_runs == 0 {
        return Err(SimError::InvalidArgument(
            "number of runs must be greater than zero".into(),
        ));
    }
    simulation.validate_initial(initial)?;

    let simulate = || -> Vec<RunOutcome> {
        (0..options.n_runs)
            .into_par_iter()
            .map(|run| {
                let seed = derive_seed(options.seed, run as u64);
                let mut rng = SimRng::seed_from_u64(seed);
                let result = simulation.run(initial, &mut rng);
                if let Err(err) = &result {
                    log::warn!("run {run} (seed {seed:#x}) failed: {err}");
                }
                RunOutcome { run, seed, result }
            })
            .collect()
    };

    let outcomes = match options.n_threads {
        Some(n) => ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| SimError::ThreadPool(e.to_string()))?
            .install(simulate),
        None => simulate(),
    };

    let ensemble = Ensemble {
        n_species: simulation.network().n_species(),
        outcomes,
    };
    log::info!(
        "ensemble finished: {} of {} runs successful",
        ensemble.n_successful(),
        ensemble.len()
    );
    Ok(ensemble)
}

//! Deterministic events at fixed multiples of a period, such as cell division.

use std::fmt;
use std::sync::Arc;

use rand_distr::{Binomial, Distribution};

use crate::SimRng;
use crate::error::{SimError, SimResult};

/// A state rewrite applied outside the reaction dynamics.
///
/// Implementations map the pre-event counts to the post-event counts and must
/// return one count per species.
pub trait StateTransform: Send + Sync {
    fn apply(&self, counts: &[u64], rng: &mut SimRng) -> Vec<u64>;
}

impl<F> StateTransform for F
where
    F: Fn(&[u64], &mut SimRng) -> Vec<u64> + Send + Sync,
{
    fn apply(&self, counts: &[u64], rng: &mut SimRng) -> Vec<u64> {
        self(counts, rng)
    }
}

/// Random partitioning at division: each molecule independently stays with
/// the retained daughter with probability `p`.
#[derive(Clone, Debug, PartialEq)]
pub struct BinomialDivision {
    probability: f64,
    only: Option<Vec<usize>>,
}

impl Default for BinomialDivision {
    fn default() -> Self {
        Self {
            probability: 0.5,
            only: None,
        }
    }
}

impl BinomialDivision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probability(probability: f64) -> SimResult<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(SimError::config(format!(
                "partition probability must lie in [0, 1], got {probability}"
            )));
        }
        Ok(Self {
            probability,
            only: None,
        })
    }

    /// Partition only these species (by index); others keep their counts.
    pub fn only(mut self, species: Vec<usize>) -> Self {
        self.only = Some(species);
        self
    }

    fn partition(&self, count: u64, rng: &mut SimRng) -> u64 {
        if count == 0 {
            return 0;
        }
        match Binomial::new(count, self.probability) {
            Ok(dist) => dist.sample(rng),
            // Unreachable for a probability validated in [0, 1].
            Err(_) => count,
        }
    }
}

impl StateTransform for BinomialDivision {
    fn apply(&self, counts: &[u64], rng: &mut SimRng) -> Vec<u64> {
        counts
            .iter()
            .enumerate()
            .map(|(idx, &count)| match &self.only {
                Some(subset) if !subset.contains(&idx) => count,
                _ => self.partition(count, rng),
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct PeriodicEvent {
    period: f64,
    transform: Arc<dyn StateTransform>,
}

impl PeriodicEvent {
    pub fn new(period: f64, transform: impl StateTransform + 'static) -> SimResult<Self> {
        if !period.is_finite() || period <= 0.0 {
            return Err(SimError::config(format!(
                "event period must be positive and finite, got {period}"
            )));
        }
        Ok(Self {
            period,
            transform: Arc::new(transform),
        })
    }

    /// Cell division every `period` with binomial halving of every species.
    pub fn division(period: f64) -> SimResult<Self> {
        Self::new(period, BinomialDivision::new())
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    /// Time of the `k`-th event.
    #[inline]
    pub fn time_of(&self, k: u64) -> f64 {
        k as f64 * self.period
    }
}

impl fmt::Debug for PeriodicEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicEvent")
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

/// Per-run cursor over the event times of an optional [`PeriodicEvent`].
pub(crate) struct PeriodicSchedule<'a> {
    event: Option<&'a PeriodicEvent>,
    next: u64,
}

impl<'a> PeriodicSchedule<'a> {
    /// Events strictly after `start` are pending.
    pub(crate) fn new(event: Option<&'a PeriodicEvent>, start: f64) -> Self {
        let mut next = 1;
        if let Some(ev) = event {
            next = (start / ev.period).floor().max(0.0) as u64 + 1;
            while ev.time_of(next) <= start {
                next += 1;
            }
            while next > 1 && ev.time_of(next - 1) > start {
                next -= 1;
            }
        }
        Self { event, next }
    }

    pub(crate) fn next_time(&self) -> f64 {
        self.event
            .map(|ev| ev.time_of(self.next))
            .unwrap_or(f64::INFINITY)
    }

    pub(crate) fn is_due(&self, t: f64) -> bool {
        self.next_time() <= t
    }

    /// Replace `counts` with the transform's output and move to the next event.
    pub(crate) fn fire(&mut self, counts: &mut Vec<u64>, rng: &mut SimRng) -> SimResult<()> {
        let Some(event) = self.event else {
            return Ok(());
        };
        let updated = event.transform.apply(counts, rng);
        if updated.len() != counts.len() {
            return Err(SimError::InvalidArgument(format!(
                "periodic transform returned {} counts for {} species",
                updated.len(),
                counts.len()
            )));
        }
        log::trace!(
            "periodic event {} at t={}: {:?} -> {:?}",
            self.next,
            event.time_of(self.next),
            counts,
            updated
        );
        *counts = updated;
        self.next += 1;
        Ok(())
    }
}


//! Recorded runs as right-continuous step functions of time.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

const TIME_EPSILON: f64 = 1e-12;

/// Which points a run keeps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recording {
    /// The initial state and the state after every jump and periodic event.
    #[default]
    AllEvents,
    /// The state at each of these (ascending) times.
    Grid(Vec<f64>),
    /// Only the state at the horizon.
    FinalOnly,
}

impl Recording {
    pub(crate) fn validate(&self, t_end: f64) -> SimResult<()> {
        if let Self::Grid(points) = self {
            if points.iter().any(|t| !t.is_finite()) {
                return Err(SimError::config("recording times must be finite"));
            }
            if points.windows(2).any(|w| w[0] > w[1] + TIME_EPSILON) {
                return Err(SimError::config(
                    "recording times must be sorted in ascending order",
                ));
            }
            if points.last().is_some_and(|&last| last > t_end + TIME_EPSILON) {
                return Err(SimError::config("recording times cannot exceed t_end"));
            }
        }
        Ok(())
    }
}

/// What produced a recorded point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    Initial,
    /// Firing of the reaction with this declaration index.
    Reaction(usize),
    Periodic,
    Sample,
    Final,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The horizon was reached.
    Horizon,
    /// All propensities vanished at `time` and nothing later revived them.
    Absorbed { time: f64 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    n_species: usize,
    times: Vec<f64>,
    counts: Vec<u64>,
    kinds: Vec<PointKind>,
    t_end: f64,
    termination: Termination,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn n_species(&self) -> usize {
        self.n_species
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn kinds(&self) -> &[PointKind] {
        &self.kinds
    }

    pub fn t_end(&self) -> f64 {
        self.t_end
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// Counts of the `i`-th recorded point.
    pub fn state(&self, i: usize) -> &[u64] {
        &self.counts[i * self.n_species..(i + 1) * self.n_species]
    }

    pub fn final_state(&self) -> Option<&[u64]> {
        self.len().checked_sub(1).map(|i| self.state(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &[u64])> {
        self.times
            .iter()
            .copied()
            .zip(self.counts.chunks_exact(self.n_species.max(1)))
    }

    /// Counts held at time `t`: the most recent point at or before `t`.
    /// `None` before the first point or after the horizon.
    pub fn value_at(&self, t: f64) -> Option<&[u64]> {
        if t > self.t_end + TIME_EPSILON {
            return None;
        }
        let idx = self.times.partition_point(|&x| x <= t);
        idx.checked_sub(1).map(|i| self.state(i))
    }

    pub fn species_at(&self, species: usize, t: f64) -> Option<u64> {
        self.value_at(t).map(|counts| counts[species])
    }

    /// Counts of one species at every recorded point.
    pub fn series(&self, species: usize) -> Vec<u64> {
        assert!(
            species < self.n_species,
            "species index {species} out of range for {} species",
            self.n_species
        );
        self.counts
            .iter()
            .skip(species)
            .step_by(self.n_species.max(1))
            .copied()
            .collect()
    }

    /// Number of recorded firings of reaction `idx`.
    pub fn reaction_count(&self, idx: usize) -> usize {
        self.kinds
            .iter()
            .filter(|k| **k == PointKind::Reaction(idx))
            .count()
    }

    /// Fraction of `[t_first, t_end]` during which `predicate` held.
    pub fn time_fraction(&self, predicate: impl Fn(&[u64]) -> bool) -> f64 {
        let Some(&start) = self.times.first() else {
            return 0.0;
        };
        let span = self.t_end - start;
        if span <= 0.0 {
            return match self.final_state() {
                Some(s) if predicate(s) => 1.0,
                _ => 0.0,
            };
        }
        let held: f64 = self
            .segments()
            .filter(|(_, _, counts)| predicate(counts))
            .map(|(from, to, _)| to - from)
            .sum();
        held / span
    }

    /// Time-weighted mean count of one species over `[t_first, t_end]`.
    pub fn time_average(&self, species: usize) -> f64 {
        let Some(&start) = self.times.first() else {
            return 0.0;
        };
        let span = self.t_end - start;
        if span <= 0.0 {
            return self.final_state().map_or(0.0, |s| s[species] as f64);
        }
        let weighted: f64 = self
            .segments()
            .map(|(from, to, counts)| (to - from) * counts[species] as f64)
            .sum();
        weighted / span
    }

    /// `(from, to, counts)` for every constant piece of the step function.
    fn segments(&self) -> impl Iterator<Item = (f64, f64, &[u64])> {
        (0..self.len()).map(move |i| {
            let to = self.times.get(i + 1).copied().unwrap_or(self.t_end);
            (self.times[i], to.max(self.times[i]), self.state(i))
        })
    }
}

/// Accumulates the points of one run according to a [`Recording`] mode.
pub(crate) struct Recorder<'a> {
    mode: &'a Recording,
    n_species: usize,
    next_grid: usize,
    times: Vec<f64>,
    counts: Vec<u64>,
    kinds: Vec<PointKind>,
}

impl<'a> Recorder<'a> {
    pub(crate) fn new(mode: &'a Recording, n_species: usize, start: f64) -> Self {
        let next_grid = match mode {
            Recording::Grid(points) => points.partition_point(|&tp| tp + TIME_EPSILON < start),
            _ => 0,
        };
        Self {
            mode,
            n_species,
            next_grid,
            times: Vec::new(),
            counts: Vec::new(),
            kinds: Vec::new(),
        }
    }

    fn push(&mut self, t: f64, state: &[u64], kind: PointKind) {
        debug_assert_eq!(state.len(), self.n_species);
        debug_assert!(self.times.last().is_none_or(|&last| last <= t));
        self.times.push(t);
        self.counts.extend_from_slice(state);
        self.kinds.push(kind);
    }

    /// The state is about to change at `t`; grid points strictly before `t`
    /// take the current (pre-change) counts.
    pub(crate) fn hold_until(&mut self, t: f64, state: &[u64]) {
        if let Recording::Grid(points) = self.mode {
            while let Some(&tp) = points.get(self.next_grid) {
                if tp + TIME_EPSILON < t {
                    self.push(tp, state, PointKind::Sample);
                    self.next_grid += 1;
                } else {
                    break;
                }
            }
        }
    }

    /// `state` holds from `t` onwards.
    pub(crate) fn record(&mut self, t: f64, state: &[u64], kind: PointKind) {
        match self.mode {
            Recording::AllEvents => self.push(t, state, kind),
            Recording::Grid(points) => {
                while let Some(&tp) = points.get(self.next_grid) {
                    if tp <= t + TIME_EPSILON {
                        self.push(tp, state, PointKind::Sample);
                        self.next_grid += 1;
                    } else {
                        break;
                    }
                }
            }
            Recording::FinalOnly => {}
        }
    }

    pub(crate) fn finish(
        mut self,
        t_end: f64,
        state: &[u64],
        termination: Termination,
    ) -> Trajectory {
        match self.mode {
            Recording::Grid(_) => self.record(t_end, state, PointKind::Sample),
            Recording::FinalOnly => self.push(t_end, state, PointKind::Final),
            Recording::AllEvents => {}
        }
        Trajectory {
            n_species: self.n_species,
            times: self.times,
            counts: self.counts,
            kinds: self.kinds,
            t_end,
            termination,
        }
    }
}

#[cfg(test)]
impl Trajectory {
    pub(crate) fn from_points(
        n_species: usize,
        points: &[(f64, Vec<u64>)],
        t_end: f64,
    ) -> Self {
        let mut kinds = vec![PointKind::Sample; points.len()];
        if let Some(first) = kinds.first_mut() {
            *first = PointKind::Initial;
        }
        Self {
            n_species,
            times: points.iter().map(|(t, _)| *t).collect(),
            counts: points.iter().flat_map(|(_, c)| c.iter().copied()).collect(),
            kinds,
            t_end,
            termination: Termination::Horizon,
        }
    }
}

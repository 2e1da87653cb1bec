use crate::error::{SimError, SimResult};
use crate::network::{ReactionChannel, ReactionNetwork};
use crate::params::ParameterValues;
use crate::state::SimulationState;

impl ReactionChannel {
    /// Propensity before validation. Reactions lacking reactants are exactly
    /// zero without consulting the rate law.
    #[inline]
    pub(crate) fn propensity(
        &self,
        counts: &[u64],
        params: &[f64],
        t: f64,
        combinatoric: bool,
    ) -> Result<f64, String> {
        let mut factor = 1.0;
        for reactant in &self.reactants {
            let available = counts[reactant.species];
            if available < reactant.count {
                return Ok(0.0);
            }
            if !self.only_use_rate {
                factor *= if combinatoric {
                    binomial_coefficient(available, reactant.count)
                } else {
                    falling_factorial(available, reactant.count)
                };
            }
        }
        Ok(self.kinetics.rate(counts, params, t)? * factor)
    }
}

/// Evaluate reaction `idx` and reject negative or non-finite results.
#[inline]
pub(crate) fn checked_propensity(
    network: &ReactionNetwork,
    idx: usize,
    counts: &[u64],
    params: &[f64],
    t: f64,
) -> SimResult<f64> {
    let reaction = &network.reactions[idx];
    let value = reaction
        .propensity(counts, params, t, network.combinatoric_ratelaws)
        .map_err(|reason| SimError::RateLaw {
            reaction: reaction.id.clone(),
            reason,
        })?;
    if value >= 0.0 && value.is_finite() {
        // -0.0 from a zero rate times a negative factor is still zero
        Ok(value.abs())
    } else {
        Err(SimError::InvalidPropensity {
            reaction: reaction.id.clone(),
            time: t,
            value,
            state: counts.to_vec(),
        })
    }
}

/// Fill `out` with every propensity and return their sum.
pub(crate) fn recompute_propensities(
    network: &ReactionNetwork,
    counts: &[u64],
    params: &[f64],
    t: f64,
    out: &mut [f64],
) -> SimResult<f64> {
    let mut total = 0.0;
    for (idx, slot) in out.iter_mut().enumerate() {
        let value = checked_propensity(network, idx, counts, params, t)?;
        *slot = value;
        total += value;
    }
    Ok(total)
}

/// Propensity of every reaction, in declaration order, at time `t`.
pub fn propensities(
    network: &ReactionNetwork,
    state: &SimulationState,
    parameters: &ParameterValues,
    t: f64,
) -> SimResult<Vec<f64>> {
    if state.counts.len() != network.n_species() {
        return Err(SimError::InvalidArgument(format!(
            "state has {} species, network declares {}",
            state.counts.len(),
            network.n_species()
        )));
    }
    let mut out = vec![0.0; network.n_reactions()];
    recompute_propensities(network, &state.counts, parameters.as_slice(), t, &mut out)?;
    Ok(out)
}

/// Cumulative-sum inversion: the first reaction whose running sum reaches
/// `target`. Zero-propensity reactions are never returned.
pub(crate) fn select_reaction(propensities: &[f64], target: f64) -> Option<usize> {
    let mut acc = 0.0;
    let mut last_positive = None;
    for (idx, &value) in propensities.iter().enumerate() {
        if value <= 0.0 {
            continue;
        }
        acc += value;
        last_positive = Some(idx);
        if target <= acc {
            return Some(idx);
        }
    }
    last_positive
}

/// Binary tree of propensity partial sums, leaves in declaration order.
#[derive(Clone, Debug)]
pub(crate) struct PropensityTree {
    len: usize,
    leaf_count: usize,
    data: Vec<f64>,
}

impl PropensityTree {
    pub(crate) fn new(len: usize) -> Self {
        let leaf_count = len.max(1).next_power_of_two();
        Self {
            len,
            leaf_count,
            data: vec![0.0; leaf_count * 2],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn rebuild(&mut self, values: &[f64]) {
        debug_assert_eq!(values.len(), self.len);
        self.data.fill(0.0);
        self.data[self.leaf_count..self.leaf_count + values.len()].copy_from_slice(values);
        for idx in (1..self.leaf_count).rev() {
            self.data[idx] = self.data[idx << 1] + self.data[idx << 1 | 1];
        }
    }

    pub(crate) fn total(&self) -> f64 {
        self.data[1]
    }

    pub(crate) fn update(&mut self, idx: usize, value: f64) {
        let mut pos = self.leaf_count + idx;
        self.data[pos] = value;
        while pos > 1 {
            pos >>= 1;
            self.data[pos] = self.data[pos << 1] + self.data[pos << 1 | 1];
        }
    }

    /// Descend towards `target`; on equal bounds the left (earlier) subtree wins.
    pub(crate) fn select(&self, mut target: f64) -> usize {
        debug_assert!(self.len > 0);
        let mut node = 1usize;
        while node < self.leaf_count {
            let left = self.data[node << 1];
            if left > 0.0 && target <= left {
                node <<= 1;
            } else {
                target -= left;
                node = (node << 1) | 1;
            }
        }
        let idx = (node - self.leaf_count).min(self.len - 1);
        if self.data[self.leaf_count + idx] > 0.0 {
            return idx;
        }
        // Rounding walked past the last positive leaf.
        (0..idx)
            .rev()
            .find(|&i| self.data[self.leaf_count + i] > 0.0)
            .unwrap_or(idx)
    }
}

impl Default for PropensityTree {
    fn default() -> Self {
        Self::new(1)
    }
}

#[inline]
pub(crate) fn falling_factorial(value: u64, count: u64) -> f64 {
    match count {
        0 => 1.0,
        1 => value as f64,
        _ if value < count => 0.0,
        2 => value as f64 * (value - 1) as f64,
        _ => {
            let mut acc = 1.0;
            for i in 0..count {
                acc *= (value - i) as f64;
            }
            acc
        }
    }
}

#[inline]
pub(crate) fn binomial_coefficient(value: u64, count: u64) -> f64 {
    match count {
        0 => 1.0,
        1 => value as f64,
        _ if value < count => 0.0,
        _ => {
            let mut acc = 1.0;
            for i in 0..count {
                acc *= (value - i) as f64 / (i + 1) as f64;
            }
            acc
        }
    }
}

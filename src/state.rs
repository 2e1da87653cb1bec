use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::network::{ReactionNetwork, SpeciesDelta};

/// Time and species counts of one in-progress trajectory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub time: f64,
    pub counts: Vec<u64>,
}

impl SimulationState {
    pub fn new(counts: Vec<u64>) -> Self {
        Self { time: 0.0, counts }
    }

    pub fn at_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    /// Apply the net change of one reaction firing. Either every count is
    /// updated or none is.
    pub(crate) fn apply(
        &mut self,
        network: &ReactionNetwork,
        deltas: &[SpeciesDelta],
    ) -> SimResult<()> {
        if let Some(bad) = deltas
            .iter()
            .find(|d| self.counts[d.species].checked_add_signed(d.delta).is_none())
        {
            return Err(SimError::CountOverflow {
                species: network.species()[bad.species].id.clone(),
            });
        }
        for delta in deltas {
            let count = &mut self.counts[delta.species];
            *count = count.wrapping_add_signed(delta.delta);
        }
        Ok(())
    }
}

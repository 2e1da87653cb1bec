use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ensemble::EnsembleOptions;
use crate::error::{SimError, SimResult};
use crate::network::ReactionNetwork;
use crate::params::Parameters;
use crate::periodic::PeriodicEvent;
use crate::simulation::{Simulation, SimulationOptions};
use crate::state::SimulationState;

/// Everything needed to run an ensemble on an already-built network.
///
/// ```json
/// {
///   "parameters": { "rho": 5.0, "delta": 0.5 },
///   "initial": { "M": 0 },
///   "simulation": { "t_end": 10.0, "recording": "all_events" },
///   "ensemble": { "n_runs": 1000, "seed": 42 },
///   "division_period": 2.0
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub parameters: Parameters,
    pub initial: BTreeMap<String, u64>,
    pub simulation: SimulationOptions,
    pub ensemble: EnsembleOptions,
    /// Binomial cell division with this period, if any.
    pub division_period: Option<f64>,
}

impl RunConfig {
    pub fn from_json(text: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            SimError::config(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn initial_state(&self, network: &ReactionNetwork) -> SimResult<SimulationState> {
        let counts: Vec<(&str, u64)> = self
            .initial
            .iter()
            .map(|(id, &count)| (id.as_str(), count))
            .collect();
        network.state_from(&counts)
    }

    pub fn periodic_event(&self) -> SimResult<Option<PeriodicEvent>> {
        self.division_period.map(PeriodicEvent::division).transpose()
    }

    pub fn simulation<'a>(&self, network: &'a ReactionNetwork) -> SimResult<Simulation<'a>> {
        let simulation = Simulation::new(network, &self.parameters, self.simulation.clone())?;
        Ok(match self.periodic_event()? {
            Some(event) => simulation.with_periodic_event(event),
            None => simulation,
        })
    }
}

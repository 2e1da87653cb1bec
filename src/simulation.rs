//! One simulation context: a network bound to parameters and options, able to
//! produce trajectories from an initial state and an RNG stream.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::SimRng;
use crate::ensemble::{Ensemble, EnsembleOptions, run_ensemble};
use crate::error::{SimError, SimResult};
use crate::network::ReactionNetwork;
use crate::params::{ParameterValues, Parameters};
use crate::periodic::{PeriodicEvent, PeriodicSchedule};
use crate::propensity::PropensityTree;
use crate::state::SimulationState;
use crate::trajectory::{PointKind, Recorder, Recording, Trajectory};
use crate::{hybrid, ssa};

/// Which engine advances the jump process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Hybrid when any rate law reads `t`, Direct otherwise.
    #[default]
    Auto,
    /// Exact Direct Method; requires time-homogeneous rate laws.
    Direct,
    /// Cumulative-hazard integration.
    Hybrid,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorOptions {
    pub rtol: f64,
    pub atol: f64,
    pub initial_step: f64,
    /// Defaults to a hundredth of the simulated span.
    pub max_step: Option<f64>,
    pub min_step: f64,
    /// Step-size halvings allowed within one step before giving up.
    pub max_reductions: u32,
}

impl Default for IntegratorOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-9,
            initial_step: 1e-2,
            max_step: None,
            min_step: 1e-12,
            max_reductions: 30,
        }
    }
}

impl IntegratorOptions {
    fn validate(&self) -> SimResult<()> {
        if !(self.rtol >= 0.0 && self.atol >= 0.0) || self.rtol + self.atol <= 0.0 {
            return Err(SimError::config(
                "integrator tolerances must be non-negative and not both zero",
            ));
        }
        if !(self.initial_step.is_finite() && self.initial_step > 0.0) {
            return Err(SimError::config("initial_step must be positive"));
        }
        if self.max_step.is_some_and(|h| !(h.is_finite() && h > 0.0)) {
            return Err(SimError::config("max_step must be positive"));
        }
        if self.min_step.is_nan() || self.min_step < 0.0 {
            return Err(SimError::config("min_step must be non-negative"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationOptions {
    /// Horizon; runs end normally when it is reached.
    pub t_end: f64,
    pub method: Method,
    pub recording: Recording,
    /// Loop iterations (jumps, boundaries, integration steps) allowed per run.
    pub max_steps: Option<u64>,
    pub max_wall_time: Option<Duration>,
    pub integrator: IntegratorOptions,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            t_end: 1.0,
            method: Method::Auto,
            recording: Recording::AllEvents,
            max_steps: None,
            max_wall_time: None,
            integrator: IntegratorOptions::default(),
        }
    }
}

impl SimulationOptions {
    pub fn until(t_end: f64) -> Self {
        Self {
            t_end,
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_recording(mut self, recording: Recording) -> Self {
        self.recording = recording;
        self
    }

    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn with_max_wall_time(mut self, limit: Duration) -> Self {
        self.max_wall_time = Some(limit);
        self
    }

    pub fn with_integrator(mut self, integrator: IntegratorOptions) -> Self {
        self.integrator = integrator;
        self
    }

    fn validate(&self) -> SimResult<()> {
        if !(self.t_end.is_finite() && self.t_end >= 0.0) {
            return Err(SimError::config(format!(
                "t_end must be finite and non-negative, got {}",
                self.t_end
            )));
        }
        self.recording.validate(self.t_end)?;
        self.integrator.validate()
    }
}

/// Guards a single run against stalls.
pub(crate) struct RunGuard {
    max_steps: Option<u64>,
    max_wall_time: Option<Duration>,
    started: Instant,
    steps: u64,
}

impl RunGuard {
    const WALL_CHECK_INTERVAL: u64 = 256;

    fn new(options: &SimulationOptions) -> Self {
        Self {
            max_steps: options.max_steps,
            max_wall_time: options.max_wall_time,
            started: Instant::now(),
            steps: 0,
        }
    }

    #[inline]
    pub(crate) fn tick(&mut self, time: f64) -> SimResult<()> {
        self.steps += 1;
        if let Some(max) = self.max_steps {
            if self.steps > max {
                return Err(SimError::StepLimit { steps: max, time });
            }
        }
        if let Some(limit) = self.max_wall_time {
            if self.steps % Self::WALL_CHECK_INTERVAL == 0 {
                let elapsed = self.started.elapsed();
                if elapsed > limit {
                    return Err(SimError::WallClock { elapsed, time });
                }
            }
        }
        Ok(())
    }
}

/// Everything one run mutates, besides the state itself.
pub(crate) struct RunContext<'a> {
    pub network: &'a ReactionNetwork,
    pub params: &'a [f64],
    pub options: &'a SimulationOptions,
    pub schedule: PeriodicSchedule<'a>,
    pub recorder: Recorder<'a>,
    pub guard: RunGuard,
    pub rng: &'a mut SimRng,
}

#[derive(Default)]
pub(crate) struct TrajectoryScratch {
    pub propensities: Vec<f64>,
    pub tree: PropensityTree,
}

impl TrajectoryScratch {
    fn ensure(&mut self, n_reactions: usize) {
        if self.propensities.len() != n_reactions {
            self.propensities.resize(n_reactions, 0.0);
        }
        if self.tree.len() != n_reactions {
            self.tree = PropensityTree::new(n_reactions);
        }
    }
}

thread_local! {
    static TRAJECTORY_SCRATCH: RefCell<TrajectoryScratch> =
        RefCell::new(TrajectoryScratch::default());
}

#[derive(Debug)]
pub struct Simulation<'a> {
    network: &'a ReactionNetwork,
    parameters: ParameterValues,
    options: SimulationOptions,
    periodic: Option<PeriodicEvent>,
    method: Method,
}

impl<'a> Simulation<'a> {
    /// Bind parameters and options to a network. Fails with a configuration
    /// error before any simulation happens.
    pub fn new(
        network: &'a ReactionNetwork,
        parameters: &Parameters,
        options: SimulationOptions,
    ) -> SimResult<Self> {
        options.validate()?;
        let parameters = parameters.bind(network.parameter_names())?;
        let method = match options.method {
            Method::Auto if network.is_time_dependent() => Method::Hybrid,
            Method::Auto => Method::Direct,
            Method::Direct if network.is_time_dependent() => {
                return Err(SimError::config(
                    "the Direct method cannot simulate rate laws that depend on time",
                ));
            }
            explicit => explicit,
        };
        log::debug!(
            "simulation configured: method {:?}, t_end {}",
            method,
            options.t_end
        );
        Ok(Self {
            network,
            parameters,
            options,
            periodic: None,
            method,
        })
    }

    pub fn with_periodic_event(mut self, event: PeriodicEvent) -> Self {
        self.periodic = Some(event);
        self
    }

    /// The engine runs will use; never [`Method::Auto`].
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn network(&self) -> &ReactionNetwork {
        self.network
    }

    pub fn parameters(&self) -> &ParameterValues {
        &self.parameters
    }

    pub fn options(&self) -> &SimulationOptions {
        &self.options
    }

    pub fn periodic_event(&self) -> Option<&PeriodicEvent> {
        self.periodic.as_ref()
    }

    pub(crate) fn validate_initial(&self, initial: &SimulationState) -> SimResult<()> {
        if initial.counts.len() != self.network.n_species() {
            return Err(SimError::InvalidArgument(format!(
                "initial state length {} does not match number of species {}",
                initial.counts.len(),
                self.network.n_species()
            )));
        }
        if !(initial.time.is_finite() && initial.time >= 0.0 && initial.time <= self.options.t_end)
        {
            return Err(SimError::InvalidArgument(format!(
                "initial time {} must lie between 0 and t_end {}",
                initial.time, self.options.t_end
            )));
        }
        Ok(())
    }

    /// Simulate one trajectory from `initial` with the given RNG stream.
    pub fn run(&self, initial: &SimulationState, rng: &mut SimRng) -> SimResult<Trajectory> {
        self.validate_initial(initial)?;
        TRAJECTORY_SCRATCH.with(|cell| {
            let mut scratch = cell.borrow_mut();
            scratch.ensure(self.network.n_reactions());
            self.run_with_scratch(initial, rng, &mut scratch)
        })
    }

    pub fn run_seeded(&self, initial: &SimulationState, seed: u64) -> SimResult<Trajectory> {
        let mut rng = SimRng::seed_from_u64(seed);
        self.run(initial, &mut rng)
    }

    /// Run `options.n_runs` independent trajectories.
    pub fn ensemble(
        &self,
        initial: &SimulationState,
        options: &EnsembleOptions,
    ) -> SimResult<Ensemble> {
        run_ensemble(self, initial, options)
    }

    fn run_with_scratch(
        &self,
        initial: &SimulationState,
        rng: &mut SimRng,
        scratch: &mut TrajectoryScratch,
    ) -> SimResult<Trajectory> {
        let mut state = initial.clone();
        let mut ctx = RunContext {
            network: self.network,
            params: self.parameters.as_slice(),
            options: &self.options,
            schedule: PeriodicSchedule::new(self.periodic.as_ref(), state.time),
            recorder: Recorder::new(
                &self.options.recording,
                self.network.n_species(),
                state.time,
            ),
            guard: RunGuard::new(&self.options),
            rng,
        };
        ctx.recorder
            .record(state.time, &state.counts, PointKind::Initial);

        let termination = match self.method {
            Method::Hybrid => hybrid::run_hybrid(&mut ctx, &mut state, scratch)?,
            _ => ssa::run_direct(&mut ctx, &mut state, scratch)?,
        };
        Ok(ctx
            .recorder
            .finish(self.options.t_end, &state.counts, termination))
    }
}

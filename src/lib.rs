//! Stochastic simulation of chemical reaction networks.
//!
//! A [`ReactionNetwork`] is built once from species, reactions and parameter
//! names and shared read-only by every run. A [`Simulation`] binds it to
//! parameter values and [`SimulationOptions`], optionally with a
//! [`PeriodicEvent`] such as binomial cell division, and produces
//! [`Trajectory`] values either one at a time or as an [`Ensemble`] of
//! independently seeded runs computed in parallel.
//!
//! Networks whose rate laws are time-homogeneous are simulated with
//! Gillespie's Direct Method. Rate laws that read simulation time switch the
//! engine to cumulative-hazard integration; [`Simulation::method`] reports the
//! choice.
//!
//! ```no_run
//! use crnsim::{
//!     EnsembleOptions, NetworkBuilder, Parameters, RateLaw, Reaction, Simulation,
//!     SimulationOptions, Species,
//! };
//!
//! let network = NetworkBuilder::new()
//!     .species(Species::new("M").with_name("mRNA"))
//!     .parameters(["rho", "delta"])
//!     .reaction(Reaction::new("transcription", RateLaw::mass_action("rho")).product("M", 1))
//!     .reaction(Reaction::new("decay", RateLaw::mass_action("delta")).reactant("M", 1))
//!     .build()?;
//! let params = Parameters::new().with("rho", 5.0).with("delta", 0.5);
//! let simulation = Simulation::new(&network, &params, SimulationOptions::until(10.0))?;
//! let initial = network.state_from(&[("M", 0)])?;
//! let ensemble = simulation.ensemble(&initial, &EnsembleOptions::new(1000, 7))?;
//! println!("mean M at t=10: {:?}", ensemble.mean_at(0, 10.0));
//! # Ok::<(), crnsim::SimError>(())
//! ```

pub mod config;
pub mod ensemble;
pub mod error;
mod hybrid;
pub mod network;
pub mod params;
pub mod periodic;
pub mod propensity;
pub mod rate_law;
pub mod simulation;
mod ssa;
pub mod state;
pub mod trajectory;

/// Random stream owned by one run.
pub type SimRng = rand_chacha::ChaCha8Rng;

pub use config::RunConfig;
pub use ensemble::{Ensemble, EnsembleOptions, RunOutcome, SpeciesSummary, derive_seed};
pub use error::{SimError, SimResult};
pub use network::{NetworkBuilder, Reaction, ReactionNetwork, Species};
pub use params::{ParameterValues, Parameters};
pub use periodic::{BinomialDivision, PeriodicEvent, StateTransform};
pub use propensity::propensities;
pub use rate_law::{CustomRateLaw, RateArgs, RateConstant, RateLaw};
pub use simulation::{IntegratorOptions, Method, Simulation, SimulationOptions};
pub use state::SimulationState;
pub use trajectory::{PointKind, Recording, Termination, Trajectory};

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(
        "reaction '{reaction}' produced invalid propensity {value} at t={time} (state {state:?})"
    )]
    InvalidPropensity {
        reaction: String,
        time: f64,
        value: f64,
        state: Vec<u64>,
    },
    #[error("rate law of reaction '{reaction}' failed to evaluate: {reason}")]
    RateLaw { reaction: String, reason: String },
    #[error("integration failed at t={time}: {reason}")]
    Integration { time: f64, reason: String },
    #[error("step limit of {steps} exceeded at t={time}")]
    StepLimit { steps: u64, time: f64 },
    #[error("wall-clock limit exceeded after {elapsed:?} at t={time}")]
    WallClock { elapsed: Duration, time: f64 },
    #[error("count of species '{species}' left the representable range")]
    CountOverflow { species: String },
    #[error("thread pool error: {0}")]
    ThreadPool(String),
    #[error("malformed configuration document: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether the error belongs to a single run rather than to the setup.
    pub fn is_run_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidPropensity { .. }
                | Self::RateLaw { .. }
                | Self::Integration { .. }
                | Self::StepLimit { .. }
                | Self::WallClock { .. }
                | Self::CountOverflow { .. }
        )
    }
}

pub type SimResult<T> = Result<T, SimError>;

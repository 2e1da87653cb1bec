//! Rate laws as declared by the caller and in their index-resolved form.
//!
//! A rate law yields the propensity of a reaction *before* the combinatorial
//! factor of its reactants is applied (unless the reaction asks to use the
//! rate as-is). Species and parameters are referenced by name here and are
//! resolved to dense indices once, when the network is built.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use meval::{Context, ContextProvider, Expr};

use crate::error::{SimError, SimResult};

/// Symbol reserved for simulation time inside rate expressions.
pub const TIME_SYMBOL: &str = "t";

/// A numeric argument of a built-in rate law.
#[derive(Clone, Debug, PartialEq)]
pub enum RateConstant {
    Value(f64),
    Parameter(String),
}

impl From<f64> for RateConstant {
    fn from(value: f64) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for RateConstant {
    fn from(name: &str) -> Self {
        Self::Parameter(name.to_string())
    }
}

impl From<String> for RateConstant {
    fn from(name: String) -> Self {
        Self::Parameter(name)
    }
}

pub type RateFn = dyn Fn(&RateArgs<'_>) -> f64 + Send + Sync;

/// Inputs handed to a [`CustomRateLaw`] closure.
///
/// `count(i)` and `parameter(i)` are positional over the species and
/// parameters the custom law declared, in declaration order.
pub struct RateArgs<'a> {
    species: &'a [usize],
    parameters: &'a [usize],
    counts: &'a [u64],
    values: &'a [f64],
    t: f64,
}

impl RateArgs<'_> {
    pub fn count(&self, i: usize) -> f64 {
        self.counts[self.species[i]] as f64
    }

    pub fn parameter(&self, i: usize) -> f64 {
        self.values[self.parameters[i]]
    }

    pub fn time(&self) -> f64 {
        self.t
    }
}

/// A rate law given as a Rust closure.
#[derive(Clone)]
pub struct CustomRateLaw {
    species: Vec<String>,
    parameters: Vec<String>,
    time_dependent: bool,
    func: Arc<RateFn>,
}

impl CustomRateLaw {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&RateArgs<'_>) -> f64 + Send + Sync + 'static,
    {
        Self {
            species: Vec::new(),
            parameters: Vec::new(),
            time_dependent: false,
            func: Arc::new(func),
        }
    }

    pub fn reads_species<I, S>(mut self, species: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.species.extend(species.into_iter().map(Into::into));
        self
    }

    pub fn reads_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters.extend(parameters.into_iter().map(Into::into));
        self
    }

    /// Declare that the closure reads [`RateArgs::time`].
    pub fn time_dependent(mut self) -> Self {
        self.time_dependent = true;
        self
    }
}

impl fmt::Debug for CustomRateLaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRateLaw")
            .field("species", &self.species)
            .field("parameters", &self.parameters)
            .field("time_dependent", &self.time_dependent)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub enum RateLaw {
    /// Constant rate, multiplied by the reactant combinatorics.
    MassAction(RateConstant),
    /// `vmax * x^n / (k^n + x^n)`
    Hill {
        vmax: RateConstant,
        activator: String,
        k: RateConstant,
        n: RateConstant,
    },
    /// `vmax * k^n / (k^n + x^n)`
    HillRepressor {
        vmax: RateConstant,
        repressor: String,
        k: RateConstant,
        n: RateConstant,
    },
    /// `vmax * x / (km + x)`
    MichaelisMenten {
        vmax: RateConstant,
        substrate: String,
        km: RateConstant,
    },
    /// Formula over species ids, parameter names and `t`.
    Expression(String),
    Custom(CustomRateLaw),
}

impl RateLaw {
    pub fn mass_action(k: impl Into<RateConstant>) -> Self {
        Self::MassAction(k.into())
    }

    pub fn hill(
        vmax: impl Into<RateConstant>,
        activator: impl Into<String>,
        k: impl Into<RateConstant>,
        n: impl Into<RateConstant>,
    ) -> Self {
        Self::Hill {
            vmax: vmax.into(),
            activator: activator.into(),
            k: k.into(),
            n: n.into(),
        }
    }

    pub fn hill_repressor(
        vmax: impl Into<RateConstant>,
        repressor: impl Into<String>,
        k: impl Into<RateConstant>,
        n: impl Into<RateConstant>,
    ) -> Self {
        Self::HillRepressor {
            vmax: vmax.into(),
            repressor: repressor.into(),
            k: k.into(),
            n: n.into(),
        }
    }

    pub fn michaelis_menten(
        vmax: impl Into<RateConstant>,
        substrate: impl Into<String>,
        km: impl Into<RateConstant>,
    ) -> Self {
        Self::MichaelisMenten {
            vmax: vmax.into(),
            substrate: substrate.into(),
            km: km.into(),
        }
    }

    pub fn expression(formula: impl Into<String>) -> Self {
        Self::Expression(formula.into())
    }

    pub fn custom(law: CustomRateLaw) -> Self {
        Self::Custom(law)
    }
}

/// Name tables used while resolving rate laws.
pub(crate) struct Symbols<'a> {
    pub species: HashMap<&'a str, usize>,
    pub parameters: HashMap<&'a str, usize>,
}

impl Symbols<'_> {
    fn species(&self, reaction: &str, name: &str) -> SimResult<usize> {
        self.species.get(name).copied().ok_or_else(|| {
            SimError::config(format!(
                "reaction '{reaction}' rate law references undeclared species '{name}'"
            ))
        })
    }

    fn parameter(&self, reaction: &str, name: &str) -> SimResult<usize> {
        self.parameters.get(name).copied().ok_or_else(|| {
            SimError::config(format!(
                "reaction '{reaction}' rate law references missing parameter '{name}'"
            ))
        })
    }

    fn coefficient(&self, reaction: &str, constant: &RateConstant) -> SimResult<Coefficient> {
        match constant {
            RateConstant::Value(value) => {
                if !value.is_finite() || *value < 0.0 {
                    return Err(SimError::config(format!(
                        "reaction '{reaction}' has invalid rate constant {value}"
                    )));
                }
                Ok(Coefficient::Value(*value))
            }
            RateConstant::Parameter(name) => {
                self.parameter(reaction, name).map(Coefficient::Parameter)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Coefficient {
    Value(f64),
    Parameter(usize),
}

impl Coefficient {
    #[inline]
    fn get(self, params: &[f64]) -> f64 {
        match self {
            Self::Value(value) => value,
            Self::Parameter(idx) => params[idx],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Binding {
    Species(usize),
    Parameter(usize),
    Time,
}

#[derive(Clone)]
pub(crate) enum Kinetics {
    MassAction(Coefficient),
    Hill {
        vmax: Coefficient,
        activator: usize,
        k: Coefficient,
        n: Coefficient,
    },
    HillRepressor {
        vmax: Coefficient,
        repressor: usize,
        k: Coefficient,
        n: Coefficient,
    },
    MichaelisMenten {
        vmax: Coefficient,
        substrate: usize,
        km: Coefficient,
    },
    Expression {
        expr: Expr,
        bindings: Vec<(String, Binding)>,
    },
    Custom {
        func: Arc<RateFn>,
        species: Vec<usize>,
        parameters: Vec<usize>,
        time_dependent: bool,
    },
}

impl fmt::Debug for Kinetics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MassAction(k) => f.debug_tuple("MassAction").field(k).finish(),
            Self::Hill { activator, .. } => {
                f.debug_struct("Hill").field("activator", activator).finish()
            }
            Self::HillRepressor { repressor, .. } => f
                .debug_struct("HillRepressor")
                .field("repressor", repressor)
                .finish(),
            Self::MichaelisMenten { substrate, .. } => f
                .debug_struct("MichaelisMenten")
                .field("substrate", substrate)
                .finish(),
            Self::Expression { bindings, .. } => f
                .debug_struct("Expression")
                .field("bindings", bindings)
                .finish(),
            Self::Custom {
                species,
                time_dependent,
                ..
            } => f
                .debug_struct("Custom")
                .field("species", species)
                .field("time_dependent", time_dependent)
                .finish_non_exhaustive(),
        }
    }
}

struct ExprScope<'a> {
    bindings: &'a [(String, Binding)],
    counts: &'a [u64],
    params: &'a [f64],
    t: f64,
}

impl ContextProvider for ExprScope<'_> {
    fn get_var(&self, name: &str) -> Option<f64> {
        self.bindings
            .iter()
            .find(|(bound, _)| bound == name)
            .map(|(_, binding)| match *binding {
                Binding::Species(idx) => self.counts[idx] as f64,
                Binding::Parameter(idx) => self.params[idx],
                Binding::Time => self.t,
            })
    }
}

impl RateLaw {
    pub(crate) fn compile(&self, reaction: &str, symbols: &Symbols<'_>) -> SimResult<Kinetics> {
        Ok(match self {
            Self::MassAction(k) => Kinetics::MassAction(symbols.coefficient(reaction, k)?),
            Self::Hill {
                vmax,
                activator,
                k,
                n,
            } => Kinetics::Hill {
                vmax: symbols.coefficient(reaction, vmax)?,
                activator: symbols.species(reaction, activator)?,
                k: symbols.coefficient(reaction, k)?,
                n: symbols.coefficient(reaction, n)?,
            },
            Self::HillRepressor {
                vmax,
                repressor,
                k,
                n,
            } => Kinetics::HillRepressor {
                vmax: symbols.coefficient(reaction, vmax)?,
                repressor: symbols.species(reaction, repressor)?,
                k: symbols.coefficient(reaction, k)?,
                n: symbols.coefficient(reaction, n)?,
            },
            Self::MichaelisMenten {
                vmax,
                substrate,
                km,
            } => Kinetics::MichaelisMenten {
                vmax: symbols.coefficient(reaction, vmax)?,
                substrate: symbols.species(reaction, substrate)?,
                km: symbols.coefficient(reaction, km)?,
            },
            Self::Expression(formula) => compile_expression(reaction, formula, symbols)?,
            Self::Custom(law) => Kinetics::Custom {
                func: Arc::clone(&law.func),
                species: law
                    .species
                    .iter()
                    .map(|name| symbols.species(reaction, name))
                    .collect::<SimResult<_>>()?,
                parameters: law
                    .parameters
                    .iter()
                    .map(|name| symbols.parameter(reaction, name))
                    .collect::<SimResult<_>>()?,
                time_dependent: law.time_dependent,
            },
        })
    }
}

fn compile_expression(reaction: &str, formula: &str, symbols: &Symbols<'_>) -> SimResult<Kinetics> {
    let expr = Expr::from_str(formula).map_err(|err| {
        SimError::config(format!(
            "reaction '{reaction}' expression parse error: {err}"
        ))
    })?;
    let mut bindings = Vec::new();
    for name in collect_identifiers(formula) {
        let binding = if name == TIME_SYMBOL {
            Binding::Time
        } else if let Some(&idx) = symbols.species.get(name.as_str()) {
            Binding::Species(idx)
        } else if let Some(&idx) = symbols.parameters.get(name.as_str()) {
            Binding::Parameter(idx)
        } else if is_builtin_constant(&name) {
            continue;
        } else {
            return Err(SimError::config(format!(
                "reaction '{reaction}' expression references unknown symbol '{name}' \
                 (neither a declared species nor a declared parameter)"
            )));
        };
        bindings.push((name, binding));
    }

    // A trial evaluation catches unknown functions and arity mistakes up front.
    let counts = vec![1; symbols.species.len()];
    let params = vec![1.0; symbols.parameters.len()];
    let probe = ExprScope {
        bindings: &bindings,
        counts: &counts,
        params: &params,
        t: 0.0,
    };
    expr.eval_with_context((probe, Context::new()))
        .map_err(|err| {
            SimError::config(format!(
                "reaction '{reaction}' expression cannot be evaluated: {err}"
            ))
        })?;

    Ok(Kinetics::Expression { expr, bindings })
}

fn is_builtin_constant(name: &str) -> bool {
    matches!(name, "pi" | "e")
}

/// Variable names in a formula, in first-appearance order. Names directly
/// followed by `(` are function calls and are skipped.
pub(crate) fn collect_identifiers(formula: &str) -> Vec<String> {
    let bytes = formula.as_bytes();
    let mut names: Vec<String> = Vec::new();
    let mut idx = 0;
    while idx < bytes.len() {
        let ch = bytes[idx];
        if ch.is_ascii_digit() || ch == b'.' {
            idx += 1;
            while idx < bytes.len() && (bytes[idx].is_ascii_digit() || bytes[idx] == b'.') {
                idx += 1;
            }
            if idx < bytes.len() && (bytes[idx] == b'e' || bytes[idx] == b'E') {
                let mut end = idx + 1;
                if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
                    end += 1;
                }
                if end < bytes.len() && bytes[end].is_ascii_digit() {
                    idx = end;
                    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
                        idx += 1;
                    }
                }
            }
            continue;
        }
        if ch.is_ascii_alphabetic() || ch == b'_' {
            let start = idx;
            while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_')
            {
                idx += 1;
            }
            let mut look = idx;
            while look < bytes.len() && bytes[look].is_ascii_whitespace() {
                look += 1;
            }
            let is_call = look < bytes.len() && bytes[look] == b'(';
            let name = &formula[start..idx];
            if !is_call && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
            continue;
        }
        idx += 1;
    }
    names
}

impl Kinetics {
    /// Raw rate-law value; the caller applies the depletion rule and the
    /// combinatorial factor.
    pub(crate) fn rate(&self, counts: &[u64], params: &[f64], t: f64) -> Result<f64, String> {
        match self {
            Self::MassAction(k) => Ok(k.get(params)),
            Self::Hill {
                vmax,
                activator,
                k,
                n,
            } => {
                let n = n.get(params);
                let power = (counts[*activator] as f64).powf(n);
                let denom = k.get(params).powf(n) + power;
                Ok(if denom == 0.0 {
                    0.0
                } else {
                    vmax.get(params) * power / denom
                })
            }
            Self::HillRepressor {
                vmax,
                repressor,
                k,
                n,
            } => {
                let n = n.get(params);
                let k_pow_n = k.get(params).powf(n);
                let denom = k_pow_n + (counts[*repressor] as f64).powf(n);
                Ok(if denom == 0.0 {
                    0.0
                } else {
                    vmax.get(params) * k_pow_n / denom
                })
            }
            Self::MichaelisMenten {
                vmax,
                substrate,
                km,
            } => {
                let x = counts[*substrate] as f64;
                let denom = km.get(params) + x;
                Ok(if denom == 0.0 {
                    0.0
                } else {
                    vmax.get(params) * x / denom
                })
            }
            Self::Expression { expr, bindings } => {
                let scope = ExprScope {
                    bindings,
                    counts,
                    params,
                    t,
                };
                expr.eval_with_context((scope, Context::new()))
                    .map_err(|err| err.to_string())
            }
            Self::Custom {
                func,
                species,
                parameters,
                ..
            } => Ok(func(&RateArgs {
                species,
                parameters,
                counts,
                values: params,
                t,
            })),
        }
    }

    /// Species whose counts the rate law reads (reactants excluded).
    pub(crate) fn species_refs(&self) -> Vec<usize> {
        match self {
            Self::MassAction(_) => Vec::new(),
            Self::Hill { activator, .. } => vec![*activator],
            Self::HillRepressor { repressor, .. } => vec![*repressor],
            Self::MichaelisMenten { substrate, .. } => vec![*substrate],
            Self::Expression { bindings, .. } => bindings
                .iter()
                .filter_map(|(_, b)| match b {
                    Binding::Species(idx) => Some(*idx),
                    _ => None,
                })
                .collect(),
            Self::Custom { species, .. } => species.clone(),
        }
    }

    pub(crate) fn is_time_dependent(&self) -> bool {
        match self {
            Self::Expression { bindings, .. } => {
                bindings.iter().any(|(_, b)| *b == Binding::Time)
            }
            Self::Custom { time_dependent, .. } => *time_dependent,
            _ => false,
        }
    }
}

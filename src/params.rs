use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Parameter values by name, as supplied by the caller.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters {
    values: BTreeMap<String, f64>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Resolve against the declared parameter order of a network.
    pub(crate) fn bind(&self, declared: &[String]) -> SimResult<ParameterValues> {
        let mut values = Vec::with_capacity(declared.len());
        for name in declared {
            let value = self
                .get(name)
                .ok_or_else(|| SimError::config(format!("missing parameter '{name}'")))?;
            if !value.is_finite() {
                return Err(SimError::config(format!(
                    "parameter '{name}' must be finite, got {value}"
                )));
            }
            values.push(value);
        }
        for (name, _) in self.iter() {
            if !declared.iter().any(|d| d == name) {
                log::debug!("ignoring parameter '{name}' not declared by the network");
            }
        }
        Ok(ParameterValues(values))
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Parameter values laid out in network declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterValues(pub(crate) Vec<f64>);

impl ParameterValues {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

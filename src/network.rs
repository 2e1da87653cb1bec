//! The validated, immutable description of a reaction network.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::rate_law::{Kinetics, RateLaw, Symbols, TIME_SYMBOL};
use crate::state::SimulationState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Species {
    pub id: String,
    pub name: String,
}

impl Species {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// A reaction as declared by the caller, referencing species by id.
#[derive(Clone, Debug)]
pub struct Reaction {
    id: String,
    reactants: Vec<(String, i64)>,
    products: Vec<(String, i64)>,
    rate: RateLaw,
    only_use_rate: bool,
}

impl Reaction {
    pub fn new(id: impl Into<String>, rate: RateLaw) -> Self {
        Self {
            id: id.into(),
            reactants: Vec::new(),
            products: Vec::new(),
            rate,
            only_use_rate: false,
        }
    }

    pub fn reactant(mut self, species: impl Into<String>, coefficient: i64) -> Self {
        self.reactants.push((species.into(), coefficient));
        self
    }

    pub fn product(mut self, species: impl Into<String>, coefficient: i64) -> Self {
        self.products.push((species.into(), coefficient));
        self
    }

    /// Use the rate law value as the propensity, without multiplying by the
    /// combinatorial factor of the reactants.
    pub fn only_use_rate(mut self) -> Self {
        self.only_use_rate = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Reactant {
    pub species: usize,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SpeciesDelta {
    pub species: usize,
    pub delta: i64,
}

#[derive(Clone, Debug)]
pub(crate) struct ReactionChannel {
    pub id: String,
    pub reactants: Vec<Reactant>,
    pub kinetics: Kinetics,
    pub only_use_rate: bool,
}

#[derive(Debug)]
pub struct ReactionNetwork {
    species: Vec<Species>,
    species_index: HashMap<String, usize>,
    parameters: Vec<String>,
    pub(crate) reactions: Vec<ReactionChannel>,
    pub(crate) reaction_deltas: Vec<Vec<SpeciesDelta>>,
    pub(crate) dependencies: Vec<Vec<usize>>,
    pub(crate) combinatoric_ratelaws: bool,
    time_dependent: bool,
}

impl ReactionNetwork {
    /// Validate and index a network. Rate laws use the combinatorial factor
    /// `C(x, s)` per reactant; see [`NetworkBuilder::combinatoric_ratelaws`].
    pub fn build(
        species: Vec<Species>,
        reactions: Vec<Reaction>,
        parameter_names: Vec<String>,
    ) -> SimResult<Self> {
        Self::build_with(species, reactions, parameter_names, true)
    }

    fn build_with(
        species: Vec<Species>,
        reactions: Vec<Reaction>,
        parameter_names: Vec<String>,
        combinatoric_ratelaws: bool,
    ) -> SimResult<Self> {
        if species.is_empty() {
            return Err(SimError::config("network must declare at least one species"));
        }

        let mut species_index = HashMap::with_capacity(species.len());
        for (idx, sp) in species.iter().enumerate() {
            check_identifier("species", &sp.id)?;
            if species_index.insert(sp.id.clone(), idx).is_some() {
                return Err(SimError::config(format!("duplicate species '{}'", sp.id)));
            }
        }
        let mut parameter_index = HashMap::with_capacity(parameter_names.len());
        for (idx, name) in parameter_names.iter().enumerate() {
            check_identifier("parameter", name)?;
            if species_index.contains_key(name) {
                return Err(SimError::config(format!(
                    "parameter '{name}' shares its name with a species"
                )));
            }
            if parameter_index.insert(name.as_str(), idx).is_some() {
                return Err(SimError::config(format!("duplicate parameter '{name}'")));
            }
        }
        let symbols = Symbols {
            species: species_index
                .iter()
                .map(|(k, &v)| (k.as_str(), v))
                .collect(),
            parameters: parameter_index,
        };

        let mut seen_reactions = HashSet::with_capacity(reactions.len());
        let mut channels = Vec::with_capacity(reactions.len());
        let mut reaction_deltas = Vec::with_capacity(reactions.len());
        for reaction in &reactions {
            if reaction.id.is_empty() {
                return Err(SimError::config("reaction identifiers must not be empty"));
            }
            if !seen_reactions.insert(reaction.id.as_str()) {
                return Err(SimError::config(format!(
                    "duplicate reaction '{}'",
                    reaction.id
                )));
            }
            if reaction.reactants.is_empty() && reaction.products.is_empty() {
                return Err(SimError::config(format!(
                    "reaction '{}' has neither reactants nor products",
                    reaction.id
                )));
            }
            let reactants = resolve_side(
                &reaction.id,
                "reactant",
                &reaction.reactants,
                &species_index,
            )?;
            let products = resolve_side(
                &reaction.id,
                "product",
                &reaction.products,
                &species_index,
            )?;
            let kinetics = reaction.rate.compile(&reaction.id, &symbols)?;

            reaction_deltas.push(build_reaction_deltas(species.len(), &reactants, &products));
            channels.push(ReactionChannel {
                id: reaction.id.clone(),
                reactants: reactants
                    .into_iter()
                    .map(|(species, count)| Reactant { species, count })
                    .collect(),
                kinetics,
                only_use_rate: reaction.only_use_rate,
            });
        }

        let dependencies = build_dependency_graph(species.len(), &reaction_deltas, &channels);
        let time_dependent = channels.iter().any(|c| c.kinetics.is_time_dependent());
        log::debug!(
            "built network with {} species, {} reactions, {} parameters (time-dependent: {})",
            species.len(),
            channels.len(),
            parameter_names.len(),
            time_dependent
        );

        Ok(Self {
            species,
            species_index,
            parameters: parameter_names,
            reactions: channels,
            reaction_deltas,
            dependencies,
            combinatoric_ratelaws,
            time_dependent,
        })
    }

    pub fn n_species(&self) -> usize {
        self.species.len()
    }

    pub fn n_reactions(&self) -> usize {
        self.reactions.len()
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn species_index(&self, id: &str) -> Option<usize> {
        self.species_index.get(id).copied()
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameters
    }

    pub fn reaction_id(&self, idx: usize) -> Option<&str> {
        self.reactions.get(idx).map(|r| r.id.as_str())
    }

    pub fn reaction_ids(&self) -> impl Iterator<Item = &str> {
        self.reactions.iter().map(|r| r.id.as_str())
    }

    /// Net change in each species when reaction `idx` fires once.
    pub fn net_change(&self, idx: usize) -> Vec<(usize, i64)> {
        self.reaction_deltas
            .get(idx)
            .map(|deltas| deltas.iter().map(|d| (d.species, d.delta)).collect())
            .unwrap_or_default()
    }

    /// Whether any rate law reads simulation time.
    pub fn is_time_dependent(&self) -> bool {
        self.time_dependent
    }

    /// Initial state at `t = 0` from named counts; unnamed species start at 0.
    pub fn state_from(&self, counts: &[(&str, u64)]) -> SimResult<SimulationState> {
        let mut state = vec![0u64; self.n_species()];
        for &(id, count) in counts {
            let idx = self.species_index(id).ok_or_else(|| {
                SimError::InvalidArgument(format!("unknown species '{id}' in initial state"))
            })?;
            state[idx] = count;
        }
        Ok(SimulationState::new(state))
    }
}

fn check_identifier(kind: &str, id: &str) -> SimResult<()> {
    if id.is_empty() {
        return Err(SimError::config(format!("{kind} identifiers must not be empty")));
    }
    if id == TIME_SYMBOL {
        return Err(SimError::config(format!(
            "{kind} cannot be named '{TIME_SYMBOL}', it denotes simulation time"
        )));
    }
    Ok(())
}

fn resolve_side(
    reaction: &str,
    side: &str,
    entries: &[(String, i64)],
    species_index: &HashMap<String, usize>,
) -> SimResult<Vec<(usize, u64)>> {
    let mut resolved: Vec<(usize, u64)> = Vec::with_capacity(entries.len());
    for (name, coefficient) in entries {
        let idx = species_index.get(name).copied().ok_or_else(|| {
            SimError::config(format!(
                "reaction '{reaction}' {side} references undeclared species '{name}'"
            ))
        })?;
        if *coefficient <= 0 {
            return Err(SimError::config(format!(
                "reaction '{reaction}' {side} '{name}' has non-positive coefficient {coefficient}"
            )));
        }
        if resolved.iter().any(|&(s, _)| s == idx) {
            return Err(SimError::config(format!(
                "reaction '{reaction}' lists {side} '{name}' more than once"
            )));
        }
        resolved.push((idx, *coefficient as u64));
    }
    Ok(resolved)
}

pub(crate) fn build_reaction_deltas(
    n_species: usize,
    reactants: &[(usize, u64)],
    products: &[(usize, u64)],
) -> Vec<SpeciesDelta> {
    let mut net = vec![0i64; n_species];
    for &(species, count) in reactants {
        net[species] -= count as i64;
    }
    for &(species, count) in products {
        net[species] += count as i64;
    }
    net.into_iter()
        .enumerate()
        .filter_map(|(species, delta)| (delta != 0).then_some(SpeciesDelta { species, delta }))
        .collect()
}

/// For each reaction, the reactions whose propensity may change when it fires
/// (itself included, listed first).
pub(crate) fn build_dependency_graph(
    n_species: usize,
    reaction_deltas: &[Vec<SpeciesDelta>],
    reactions: &[ReactionChannel],
) -> Vec<Vec<usize>> {
    let mut species_dependents: Vec<Vec<usize>> = vec![Vec::new(); n_species];
    for (idx, reaction) in reactions.iter().enumerate() {
        for reactant in &reaction.reactants {
            species_dependents[reactant.species].push(idx);
        }
        for species in reaction.kinetics.species_refs() {
            species_dependents[species].push(idx);
        }
    }

    let mut dependencies = vec![Vec::new(); reactions.len()];
    let mut visit_markers = vec![usize::MAX; reactions.len()];
    for (r, deps) in dependencies.iter_mut().enumerate() {
        visit_markers[r] = r;
        deps.push(r);
        for delta in &reaction_deltas[r] {
            for &dep in &species_dependents[delta.species] {
                if visit_markers[dep] != r {
                    visit_markers[dep] = r;
                    deps.push(dep);
                }
            }
        }
    }
    dependencies
}

/// Fluent construction of a [`ReactionNetwork`].
#[derive(Debug)]
pub struct NetworkBuilder {
    species: Vec<Species>,
    reactions: Vec<Reaction>,
    parameters: Vec<String>,
    combinatoric_ratelaws: bool,
}

impl Default for NetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self {
            species: Vec::new(),
            reactions: Vec::new(),
            parameters: Vec::new(),
            combinatoric_ratelaws: true,
        }
    }

    pub fn species(mut self, species: Species) -> Self {
        self.species.push(species);
        self
    }

    pub fn parameter(mut self, name: impl Into<String>) -> Self {
        self.parameters.push(name.into());
        self
    }

    pub fn parameters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn reaction(mut self, reaction: Reaction) -> Self {
        self.reactions.push(reaction);
        self
    }

    /// With `true` (default) a reactant of coefficient `s` and count `x`
    /// contributes `C(x, s)`; with `false` it contributes `x!/(x-s)!`.
    pub fn combinatoric_ratelaws(mut self, enabled: bool) -> Self {
        self.combinatoric_ratelaws = enabled;
        self
    }

    pub fn build(self) -> SimResult<ReactionNetwork> {
        ReactionNetwork::build_with(
            self.species,
            self.reactions,
            self.parameters,
            self.combinatoric_ratelaws,
        )
    }
}

//! Gillespie's Direct Method for time-homogeneous propensities.

use rand::Rng;
use rand_distr::Exp1;

use crate::error::SimResult;
use crate::propensity::{PropensityTree, checked_propensity, recompute_propensities};
use crate::simulation::{RunContext, TrajectoryScratch};
use crate::state::SimulationState;
use crate::trajectory::{PointKind, Termination};

fn refresh_all(
    ctx: &RunContext<'_>,
    state: &SimulationState,
    propensities: &mut [f64],
    tree: &mut PropensityTree,
) -> SimResult<f64> {
    recompute_propensities(ctx.network, &state.counts, ctx.params, state.time, propensities)?;
    tree.rebuild(propensities);
    Ok(tree.total())
}

pub(crate) fn run_direct(
    ctx: &mut RunContext<'_>,
    state: &mut SimulationState,
    scratch: &mut TrajectoryScratch,
) -> SimResult<Termination> {
    let network = ctx.network;
    let t_end = ctx.options.t_end;
    let TrajectoryScratch { propensities, tree } = scratch;

    let mut total_propensity = refresh_all(ctx, state, propensities, tree)?;
    let mut absorbed_at = (total_propensity == 0.0).then_some(state.time);

    while state.time < t_end {
        ctx.guard.tick(state.time)?;
        let next_boundary = ctx.schedule.next_time().min(t_end);

        let tau = if total_propensity > 0.0 {
            ctx.rng.sample::<f64, _>(Exp1) / total_propensity
        } else {
            f64::INFINITY
        };

        if state.time + tau >= next_boundary {
            // Boundary reached (periodic event or t_end); it wins ties.
            ctx.recorder.hold_until(next_boundary, &state.counts);
            state.time = next_boundary;
            if ctx.schedule.is_due(state.time) {
                ctx.schedule.fire(&mut state.counts, ctx.rng)?;
                ctx.recorder
                    .record(state.time, &state.counts, PointKind::Periodic);
                total_propensity = refresh_all(ctx, state, propensities, tree)?;
                absorbed_at = if total_propensity == 0.0 {
                    absorbed_at.or(Some(state.time))
                } else {
                    None
                };
            }
        } else {
            // Reaction occurs
            let next_time = state.time + tau;
            let u: f64 = ctx.rng.random();
            let chosen = tree.select(u * total_propensity);

            ctx.recorder.hold_until(next_time, &state.counts);
            state.apply(network, &network.reaction_deltas[chosen])?;
            state.time = next_time;

            for &dep in &network.dependencies[chosen] {
                let value = checked_propensity(network, dep, &state.counts, ctx.params, next_time)?;
                propensities[dep] = value;
                tree.update(dep, value);
            }
            total_propensity = tree.total();
            ctx.recorder
                .record(state.time, &state.counts, PointKind::Reaction(chosen));
            if total_propensity == 0.0 {
                absorbed_at = Some(state.time);
            }
        }
    }

    Ok(match absorbed_at {
        Some(time) => Termination::Absorbed { time },
        None => Termination::Horizon,
    })
}

//! Jump process with explicitly time-dependent propensities, simulated by the
//! random time-change representation.
//!
//! Between jumps the counts are frozen and only `t` moves, so the total
//! propensity `a0(t)` is an ordinary function of time. Each jump draws a
//! threshold `θ ~ Exp(1)`; the cumulative hazard `H = ∫ a0(s) ds` is integrated
//! forward with adaptive Simpson steps and the jump happens where `H` reaches
//! `θ`. With a constant `a0` the quadrature is exact and this reduces to
//! exponential waiting times.

use rand::Rng;
use rand_distr::Exp1;

use crate::error::{SimError, SimResult};
use crate::propensity::{recompute_propensities, select_reaction};
use crate::simulation::{RunContext, TrajectoryScratch};
use crate::state::SimulationState;
use crate::trajectory::{PointKind, Termination};

const BISECTION_ITERATIONS: usize = 200;

/// One accepted quadrature step of `a0` over `[t, t + h]`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct HazardStep {
    pub h: f64,
    pub f0: f64,
    pub f_mid: f64,
    pub f1: f64,
    pub increment: f64,
    pub next_h: f64,
}

impl HazardStep {
    /// Offset within the step at which the accumulated hazard equals
    /// `target`, using the quadratic interpolant through the three nodes.
    pub(crate) fn locate(&self, target: f64) -> f64 {
        if target <= 0.0 {
            return 0.0;
        }
        if target >= self.increment {
            return self.h;
        }
        let h = self.h;
        let b = (4.0 * self.f_mid - 3.0 * self.f0 - self.f1) / h;
        let c = 2.0 * (self.f1 - 2.0 * self.f_mid + self.f0) / (h * h);
        let integral = |x: f64| x * (self.f0 + x * (b / 2.0 + x * c / 3.0));

        let (mut lo, mut hi) = (0.0, h);
        for _ in 0..BISECTION_ITERATIONS {
            let mid = 0.5 * (lo + hi);
            if mid <= lo || mid >= hi {
                break;
            }
            if integral(mid) < target {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        hi
    }
}

fn total_at(
    ctx: &RunContext<'_>,
    state: &SimulationState,
    t: f64,
    propensities: &mut [f64],
) -> SimResult<f64> {
    recompute_propensities(ctx.network, &state.counts, ctx.params, t, propensities)
}

/// Integrate `a0` from the current time over at most `h_try`, halving the
/// step until the embedded trapezoid/Simpson error estimate is acceptable.
/// `start` is `a0` at the current time when the counts are unchanged since
/// it was evaluated.
pub(crate) fn integrate_step(
    ctx: &RunContext<'_>,
    state: &SimulationState,
    h_try: f64,
    start: Option<f64>,
    propensities: &mut [f64],
) -> SimResult<HazardStep> {
    let options = &ctx.options.integrator;
    let t = state.time;
    let f0 = match start {
        Some(f0) => f0,
        None => total_at(ctx, state, t, propensities)?,
    };
    let mut h = h_try;
    let mut reductions = 0u32;
    loop {
        let f_mid = total_at(ctx, state, t + 0.5 * h, propensities)?;
        let f1 = total_at(ctx, state, t + h, propensities)?;
        let simpson = h / 6.0 * (f0 + 4.0 * f_mid + f1);
        let trapezoid = h / 2.0 * (f0 + f1);
        let error = (simpson - trapezoid).abs();
        let tolerance = options.atol + options.rtol * simpson.abs();
        if error <= tolerance {
            let growth = if error == 0.0 {
                4.0
            } else {
                (0.9 * (tolerance / error).cbrt()).clamp(1.0, 4.0)
            };
            return Ok(HazardStep {
                h,
                f0,
                f_mid,
                f1,
                increment: simpson,
                next_h: h * growth,
            });
        }
        if reductions >= options.max_reductions || 0.5 * h < options.min_step {
            return Err(SimError::Integration {
                time: t,
                reason: format!(
                    "hazard quadrature did not converge after {reductions} step-size \
                     reductions (step {h:e}, error {error:e}, tolerance {tolerance:e})"
                ),
            });
        }
        h *= 0.5;
        reductions += 1;
    }
}

fn draw_threshold(ctx: &mut RunContext<'_>) -> f64 {
    ctx.rng.sample::<f64, _>(Exp1)
}

/// Fire one reaction at `t`, chosen by propensities evaluated at `t`.
fn jump(
    ctx: &mut RunContext<'_>,
    state: &mut SimulationState,
    t: f64,
    propensities: &mut [f64],
) -> SimResult<()> {
    let total = total_at(ctx, state, t, propensities)?;
    let u: f64 = ctx.rng.random();
    ctx.recorder.hold_until(t, &state.counts);
    state.time = t;
    let Some(chosen) = (total > 0.0)
        .then(|| select_reaction(propensities, u * total))
        .flatten()
    else {
        log::trace!("hazard threshold crossed at t={t} with vanishing propensity");
        return Ok(());
    };
    state.apply(ctx.network, &ctx.network.reaction_deltas[chosen])?;
    ctx.recorder
        .record(t, &state.counts, PointKind::Reaction(chosen));
    Ok(())
}

pub(crate) fn run_hybrid(
    ctx: &mut RunContext<'_>,
    state: &mut SimulationState,
    scratch: &mut TrajectoryScratch,
) -> SimResult<Termination> {
    let t_end = ctx.options.t_end;
    let integrator = &ctx.options.integrator;
    let max_step = integrator
        .max_step
        .unwrap_or((t_end - state.time) / 100.0)
        .max(integrator.min_step)
        .max(f64::MIN_POSITIVE);
    let mut h = integrator.initial_step.min(max_step);
    let propensities = &mut scratch.propensities;

    let mut threshold = draw_threshold(ctx);
    let mut hazard = 0.0;
    // a0 at state.time, valid until the counts change
    let mut a0_now: Option<f64> = None;

    while state.time < t_end {
        ctx.guard.tick(state.time)?;

        if hazard >= threshold {
            // Carried over a periodic boundary at the same instant.
            let t = state.time;
            jump(ctx, state, t, propensities)?;
            threshold = draw_threshold(ctx);
            hazard = 0.0;
            a0_now = None;
            continue;
        }

        let boundary = ctx.schedule.next_time().min(t_end);
        let span = boundary - state.time;
        if span > 0.0 {
            let step = integrate_step(
                ctx,
                state,
                h.min(max_step).min(span),
                a0_now,
                propensities,
            )?;
            h = step.next_h;
            let needed = threshold - hazard;
            if step.increment >= needed && step.increment > 0.0 {
                let offset = step.locate(needed);
                let t_jump = state.time + offset;
                if offset >= span || t_jump >= boundary {
                    // A periodic event fires first and the jump follows it;
                    // at the horizon the pending jump is dropped.
                    hazard = threshold;
                    state.time = boundary;
                } else {
                    jump(ctx, state, t_jump, propensities)?;
                    threshold = draw_threshold(ctx);
                    hazard = 0.0;
                    a0_now = None;
                    continue;
                }
            } else {
                hazard += step.increment;
                state.time = if step.h >= span {
                    boundary
                } else {
                    state.time + step.h
                };
                a0_now = Some(step.f1);
            }
        }

        if ctx.schedule.is_due(state.time) {
            ctx.recorder.hold_until(state.time, &state.counts);
            ctx.schedule.fire(&mut state.counts, ctx.rng)?;
            a0_now = None;
            ctx.recorder
                .record(state.time, &state.counts, PointKind::Periodic);
        }
    }

    Ok(Termination::Horizon)
}

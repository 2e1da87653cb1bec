//! Ensemble statistics against closed-form results.

use crnsim::{
    EnsembleOptions, Method, NetworkBuilder, Parameters, PeriodicEvent, PointKind, RateLaw,
    Reaction, ReactionNetwork, Recording, Simulation, SimulationOptions, SimulationState, Species,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn birth_death() -> ReactionNetwork {
    NetworkBuilder::new()
        .species(Species::new("M"))
        .parameters(["rho", "delta"])
        .reaction(Reaction::new("birth", RateLaw::mass_action("rho")).product("M", 1))
        .reaction(Reaction::new("death", RateLaw::mass_action("delta")).reactant("M", 1))
        .build()
        .unwrap()
}

fn telegraph() -> ReactionNetwork {
    NetworkBuilder::new()
        .species(Species::new("G_on"))
        .species(Species::new("G_off"))
        .parameters(["sigma_on", "sigma_off"])
        .reaction(
            Reaction::new("activate", RateLaw::mass_action("sigma_on"))
                .reactant("G_off", 1)
                .product("G_on", 1),
        )
        .reaction(
            Reaction::new("deactivate", RateLaw::mass_action("sigma_off"))
                .reactant("G_on", 1)
                .product("G_off", 1),
        )
        .build()
        .unwrap()
}

fn birth_death_mean(rho: f64, delta: f64, t: f64) -> f64 {
    rho / delta * (1.0 - (-delta * t).exp())
}

fn assert_relative(actual: f64, expected: f64, tolerance: f64) {
    let error = (actual - expected).abs() / expected.abs();
    assert!(
        error < tolerance,
        "actual {actual}, expected {expected} (relative error {error:.4})"
    );
}

#[test]
fn birth_death_mean_and_variance_match_poisson() {
    init_logging();
    let network = birth_death();
    let params = Parameters::new().with("rho", 5.0).with("delta", 0.5);
    let sim = Simulation::new(&network, &params, SimulationOptions::until(10.0)).unwrap();
    assert_eq!(sim.method(), Method::Direct);
    let ensemble = sim
        .ensemble(&SimulationState::new(vec![0]), &EnsembleOptions::new(1000, 2024))
        .unwrap();
    assert_eq!(ensemble.n_failed(), 0);

    let expected = birth_death_mean(5.0, 0.5, 10.0);
    assert_relative(ensemble.mean_at(0, 10.0).unwrap(), expected, 0.05);
    assert_relative(ensemble.variance_at(0, 10.0).unwrap(), expected, 0.15);
    assert_relative(
        ensemble.mean_at(0, 2.0).unwrap(),
        birth_death_mean(5.0, 0.5, 2.0),
        0.08,
    );
}

#[test]
fn telegraph_on_fraction_matches_stationary_probability() {
    let network = telegraph();
    let params = Parameters::new()
        .with("sigma_on", 1.0)
        .with("sigma_off", 2.0);
    let sim = Simulation::new(&network, &params, SimulationOptions::until(1000.0)).unwrap();
    let ensemble = sim
        .ensemble(&SimulationState::new(vec![0, 1]), &EnsembleOptions::new(20, 8))
        .unwrap();
    let on_fraction = ensemble.mean_time_fraction(|counts| counts[0] == 1).unwrap();
    assert!(
        (on_fraction - 1.0 / 3.0).abs() < 0.03,
        "on fraction {on_fraction}"
    );
}

#[test]
fn gene_copies_are_conserved() {
    let network = telegraph();
    let params = Parameters::new()
        .with("sigma_on", 0.7)
        .with("sigma_off", 0.3);
    let sim = Simulation::new(&network, &params, SimulationOptions::until(50.0)).unwrap();
    let initial = network.state_from(&[("G_off", 5)]).unwrap();
    let ensemble = sim.ensemble(&initial, &EnsembleOptions::new(25, 4)).unwrap();
    for traj in ensemble.successful() {
        assert!(traj.len() > 1);
        assert!(traj.iter().all(|(_, counts)| counts[0] + counts[1] == 5));
    }
}

#[test]
fn division_events_happen_at_exact_multiples_of_the_period() {
    let network = birth_death();
    let params = Parameters::new().with("rho", 5.0).with("delta", 0.5);
    let sim = Simulation::new(&network, &params, SimulationOptions::until(10.0))
        .unwrap()
        .with_periodic_event(PeriodicEvent::division(2.5).unwrap());
    let ensemble = sim
        .ensemble(&SimulationState::new(vec![20]), &EnsembleOptions::new(10, 31))
        .unwrap();
    for traj in ensemble.successful() {
        let periodic: Vec<f64> = traj
            .iter()
            .zip(traj.kinds())
            .filter(|(_, kind)| **kind == PointKind::Periodic)
            .map(|((t, _), _)| t)
            .collect();
        assert_eq!(periodic, vec![2.5, 5.0, 7.5, 10.0]);
    }
}

#[test]
fn binomial_division_halves_the_mean() {
    let network = NetworkBuilder::new()
        .species(Species::new("X"))
        .build()
        .unwrap();
    let options = SimulationOptions::until(1.0).with_recording(Recording::FinalOnly);
    let sim = Simulation::new(&network, &Parameters::new(), options)
        .unwrap()
        .with_periodic_event(PeriodicEvent::division(1.0).unwrap());
    let ensemble = sim
        .ensemble(&SimulationState::new(vec![1000]), &EnsembleOptions::new(2000, 77))
        .unwrap();
    let mean = ensemble.mean_at(0, 1.0).unwrap();
    assert!((mean - 500.0).abs() < 2.0, "mean after division {mean}");
    // binomial variance n p (1 - p)
    assert_relative(ensemble.variance_at(0, 1.0).unwrap(), 250.0, 0.15);
}

#[test]
fn hybrid_follows_a_linear_ramp_in_production() {
    init_logging();
    let network = NetworkBuilder::new()
        .species(Species::new("M"))
        .parameters(["a", "delta"])
        .reaction(Reaction::new("ramp", RateLaw::expression("a * t")).product("M", 1))
        .reaction(Reaction::new("death", RateLaw::mass_action("delta")).reactant("M", 1))
        .build()
        .unwrap();
    let params = Parameters::new().with("a", 2.0).with("delta", 0.5);
    let sim = Simulation::new(&network, &params, SimulationOptions::until(10.0)).unwrap();
    assert_eq!(sim.method(), Method::Hybrid);
    let ensemble = sim
        .ensemble(&SimulationState::new(vec![0]), &EnsembleOptions::new(400, 12))
        .unwrap();
    assert_eq!(ensemble.n_failed(), 0);

    // m(t) = a/delta * (t - (1 - exp(-delta t)) / delta)
    let (a, delta, t) = (2.0_f64, 0.5_f64, 10.0_f64);
    let expected = a / delta * (t - (1.0 - (-delta * t).exp()) / delta);
    assert_relative(ensemble.mean_at(0, t).unwrap(), expected, 0.05);
}

#[test]
fn hybrid_with_constant_rates_matches_direct_statistics() {
    let network = birth_death();
    let params = Parameters::new().with("rho", 5.0).with("delta", 0.5);
    let options = SimulationOptions::until(10.0).with_method(Method::Hybrid);
    let sim = Simulation::new(&network, &params, options).unwrap();
    assert_eq!(sim.method(), Method::Hybrid);
    let ensemble = sim
        .ensemble(&SimulationState::new(vec![0]), &EnsembleOptions::new(1000, 6))
        .unwrap();
    assert_relative(
        ensemble.mean_at(0, 10.0).unwrap(),
        birth_death_mean(5.0, 0.5, 10.0),
        0.05,
    );
}

#[test]
fn grid_recording_agrees_with_full_recording() {
    let network = birth_death();
    let params = Parameters::new().with("rho", 5.0).with("delta", 0.5);
    let grid: Vec<f64> = (0..=20).map(|i| i as f64 * 0.5).collect();
    let full = Simulation::new(&network, &params, SimulationOptions::until(10.0)).unwrap();
    let sampled = Simulation::new(
        &network,
        &params,
        SimulationOptions::until(10.0).with_recording(Recording::Grid(grid.clone())),
    )
    .unwrap();
    let initial = SimulationState::new(vec![3]);
    let a = full.run_seeded(&initial, 404).unwrap();
    let b = sampled.run_seeded(&initial, 404).unwrap();
    assert_eq!(b.times(), grid.as_slice());
    for &t in &grid {
        assert_eq!(a.value_at(t), b.value_at(t), "mismatch at t={t}");
    }
}

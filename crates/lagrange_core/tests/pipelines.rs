use lagrange_core::equation_engine::lambdify;
use lagrange_core::equilibrium::Stability;
use lagrange_core::ode::{dsolve, residual};
use lagrange_core::pipelines::{coupled, derivation, pendulum, stability};
use lagrange_core::{Coordinate, Expr, Symbol};
use num_complex::Complex;
use std::f64::consts::PI;

#[test]
fn derived_equation_of_motion_is_the_pendulum_equation() {
    let derivation = derivation::derive(&derivation::DerivationConfig::default()).unwrap();

    let t = Symbol::positive("t");
    let g = Expr::from(Symbol::positive("g"));
    let l = Expr::from(Symbol::positive("l"));
    let theta = Coordinate::new("theta", &t);
    let expected = (Expr::from(theta.nth(2)) + g / l * Expr::sin(Expr::from(&theta))).simplify();

    assert_eq!(derivation.equation_of_motion.lhs, expected);
    assert!(derivation.equation_of_motion.rhs.is_zero());
}

#[test]
fn pendulum_equilibria_have_the_expected_spectra() {
    let config = stability::StabilityConfig {
        grid: (30, 30),
        ..stability::StabilityConfig::default()
    };
    let analysis = stability::analyze(&config).unwrap();
    let g = Expr::from(Symbol::positive("g"));
    let l = Expr::from(Symbol::positive("l"));
    let bindings = [(g, Complex::new(9.82, 0.0)), (l, Complex::new(1.0, 0.0))];
    let rate = 9.82_f64.sqrt();

    for equilibrium in &analysis.equilibria {
        let values: Vec<Complex<f64>> = equilibrium
            .eigenvalues
            .iter()
            .map(|e| e.eval_complex(&bindings).unwrap())
            .collect();
        assert_eq!(values.len(), 2);
        if equilibrium.numeric_point[0].abs() < 1e-12 {
            assert_eq!(equilibrium.stability, Stability::Center);
            for v in &values {
                assert!(v.re.abs() < 1e-12);
                assert!((v.im.abs() - rate).abs() < 1e-9);
            }
        } else {
            assert!((equilibrium.numeric_point[0].abs() - PI).abs() < 1e-12);
            assert_eq!(equilibrium.stability, Stability::Saddle);
            let mut reals: Vec<f64> = values.iter().map(|v| v.re).collect();
            reals.sort_by(f64::total_cmp);
            assert!((reals[0] + rate).abs() < 1e-9);
            assert!((reals[1] - rate).abs() < 1e-9);
        }
    }
}

#[test]
fn linearized_pendulum_reaches_zero_at_quarter_period() {
    let config = pendulum::PendulumConfig::default();
    let response = pendulum::simulate(&config).unwrap();
    let t = Expr::from(&response.time);
    let f = lambdify(&response.particular_solution, &[t]).unwrap();

    let rate = (config.gravity / config.length).sqrt();
    assert!((f.call(&[0.0]) - 0.26).abs() < 1e-12);
    assert!(f.call(&[PI / (2.0 * rate)]).abs() < 1e-9);
    for &tv in &[0.3, 2.2, 7.5] {
        assert!((f.call(&[tv]) - 0.26 * (rate * tv).cos()).abs() < 1e-9);
    }
}

#[test]
fn symbolic_solution_satisfies_its_ode() {
    let t = Symbol::positive("t");
    let g = Expr::from(Symbol::positive("g"));
    let l = Expr::from(Symbol::positive("l"));
    let theta = Coordinate::new("theta", &t);
    let ode = Expr::from(theta.nth(2)) + g / l * Expr::from(&theta);

    let general = dsolve(&ode, &theta).unwrap();
    assert_eq!(general.constants.len(), 2);
    assert!(residual(&ode, &theta, &general.solution).is_zero());
}

#[test]
fn coupled_masses_start_at_rest_and_conserve_energy() {
    let response = coupled::simulate(&coupled::CoupledConfig::default()).unwrap();
    assert!(response.energy_drift < 1e-3);
    assert!((response.series[0].values[0] - 1.0).abs() < 1e-9);
    assert!(response.series[1].values[0].abs() < 1e-9);
    assert_eq!(response.solutions.len(), 4);
}

#[test]
fn coupled_closed_forms_satisfy_the_state_equations() {
    let config = coupled::CoupledConfig {
        m1: 1.0,
        m2: 2.0,
        k1: 3.0,
        k2: 1.5,
        k3: 2.0,
        initial: [0.5, -0.2, 0.1, 0.3],
        t_end: 10.0,
        samples: 50,
        ..coupled::CoupledConfig::default()
    };
    let response = coupled::simulate(&config).unwrap();

    let mut pairs = Vec::new();
    for (q, solution) in response.state.iter().zip(&response.solutions) {
        pairs.push((Expr::from(q.derivative()), solution.time_derivative(&response.time)));
        pairs.push((Expr::from(q), solution.clone()));
    }
    let params = [
        ("m1", config.m1),
        ("m2", config.m2),
        ("k1", config.k1),
        ("k2", config.k2),
        ("k3", config.k3),
    ];
    let t = Expr::from(&response.time);
    for residual in &response.residual {
        let substituted = residual.subs_all(&pairs);
        for &tv in &response.series[0].t {
            let mut bindings: Vec<(Expr, f64)> = params
                .iter()
                .map(|(name, value)| (Expr::from(Symbol::positive(*name)), *value))
                .collect();
            bindings.push((t.clone(), tv));
            let value = substituted.eval_real(&bindings).unwrap();
            assert!(value.abs() < 1e-8, "residual {} at t = {}", value, tv);
        }
    }
}

#[test]
fn runs_are_idempotent() {
    let stability_config = stability::StabilityConfig {
        grid: (30, 30),
        ..stability::StabilityConfig::default()
    };
    assert_eq!(
        derivation::run(&derivation::DerivationConfig::default()).unwrap(),
        derivation::run(&derivation::DerivationConfig::default()).unwrap()
    );
    assert_eq!(
        stability::run(&stability_config).unwrap(),
        stability::run(&stability_config).unwrap()
    );
    assert_eq!(
        pendulum::run(&pendulum::PendulumConfig::default()).unwrap(),
        pendulum::run(&pendulum::PendulumConfig::default()).unwrap()
    );
    assert_eq!(
        coupled::run(&coupled::CoupledConfig::default()).unwrap(),
        coupled::run(&coupled::CoupledConfig::default()).unwrap()
    );
}

use super::{bind, ExprReport, Series};
use crate::equation_engine::{lambdify, CompiledFunction, EquationSystem};
use crate::expr::Expr;
use crate::matrix::Matrix;
use crate::ode::solve_linear_ivp;
use crate::phase::linspace;
use crate::solvers::{integrate, RungeKutta};
use crate::symbol::{Coordinate, Symbol};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Fixed-step integrator used for the numeric cross-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Integrator {
    Rk4,
    Tsit5,
}

impl Integrator {
    fn stepper(self, dim: usize) -> RungeKutta<f64> {
        match self {
            Integrator::Rk4 => RungeKutta::rk4(dim),
            Integrator::Tsit5 => RungeKutta::tsit5(dim),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoupledConfig {
    pub m1: f64,
    pub m2: f64,
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    /// `[x1, x2, v1, v2]` at `t = 0`.
    pub initial: [f64; 4],
    pub t_end: f64,
    pub samples: usize,
    pub cross_check: Option<Integrator>,
    pub cross_check_dt: f64,
}

impl Default for CoupledConfig {
    fn default() -> Self {
        Self {
            m1: 1.0,
            m2: 1.0,
            k1: 4.0,
            k2: 2.0,
            k3: 4.0,
            initial: [1.0, 0.0, 0.0, 0.0],
            t_end: 50.0,
            samples: 1000,
            cross_check: None,
            cross_check_dt: 0.01,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoupledResponse {
    pub time: Symbol,
    pub state: Vec<Coordinate>,
    pub matrix: Matrix,
    pub residual: Vec<Expr>,
    pub solutions: Vec<Expr>,
    /// `x1(t)` and `x2(t)`.
    pub series: Vec<Series>,
    pub energy_drift: f64,
    pub cross_check: Option<CrossCheck>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossCheck {
    pub integrator: Integrator,
    pub dt: f64,
    pub steps: usize,
    pub max_deviation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentReport {
    pub name: String,
    pub solution: ExprReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoupledReport {
    pub matrix: ExprReport,
    pub residual: Vec<ExprReport>,
    pub solutions: Vec<ComponentReport>,
    pub energy_drift: f64,
    pub cross_check: Option<CrossCheck>,
    pub series: Vec<Series>,
}

fn validate(config: &CoupledConfig) -> Result<()> {
    if config.samples < 2 {
        bail!("samples must be at least 2.");
    }
    if config.t_end <= 0.0 {
        bail!("t_end must be positive.");
    }
    if config.cross_check.is_some() && config.cross_check_dt <= 0.0 {
        bail!("cross_check_dt must be positive.");
    }
    Ok(())
}

/// State matrix of two masses between three springs, `x' = A x` with
/// `x = [x1, x2, v1, v2]`.
fn state_matrix(m1: &Expr, m2: &Expr, k1: &Expr, k2: &Expr, k3: &Expr) -> Result<Matrix> {
    let zero = Expr::zero;
    let one = Expr::one;
    let rows = vec![
        vec![zero(), zero(), one(), zero()],
        vec![zero(), zero(), zero(), one()],
        vec![-(k1 + k2) / m1, k2 / m1, zero(), zero()],
        vec![k2 / m2, -(k2 + k3) / m2, zero(), zero()],
    ];
    Ok(Matrix::from_rows(rows)?.simplify())
}

fn mechanical_energy(config: &CoupledConfig, x: &[f64]) -> f64 {
    let (x1, x2, v1, v2) = (x[0], x[1], x[2], x[3]);
    0.5 * config.m1 * v1 * v1
        + 0.5 * config.m2 * v2 * v2
        + 0.5 * config.k1 * x1 * x1
        + 0.5 * config.k2 * (x2 - x1).powi(2)
        + 0.5 * config.k3 * x2 * x2
}

pub fn simulate(config: &CoupledConfig) -> Result<CoupledResponse> {
    validate(config)?;

    let time = Symbol::positive("t");
    let names = ["x1", "x2", "v1", "v2"];
    let state: Vec<Coordinate> = names.iter().map(|n| Coordinate::new(*n, &time)).collect();
    let state_exprs: Vec<Expr> = state.iter().map(Expr::from).collect();

    let symbols: Vec<Symbol> = ["m1", "m2", "k1", "k2", "k3"]
        .iter()
        .map(|n| Symbol::positive(*n))
        .collect();
    let atoms: Vec<Expr> = symbols.iter().map(Expr::from).collect();
    let matrix = state_matrix(&atoms[0], &atoms[1], &atoms[2], &atoms[3], &atoms[4])?;

    let fields = matrix
        .mul_vector(&state_exprs)
        .context("Failed to form A * state.")?;
    let residual: Vec<Expr> = state
        .iter()
        .zip(&fields)
        .map(|(q, field)| (Expr::from(q.derivative()) - field).simplify())
        .collect();
    for r in &residual {
        info!(residual = %r, "equation of motion");
    }

    let values = [config.m1, config.m2, config.k1, config.k2, config.k3];
    let bindings: Vec<(Expr, f64)> = symbols
        .iter()
        .zip(values)
        .map(|(s, v)| bind(s, v))
        .collect();
    let numeric = matrix
        .to_numeric(&bindings)
        .context("Failed to evaluate the state matrix.")?;
    debug!(?numeric, "numeric state matrix");

    let solutions = solve_linear_ivp(&numeric, &config.initial, &time)
        .context("Failed to solve the coupled initial-value problem.")?;
    for (name, solution) in names.iter().zip(&solutions) {
        info!(component = name, %solution, "closed form");
    }

    let t = Expr::from(&time);
    let compiled = solutions
        .iter()
        .map(|s| lambdify(s, &[t.clone()]))
        .collect::<Result<Vec<CompiledFunction>, _>>()
        .context("Failed to compile the closed-form solutions.")?;

    let ts = linspace(0.0, config.t_end, config.samples);
    let sampled: Vec<Vec<f64>> = compiled.iter().map(|f| f.sample(&ts)).collect();

    let initial_energy = mechanical_energy(config, &config.initial);
    let scale = if initial_energy.abs() > 0.0 {
        initial_energy.abs()
    } else {
        1.0
    };
    let energy_drift = (0..ts.len())
        .map(|i| {
            let x: Vec<f64> = sampled.iter().map(|c| c[i]).collect();
            (mechanical_energy(config, &x) - initial_energy).abs() / scale
        })
        .fold(0.0, f64::max);
    info!(energy_drift, "relative energy drift");

    let cross_check = match config.cross_check {
        Some(integrator) => Some(run_cross_check(
            integrator,
            config,
            &fields,
            &state_exprs,
            &bindings,
            &compiled,
        )?),
        None => None,
    };

    let series = names
        .iter()
        .zip(&sampled)
        .take(2)
        .map(|(name, values)| Series {
            label: format!("{}(t)", name),
            t: ts.clone(),
            values: values.clone(),
        })
        .collect();

    Ok(CoupledResponse {
        time,
        state,
        matrix,
        residual,
        solutions,
        series,
        energy_drift,
        cross_check,
    })
}

fn run_cross_check(
    integrator: Integrator,
    config: &CoupledConfig,
    fields: &[Expr],
    state: &[Expr],
    bindings: &[(Expr, f64)],
    closed_form: &[CompiledFunction],
) -> Result<CrossCheck> {
    let system = EquationSystem::compile(fields, state, bindings)
        .context("Failed to compile the coupled vector field.")?;
    let steps = (config.t_end / config.cross_check_dt - 1e-9).ceil().max(1.0) as usize;
    let mut stepper = integrator.stepper(state.len());
    let (times, states) = integrate(
        &system,
        &mut stepper,
        0.0,
        &config.initial,
        config.cross_check_dt,
        steps,
    );
    let max_deviation = times
        .iter()
        .zip(&states)
        .flat_map(|(&t, x)| {
            closed_form
                .iter()
                .zip(x)
                .map(move |(f, &xi)| (f.call(&[t]) - xi).abs())
        })
        .fold(0.0, f64::max);
    info!(?integrator, steps, max_deviation, "numeric cross-check");
    Ok(CrossCheck {
        integrator,
        dt: config.cross_check_dt,
        steps,
        max_deviation,
    })
}

impl CoupledResponse {
    pub fn report(&self) -> CoupledReport {
        CoupledReport {
            matrix: ExprReport::from(&self.matrix),
            residual: self.residual.iter().map(ExprReport::from).collect(),
            solutions: self
                .state
                .iter()
                .zip(&self.solutions)
                .map(|(q, s)| ComponentReport {
                    name: q.to_string(),
                    solution: ExprReport::from(s),
                })
                .collect(),
            energy_drift: self.energy_drift,
            cross_check: self.cross_check.clone(),
            series: self.series.clone(),
        }
    }
}

pub fn run(config: &CoupledConfig) -> Result<CoupledReport> {
    Ok(simulate(config)?.report())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_system_conserves_energy() {
        let response = simulate(&CoupledConfig::default()).expect("simulates");
        assert!(response.energy_drift < 1e-3);
        assert_eq!(response.series.len(), 2);
        assert_eq!(response.series[0].t.len(), 1000);
        assert!((response.series[0].values[0] - 1.0).abs() < 1e-9);
        assert!(response.series[1].values[0].abs() < 1e-9);
    }

    #[test]
    fn closed_form_matches_normal_modes() {
        let response = simulate(&CoupledConfig::default()).expect("simulates");
        let root2 = 2.0_f64.sqrt();
        for (t, x1) in response.series[0].t.iter().zip(&response.series[0].values) {
            let expected = 0.5 * (2.0 * t).cos() + 0.5 * (2.0 * root2 * t).cos();
            assert!((x1 - expected).abs() < 1e-8);
        }
        for (t, x2) in response.series[1].t.iter().zip(&response.series[1].values) {
            let expected = 0.5 * (2.0 * t).cos() - 0.5 * (2.0 * root2 * t).cos();
            assert!((x2 - expected).abs() < 1e-8);
        }
    }

    #[test]
    fn uncoupled_masses_share_a_frequency() {
        let config = CoupledConfig {
            k2: 0.0,
            initial: [1.0, 0.0, 0.0, 0.0],
            ..CoupledConfig::default()
        };
        let response = simulate(&config).expect("repeated but diagonalizable");
        for (t, x1) in response.series[0].t.iter().zip(&response.series[0].values) {
            assert!((x1 - (2.0 * t).cos()).abs() < 1e-8);
        }
        assert!(response.series[1].values.iter().all(|x2| x2.abs() < 1e-8));
    }

    #[test]
    fn residual_mentions_every_component() {
        let response = simulate(&CoupledConfig::default()).expect("simulates");
        let report = response.report();
        assert_eq!(report.residual.len(), 4);
        assert_eq!(report.residual[0].plain, "-v1(t) + x1'(t)");
        assert_eq!(report.solutions[0].name, "x1(t)");
        assert!(report.residual[2].plain.contains("k1"));
    }

    #[test]
    fn integrators_agree_with_closed_form() {
        for integrator in [Integrator::Rk4, Integrator::Tsit5] {
            let config = CoupledConfig {
                t_end: 10.0,
                cross_check: Some(integrator),
                ..CoupledConfig::default()
            };
            let check = simulate(&config)
                .expect("simulates")
                .cross_check
                .expect("cross-check requested");
            assert_eq!(check.steps, 1000);
            assert!(check.max_deviation < 1e-5, "{:?}: {}", integrator, check.max_deviation);
        }
    }

    #[test]
    fn rejects_bad_time_span() {
        let config = CoupledConfig {
            t_end: 0.0,
            ..CoupledConfig::default()
        };
        assert!(simulate(&config).is_err());
    }
}

use super::{as_substitution, bind, ExprReport, Series};
use crate::equation_engine::lambdify;
use crate::expr::{Equation, Expr};
use crate::ode::{dsolve, residual, GeneralSolution, InitialCondition};
use crate::phase::linspace;
use crate::symbol::{Coordinate, Symbol};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendulumConfig {
    pub gravity: f64,
    pub length: f64,
    /// Initial angle in radians.
    pub theta0: f64,
    /// Initial angular rate.
    pub omega0: f64,
    /// Viscous damping per unit inertia; zero keeps the undamped model.
    pub damping: f64,
    pub t_end: f64,
    pub samples: usize,
}

impl Default for PendulumConfig {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            length: 1.0,
            theta0: 0.26,
            omega0: 0.0,
            damping: 0.0,
            t_end: 10.0,
            samples: 400,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PendulumResponse {
    pub time: Symbol,
    pub angle: Coordinate,
    pub ode: Equation,
    pub general_solution: Expr,
    pub particular_solution: Expr,
    pub series: Series,
    pub max_residual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendulumReport {
    pub ode: ExprReport,
    pub general_solution: ExprReport,
    pub particular_solution: ExprReport,
    pub max_residual: f64,
    pub series: Series,
}

fn validate(config: &PendulumConfig) -> Result<()> {
    if config.samples < 2 {
        bail!("samples must be at least 2.");
    }
    if config.t_end <= 0.0 {
        bail!("t_end must be positive.");
    }
    if config.damping < 0.0 {
        bail!("damping must be non-negative.");
    }
    Ok(())
}

pub fn simulate(config: &PendulumConfig) -> Result<PendulumResponse> {
    validate(config)?;

    let time = Symbol::positive("t");
    let g = Symbol::positive("g");
    let l = Symbol::positive("l");
    let c = Symbol::positive("c");
    let angle = Coordinate::new("theta", &time);

    // theta'' + c*theta' + (g/l)*theta = 0
    let mut lhs = Expr::from(angle.nth(2)) + Expr::from(&g) / Expr::from(&l) * Expr::from(&angle);
    if config.damping > 0.0 {
        lhs = lhs + Expr::from(&c) * Expr::from(angle.derivative());
    }
    let lhs = lhs.simplify();
    let ode = Equation::new(lhs.clone(), Expr::zero());
    info!(%ode, "linearized pendulum");

    let mut bindings = vec![bind(&g, config.gravity), bind(&l, config.length)];
    if config.damping > 0.0 {
        bindings.push(bind(&c, config.damping));
    }
    let substitution = as_substitution(&bindings);

    // The damping regime depends on the parameter values, so the damped
    // model is solved after substitution.
    let general = if config.damping > 0.0 {
        dsolve(&lhs.subs_all(&substitution).simplify(), &angle)
    } else {
        dsolve(&lhs, &angle)
    }
    .context("Failed to solve the linearized ODE.")?;
    debug!(solution = %general.solution, "general solution");
    let with_params = general.solution.subs_all(&substitution).simplify();
    let numeric_general = GeneralSolution {
        solution: with_params,
        ..general.clone()
    };
    let particular = numeric_general
        .apply_initial_conditions(&[
            InitialCondition::new(0, 0.0, config.theta0),
            InitialCondition::new(1, 0.0, config.omega0),
        ])
        .context("Failed to apply initial conditions.")?;
    info!(solution = %particular, "particular solution");

    let t = Expr::from(&time);
    let f = lambdify(&particular, &[t.clone()]).context("Failed to compile theta(t).")?;
    let ts = linspace(0.0, config.t_end, config.samples);
    let values = f.sample(&ts);

    let numeric_lhs = lhs.subs_all(&substitution);
    let remainder = residual(&numeric_lhs, &angle, &particular);
    let check = lambdify(&remainder, &[t]).context("Failed to compile residual.")?;
    let max_residual = check
        .sample(&ts)
        .into_iter()
        .map(f64::abs)
        .fold(0.0, f64::max);
    debug!(max_residual, "residual of the particular solution");

    Ok(PendulumResponse {
        time,
        angle,
        ode,
        general_solution: general.solution,
        particular_solution: particular,
        series: Series {
            label: "theta(t)".to_string(),
            t: ts,
            values,
        },
        max_residual,
    })
}

impl PendulumResponse {
    pub fn report(&self) -> PendulumReport {
        PendulumReport {
            ode: ExprReport::from(&self.ode),
            general_solution: ExprReport::from(&self.general_solution),
            particular_solution: ExprReport::from(&self.particular_solution),
            max_residual: self.max_residual,
            series: self.series.clone(),
        }
    }
}

pub fn run(config: &PendulumConfig) -> Result<PendulumReport> {
    Ok(simulate(config)?.report())
}

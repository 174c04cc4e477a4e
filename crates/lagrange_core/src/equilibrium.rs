use crate::equation_engine::{Compiler, EquationSystem, VM};
use crate::error::SymbolicResult;
use crate::expr::Expr;
use crate::matrix::Matrix;
use crate::traits::DynamicalSystem;
use anyhow::{anyhow, bail, Context, Result};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub damping: f64,
    pub tolerance: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 25,
            damping: 1.0,
            tolerance: 1e-9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplexNumber {
    pub re: f64,
    pub im: f64,
}

impl From<Complex<f64>> for ComplexNumber {
    fn from(value: Complex<f64>) -> Self {
        Self {
            re: value.re,
            im: value.im,
        }
    }
}

/// Linear stability type of an equilibrium, read off the Jacobian eigenvalues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stability {
    Center,
    Saddle,
    StableNode,
    UnstableNode,
    StableFocus,
    UnstableFocus,
    Degenerate,
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stability::Center => "center",
            Stability::Saddle => "saddle",
            Stability::StableNode => "stable node",
            Stability::UnstableNode => "unstable node",
            Stability::StableFocus => "stable focus",
            Stability::UnstableFocus => "unstable focus",
            Stability::Degenerate => "degenerate",
        };
        f.write_str(label)
    }
}

const CLASSIFY_TOLERANCE: f64 = 1e-9;

pub fn classify(eigenvalues: &[Complex<f64>]) -> Stability {
    if eigenvalues.is_empty() {
        return Stability::Degenerate;
    }
    let scale = eigenvalues.iter().map(|l| l.norm()).fold(1.0, f64::max);
    let tol = CLASSIFY_TOLERANCE * scale;
    let positive = eigenvalues.iter().filter(|l| l.re > tol).count();
    let negative = eigenvalues.iter().filter(|l| l.re < -tol).count();
    let oscillating = eigenvalues.iter().any(|l| l.im.abs() > tol);
    let n = eigenvalues.len();

    if positive > 0 && negative > 0 {
        return Stability::Saddle;
    }
    if positive + negative < n {
        // some eigenvalue sits on the imaginary axis
        let on_axis_nonzero = eigenvalues
            .iter()
            .filter(|l| l.re.abs() <= tol)
            .all(|l| l.im.abs() > tol);
        if on_axis_nonzero && positive == 0 && negative == 0 {
            return Stability::Center;
        }
        return Stability::Degenerate;
    }
    match (positive == n, oscillating) {
        (true, true) => Stability::UnstableFocus,
        (true, false) => Stability::UnstableNode,
        (false, true) => Stability::StableFocus,
        (false, false) => Stability::StableNode,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewtonResult {
    pub state: Vec<f64>,
    pub residual_norm: f64,
    pub iterations: usize,
}

/// Newton iteration on a symbolic field, with the Jacobian differentiated
/// symbolically and both compiled to bytecode.
pub struct NewtonSolver {
    field: EquationSystem<f64>,
    jacobian: EquationSystem<f64>,
    dim: usize,
}

impl NewtonSolver {
    pub fn compile(fields: &[Expr], state: &[Expr], params: &[(Expr, f64)]) -> Result<Self> {
        let dim = state.len();
        if dim == 0 {
            bail!("System has zero dimension.");
        }
        let jacobian = Matrix::jacobian(fields, state);
        let entries: Vec<Expr> = (0..dim)
            .flat_map(|i| (0..dim).map(move |j| (i, j)))
            .map(|(i, j)| jacobian.get(i, j).clone())
            .collect();
        let field = EquationSystem::compile(fields, state, params)
            .context("Failed to compile vector field.")?;
        let jacobian = compile_entries(&entries, state, params)
            .context("Failed to compile Jacobian.")?;
        Ok(Self {
            field,
            jacobian,
            dim,
        })
    }

    fn residual(&self, state: &[f64], out: &mut [f64]) {
        self.field.apply(0.0, state, out);
    }

    fn jacobian_at(&self, state: &[f64]) -> Vec<f64> {
        let mut stack = self.jacobian.stack.borrow_mut();
        self.jacobian
            .equations
            .iter()
            .map(|code| VM::execute(code, state, &self.jacobian.params, &mut stack))
            .collect()
    }

    pub fn solve(&self, initial_guess: &[f64], settings: NewtonSettings) -> Result<NewtonResult> {
        let dim = self.dim;
        if initial_guess.len() != dim {
            bail!(
                "Initial guess dimension mismatch. Expected {}, got {}.",
                dim,
                initial_guess.len()
            );
        }
        if settings.max_steps == 0 {
            bail!("max_steps must be greater than zero.");
        }
        if settings.damping <= 0.0 {
            bail!("damping must be positive.");
        }
        if settings.tolerance <= 0.0 {
            bail!("tolerance must be positive.");
        }

        let mut state = initial_guess.to_vec();
        let mut residual = vec![0.0; dim];
        self.residual(&state, &mut residual);
        let mut residual_norm = l2_norm(&residual);
        let mut iterations = 0usize;

        while residual_norm > settings.tolerance {
            if iterations >= settings.max_steps {
                bail!(
                    "Newton solver failed to converge in {} steps (‖f(x)‖ = {}).",
                    settings.max_steps,
                    residual_norm
                );
            }
            let jacobian = self.jacobian_at(&state);
            let delta = solve_linear_system(dim, &jacobian, &residual)
                .context("Failed to solve linear system during Newton iteration.")?;
            for i in 0..dim {
                state[i] -= settings.damping * delta[i];
            }
            iterations += 1;
            self.residual(&state, &mut residual);
            residual_norm = l2_norm(&residual);
            if !residual_norm.is_finite() {
                bail!("Newton iteration diverged.");
            }
        }

        Ok(NewtonResult {
            state,
            residual_norm,
            iterations,
        })
    }

    /// Runs Newton from every seed and keeps the distinct converged points
    /// (closer than `merge_distance` counts as the same point).
    pub fn find_all(
        &self,
        seeds: &[Vec<f64>],
        settings: NewtonSettings,
        merge_distance: f64,
    ) -> Vec<Vec<f64>> {
        let mut found: Vec<Vec<f64>> = Vec::new();
        for seed in seeds {
            match self.solve(seed, settings) {
                Ok(result) => {
                    let duplicate = found.iter().any(|p| distance(p, &result.state) < merge_distance);
                    if !duplicate {
                        debug!(state = ?result.state, iterations = result.iterations, "newton converged");
                        found.push(result.state);
                    }
                }
                Err(err) => debug!(seed = ?seed, "newton seed rejected: {err:#}"),
            }
        }
        found
    }
}

fn compile_entries(
    entries: &[Expr],
    state: &[Expr],
    params: &[(Expr, f64)],
) -> SymbolicResult<EquationSystem<f64>> {
    let param_atoms: Vec<Expr> = params.iter().map(|(a, _)| a.clone()).collect();
    let compiler = Compiler::new(state, &param_atoms);
    let equations = entries
        .iter()
        .map(|e| compiler.compile(e))
        .collect::<SymbolicResult<Vec<_>>>()?;
    Ok(EquationSystem::new(
        equations,
        params.iter().map(|(_, v)| *v).collect(),
    ))
}

fn solve_linear_system(dim: usize, jacobian: &[f64], residual: &[f64]) -> Result<Vec<f64>> {
    let j_matrix = DMatrix::from_row_slice(dim, dim, jacobian);
    let rhs = DVector::from_column_slice(residual);
    j_matrix
        .lu()
        .solve(&rhs)
        .map(|v| v.iter().cloned().collect())
        .ok_or_else(|| anyhow!("Jacobian is singular."))
}

fn l2_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

/// Translates of `point` by whole periods along the `periodic` coordinates
/// that stay inside `window` (one `(min, max)` per coordinate).
pub fn periodic_images(
    point: &[f64],
    periodic: &[usize],
    period: f64,
    window: &[(f64, f64)],
) -> Vec<Vec<f64>> {
    let mut images = vec![point.to_vec()];
    for &axis in periodic {
        let Some(&(lo, hi)) = window.get(axis) else {
            continue;
        };
        let mut next = Vec::new();
        for image in &images {
            let first = ((lo - image[axis]) / period).ceil() as i64;
            let last = ((hi - image[axis]) / period).floor() as i64;
            for k in first..=last {
                let mut shifted = image.clone();
                shifted[axis] += k as f64 * period;
                next.push(shifted);
            }
        }
        images = next;
    }
    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;
    use std::f64::consts::PI;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let text = format!("{err:#}");
        assert!(text.contains(needle), "error `{text}` does not contain `{needle}`");
    }

    fn pendulum() -> (Vec<Expr>, Vec<Expr>, Vec<(Expr, f64)>) {
        let theta = Expr::from(Symbol::real("theta"));
        let omega = Expr::from(Symbol::real("omega"));
        let g = Expr::from(Symbol::positive("g"));
        let fields = vec![omega.clone(), (-g.clone() * Expr::sin(theta.clone())).simplify()];
        (fields, vec![theta, omega], vec![(g, 9.82)])
    }

    #[test]
    fn classifies_linear_types() {
        let c = |re: f64, im: f64| Complex::new(re, im);
        assert_eq!(classify(&[c(0.0, 2.0), c(0.0, -2.0)]), Stability::Center);
        assert_eq!(classify(&[c(-3.0, 0.0), c(3.0, 0.0)]), Stability::Saddle);
        assert_eq!(classify(&[c(-1.0, 0.0), c(-2.0, 0.0)]), Stability::StableNode);
        assert_eq!(classify(&[c(1.0, 0.0), c(2.0, 0.0)]), Stability::UnstableNode);
        assert_eq!(classify(&[c(-1.0, 1.0), c(-1.0, -1.0)]), Stability::StableFocus);
        assert_eq!(classify(&[c(0.5, 1.0), c(0.5, -1.0)]), Stability::UnstableFocus);
        assert_eq!(classify(&[c(0.0, 0.0), c(-1.0, 0.0)]), Stability::Degenerate);
    }

    #[test]
    fn newton_converges_to_pendulum_equilibria() {
        let (fields, state, params) = pendulum();
        let solver = NewtonSolver::compile(&fields, &state, &params).expect("compiles");
        let result = solver.solve(&[2.9, 0.3], NewtonSettings::default()).expect("converges");
        assert!((result.state[0] - PI).abs() < 1e-9);
        assert!(result.state[1].abs() < 1e-9);

        let seeds: Vec<Vec<f64>> = (-4..=4).map(|k| vec![k as f64, 0.5]).collect();
        let found = solver.find_all(&seeds, NewtonSettings::default(), 1e-6);
        assert!(found.iter().any(|p| p[0].abs() < 1e-9));
        assert!(found.iter().any(|p| (p[0] + PI).abs() < 1e-9));
    }

    #[test]
    fn newton_validates_settings() {
        let (fields, state, params) = pendulum();
        let solver = NewtonSolver::compile(&fields, &state, &params).expect("compiles");
        let bad = NewtonSettings {
            damping: 0.0,
            ..NewtonSettings::default()
        };
        assert_err_contains(solver.solve(&[0.1, 0.0], bad), "damping must be positive");
        assert_err_contains(
            solver.solve(&[0.1], NewtonSettings::default()),
            "dimension mismatch",
        );
    }

    #[test]
    fn periodic_images_fill_the_window() {
        let images = periodic_images(&[0.0, 0.0], &[0], 2.0 * PI, &[(-1.5 * PI, 1.5 * PI), (-8.0, 8.0)]);
        assert_eq!(images, vec![vec![0.0, 0.0]]);
        let images = periodic_images(&[PI, 0.0], &[0], 2.0 * PI, &[(-1.5 * PI, 1.5 * PI), (-8.0, 8.0)]);
        assert_eq!(images.len(), 2);
        assert!(images.iter().any(|p| (p[0] + PI).abs() < 1e-12));
    }
}

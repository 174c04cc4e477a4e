//! Closed-form solutions of linear constant-coefficient ODEs.
//!
//! * [`dsolve`] handles `a*q'' + b*q' + c*q = 0` (and the first-order
//!   `b*q' + c*q = 0`) with coefficients free of `q` and `t`.
//! * [`solve_linear_ivp`] handles `x' = A x, x(0) = x0` for a numeric `A`
//!   that is diagonalizable, through its eigen-decomposition. Repeated
//!   eigenvalues are fine as long as their eigenspaces are full.

use crate::error::{SymbolicError, SymbolicResult};
use crate::expr::Expr;
use crate::matrix::numeric_eigenpairs;
use crate::simplify::Sign;
use crate::solve::solve_linear;
use crate::symbol::{Coordinate, Symbol};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex;

/// A solution with free integration constants `C1, C2, ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralSolution {
    pub solution: Expr,
    pub constants: Vec<Symbol>,
    pub coordinate: Coordinate,
}

/// `q^(order)(at) = value`.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialCondition {
    pub order: usize,
    pub at: Expr,
    pub value: Expr,
}

impl InitialCondition {
    pub fn new(order: usize, at: impl Into<Expr>, value: impl Into<Expr>) -> Self {
        Self {
            order,
            at: at.into(),
            value: value.into(),
        }
    }
}

fn constant(index: usize) -> Symbol {
    Symbol::complex(format!("C{}", index))
}

/// General solution of the homogeneous linear ODE `equation = 0` in `coordinate`.
pub fn dsolve(equation: &Expr, coordinate: &Coordinate) -> SymbolicResult<GeneralSolution> {
    let q = coordinate.nth(0);
    let time = q.time().clone();
    let t = Expr::from(&time);
    let atoms: Vec<Expr> = (0..=2).map(|n| Expr::from(q.nth(n))).collect();

    let expanded = equation.expand();
    if expanded.coordinates().iter().any(|c| c.name() == q.name() && c.order() > 2) {
        return Err(SymbolicError::UnsupportedEquation {
            var: q.to_string(),
            expr: expanded.to_string(),
        });
    }
    let c = expanded.diff(&atoms[0]);
    let b = expanded.diff(&atoms[1]);
    let a = expanded.diff(&atoms[2]);
    for (coeff, atom) in [(&a, &atoms[2]), (&b, &atoms[1]), (&c, &atoms[0])] {
        if coeff.depends_on_any(&atoms) || coeff.depends_on(&t) {
            return Err(SymbolicError::NonConstantCoefficient(atom.to_string()));
        }
    }
    let remainder = (&expanded - &a * &atoms[2] - &b * &atoms[1] - &c * &atoms[0]).expand();
    if !remainder.is_zero() {
        return Err(SymbolicError::UnsupportedEquation {
            var: q.to_string(),
            expr: expanded.to_string(),
        });
    }

    let c1 = Expr::from(constant(1));
    let c2 = Expr::from(constant(2));

    if a.is_zero() {
        if b.is_zero() {
            return Err(SymbolicError::ZeroCoefficient(atoms[1].to_string()));
        }
        // q = C1 exp(-c/b t)
        let rate = (-(&c / &b)).simplify();
        return Ok(GeneralSolution {
            solution: (c1 * Expr::exp(rate * t)).simplify(),
            constants: vec![constant(1)],
            coordinate: q,
        });
    }

    let p = (&b / &a).expand();
    let r = (&c / &a).expand();

    let solution = if p.is_zero() {
        match r.sign() {
            Some(Sign::Zero) => c1 + c2 * t,
            Some(Sign::Positive) => {
                let omega = Expr::sqrt(r).simplify();
                let phase = (omega * &t).simplify();
                c1 * Expr::sin(phase.clone()) + c2 * Expr::cos(phase)
            }
            Some(Sign::Negative) => {
                let kappa = Expr::sqrt(-r).simplify();
                let phase = (kappa * &t).simplify();
                c1 * Expr::exp(-phase.clone()) + c2 * Expr::exp(phase)
            }
            None => return Err(SymbolicError::IndeterminateSign(r.to_string())),
        }
    } else {
        let half = (p * 0.5).simplify();
        let discriminant = (Expr::powf(half.clone(), 2.0) - &r).expand();
        let decay = Expr::exp((-(&half) * &t).simplify());
        match discriminant.sign() {
            Some(Sign::Zero) => (c1 + c2 * &t) * decay,
            Some(Sign::Negative) => {
                let omega = Expr::sqrt(-discriminant).simplify();
                let phase = (omega * &t).simplify();
                decay * (c1 * Expr::sin(phase.clone()) + c2 * Expr::cos(phase))
            }
            Some(Sign::Positive) => {
                let kappa = Expr::sqrt(discriminant).simplify();
                let slow = ((-(&half) - &kappa) * &t).simplify();
                let fast = ((-(&half) + &kappa) * &t).simplify();
                c1 * Expr::exp(slow) + c2 * Expr::exp(fast)
            }
            None => return Err(SymbolicError::IndeterminateSign(discriminant.to_string())),
        }
    };

    Ok(GeneralSolution {
        solution: solution.simplify(),
        constants: vec![constant(1), constant(2)],
        coordinate: q,
    })
}

impl GeneralSolution {
    pub fn time(&self) -> &Symbol {
        self.coordinate.time()
    }

    /// Fixes the integration constants from one condition per constant.
    pub fn apply_initial_conditions(&self, conditions: &[InitialCondition]) -> SymbolicResult<Expr> {
        if conditions.len() != self.constants.len() {
            return Err(SymbolicError::DimensionMismatch {
                expected: self.constants.len(),
                got: conditions.len(),
            });
        }
        let t = Expr::from(self.time());
        let equations: Vec<Expr> = conditions
            .iter()
            .map(|ic| {
                let derivative = self.solution.diff_n(&t, ic.order);
                (derivative.subs(&t, &ic.at) - &ic.value).simplify()
            })
            .collect();
        let unknowns: Vec<Expr> = self.constants.iter().map(Expr::from).collect();
        let values = solve_linear(&equations, &unknowns)?;
        let pairs: Vec<(Expr, Expr)> = unknowns.into_iter().zip(values).collect();
        Ok(self.solution.subs_all(&pairs).simplify())
    }
}

/// Substitutes `solution` (an expression in the time symbol) for `coordinate`
/// and its derivatives in `equation` and expands the result.
pub fn residual(equation: &Expr, coordinate: &Coordinate, solution: &Expr) -> Expr {
    let t = Expr::from(coordinate.time());
    let max_order = equation
        .coordinates()
        .iter()
        .filter(|c| c.name() == coordinate.name())
        .map(Coordinate::order)
        .max()
        .unwrap_or(0);
    let pairs: Vec<(Expr, Expr)> = (0..=max_order)
        .map(|n| (Expr::from(coordinate.nth(n)), solution.diff_n(&t, n)))
        .collect();
    equation.subs_all(&pairs).expand()
}

fn is_negligible(value: f64, scale: f64) -> bool {
    value.abs() <= 1e-10 * scale.max(1.0)
}

/// Closed form of `x' = A x`, `x(0) = x0`, one real expression in `time`
/// per component.
pub fn solve_linear_ivp(a: &DMatrix<f64>, x0: &[f64], time: &Symbol) -> SymbolicResult<Vec<Expr>> {
    let dim = a.nrows();
    if x0.len() != dim {
        return Err(SymbolicError::DimensionMismatch {
            expected: dim,
            got: x0.len(),
        });
    }
    let pairs = numeric_eigenpairs(a)?;
    let scale = pairs.iter().map(|(l, _)| l.norm()).fold(0.0, f64::max);

    // x0 = V c
    let modes = DMatrix::from_fn(dim, dim, |i, k| pairs[k].1[i]);
    let rhs = DVector::from_iterator(dim, x0.iter().map(|&v| Complex::new(v, 0.0)));
    let weights = modes.lu().solve(&rhs).ok_or(SymbolicError::Singular)?;

    let t = Expr::from(time);
    let mut components = Vec::with_capacity(dim);
    for i in 0..dim {
        let mut terms = Vec::new();
        for (k, (lambda, vector)) in pairs.iter().enumerate() {
            let amplitude = weights[k] * vector[i];
            let growth = if is_negligible(lambda.re, scale) {
                None
            } else {
                Some(Expr::exp((Expr::num(lambda.re) * &t).simplify()))
            };
            let with_growth = |e: Expr| match &growth {
                Some(g) => e * g,
                None => e,
            };
            if is_negligible(lambda.im, scale) {
                if !is_negligible(amplitude.re, 1.0) {
                    terms.push(with_growth(Expr::num(amplitude.re)));
                }
                continue;
            }
            if lambda.im < 0.0 {
                // carried by the conjugate partner
                continue;
            }
            // 2 Re(w e^{i beta t}) = 2 Re(w) cos(beta t) - 2 Im(w) sin(beta t)
            let phase = (Expr::num(lambda.im) * &t).simplify();
            if !is_negligible(amplitude.re, 1.0) {
                terms.push(with_growth(2.0 * amplitude.re * Expr::cos(phase.clone())));
            }
            if !is_negligible(amplitude.im, 1.0) {
                terms.push(with_growth(-2.0 * amplitude.im * Expr::sin(phase)));
            }
        }
        components.push(Expr::sum(terms).simplify());
    }
    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pendulum_symbols() -> (Symbol, Expr, Expr, Coordinate) {
        let t = Symbol::positive("t");
        let g = Expr::from(Symbol::positive("g"));
        let l = Expr::from(Symbol::positive("l"));
        let theta = Coordinate::new("theta", &t);
        (t, g, l, theta)
    }

    #[test]
    fn undamped_oscillator_has_trigonometric_solution() {
        let (t, g, l, theta) = pendulum_symbols();
        let ode = Expr::from(theta.nth(2)) + (&g / &l) * Expr::from(&theta);
        let general = dsolve(&ode, &theta).expect("solvable");
        let omega = (Expr::sqrt(g.clone()) * Expr::powf(l.clone(), -0.5)).simplify();
        let phase = (omega * Expr::from(&t)).simplify();
        let expected = (Expr::from(Symbol::complex("C1")) * Expr::sin(phase.clone())
            + Expr::from(Symbol::complex("C2")) * Expr::cos(phase))
        .simplify();
        assert_eq!(general.solution, expected);
        assert!(residual(&ode, &theta, &general.solution).is_zero());
    }

    #[test]
    fn initial_conditions_fix_constants() {
        let (t, _, _, theta) = pendulum_symbols();
        let ode = Expr::from(theta.nth(2)) + 9.81 * Expr::from(&theta);
        let general = dsolve(&ode, &theta).expect("solvable");
        let particular = general
            .apply_initial_conditions(&[
                InitialCondition::new(0, 0.0, 0.26),
                InitialCondition::new(1, 0.0, 0.0),
            ])
            .expect("regular");
        let t_expr = Expr::from(&t);
        for &tv in &[0.0, 0.7, 3.3] {
            let value = particular.eval_real(&[(t_expr.clone(), tv)]).expect("real");
            assert!((value - 0.26 * (9.81_f64.sqrt() * tv).cos()).abs() < 1e-9);
        }
    }

    #[test]
    fn damping_regimes() {
        let t = Symbol::positive("t");
        let q = Coordinate::new("q", &t);
        let q0 = Expr::from(&q);
        let q1 = Expr::from(q.nth(1));
        let q2 = Expr::from(q.nth(2));

        for (b, c) in [(2.0, 5.0), (2.0, 1.0), (5.0, 4.0)] {
            let ode = &q2 + b * q1.clone() + c * q0.clone();
            let general = dsolve(&ode, &q).expect("solvable");
            let res = residual(&ode, &q, &general.solution);
            let bindings = [
                (Expr::from(Symbol::complex("C1")), 0.3),
                (Expr::from(Symbol::complex("C2")), -1.1),
                (Expr::from(&t), 0.9),
            ];
            let value = res.eval_real(&bindings).expect("real");
            assert!(value.abs() < 1e-9, "b={} c={} residual {}", b, c, value);
        }
    }

    #[test]
    fn rejects_variable_coefficients() {
        let t = Symbol::positive("t");
        let q = Coordinate::new("q", &t);
        let ode = Expr::from(q.nth(2)) + Expr::from(&t) * Expr::from(&q);
        assert!(matches!(dsolve(&ode, &q), Err(SymbolicError::NonConstantCoefficient(_))));
        let nonlinear = Expr::from(q.nth(2)) + Expr::sin(Expr::from(&q));
        assert!(dsolve(&nonlinear, &q).is_err());
    }

    #[test]
    fn unknown_sign_is_reported() {
        let t = Symbol::positive("t");
        let q = Coordinate::new("q", &t);
        let k = Expr::from(Symbol::real("k"));
        let ode = Expr::from(q.nth(2)) + k * Expr::from(&q);
        assert!(matches!(dsolve(&ode, &q), Err(SymbolicError::IndeterminateSign(_))));
    }

    #[test]
    fn modal_solution_of_coupled_oscillators() {
        let t = Symbol::positive("t");
        let a = DMatrix::from_row_slice(
            4,
            4,
            &[
                0.0, 0.0, 1.0, 0.0, //
                0.0, 0.0, 0.0, 1.0, //
                -6.0, 2.0, 0.0, 0.0, //
                2.0, -6.0, 0.0, 0.0,
            ],
        );
        let x = solve_linear_ivp(&a, &[1.0, 0.0, 0.0, 0.0], &t).expect("diagonalizable");
        let t_expr = Expr::from(&t);
        let root2 = 2.0_f64.sqrt();
        for &tv in &[0.0, 1.3, 7.9] {
            let x1 = x[0].eval_real(&[(t_expr.clone(), tv)]).expect("real");
            let x2 = x[1].eval_real(&[(t_expr.clone(), tv)]).expect("real");
            let expected1 = 0.5 * (2.0 * tv).cos() + 0.5 * (2.0 * root2 * tv).cos();
            let expected2 = 0.5 * (2.0 * tv).cos() - 0.5 * (2.0 * root2 * tv).cos();
            assert!((x1 - expected1).abs() < 1e-9);
            assert!((x2 - expected2).abs() < 1e-9);
        }
    }

    #[test]
    fn repeated_eigenvalues_with_full_eigenspaces_are_solved() {
        // Two uncoupled oscillators with the same frequency: +-2i, each twice.
        let t = Symbol::positive("t");
        let a = DMatrix::from_row_slice(
            4,
            4,
            &[
                0.0, 0.0, 1.0, 0.0, //
                0.0, 0.0, 0.0, 1.0, //
                -4.0, 0.0, 0.0, 0.0, //
                0.0, -4.0, 0.0, 0.0,
            ],
        );
        let x = solve_linear_ivp(&a, &[1.0, 0.5, 0.0, 0.0], &t).expect("diagonalizable");
        let t_expr = Expr::from(&t);
        for &tv in &[0.0, 0.7, 4.2] {
            let at = [(t_expr.clone(), tv)];
            assert!((x[0].eval_real(&at).expect("real") - (2.0 * tv).cos()).abs() < 1e-9);
            assert!((x[1].eval_real(&at).expect("real") - 0.5 * (2.0 * tv).cos()).abs() < 1e-9);
            assert!((x[2].eval_real(&at).expect("real") + 2.0 * (2.0 * tv).sin()).abs() < 1e-9);
        }

        let identity = DMatrix::<f64>::identity(3, 3) * -1.0;
        let decay = solve_linear_ivp(&identity, &[1.0, 2.0, 3.0], &t).expect("diagonal");
        let e = (-1.5_f64).exp();
        assert!((decay[2].eval_real(&[(t_expr.clone(), 1.5)]).expect("real") - 3.0 * e).abs() < 1e-9);
    }

    #[test]
    fn defective_matrices_are_rejected() {
        let t = Symbol::positive("t");
        let a = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]);
        assert!(matches!(
            solve_linear_ivp(&a, &[1.0, 0.0], &t),
            Err(SymbolicError::NotDiagonalizable(_))
        ));
    }
}

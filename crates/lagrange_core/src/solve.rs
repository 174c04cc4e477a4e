//! Restricted algebraic solver.
//!
//! Handles the shapes that come out of vector fields and initial-condition
//! systems: products (split into factors), `sin`/`cos`/`exp`/`log` of an
//! expression in the unknown, and polynomials of degree one or two with
//! coefficients free of the unknown. Periodic functions yield their
//! principal solutions only (`sin u = 0 -> u in {0, pi}`).

use crate::error::{SymbolicError, SymbolicResult};
use crate::expr::{Expr, Func};
use crate::matrix::Matrix;

fn unsupported(expr: &Expr, var: &Expr) -> SymbolicError {
    SymbolicError::UnsupportedEquation {
        var: var.to_string(),
        expr: expr.to_string(),
    }
}

fn push_unique(roots: &mut Vec<Expr>, root: Expr) {
    if !roots.contains(&root) {
        roots.push(root);
    }
}

/// Roots of `expr = 0` in `var`.
pub fn solve(expr: &Expr, var: &Expr) -> SymbolicResult<Vec<Expr>> {
    let expr = expr.simplify();
    if !expr.depends_on(var) {
        return if expr.is_zero() {
            Err(unsupported(&expr, var))
        } else {
            Ok(Vec::new())
        };
    }
    let mut roots = Vec::new();
    solve_into(&expr, var, &mut roots)?;
    Ok(roots)
}

fn solve_into(expr: &Expr, var: &Expr, roots: &mut Vec<Expr>) -> SymbolicResult<()> {
    match expr {
        Expr::Product(factors) => {
            for factor in factors.iter().filter(|f| f.depends_on(var)) {
                solve_into(factor, var, roots)?;
            }
            Ok(())
        }
        Expr::Pow(base, exponent) if !exponent.depends_on(var) => {
            if exponent.is_positive() {
                solve_into(base, var, roots)
            } else if exponent.is_negative() {
                // a reciprocal never vanishes
                Ok(())
            } else {
                Err(unsupported(expr, var))
            }
        }
        Expr::Function(func, arg) => {
            let targets = match func {
                Func::Sin => vec![Expr::zero(), Expr::Pi],
                Func::Cos => vec![
                    Expr::product(vec![Expr::num(0.5), Expr::Pi]),
                    Expr::product(vec![Expr::num(1.5), Expr::Pi]),
                ],
                Func::Exp => Vec::new(),
                Func::Ln => vec![Expr::one()],
            };
            for target in targets {
                for root in solve(&(arg.as_ref() - &target), var)? {
                    push_unique(roots, root);
                }
            }
            Ok(())
        }
        _ => {
            for root in solve_polynomial(expr, var)? {
                push_unique(roots, root);
            }
            Ok(())
        }
    }
}

/// Coefficients `[c0, c1, ...]` of `expr` as a polynomial in `var`, or `None`
/// when some term is not a monomial in `var`.
pub fn polynomial_coefficients(expr: &Expr, var: &Expr) -> Option<Vec<Expr>> {
    let expanded = expr.expand();
    let terms = match expanded {
        Expr::Sum(terms) => terms,
        other => vec![other],
    };
    let mut coeffs: Vec<Vec<Expr>> = Vec::new();
    for term in terms {
        let factors = match term {
            Expr::Product(factors) => factors,
            other => vec![other],
        };
        let mut degree = 0usize;
        let mut rest = Vec::with_capacity(factors.len());
        for factor in factors {
            if &factor == var {
                degree += 1;
                continue;
            }
            match &factor {
                Expr::Pow(base, exponent) if base.as_ref() == var => {
                    let e = exponent.as_number()?;
                    if e < 0.0 || e.fract() != 0.0 {
                        return None;
                    }
                    degree += e as usize;
                }
                other if other.depends_on(var) => return None,
                _ => rest.push(factor),
            }
        }
        if coeffs.len() <= degree {
            coeffs.resize(degree + 1, Vec::new());
        }
        coeffs[degree].push(Expr::product(rest));
    }
    Some(
        coeffs
            .into_iter()
            .map(|terms| Expr::sum(terms).simplify())
            .collect(),
    )
}

fn solve_polynomial(expr: &Expr, var: &Expr) -> SymbolicResult<Vec<Expr>> {
    let coeffs = polynomial_coefficients(expr, var).ok_or_else(|| unsupported(expr, var))?;
    match coeffs.as_slice() {
        [c0, c1] => {
            if c1.is_zero() {
                return Err(SymbolicError::ZeroCoefficient(var.to_string()));
            }
            Ok(vec![(-(c0 / c1)).simplify()])
        }
        [c0, c1, c2] => {
            if c2.is_zero() {
                return solve_polynomial(&(c0 + c1 * var), var);
            }
            // -c1/(2 c2) -/+ sqrt(c1^2 - 4 c0 c2)/(2 c2)
            let discriminant = (Expr::powf(c1.clone(), 2.0) - 4.0 * c0.clone() * c2).expand();
            let root = Expr::sqrt(discriminant).simplify();
            let center = (-(c1 / (2.0 * c2.clone()))).simplify();
            let offset = (root / (2.0 * c2.clone())).simplify();
            let mut roots = Vec::with_capacity(2);
            push_unique(&mut roots, (&center - &offset).simplify());
            push_unique(&mut roots, (&center + &offset).simplify());
            Ok(roots)
        }
        _ => Err(unsupported(expr, var)),
    }
}

/// All solutions of `equations = 0` for `vars`, by elimination. Each solution
/// lists one value per variable in the order of `vars`.
pub fn solve_system(equations: &[Expr], vars: &[Expr]) -> SymbolicResult<Vec<Vec<Expr>>> {
    let equations: Vec<Expr> = equations.iter().map(Expr::simplify).collect();
    let mut solutions = Vec::new();
    let mut assignment: Vec<Option<Expr>> = vec![None; vars.len()];
    eliminate(&equations, vars, &mut assignment, &mut solutions)?;
    Ok(solutions)
}

fn eliminate(
    equations: &[Expr],
    vars: &[Expr],
    assignment: &mut Vec<Option<Expr>>,
    solutions: &mut Vec<Vec<Expr>>,
) -> SymbolicResult<()> {
    let pending: Vec<usize> = (0..vars.len()).filter(|&i| assignment[i].is_none()).collect();
    let mut remaining = Vec::with_capacity(equations.len());
    for eq in equations {
        let depends = pending.iter().any(|&i| eq.depends_on(&vars[i]));
        if depends {
            remaining.push(eq.clone());
        } else if !eq.simplify().is_zero() {
            // inconsistent branch
            return Ok(());
        }
    }

    if remaining.is_empty() {
        if let Some(&free) = pending.first() {
            return Err(SymbolicError::UnsupportedEquation {
                var: vars[free].to_string(),
                expr: "underdetermined system".to_string(),
            });
        }
        let solution = back_substitute(assignment, vars);
        if !solutions.contains(&solution) {
            solutions.push(solution);
        }
        return Ok(());
    }

    // Prefer equations in a single unknown.
    let mut order: Vec<(usize, usize)> = remaining
        .iter()
        .enumerate()
        .map(|(idx, eq)| {
            let count = pending.iter().filter(|&&i| eq.depends_on(&vars[i])).count();
            (count, idx)
        })
        .collect();
    order.sort();

    let mut last_error = None;
    for (_, idx) in order {
        let eq = &remaining[idx];
        for &var_idx in pending.iter().filter(|&&i| eq.depends_on(&vars[i])) {
            let roots = match solve(eq, &vars[var_idx]) {
                Ok(roots) => roots,
                Err(err) => {
                    last_error = Some(err);
                    continue;
                }
            };
            let others: Vec<Expr> = remaining
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != idx)
                .map(|(_, e)| e.clone())
                .collect();
            for root in roots {
                let reduced: Vec<Expr> = others
                    .iter()
                    .map(|e| e.subs(&vars[var_idx], &root).simplify())
                    .collect();
                assignment[var_idx] = Some(root);
                eliminate(&reduced, vars, assignment, solutions)?;
                assignment[var_idx] = None;
            }
            return Ok(());
        }
    }
    Err(last_error.unwrap_or_else(|| unsupported(&remaining[0], &vars[pending[0]])))
}

fn back_substitute(assignment: &[Option<Expr>], vars: &[Expr]) -> Vec<Expr> {
    let pairs: Vec<(Expr, Expr)> = vars
        .iter()
        .zip(assignment)
        .filter_map(|(v, a)| a.as_ref().map(|a| (v.clone(), a.clone())))
        .collect();
    let mut values: Vec<Expr> = assignment
        .iter()
        .map(|a| a.clone().unwrap_or_else(Expr::zero))
        .collect();
    // Roots may reference unknowns solved later.
    for _ in 0..vars.len() {
        let next: Vec<Expr> = values.iter().map(|v| v.subs_all(&pairs).simplify()).collect();
        if next == values {
            break;
        }
        values = next;
    }
    values
}

/// Solves a square linear system `equations = 0` in `unknowns` by Cramer's
/// rule. Coefficients must not depend on the unknowns.
pub fn solve_linear(equations: &[Expr], unknowns: &[Expr]) -> SymbolicResult<Vec<Expr>> {
    if equations.len() != unknowns.len() {
        return Err(SymbolicError::DimensionMismatch {
            expected: unknowns.len(),
            got: equations.len(),
        });
    }
    let coefficients = Matrix::jacobian(equations, unknowns);
    for i in 0..coefficients.rows() {
        for j in 0..coefficients.cols() {
            if coefficients.get(i, j).depends_on_any(unknowns) {
                return Err(SymbolicError::NonConstantCoefficient(unknowns[j].to_string()));
            }
        }
    }
    let zeros: Vec<(Expr, Expr)> = unknowns.iter().map(|u| (u.clone(), Expr::zero())).collect();
    let rhs: Vec<Expr> = equations
        .iter()
        .map(|eq| (-eq.subs_all(&zeros)).simplify())
        .collect();

    let det = coefficients.determinant()?;
    if det.is_zero() {
        return Err(SymbolicError::Singular);
    }
    let n = unknowns.len();
    (0..n)
        .map(|j| {
            let replaced = Matrix::from_fn(n, n, |r, c| {
                if c == j {
                    rhs[r].clone()
                } else {
                    coefficients.get(r, c).clone()
                }
            });
            Ok((replaced.determinant()? / &det).expand())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;

    fn real(name: &str) -> Expr {
        Expr::from(Symbol::real(name))
    }

    #[test]
    fn sine_has_principal_roots() {
        let theta = real("theta");
        let g = Expr::from(Symbol::positive("g"));
        let l = Expr::from(Symbol::positive("l"));
        let e = -(g / l) * Expr::sin(theta.clone());
        assert_eq!(solve(&e, &theta).expect("solvable"), vec![Expr::zero(), Expr::Pi]);
    }

    #[test]
    fn cosine_roots_are_quarter_turns() {
        let x = real("x");
        let roots = solve(&Expr::cos(x.clone()), &x).expect("solvable");
        assert_eq!(roots.len(), 2);
        let values: Vec<f64> = roots.iter().map(|r| r.eval_real(&[]).expect("numeric")).collect();
        assert!((values[0] - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((values[1] - 1.5 * std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn quadratic_roots() {
        let x = real("x");
        let e = Expr::powf(x.clone(), 2.0) - 5.0 * x.clone() + 6.0;
        let roots = solve(&e, &x).expect("solvable");
        assert_eq!(roots, vec![Expr::num(2.0), Expr::num(3.0)]);
    }

    #[test]
    fn linear_root_with_symbolic_coefficient() {
        let x = real("x");
        let k = Expr::from(Symbol::positive("k"));
        let e = k.clone() * x.clone() - 2.0;
        let roots = solve(&e, &x).expect("solvable");
        assert_eq!(roots, vec![(Expr::num(2.0) / k).simplify()]);
    }

    #[test]
    fn unsupported_shapes_are_errors() {
        let x = real("x");
        let e = Expr::sin(x.clone()) - x.clone();
        assert!(matches!(solve(&e, &x), Err(SymbolicError::UnsupportedEquation { .. })));
    }

    #[test]
    fn pendulum_field_equilibria() {
        let theta = real("theta");
        let omega = real("omega");
        let field = vec![omega.clone(), -9.82 * Expr::sin(theta.clone())];
        let solutions = solve_system(&field, &[theta, omega]).expect("solvable");
        assert_eq!(
            solutions,
            vec![vec![Expr::zero(), Expr::zero()], vec![Expr::Pi, Expr::zero()]]
        );
    }

    #[test]
    fn coupled_elimination_back_substitutes() {
        let x = real("x");
        let y = real("y");
        let eqs = vec![x.clone() - y.clone(), y.clone() - 2.0];
        let solutions = solve_system(&eqs, &[x, y]).expect("solvable");
        assert_eq!(solutions, vec![vec![Expr::num(2.0), Expr::num(2.0)]]);
    }

    #[test]
    fn linear_system_by_cramer() {
        let c1 = Expr::from(Symbol::complex("C1"));
        let c2 = Expr::from(Symbol::complex("C2"));
        let eqs = vec![
            c1.clone() + c2.clone() - 3.0,
            c1.clone() - c2.clone() - 1.0,
        ];
        let values = solve_linear(&eqs, &[c1.clone(), c2.clone()]).expect("regular");
        assert_eq!(values, vec![Expr::num(2.0), Expr::num(1.0)]);

        let singular = vec![c1.clone() + c2.clone(), 2.0 * c1.clone() + 2.0 * c2.clone()];
        assert_eq!(solve_linear(&singular, &[c1.clone(), c2.clone()]), Err(SymbolicError::Singular));

        let nonlinear = vec![c1.clone() * c2.clone(), c2.clone()];
        assert!(matches!(
            solve_linear(&nonlinear, &[c1, c2]),
            Err(SymbolicError::NonConstantCoefficient(_))
        ));
    }
}

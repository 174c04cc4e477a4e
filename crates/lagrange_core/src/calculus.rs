use crate::expr::{Expr, Func};
use crate::symbol::Symbol;

impl Expr {
    /// Partial derivative with respect to an atom (a symbol or a coordinate of
    /// a fixed derivative order). Every other atom is held constant.
    pub fn diff(&self, var: &Expr) -> Expr {
        differentiate(self, &|atom: &Expr| {
            if atom == var {
                Expr::one()
            } else {
                Expr::zero()
            }
        })
        .simplify()
    }

    /// Repeated partial derivative.
    pub fn diff_n(&self, var: &Expr, order: usize) -> Expr {
        (0..order).fold(self.clone(), |acc, _| acc.diff(var))
    }

    /// Total derivative with respect to time: coordinates `q^(n)(t)` become
    /// `q^(n+1)(t)`, the time symbol differentiates to one, and every other
    /// symbol is constant.
    pub fn time_derivative(&self, time: &Symbol) -> Expr {
        differentiate(self, &|atom: &Expr| match atom {
            Expr::Coordinate(c) if c.time() == time => Expr::Coordinate(c.derivative()),
            Expr::Symbol(s) if s == time => Expr::one(),
            _ => Expr::zero(),
        })
        .simplify()
    }
}

/// Chain rule over the tree; `atom_rule` gives the derivative of each atom.
fn differentiate(expr: &Expr, atom_rule: &dyn Fn(&Expr) -> Expr) -> Expr {
    match expr {
        Expr::Number(_) | Expr::Pi | Expr::ImaginaryUnit => Expr::zero(),
        Expr::Symbol(_) | Expr::Coordinate(_) => atom_rule(expr),
        Expr::Sum(terms) => Expr::sum(terms.iter().map(|t| differentiate(t, atom_rule)).collect()),
        Expr::Product(factors) => {
            let mut terms = Vec::with_capacity(factors.len());
            for (i, factor) in factors.iter().enumerate() {
                let d = differentiate(factor, atom_rule).simplify();
                if d.is_zero() {
                    continue;
                }
                let mut replaced = factors.clone();
                replaced[i] = d;
                terms.push(Expr::Product(replaced));
            }
            Expr::sum(terms)
        }
        Expr::Pow(base, exponent) => {
            let d_base = differentiate(base, atom_rule).simplify();
            let d_exp = differentiate(exponent, atom_rule).simplify();
            let base = base.as_ref().clone();
            let exponent = exponent.as_ref().clone();
            if d_exp.is_zero() {
                // n * b^(n-1) * b'
                return Expr::product(vec![
                    exponent.clone(),
                    Expr::pow(base, exponent - 1.0),
                    d_base,
                ]);
            }
            // b^e * (e' * ln(b) + e * b' / b)
            let power = Expr::pow(base.clone(), exponent.clone());
            power
                * (d_exp * Expr::ln(base.clone()) + exponent * d_base * Expr::powf(base, -1.0))
        }
        Expr::Function(func, arg) => {
            let d_arg = differentiate(arg, atom_rule).simplify();
            if d_arg.is_zero() {
                return Expr::zero();
            }
            let arg = arg.as_ref().clone();
            let outer = match func {
                Func::Sin => Expr::cos(arg),
                Func::Cos => -Expr::sin(arg),
                Func::Exp => Expr::exp(arg),
                Func::Ln => Expr::powf(arg, -1.0),
            };
            outer * d_arg
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Coordinate;

    #[test]
    fn power_and_product_rules() {
        let x = Expr::from(Symbol::real("x"));
        let e = Expr::powf(x.clone(), 3.0) * Expr::sin(x.clone());
        let expected = (Expr::num(3.0) * Expr::powf(x.clone(), 2.0) * Expr::sin(x.clone())
            + Expr::powf(x.clone(), 3.0) * Expr::cos(x.clone()))
        .simplify();
        assert_eq!(e.diff(&x), expected);
    }

    #[test]
    fn partial_derivative_treats_velocity_as_independent() {
        let t = Symbol::positive("t");
        let q = Coordinate::new("q", &t);
        let q_expr = Expr::from(&q);
        let qd = Expr::from(q.derivative());
        let e = Expr::powf(qd.clone(), 2.0) * Expr::cos(q_expr.clone());
        assert_eq!(e.diff(&qd), (qd.clone() * 2.0 * Expr::cos(q_expr.clone())).simplify());
        assert!(qd.diff(&q_expr).is_zero());
    }

    #[test]
    fn time_derivative_advances_coordinates() {
        let t = Symbol::positive("t");
        let q = Coordinate::new("q", &t);
        let e = Expr::sin(Expr::from(&q));
        let expected = (Expr::cos(Expr::from(&q)) * Expr::from(q.derivative())).simplify();
        assert_eq!(e.time_derivative(&t), expected);
        let w = Expr::from(Symbol::positive("w"));
        let wave = Expr::cos(w.clone() * Expr::from(&t));
        let second = wave.time_derivative(&t).time_derivative(&t);
        let expected = (-(Expr::powf(w.clone(), 2.0)) * wave.clone()).simplify();
        assert_eq!(second, expected);
    }

    #[test]
    fn exponential_base_uses_logarithm() {
        let x = Expr::from(Symbol::real("x"));
        let e = Expr::pow(Expr::num(2.0), x.clone());
        let d = e.diff(&x);
        assert!(d.depends_on(&Expr::pow(Expr::num(2.0), x.clone())));
        let value = d.eval_real(&[(x, 1.0)]).expect("evaluates");
        assert!((value - 2.0 * 2.0_f64.ln()).abs() < 1e-12);
    }
}

use crate::error::{SymbolicError, SymbolicResult};
use crate::expr::{Expr, Func};
use num_complex::Complex;
use std::f64::consts::PI;

/// Imaginary parts below this are treated as round-off in [`Expr::eval_real`].
const REAL_TOLERANCE: f64 = 1e-12;

impl Expr {
    /// Evaluates with complex arithmetic; `bindings` maps atoms to values.
    pub fn eval_complex(&self, bindings: &[(Expr, Complex<f64>)]) -> SymbolicResult<Complex<f64>> {
        if let Some((_, value)) = bindings.iter().find(|(atom, _)| atom == self) {
            return Ok(*value);
        }
        match self {
            Expr::Number(v) => Ok(Complex::new(*v, 0.0)),
            Expr::Pi => Ok(Complex::new(PI, 0.0)),
            Expr::ImaginaryUnit => Ok(Complex::i()),
            Expr::Symbol(s) => Err(SymbolicError::Unbound(s.to_string())),
            Expr::Coordinate(c) => Err(SymbolicError::Unbound(c.to_string())),
            Expr::Sum(terms) => terms
                .iter()
                .try_fold(Complex::new(0.0, 0.0), |acc, t| Ok(acc + t.eval_complex(bindings)?)),
            Expr::Product(factors) => factors
                .iter()
                .try_fold(Complex::new(1.0, 0.0), |acc, f| Ok(acc * f.eval_complex(bindings)?)),
            Expr::Pow(base, exponent) => {
                let b = base.eval_complex(bindings)?;
                let e = exponent.eval_complex(bindings)?;
                if e.im == 0.0 && e.re.fract() == 0.0 && e.re.abs() < i32::MAX as f64 {
                    return Ok(b.powi(e.re as i32));
                }
                if b.im == 0.0 && b.re >= 0.0 && e.im == 0.0 {
                    return Ok(Complex::new(b.re.powf(e.re), 0.0));
                }
                Ok(b.powc(e))
            }
            Expr::Function(func, arg) => {
                let a = arg.eval_complex(bindings)?;
                Ok(match func {
                    Func::Sin => a.sin(),
                    Func::Cos => a.cos(),
                    Func::Exp => a.exp(),
                    Func::Ln => a.ln(),
                })
            }
        }
    }

    /// Evaluates to a real number, failing when the result has a
    /// non-negligible imaginary part.
    pub fn eval_real(&self, bindings: &[(Expr, f64)]) -> SymbolicResult<f64> {
        let complex_bindings: Vec<(Expr, Complex<f64>)> = bindings
            .iter()
            .map(|(atom, v)| (atom.clone(), Complex::new(*v, 0.0)))
            .collect();
        let value = self.eval_complex(&complex_bindings)?;
        if value.im.abs() > REAL_TOLERANCE * value.re.abs().max(1.0) {
            return Err(SymbolicError::ComplexValued(self.to_string()));
        }
        Ok(value.re)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;

    #[test]
    fn evaluates_imaginary_square_roots() {
        let g = Expr::from(Symbol::positive("g"));
        let e = Expr::sqrt(-g.clone()).simplify();
        let value = e.eval_complex(&[(g, Complex::new(4.0, 0.0))]).expect("bound");
        assert!(value.re.abs() < 1e-12);
        assert!((value.im - 2.0).abs() < 1e-12);
    }

    #[test]
    fn unbound_symbols_are_reported() {
        let x = Expr::from(Symbol::real("x"));
        let err = (x + 1.0).eval_real(&[]).expect_err("x is unbound");
        assert_eq!(err, SymbolicError::Unbound("x".to_string()));
    }

    #[test]
    fn real_evaluation_rejects_complex_results() {
        let e = Expr::ImaginaryUnit * 3.0;
        assert!(matches!(e.eval_real(&[]), Err(SymbolicError::ComplexValued(_))));
    }
}

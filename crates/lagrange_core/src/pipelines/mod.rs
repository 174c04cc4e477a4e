//! The four end-to-end pipelines. Each takes a `serde` configuration and
//! returns an in-memory result plus a serializable report; nothing here
//! touches the filesystem.

pub mod coupled;
pub mod derivation;
pub mod pendulum;
pub mod stability;

use crate::expr::{Equation, Expr};
use crate::latex::ToLatex;
use crate::matrix::Matrix;
use crate::symbol::{Domain, Symbol};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// An expression in both printed forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprReport {
    pub plain: String,
    pub latex: String,
}

impl ExprReport {
    pub fn new<T: ToString + ToLatex>(value: &T) -> Self {
        Self {
            plain: value.to_string(),
            latex: value.to_latex(),
        }
    }
}

impl From<&Expr> for ExprReport {
    fn from(expr: &Expr) -> Self {
        Self::new(expr)
    }
}

impl From<&Equation> for ExprReport {
    fn from(equation: &Equation) -> Self {
        Self::new(equation)
    }
}

impl From<&Matrix> for ExprReport {
    fn from(matrix: &Matrix) -> Self {
        Self::new(matrix)
    }
}

/// A named numeric parameter with its declared domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterConfig {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub domain: Domain,
}

impl ParameterConfig {
    pub fn new(name: &str, value: f64, domain: Domain) -> Self {
        Self {
            name: name.to_string(),
            value,
            domain,
        }
    }

    pub fn symbol(&self) -> Symbol {
        Symbol::new(self.name.clone(), self.domain)
    }
}

/// Builds `(symbol, value)` bindings, warning on values outside the
/// declared domain.
pub(crate) fn bind(symbol: &Symbol, value: f64) -> (Expr, f64) {
    if !symbol.admits(value) {
        warn!(
            symbol = symbol.name(),
            value,
            domain = ?symbol.domain(),
            "parameter value outside its declared domain"
        );
    }
    (Expr::from(symbol), value)
}

pub(crate) fn as_substitution(bindings: &[(Expr, f64)]) -> Vec<(Expr, Expr)> {
    bindings
        .iter()
        .map(|(atom, value)| (atom.clone(), Expr::num(*value)))
        .collect()
}

/// Numeric time series `(t, values)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub label: String,
    pub t: Vec<f64>,
    pub values: Vec<f64>,
}

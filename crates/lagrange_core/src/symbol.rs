use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain assumption attached to a symbol.
///
/// Simplification consults these to decide whether branch-sensitive rewrites
/// such as `sqrt(a*b) -> sqrt(a)*sqrt(b)` are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Complex,
    Real,
    Positive,
}

impl Default for Domain {
    fn default() -> Self {
        Domain::Real
    }
}

/// A named scalar placeholder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol {
    name: String,
    domain: Domain,
}

impl Symbol {
    pub fn new(name: impl Into<String>, domain: Domain) -> Self {
        Self {
            name: name.into(),
            domain,
        }
    }

    pub fn complex(name: impl Into<String>) -> Self {
        Self::new(name, Domain::Complex)
    }

    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, Domain::Real)
    }

    pub fn positive(name: impl Into<String>) -> Self {
        Self::new(name, Domain::Positive)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn is_real(&self) -> bool {
        matches!(self.domain, Domain::Real | Domain::Positive)
    }

    pub fn is_positive(&self) -> bool {
        self.domain == Domain::Positive
    }

    /// Whether a numeric value lies inside this symbol's declared domain.
    pub fn admits(&self, value: f64) -> bool {
        match self.domain {
            Domain::Complex | Domain::Real => value.is_finite(),
            Domain::Positive => value.is_finite() && value > 0.0,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Generalized coordinate `q(t)` and its time derivatives.
///
/// Each derivative order is an independent atom for partial differentiation,
/// which is what the Euler-Lagrange operator needs (`dL/dq` vs `dL/dq'`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coordinate {
    name: String,
    time: Symbol,
    order: usize,
}

impl Coordinate {
    pub fn new(name: impl Into<String>, time: &Symbol) -> Self {
        Self {
            name: name.into(),
            time: time.clone(),
            order: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn time(&self) -> &Symbol {
        &self.time
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// The same coordinate differentiated once more with respect to time.
    pub fn derivative(&self) -> Self {
        self.nth(self.order + 1)
    }

    /// The same coordinate at an absolute derivative order.
    pub fn nth(&self, order: usize) -> Self {
        Self {
            name: self.name.clone(),
            time: self.time.clone(),
            order,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.order {
            0 => write!(f, "{}({})", self.name, self.time),
            n if n <= 3 => write!(f, "{}{}({})", self.name, "'".repeat(n), self.time),
            n => write!(f, "{}^({})({})", self.name, n, self.time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_domain_rejects_non_positive_values() {
        let l = Symbol::positive("l");
        assert!(l.admits(1.0));
        assert!(!l.admits(0.0));
        assert!(!l.admits(-2.0));
        assert!(Symbol::real("x").admits(-2.0));
    }

    #[test]
    fn coordinate_derivatives_keep_name_and_time() {
        let t = Symbol::positive("t");
        let theta = Coordinate::new("theta", &t);
        let acc = theta.derivative().derivative();
        assert_eq!(acc.order(), 2);
        assert_eq!(acc.name(), "theta");
        assert_eq!(acc.to_string(), "theta''(t)");
        assert_eq!(theta.nth(4).to_string(), "theta^(4)(t)");
    }
}

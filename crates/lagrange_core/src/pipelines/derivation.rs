use super::ExprReport;
use crate::expr::{Equation, Expr};
use crate::lagrangian::SimplePendulum;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationConfig {
    /// Name of the angle coordinate.
    pub coordinate: String,
    /// Name of the time symbol.
    pub time: String,
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            coordinate: "theta".to_string(),
            time: "t".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Derivation {
    pub pendulum: SimplePendulum,
    pub kinetic: Expr,
    pub potential: Expr,
    pub lagrangian: Expr,
    pub euler_lagrange: Expr,
    pub equation_of_motion: Equation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivationReport {
    pub kinetic: ExprReport,
    pub potential: ExprReport,
    pub lagrangian: ExprReport,
    pub euler_lagrange: ExprReport,
    pub equation_of_motion: ExprReport,
}

pub fn derive(config: &DerivationConfig) -> Result<Derivation> {
    if config.coordinate.is_empty() || config.time.is_empty() {
        bail!("coordinate and time names must be non-empty.");
    }
    if config.coordinate == config.time {
        bail!("coordinate and time must have different names.");
    }
    let pendulum = SimplePendulum::new(&config.coordinate, &config.time);
    let kinetic = pendulum.kinetic_energy().simplify();
    let potential = pendulum.potential_energy().simplify();
    let lagrangian = pendulum.lagrangian().simplify();
    debug!(%lagrangian, "built lagrangian");

    let euler_lagrange = pendulum.euler_lagrange();
    let equation_of_motion = Equation::new(pendulum.equation_of_motion(), Expr::zero());
    info!(equation = %equation_of_motion, "derived equation of motion");

    Ok(Derivation {
        pendulum,
        kinetic,
        potential,
        lagrangian,
        euler_lagrange,
        equation_of_motion,
    })
}

impl Derivation {
    pub fn report(&self) -> DerivationReport {
        DerivationReport {
            kinetic: ExprReport::from(&self.kinetic),
            potential: ExprReport::from(&self.potential),
            lagrangian: ExprReport::from(&self.lagrangian),
            euler_lagrange: ExprReport::from(&self.euler_lagrange),
            equation_of_motion: ExprReport::from(&self.equation_of_motion),
        }
    }
}

pub fn run(config: &DerivationConfig) -> Result<DerivationReport> {
    Ok(derive(config)?.report())
}

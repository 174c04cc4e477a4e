//! Stdout rendering of pipeline reports. Each expression is printed in plain
//! form followed by its LaTeX form.

use lagrange_core::pipelines::coupled::CoupledReport;
use lagrange_core::pipelines::derivation::DerivationReport;
use lagrange_core::pipelines::pendulum::PendulumReport;
use lagrange_core::pipelines::stability::StabilityReport;
use lagrange_core::pipelines::ExprReport;
use serde::Serialize;
use std::io::{self, Write};

/// Everything one invocation produced, for `--json`.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivation: Option<DerivationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability: Option<StabilityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pendulum: Option<PendulumReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupled: Option<CoupledReport>,
}

fn expr(out: &mut impl Write, label: &str, e: &ExprReport) -> io::Result<()> {
    writeln!(out, "{}:", label)?;
    writeln!(out, "  {}", e.plain)?;
    writeln!(out, "  LaTeX: {}", e.latex)
}

fn heading(out: &mut impl Write, title: &str) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "== {} ==", title)
}

pub fn print_derivation(out: &mut impl Write, report: &DerivationReport) -> io::Result<()> {
    heading(out, "Euler-Lagrange derivation")?;
    expr(out, "Kinetic energy", &report.kinetic)?;
    expr(out, "Potential energy", &report.potential)?;
    expr(out, "Lagrangian", &report.lagrangian)?;
    expr(out, "Euler-Lagrange equation", &report.euler_lagrange)?;
    expr(out, "Equation of motion", &report.equation_of_motion)
}

pub fn print_stability(out: &mut impl Write, report: &StabilityReport) -> io::Result<()> {
    heading(out, "Stability analysis")?;
    writeln!(out, "State: ({})", report.state.join(", "))?;
    for (name, field) in report.state.iter().zip(&report.fields) {
        expr(out, &format!("d{}/dt", name), field)?;
    }
    expr(out, "Jacobian", &report.jacobian)?;
    for equilibrium in &report.equilibria {
        let point: Vec<&str> = equilibrium.point.iter().map(|p| p.plain.as_str()).collect();
        writeln!(out)?;
        writeln!(
            out,
            "Equilibrium ({}) [{:?}]: {}",
            point.join(", "),
            equilibrium.origin,
            equilibrium.stability
        )?;
        expr(out, "Jacobian at equilibrium", &equilibrium.jacobian)?;
        for eigenvalue in &equilibrium.eigenvalues {
            expr(out, "Eigenvalue", eigenvalue)?;
        }
        let numeric: Vec<String> = equilibrium
            .numeric_eigenvalues
            .iter()
            .map(|c| format!("{:.6}{:+.6}i", c.re, c.im))
            .collect();
        writeln!(out, "Numeric eigenvalues: {}", numeric.join(", "))?;
    }
    if let Some((nx, ny)) = report.grid_shape {
        writeln!(
            out,
            "Phase grid {}x{}, {} streamlines",
            nx, ny, report.streamline_count
        )?;
    }
    Ok(())
}

pub fn print_pendulum(out: &mut impl Write, report: &PendulumReport) -> io::Result<()> {
    heading(out, "Linearized pendulum")?;
    expr(out, "ODE", &report.ode)?;
    expr(out, "General solution", &report.general_solution)?;
    expr(out, "Particular solution", &report.particular_solution)?;
    writeln!(out, "Max residual over samples: {:.3e}", report.max_residual)
}

pub fn print_coupled(out: &mut impl Write, report: &CoupledReport) -> io::Result<()> {
    heading(out, "Coupled masses")?;
    expr(out, "State matrix", &report.matrix)?;
    for residual in &report.residual {
        expr(out, "Residual", residual)?;
    }
    for component in &report.solutions {
        expr(out, &component.name, &component.solution)?;
    }
    writeln!(out, "Max relative energy drift: {:.3e}", report.energy_drift)?;
    if let Some(check) = &report.cross_check {
        writeln!(
            out,
            "{:?} cross-check (dt = {}, {} steps): max deviation {:.3e}",
            check.integrator, check.dt, check.steps, check.max_deviation
        )?;
    }
    Ok(())
}

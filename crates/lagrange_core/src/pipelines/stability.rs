use super::{as_substitution, bind, ExprReport, ParameterConfig};
use crate::equation_engine::{lambdify, parse, SymbolTable};
use crate::equilibrium::{classify, periodic_images, ComplexNumber, NewtonSettings, NewtonSolver, Stability};
use crate::expr::Expr;
use crate::matrix::{complex_to_expr, numeric_eigenvalues, Matrix};
use crate::phase::{linspace, streamlines, PhaseGrid, Streamline, StreamlineSettings};
use crate::solve::solve_system;
use crate::symbol::{Domain, Symbol};
use anyhow::{bail, Context, Result};
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// State variable names, in order.
    pub state: Vec<String>,
    pub parameters: Vec<ParameterConfig>,
    /// One right-hand side per state variable.
    pub field: Vec<String>,
    /// Equilibria added after the solver's principal solutions.
    pub extra_equilibria: Vec<Vec<String>>,
    /// State variables whose equilibria repeat with period `2*pi`; their
    /// images inside the plot window are added as well.
    pub periodic: Vec<String>,
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    pub grid: (usize, usize),
    pub streamlines: StreamlineSettings,
    pub newton: NewtonSettings,
    /// Newton seeds per axis for the numeric fallback.
    pub newton_seeds: usize,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            state: vec!["theta".to_string(), "omega".to_string()],
            parameters: vec![
                ParameterConfig::new("g", 9.82, Domain::Positive),
                ParameterConfig::new("l", 1.0, Domain::Positive),
            ],
            field: vec!["omega".to_string(), "-(g/l)*sin(theta)".to_string()],
            extra_equilibria: vec![vec!["-pi".to_string(), "0".to_string()]],
            periodic: Vec::new(),
            x_range: (-1.5 * PI, 1.5 * PI),
            y_range: (-8.0, 8.0),
            grid: (200, 200),
            streamlines: StreamlineSettings::default(),
            newton: NewtonSettings::default(),
            newton_seeds: 9,
        }
    }
}

/// Where an equilibrium came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Solved,
    Configured,
    PeriodicImage,
    Newton,
}

#[derive(Debug, Clone)]
pub struct EquilibriumAnalysis {
    pub point: Vec<Expr>,
    pub numeric_point: Vec<f64>,
    pub jacobian: Matrix,
    pub eigenvalues: Vec<Expr>,
    pub numeric_eigenvalues: Vec<Complex<f64>>,
    pub stability: Stability,
    pub origin: Origin,
}

#[derive(Debug, Clone)]
pub struct StabilityAnalysis {
    pub state: Vec<Symbol>,
    pub fields: Vec<Expr>,
    pub jacobian: Matrix,
    pub equilibria: Vec<EquilibriumAnalysis>,
    /// Present for planar systems.
    pub grid: Option<PhaseGrid>,
    pub streamlines: Vec<Streamline>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquilibriumReport {
    pub point: Vec<ExprReport>,
    pub numeric_point: Vec<f64>,
    pub jacobian: ExprReport,
    pub eigenvalues: Vec<ExprReport>,
    pub numeric_eigenvalues: Vec<ComplexNumber>,
    pub stability: Stability,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityReport {
    pub state: Vec<String>,
    pub fields: Vec<ExprReport>,
    pub jacobian: ExprReport,
    pub equilibria: Vec<EquilibriumReport>,
    pub grid_shape: Option<(usize, usize)>,
    pub streamline_count: usize,
}

fn validate(config: &StabilityConfig) -> Result<()> {
    if config.state.is_empty() {
        bail!("state must list at least one variable.");
    }
    if config.field.len() != config.state.len() {
        bail!(
            "field must have one expression per state variable. Expected {}, got {}.",
            config.state.len(),
            config.field.len()
        );
    }
    if !(config.x_range.1 > config.x_range.0) || !(config.y_range.1 > config.y_range.0) {
        bail!("x_range and y_range must be increasing.");
    }
    for name in &config.periodic {
        if !config.state.contains(name) {
            bail!("periodic variable '{}' is not a state variable.", name);
        }
    }
    Ok(())
}

pub fn analyze(config: &StabilityConfig) -> Result<StabilityAnalysis> {
    validate(config)?;

    let state: Vec<Symbol> = config.state.iter().map(Symbol::real).collect();
    let state_atoms: Vec<Expr> = state.iter().map(Expr::from).collect();
    let mut table = SymbolTable::new();
    for symbol in &state {
        table.insert(symbol.name(), symbol);
    }
    let mut bindings = Vec::with_capacity(config.parameters.len());
    for param in &config.parameters {
        let symbol = param.symbol();
        table.insert(symbol.name(), &symbol);
        bindings.push(bind(&symbol, param.value));
    }
    let substitution = as_substitution(&bindings);

    let fields = config
        .field
        .iter()
        .map(|src| {
            parse(src, &table)
                .map(|e| e.simplify())
                .with_context(|| format!("Failed to parse field expression '{}'.", src))
        })
        .collect::<Result<Vec<_>>>()?;
    let jacobian = Matrix::jacobian(&fields, &state_atoms);
    info!(%jacobian, "jacobian of the field");

    let mut candidates: Vec<(Vec<Expr>, Origin)> = match solve_system(&fields, &state_atoms) {
        Ok(solutions) if !solutions.is_empty() => solutions
            .into_iter()
            .map(|point| (point, Origin::Solved))
            .collect(),
        outcome => {
            match outcome {
                Err(err) => warn!("symbolic equilibrium solve failed, using Newton: {err}"),
                Ok(_) => warn!("symbolic solve found no equilibria, using Newton"),
            }
            newton_equilibria(config, &fields, &state_atoms, &bindings)?
                .into_iter()
                .map(|point| (point.into_iter().map(Expr::num).collect(), Origin::Newton))
                .collect()
        }
    };

    for extra in &config.extra_equilibria {
        if extra.len() != state.len() {
            bail!(
                "extra equilibrium has {} coordinates, expected {}.",
                extra.len(),
                state.len()
            );
        }
        let point = extra
            .iter()
            .map(|src| parse(src, &table).map(|e| e.simplify()))
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to parse extra equilibrium.")?;
        candidates.push((point, Origin::Configured));
    }

    let mut equilibria: Vec<EquilibriumAnalysis> = Vec::new();
    let periodic_axes: Vec<usize> = config
        .periodic
        .iter()
        .filter_map(|name| config.state.iter().position(|s| s == name))
        .collect();
    let window = [config.x_range, config.y_range];
    for (point, origin) in candidates {
        let numeric_point = point
            .iter()
            .map(|e| e.subs_all(&substitution).eval_real(&[]))
            .collect::<Result<Vec<_>, _>>()
            .context("Equilibrium coordinates must evaluate to real numbers.")?;
        let mut images = vec![(point.clone(), numeric_point.clone(), origin)];
        if !periodic_axes.is_empty() {
            for image in periodic_images(&numeric_point, &periodic_axes, 2.0 * PI, &window) {
                let shifted: Vec<Expr> = point
                    .iter()
                    .zip(image.iter().zip(&numeric_point))
                    .map(|(e, (to, from))| {
                        let turns = ((to - from) / (2.0 * PI)).round();
                        (e + Expr::num(2.0 * turns) * Expr::Pi).simplify()
                    })
                    .collect();
                images.push((shifted, image, Origin::PeriodicImage));
            }
        }
        for (point, numeric_point, origin) in images {
            let duplicate = equilibria.iter().any(|e| {
                e.numeric_point
                    .iter()
                    .zip(&numeric_point)
                    .all(|(a, b)| (a - b).abs() < 1e-9)
            });
            if duplicate {
                continue;
            }
            let analysis = analyze_point(&jacobian, &state_atoms, &substitution, point, numeric_point, origin)?;
            info!(
                point = ?analysis.numeric_point,
                stability = %analysis.stability,
                "classified equilibrium"
            );
            equilibria.push(analysis);
        }
    }

    let (grid, lines) = if state.len() == 2 {
        let numeric_fields: Vec<Expr> = fields
            .iter()
            .map(|f| f.subs_all(&substitution).simplify())
            .collect();
        let fu = lambdify(&numeric_fields[0], &state_atoms).context("Failed to compile U(x, y).")?;
        let fv = lambdify(&numeric_fields[1], &state_atoms).context("Failed to compile V(x, y).")?;
        let grid = PhaseGrid::evaluate(&fu, &fv, config.x_range, config.y_range, config.grid.0, config.grid.1)?;
        let lines = streamlines(&grid, &config.streamlines)?;
        debug!(count = lines.len(), "traced streamlines");
        (Some(grid), lines)
    } else {
        info!(dimension = state.len(), "phase portrait skipped for non-planar system");
        (None, Vec::new())
    };

    Ok(StabilityAnalysis {
        state,
        fields,
        jacobian,
        equilibria,
        grid,
        streamlines: lines,
    })
}

fn analyze_point(
    jacobian: &Matrix,
    state: &[Expr],
    substitution: &[(Expr, Expr)],
    point: Vec<Expr>,
    numeric_point: Vec<f64>,
    origin: Origin,
) -> Result<EquilibriumAnalysis> {
    let at_point: Vec<(Expr, Expr)> = state.iter().cloned().zip(point.iter().cloned()).collect();
    let local = jacobian.subs_all(&at_point).simplify();
    let (eigenvalues, numeric) = if local.rows() <= 2 {
        let symbolic = local.eigenvalues().context("Failed to compute eigenvalues.")?;
        let numeric = symbolic
            .iter()
            .map(|e| e.subs_all(substitution).eval_complex(&[]))
            .collect::<Result<Vec<_>, _>>()
            .context("Eigenvalues must evaluate once parameters are bound.")?;
        (symbolic, numeric)
    } else {
        let numeric_matrix = local
            .subs_all(substitution)
            .to_numeric(&[])
            .context("Jacobian must be numeric once parameters are bound.")?;
        let numeric = numeric_eigenvalues(&numeric_matrix);
        let symbolic = numeric.iter().map(|&l| complex_to_expr(l)).collect();
        (symbolic, numeric)
    };
    let stability = classify(&numeric);
    Ok(EquilibriumAnalysis {
        point,
        numeric_point,
        jacobian: local,
        eigenvalues,
        numeric_eigenvalues: numeric,
        stability,
        origin,
    })
}

fn newton_equilibria(
    config: &StabilityConfig,
    fields: &[Expr],
    state: &[Expr],
    bindings: &[(Expr, f64)],
) -> Result<Vec<Vec<f64>>> {
    let solver = NewtonSolver::compile(fields, state, bindings)?;
    let n = config.newton_seeds.max(2);
    let xs = linspace(config.x_range.0, config.x_range.1, n);
    let ys = linspace(config.y_range.0, config.y_range.1, n);
    let mut seeds = Vec::with_capacity(n * n);
    for &x in &xs {
        for &y in &ys {
            let mut seed = vec![0.0; state.len()];
            seed[0] = x;
            if state.len() > 1 {
                seed[1] = y;
            }
            seeds.push(seed);
        }
    }
    let found = solver.find_all(&seeds, config.newton, 1e-6);
    if found.is_empty() {
        bail!("No equilibria found by the symbolic solver or Newton iteration.");
    }
    Ok(found)
}

impl StabilityAnalysis {
    pub fn report(&self) -> StabilityReport {
        StabilityReport {
            state: self.state.iter().map(|s| s.name().to_string()).collect(),
            fields: self.fields.iter().map(ExprReport::from).collect(),
            jacobian: ExprReport::from(&self.jacobian),
            equilibria: self
                .equilibria
                .iter()
                .map(|e| EquilibriumReport {
                    point: e.point.iter().map(ExprReport::from).collect(),
                    numeric_point: e.numeric_point.clone(),
                    jacobian: ExprReport::from(&e.jacobian),
                    eigenvalues: e.eigenvalues.iter().map(ExprReport::from).collect(),
                    numeric_eigenvalues: e
                        .numeric_eigenvalues
                        .iter()
                        .map(|&l| ComplexNumber::from(l))
                        .collect(),
                    stability: e.stability,
                    origin: e.origin,
                })
                .collect(),
            grid_shape: self.grid.as_ref().map(|g| (g.nx(), g.ny())),
            streamline_count: self.streamlines.len(),
        }
    }
}

pub fn run(config: &StabilityConfig) -> Result<StabilityReport> {
    Ok(analyze(config)?.report())
}

//! Sampled planar vector fields and streamline tracing.
//!
//! Streamlines follow the usual streamplot scheme: the plot area is divided
//! into a coarse occupancy mask (`30 * density` cells per axis), seeds are
//! taken from unoccupied mask cells, and each line is integrated forward and
//! backward through the bilinearly interpolated field until it leaves the
//! domain, stalls, or runs into a cell owned by an earlier line.

use crate::equation_engine::CompiledFunction;
use crate::solvers::RungeKutta;
use crate::traits::{DynamicalSystem, Steppable};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Field values on a regular grid, stored row-major with `x` varying fastest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseGrid {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub u: Vec<f64>,
    pub v: Vec<f64>,
}

pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count).map(|i| start + step * i as f64).collect()
        }
    }
}

impl PhaseGrid {
    /// Evaluates `(u, v) = (fu(x, y), fv(x, y))` on an `nx` by `ny` grid.
    pub fn evaluate(
        fu: &CompiledFunction,
        fv: &CompiledFunction,
        x_range: (f64, f64),
        y_range: (f64, f64),
        nx: usize,
        ny: usize,
    ) -> Result<Self> {
        if nx < 2 || ny < 2 {
            bail!("Grid needs at least 2 points per axis, got {}x{}.", nx, ny);
        }
        if fu.arity != 2 || fv.arity != 2 {
            bail!("Phase field components must be functions of two variables.");
        }
        if !(x_range.1 > x_range.0) || !(y_range.1 > y_range.0) {
            bail!("Grid ranges must be increasing.");
        }
        let x = linspace(x_range.0, x_range.1, nx);
        let y = linspace(y_range.0, y_range.1, ny);
        let mut u = Vec::with_capacity(nx * ny);
        let mut v = Vec::with_capacity(nx * ny);
        for &yj in &y {
            for &xi in &x {
                u.push(fu.call(&[xi, yj]));
                v.push(fv.call(&[xi, yj]));
            }
        }
        Ok(Self { x, y, u, v })
    }

    pub fn nx(&self) -> usize {
        self.x.len()
    }

    pub fn ny(&self) -> usize {
        self.y.len()
    }

    pub fn x_range(&self) -> (f64, f64) {
        (self.x[0], self.x[self.nx() - 1])
    }

    pub fn y_range(&self) -> (f64, f64) {
        (self.y[0], self.y[self.ny() - 1])
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (x0, x1) = self.x_range();
        let (y0, y1) = self.y_range();
        x >= x0 && x <= x1 && y >= y0 && y <= y1
    }

    /// Bilinear interpolation of the field; `None` outside the grid.
    pub fn interpolate(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if !self.contains(x, y) {
            return None;
        }
        let (x0, x1) = self.x_range();
        let (y0, y1) = self.y_range();
        let gx = (x - x0) / (x1 - x0) * (self.nx() - 1) as f64;
        let gy = (y - y0) / (y1 - y0) * (self.ny() - 1) as f64;
        let i = (gx.floor() as usize).min(self.nx() - 2);
        let j = (gy.floor() as usize).min(self.ny() - 2);
        let fx = gx - i as f64;
        let fy = gy - j as f64;
        let at = |field: &[f64], i: usize, j: usize| field[j * self.nx() + i];
        let blend = |field: &[f64]| {
            let bottom = at(field, i, j) * (1.0 - fx) + at(field, i + 1, j) * fx;
            let top = at(field, i, j + 1) * (1.0 - fx) + at(field, i + 1, j + 1) * fx;
            bottom * (1.0 - fy) + top * fy
        };
        Some((blend(&self.u), blend(&self.v)))
    }

    /// Largest field magnitude on the grid.
    pub fn max_speed(&self) -> f64 {
        self.u
            .iter()
            .zip(&self.v)
            .map(|(u, v)| u.hypot(*v))
            .filter(|s| s.is_finite())
            .fold(0.0, f64::max)
    }
}

/// Unit-speed flow of the grid field in axis-normalized coordinates
/// (`[0, 1]` per axis), optionally reversed.
struct GridField<'a> {
    grid: &'a PhaseGrid,
    direction: f64,
}

impl GridField<'_> {
    fn to_data(&self, s: f64, r: f64) -> (f64, f64) {
        let (x0, x1) = self.grid.x_range();
        let (y0, y1) = self.grid.y_range();
        (x0 + s * (x1 - x0), y0 + r * (y1 - y0))
    }
}

impl DynamicalSystem<f64> for GridField<'_> {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
        let (dx, dy) = self.to_data(x[0], x[1]);
        let (x0, x1) = self.grid.x_range();
        let (y0, y1) = self.grid.y_range();
        match self.grid.interpolate(dx, dy) {
            Some((u, v)) => {
                let su = u / (x1 - x0);
                let sv = v / (y1 - y0);
                let norm = su.hypot(sv);
                if norm > 0.0 && norm.is_finite() {
                    out[0] = self.direction * su / norm;
                    out[1] = self.direction * sv / norm;
                } else {
                    out[0] = 0.0;
                    out[1] = 0.0;
                }
            }
            None => {
                out[0] = 0.0;
                out[1] = 0.0;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamlineSettings {
    /// Scales the occupancy mask; 1.0 gives a 30x30 mask.
    pub density: f64,
    /// Integration step as a fraction of one mask cell.
    pub step_fraction: f64,
    /// Lines shorter than this (in axis-normalized units) are dropped.
    pub min_length: f64,
    /// Maximum length per direction, in axis-normalized units.
    pub max_length: f64,
    /// Stop when the field magnitude falls below this fraction of the maximum.
    pub stall_fraction: f64,
}

impl Default for StreamlineSettings {
    fn default() -> Self {
        Self {
            density: 1.5,
            step_fraction: 0.2,
            min_length: 0.05,
            max_length: 4.0,
            stall_fraction: 1e-4,
        }
    }
}

/// One traced flow line in data coordinates, ordered along the flow.
pub type Streamline = Vec<(f64, f64)>;

struct Mask {
    n: usize,
    owner: Vec<Option<usize>>,
}

impl Mask {
    fn cell(&self, s: f64, r: f64) -> Option<usize> {
        if !(0.0..=1.0).contains(&s) || !(0.0..=1.0).contains(&r) {
            return None;
        }
        let i = ((s * self.n as f64) as usize).min(self.n - 1);
        let j = ((r * self.n as f64) as usize).min(self.n - 1);
        Some(j * self.n + i)
    }
}

/// Traces streamlines through `grid`.
pub fn streamlines(grid: &PhaseGrid, settings: &StreamlineSettings) -> Result<Vec<Streamline>> {
    if settings.density <= 0.0 {
        bail!("density must be positive.");
    }
    if settings.step_fraction <= 0.0 {
        bail!("step_fraction must be positive.");
    }
    let n = ((30.0 * settings.density).round() as usize).max(1);
    let mut mask = Mask {
        n,
        owner: vec![None; n * n],
    };
    let stall = settings.stall_fraction * grid.max_speed();
    let step = settings.step_fraction / n as f64;

    let mut lines = Vec::new();
    for seed in seed_order(n) {
        if mask.owner[seed].is_some() {
            continue;
        }
        let s = ((seed % n) as f64 + 0.5) / n as f64;
        let r = ((seed / n) as f64 + 0.5) / n as f64;
        let id = lines.len();

        let mut claimed = vec![seed];
        let backward = trace(grid, &mask, id, (s, r), -1.0, step, stall, settings, &mut claimed);
        let forward = trace(grid, &mask, id, (s, r), 1.0, step, stall, settings, &mut claimed);

        let length = polyline_length(&backward) + polyline_length(&forward);
        if length < settings.min_length {
            continue;
        }
        for cell in claimed {
            mask.owner[cell] = Some(id);
        }
        let field = GridField {
            grid,
            direction: 1.0,
        };
        let mut line: Streamline = backward
            .iter()
            .rev()
            .chain(forward.iter().skip(1))
            .map(|&(s, r)| field.to_data(s, r))
            .collect();
        line.dedup();
        lines.push(line);
    }
    Ok(lines)
}

/// Seeds spiral inward from the mask border so long lines start near edges.
fn seed_order(n: usize) -> Vec<usize> {
    let mut order = Vec::with_capacity(n * n);
    let (mut lo_i, mut hi_i, mut lo_j, mut hi_j) = (0isize, n as isize - 1, 0isize, n as isize - 1);
    while lo_i <= hi_i && lo_j <= hi_j {
        for i in lo_i..=hi_i {
            order.push((lo_j, i));
        }
        for j in lo_j + 1..=hi_j {
            order.push((j, hi_i));
        }
        if lo_j < hi_j {
            for i in (lo_i..hi_i).rev() {
                order.push((hi_j, i));
            }
        }
        if lo_i < hi_i {
            for j in (lo_j + 1..hi_j).rev() {
                order.push((j, lo_i));
            }
        }
        lo_i += 1;
        hi_i -= 1;
        lo_j += 1;
        hi_j -= 1;
    }
    order
        .into_iter()
        .map(|(j, i)| j as usize * n + i as usize)
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn trace(
    grid: &PhaseGrid,
    mask: &Mask,
    id: usize,
    start: (f64, f64),
    direction: f64,
    step: f64,
    stall: f64,
    settings: &StreamlineSettings,
    claimed: &mut Vec<usize>,
) -> Vec<(f64, f64)> {
    let field = GridField { grid, direction };
    let mut stepper = RungeKutta::rk4(2);
    let mut state = [start.0, start.1];
    let mut t = 0.0;
    let mut points = vec![start];
    let mut travelled = 0.0;
    let max_steps = (settings.max_length / step).ceil() as usize;
    let mut last_cell = mask.cell(start.0, start.1);

    for _ in 0..max_steps {
        let (dx, dy) = field.to_data(state[0], state[1]);
        match grid.interpolate(dx, dy) {
            Some((u, v)) if u.hypot(v) > stall => {}
            _ => break,
        }
        let previous = state;
        stepper.step(&field, &mut t, &mut state, step);
        let Some(cell) = mask.cell(state[0], state[1]) else {
            break;
        };
        if let Some(owner) = mask.owner[cell] {
            if owner != id {
                break;
            }
        }
        if last_cell != Some(cell) && claimed.contains(&cell) {
            // closed orbit
            break;
        }
        last_cell = Some(cell);
        let moved = (state[0] - previous[0]).hypot(state[1] - previous[1]);
        if moved < 1e-3 * step {
            break;
        }
        travelled += moved;
        if !claimed.contains(&cell) {
            claimed.push(cell);
        }
        points.push((state[0], state[1]));
        if travelled >= settings.max_length {
            break;
        }
    }
    points
}

fn polyline_length(points: &[(f64, f64)]) -> f64 {
    points
        .windows(2)
        .map(|w| (w[1].0 - w[0].0).hypot(w[1].1 - w[0].1))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::lambdify;
    use crate::expr::Expr;
    use crate::symbol::Symbol;

    fn rotation_grid() -> PhaseGrid {
        let x = Expr::from(Symbol::real("x"));
        let y = Expr::from(Symbol::real("y"));
        let fu = lambdify(&(-y.clone()), &[x.clone(), y.clone()]).expect("compiles");
        let fv = lambdify(&x, &[x.clone(), y.clone()]).expect("compiles");
        PhaseGrid::evaluate(&fu, &fv, (-2.0, 2.0), (-2.0, 2.0), 41, 41).expect("valid grid")
    }

    #[test]
    fn bilinear_interpolation_is_exact_for_linear_fields() {
        let grid = rotation_grid();
        let (u, v) = grid.interpolate(0.33, -1.27).expect("inside");
        assert!((u - 1.27).abs() < 1e-12);
        assert!((v - 0.33).abs() < 1e-12);
        assert!(grid.interpolate(2.5, 0.0).is_none());
    }

    #[test]
    fn streamlines_follow_circles() {
        let grid = rotation_grid();
        let lines = streamlines(&grid, &StreamlineSettings::default()).expect("valid settings");
        assert!(!lines.is_empty());
        for line in &lines {
            let r0 = line[0].0.hypot(line[0].1);
            for &(x, y) in line {
                assert!((x.hypot(y) - r0).abs() < 0.05, "radius drifted on a rotation field");
            }
        }
    }

    #[test]
    fn settings_are_validated() {
        let grid = rotation_grid();
        let bad = StreamlineSettings {
            density: 0.0,
            ..StreamlineSettings::default()
        };
        assert!(streamlines(&grid, &bad).is_err());
    }

    #[test]
    fn spiral_covers_every_cell_once() {
        for n in [1, 2, 5, 6] {
            let mut order = seed_order(n);
            order.sort_unstable();
            assert_eq!(order, (0..n * n).collect::<Vec<_>>());
        }
    }
}

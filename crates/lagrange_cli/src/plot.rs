use anyhow::{bail, Context, Result};
use lagrange_core::phase::PhaseGrid;
use lagrange_core::pipelines::stability::StabilityAnalysis;
use lagrange_core::pipelines::Series;
use plotters::prelude::*;
use std::path::Path;
use tracing::info;

const CURVE: RGBColor = RGBColor(30, 90, 200);
const LIGHT_GRID: RGBColor = RGBColor(225, 225, 225);
const MASS_TITLES: [&str; 2] = [
    "Displacement of First Mass over Time",
    "Displacement of Second Mass over Time",
];

fn padded_range(values: &[f64]) -> (f64, f64) {
    let (mut lo, mut hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() || !hi.is_finite() {
        return (-1.0, 1.0);
    }
    // Add a small y padding.
    let pad = 0.05 * (hi - lo).abs().max(1e-9);
    lo -= pad;
    hi += pad;
    (lo, hi)
}

/// Arrow head at the middle of a streamline, pointing along the flow.
/// Built in window-normalized coordinates so heads look the same on both axes.
fn arrow_head(grid: &PhaseGrid, line: &[(f64, f64)]) -> Option<Vec<(f64, f64)>> {
    if line.len() < 3 {
        return None;
    }
    let (x0, x1) = grid.x_range();
    let (y0, y1) = grid.y_range();
    let (sx, sy) = (x1 - x0, y1 - y0);
    let mid = line.len() / 2;
    let (px, py) = line[mid];
    let (qx, qy) = line[mid + 1];
    let (dx, dy) = ((qx - px) / sx, (qy - py) / sy);
    let norm = dx.hypot(dy);
    if norm == 0.0 {
        return None;
    }
    let (dx, dy) = (dx / norm, dy / norm);
    let size = 0.012;
    let (tx, ty) = ((px - x0) / sx, (py - y0) / sy);
    let (bx, by) = (tx - size * dx, ty - size * dy);
    let (nx, ny) = (-dy * 0.5 * size, dx * 0.5 * size);
    let back = |u: f64, v: f64| (x0 + u * sx, y0 + v * sy);
    Some(vec![back(tx, ty), back(bx + nx, by + ny), back(bx - nx, by - ny)])
}

pub fn phase_portrait(path: &Path, analysis: &StabilityAnalysis, size: (u32, u32)) -> Result<()> {
    let Some(grid) = analysis.grid.as_ref() else {
        bail!("A phase portrait needs a two-dimensional field.");
    };
    let (x0, x1) = grid.x_range();
    let (y0, y1) = grid.y_range();

    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("Phase Portrait of the Pendulum", ("sans-serif", 32))
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x0..x1, y0..y1)?;

    chart
        .configure_mesh()
        .x_desc("θ")
        .y_desc("ω")
        .light_line_style(LIGHT_GRID.stroke_width(1))
        .draw()?;

    for line in &analysis.streamlines {
        chart.draw_series(LineSeries::new(line.iter().copied(), CURVE.stroke_width(1)))?;
        if let Some(head) = arrow_head(grid, line) {
            chart.draw_series(std::iter::once(Polygon::new(head, CURVE.filled())))?;
        }
    }

    chart.draw_series(
        analysis
            .equilibria
            .iter()
            .filter(|e| e.numeric_point.len() == 2)
            .map(|e| (e.numeric_point[0], e.numeric_point[1]))
            .filter(|&(x, y)| grid.contains(x, y))
            .map(|p| Circle::new(p, 6, RED.filled())),
    )?;

    root.present()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Phase portrait saved to {}", path.display());
    Ok(())
}

pub fn pendulum(path: &Path, series: &Series, size: (u32, u32)) -> Result<()> {
    let t_end = series.t.last().copied().unwrap_or(1.0);
    let (lo, hi) = padded_range(&series.values);

    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("Linearized Pendulum Motion Over Time", ("sans-serif", 32))
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(0.0..t_end, lo..hi)?;

    chart
        .configure_mesh()
        .x_desc("Time (s)")
        .y_desc("θ(t) (rad)")
        .light_line_style(LIGHT_GRID.stroke_width(1))
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            series.t.iter().copied().zip(series.values.iter().copied()),
            CURVE.stroke_width(2),
        ))?
        .label("θ(t)")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], CURVE));

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Pendulum response saved to {}", path.display());
    Ok(())
}

/// One panel per mass, stacked vertically.
pub fn two_masses(path: &Path, series: &[Series], size: (u32, u32)) -> Result<()> {
    if series.len() != 2 {
        bail!("Expected two displacement series, got {}.", series.len());
    }
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    let areas = root.split_evenly((2, 1));

    let panels = areas.iter().zip(series).zip([BLUE, RED]).zip(MASS_TITLES);
    for (((area, s), color), title) in panels {
        let t_end = s.t.last().copied().unwrap_or(1.0);
        let (lo, hi) = padded_range(&s.values);
        let mut chart = ChartBuilder::on(area)
            .margin(15)
            .caption(title, ("sans-serif", 24))
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(0.0..t_end, lo..hi)?;

        chart
            .configure_mesh()
            .x_desc("Time (s)")
            .y_desc("Displacement (m)")
            .light_line_style(LIGHT_GRID.stroke_width(1))
            .draw()?;

        chart
            .draw_series(LineSeries::new(
                s.t.iter().copied().zip(s.values.iter().copied()),
                color.stroke_width(2),
            ))?
            .label(s.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));

        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
    }

    root.present()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Two-mass response saved to {}", path.display());
    Ok(())
}

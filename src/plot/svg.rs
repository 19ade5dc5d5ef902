//! SVG rendering of the diagnostics with plotters.
//!
//! Every file goes under one plot directory; report names may contain a
//! subdirectory (`single_fit/...`). A failed render is logged and skipped.

use std::path::{Path, PathBuf};

use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use tracing::{debug, warn};

use crate::domain::{BinnedDataset, BlindWindow};
use crate::io::ensure_parent_dir;
use crate::math::{chi2_pdf, poisson_errors};
use crate::models::Model;
use crate::plot::{Diagnostics, EnvelopeReport, GofToyReport, NestedToyReport, SingleFitReport};

type DrawResult = Result<(), Box<dyn std::error::Error>>;
type MassChart<'a, 'b> = ChartContext<'a, SVGBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

const SIZE: (u32, u32) = (900, 650);
const NESTED_RANGE: (f64, f64) = (-2.0, 10.0);
const NESTED_BINS: usize = 60;
const STATUS_RANGE: (f64, f64) = (-4.0, 4.0);
const STATUS_BINS: usize = 8;
const GOF_BINS: usize = 50;
const CURVE_POINTS: usize = 400;

/// Writes one SVG per report under `dir`.
#[derive(Debug, Clone)]
pub struct SvgDiagnostics {
    dir: PathBuf,
}

impl SvgDiagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.svg"))
    }

    fn render(&self, name: &str, draw: impl FnOnce(&Path) -> DrawResult) {
        let path = self.path(name);
        let result = match ensure_parent_dir(&path) {
            Ok(()) => draw(&path),
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => debug!(path = %path.display(), "wrote plot"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to render plot"),
        }
    }
}

impl Diagnostics for SvgDiagnostics {
    fn nested_toys(&mut self, report: &NestedToyReport) {
        self.render(&report.name, |path| draw_nested(path, report));
        self.render(&format!("{}_fitstatus", report.name), |path| {
            draw_fit_status(path, report)
        });
    }

    fn gof_toys(&mut self, report: &GofToyReport) {
        self.render(&report.name, |path| draw_gof(path, report));
    }

    fn single_fit(&mut self, report: &SingleFitReport<'_>) {
        self.render(&report.name, |path| draw_single_fit(path, report));
    }

    fn envelope(&mut self, report: &EnvelopeReport<'_>) {
        self.render(&report.name, |path| draw_envelope(path, report));
    }
}

/// Fill `nbins` equal bins over `[low, high)`; values outside are dropped.
pub fn histogram(values: impl IntoIterator<Item = f64>, low: f64, high: f64, nbins: usize) -> Vec<f64> {
    let nbins = nbins.max(1);
    let width = (high - low) / nbins as f64;
    let mut counts = vec![0.0; nbins];
    for v in values {
        if !(v >= low && v < high) {
            continue;
        }
        let idx = (((v - low) / width) as usize).min(nbins - 1);
        counts[idx] += 1.0;
    }
    counts
}

fn bars(counts: &[f64], low: f64, high: f64, style: ShapeStyle) -> Vec<Rectangle<(f64, f64)>> {
    let width = (high - low) / counts.len().max(1) as f64;
    counts
        .iter()
        .enumerate()
        .filter(|(_, c)| **c > 0.0)
        .map(|(i, c)| {
            let x0 = low + i as f64 * width;
            Rectangle::new([(x0, 0.0), (x0 + width, *c)], style)
        })
        .collect()
}

fn max_or(values: impl IntoIterator<Item = f64>, fallback: f64) -> f64 {
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(fallback, f64::max)
}

fn draw_nested(path: &Path, report: &NestedToyReport) -> DrawResult {
    let (low, high) = NESTED_RANGE;
    let width = (high - low) / NESTED_BINS as f64;
    let n = report.toy_chi2.len().max(1) as f64;
    let density: Vec<f64> = histogram(report.toy_chi2.iter().copied(), low, high, NESTED_BINS)
        .into_iter()
        .map(|c| c / (n * width))
        .collect();
    let pdf: Vec<(f64, f64)> = (0..=CURVE_POINTS)
        .map(|i| {
            let x = low + (high - low) * i as f64 / CURVE_POINTS as f64;
            (x, chi2_pdf(x, i64::from(report.ndof)))
        })
        .collect();
    let y_max = 1.2 * max_or(density.iter().copied().chain(pdf.iter().map(|p| p.1)), 0.1);

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let caption = format!(
        "Prob (asymptotic) = {:.4}   Prob (toys) = {:.4}",
        report.prob_asymptotic, report.prob_toys
    );
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 18).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(low..high, 0.0..y_max)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_desc("chi2")
        .y_desc("density")
        .draw()?;

    chart
        .draw_series(bars(&density, low, high, BLUE.mix(0.4).filled()))?
        .label(format!("toy chi2 ({} toys)", report.toy_chi2.len()))
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], BLUE.mix(0.4).filled()));
    chart
        .draw_series(LineSeries::new(pdf, RED.stroke_width(2)))?
        .label(format!("chi2 pdf, ndof = {}", report.ndof))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(2)));
    chart
        .draw_series(LineSeries::new(
            vec![(report.observed_chi2, 0.0), (report.observed_chi2, y_max)],
            BLACK.stroke_width(2),
        ))?
        .label(format!("observed = {:.3}", report.observed_chi2))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK.stroke_width(2)));

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

fn draw_fit_status(path: &Path, report: &NestedToyReport) -> DrawResult {
    let (low, high) = STATUS_RANGE;
    let as_f64 = |s: &[i32]| s.iter().map(|v| f64::from(*v)).collect::<Vec<_>>();
    let simple = histogram(as_f64(&report.status_simple), low, high, STATUS_BINS);
    let rich = histogram(as_f64(&report.status_rich), low, high, STATUS_BINS);
    let y_max = 1.2 * max_or(simple.iter().chain(&rich).copied(), 1.0);

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Toy fit status", ("sans-serif", 18).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(low..high, 0.0..y_max)?;
    chart.configure_mesh().x_desc("fit status").y_desc("toys").draw()?;

    chart
        .draw_series(bars(&simple, low, high, BLUE.mix(0.4).filled()))?
        .label("null hypothesis")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], BLUE.mix(0.4).filled()));
    chart
        .draw_series(bars(&rich, low, high, RED.stroke_width(2)))?
        .label("alternative hypothesis")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], RED.stroke_width(2)));
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

fn draw_gof(path: &Path, report: &GofToyReport) -> DrawResult {
    let finite: Vec<f64> = report.toy_chi2.iter().copied().filter(|v| v.is_finite()).collect();
    let lo = finite.iter().copied().fold(report.observed_chi2, f64::min);
    let hi = finite.iter().copied().fold(report.observed_chi2, f64::max);
    let (low, high) = if hi > lo { (lo, hi + 0.01 * (hi - lo)) } else { (lo - 1.0, hi + 1.0) };
    let counts = histogram(finite.iter().copied(), low, high, GOF_BINS);
    let y_max = 1.2 * max_or(counts.iter().copied(), 1.0);

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Goodness of fit from toys", ("sans-serif", 18).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(low..high, 0.0..y_max)?;
    chart.configure_mesh().x_desc("chi2").y_desc("toys").draw()?;

    chart.draw_series(bars(&counts, low, high, BLUE.mix(0.4).filled()))?;
    chart
        .draw_series(LineSeries::new(
            vec![(report.observed_chi2, 0.0), (report.observed_chi2, y_max)],
            RED.stroke_width(2),
        ))?
        .label(format!("observed = {:.2}", report.observed_chi2))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(2)));
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

/// Data points with asymmetric Poisson error bars, skipping blinded bins.
fn data_points(data: &BinnedDataset, blind: Option<BlindWindow>) -> Vec<(f64, f64, f64, f64)> {
    (0..data.nbins())
        .map(|i| (data.bin_center(i), data.counts[i]))
        .filter(|(x, _)| !blind.is_some_and(|b| b.contains(*x)))
        .map(|(x, n)| {
            let (lo, hi) = poisson_errors(n);
            (x, n, n - lo, n + hi)
        })
        .collect()
}

fn draw_data(chart: &mut MassChart<'_, '_>, points: &[(f64, f64, f64, f64)]) -> DrawResult {
    chart.draw_series(
        points
            .iter()
            .map(|&(x, _, lo, hi)| PathElement::new(vec![(x, lo), (x, hi)], &BLACK)),
    )?;
    chart
        .draw_series(points.iter().map(|&(x, y, _, _)| Circle::new((x, y), 3, BLACK.filled())))?
        .label("data")
        .legend(|(x, y)| Circle::new((x + 10, y), 3, BLACK.filled()));
    Ok(())
}

fn draw_single_fit(path: &Path, report: &SingleFitReport<'_>) -> DrawResult {
    let data = report.data;
    let scale = data.sum_entries() * data.bin_width();
    let curve = report.model.curve(CURVE_POINTS, scale);
    let points = data_points(data, report.blind);
    let y_max = 1.2 * max_or(points.iter().map(|p| p.3).chain(curve.iter().map(|c| c.1)), 1.0);

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let caption = format!(
        "{}   chi2/ndof = {:.3}   Prob = {:.3}   Fit Status = {}",
        report.model.name(),
        report.chi2,
        report.gof_prob,
        report.status
    );
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 16).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(data.low..data.high, 0.0..y_max)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_desc("m (GeV)")
        .y_desc("events / bin")
        .draw()?;

    draw_data(&mut chart, &points)?;
    chart
        .draw_series(LineSeries::new(curve, BLUE.stroke_width(2)))?
        .label(format!("{}{}", report.model.family(), report.model.order()))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE.stroke_width(2)));
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

fn draw_envelope(path: &Path, report: &EnvelopeReport<'_>) -> DrawResult {
    let data = report.data;
    let total = data.sum_entries();
    let scale = total * data.bin_width();
    let points = data_points(data, report.blind);
    let curves: Vec<(&Model, Vec<(f64, f64)>)> = report
        .models
        .iter()
        .map(|m| (m, m.curve(CURVE_POINTS, scale)))
        .collect();
    let y_max = 1.2
        * max_or(
            points
                .iter()
                .map(|p| p.3)
                .chain(curves.iter().flat_map(|(_, c)| c.iter().map(|p| p.1))),
            1.0,
        );

    // Residuals against the chosen function, same blinding as the data.
    let expected = report
        .models
        .get(report.best)
        .and_then(|m| m.expected_counts(data, total))
        .unwrap_or_default();
    let residuals: Vec<(f64, f64, f64, f64)> = points
        .iter()
        .filter_map(|&(x, n, lo, hi)| {
            let idx = (((x - data.low) / data.bin_width()) as usize).min(data.nbins().saturating_sub(1));
            let e = expected.get(idx)?;
            Some((x, n - e, lo - e, hi - e))
        })
        .collect();
    let r_max = 1.2 * max_or(residuals.iter().map(|r| r.2.abs().max(r.3.abs())), 1.0);

    let root = SVGBackend::new(path, (SIZE.0, SIZE.1 + 200)).into_drawing_area();
    root.fill(&WHITE)?;
    let (upper, lower) = root.split_vertically(SIZE.1);

    let mut chart = ChartBuilder::on(&upper)
        .caption(format!("Category {}", report.category), ("sans-serif", 18).into_font())
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(60)
        .build_cartesian_2d(data.low..data.high, 0.0..y_max)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .y_desc("events / bin")
        .draw()?;
    draw_data(&mut chart, &points)?;

    for (i, (model, curve)) in curves.into_iter().enumerate() {
        let is_best = i == report.best;
        let style = if is_best {
            RED.stroke_width(3)
        } else {
            Palette99::pick(i).stroke_width(1)
        };
        let label = if is_best {
            format!("{} (best fit)", model.name())
        } else {
            model.name().to_string()
        };
        chart
            .draw_series(LineSeries::new(curve, style))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
    }
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    let mut resid = ChartBuilder::on(&lower)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(data.low..data.high, -r_max..r_max)?;
    resid
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_desc("m (GeV)")
        .y_desc("data - best fit")
        .y_labels(5)
        .draw()?;
    resid.draw_series(LineSeries::new(vec![(data.low, 0.0), (data.high, 0.0)], RED.stroke_width(2)))?;
    draw_data(&mut resid, &residuals)?;

    root.present()?;
    Ok(())
}

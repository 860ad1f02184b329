//! Measurement plots.

use std::ops::Range;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use tracing::info;

use crate::error::{BenchError, BenchResult};
use crate::processing::MeasurementData;

/// Renders the measurement table.
pub trait Plotter {
    /// Render all plots into `outdir`, returning the files written.
    fn plot(&self, data: &MeasurementData, outdir: &Path) -> BenchResult<Vec<PathBuf>>;
}

/// Writes PNG charts.
#[derive(Debug, Clone)]
pub struct PngPlotter {
    size: (u32, u32),
}

impl PngPlotter {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
        }
    }
}

impl Default for PngPlotter {
    fn default() -> Self {
        Self::new(1024, 768)
    }
}

impl Plotter for PngPlotter {
    fn plot(&self, data: &MeasurementData, outdir: &Path) -> BenchResult<Vec<PathBuf>> {
        if data.measurements.is_empty() {
            return Err(BenchError::NoMeasurements);
        }
        std::fs::create_dir_all(outdir).map_err(|e| BenchError::io(outdir, e))?;

        let saturation = data.saturation_index();
        let ptc: Vec<(f64, f64)> = data
            .measurements
            .iter()
            .map(|m| (m.signal, m.temporal_variance))
            .collect();
        let sensitivity: Vec<(f64, f64)> = data
            .measurements
            .iter()
            .map(|m| (m.photons, m.signal))
            .collect();

        let ptc_path = outdir.join("photon_transfer.png");
        draw_chart(
            &ptc_path,
            self.size,
            "Photon transfer",
            "mean signal - dark [DN]",
            "temporal variance - dark [DN^2]",
            &ptc,
            saturation,
        )?;

        let sensitivity_path = outdir.join("sensitivity.png");
        draw_chart(
            &sensitivity_path,
            self.size,
            "Sensitivity",
            "photons per pixel",
            "mean signal - dark [DN]",
            &sensitivity,
            saturation,
        )?;

        info!("Wrote plots to {}", outdir.display());
        Ok(vec![ptc_path, sensitivity_path])
    }
}

fn plot_err<E: std::fmt::Display>(e: E) -> BenchError {
    BenchError::Plot(e.to_string())
}

fn draw_chart(
    path: &Path,
    size: (u32, u32),
    caption: &str,
    x_desc: &str,
    y_desc: &str,
    points: &[(f64, f64)],
    highlight: Option<usize>,
) -> BenchResult<()> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(
            axis_range(points.iter().map(|p| p.0)),
            axis_range(points.iter().map(|p| p.1)),
        )
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(points.iter().copied(), &BLUE))
        .map_err(plot_err)?;
    chart
        .draw_series(points.iter().map(|&p| Circle::new(p, 4, BLUE.filled())))
        .map_err(plot_err)?;

    if let Some(point) = highlight.and_then(|i| points.get(i)) {
        chart
            .draw_series(std::iter::once(Circle::new(*point, 7, RED.filled())))
            .map_err(plot_err)?;
    }

    root.present().map_err(plot_err)?;
    Ok(())
}

/// Axis range covering `values` with 5 % padding on each side.
fn axis_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        return 0.0..1.0;
    }
    let span = hi - lo;
    let pad = if span > 0.0 {
        span * 0.05
    } else {
        lo.abs().max(1.0) * 0.05
    };
    (lo - pad)..(hi + pad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::Measurement;
    use approx::assert_relative_eq;

    #[test]
    fn test_axis_range_pads_both_sides() {
        let range = axis_range([0.0, 100.0, 50.0].into_iter());
        assert_relative_eq!(range.start, -5.0);
        assert_relative_eq!(range.end, 105.0);
    }

    #[test]
    fn test_axis_range_single_value() {
        let range = axis_range(std::iter::once(200.0));
        assert_relative_eq!(range.start, 190.0);
        assert_relative_eq!(range.end, 210.0);
    }

    #[test]
    fn test_axis_range_ignores_non_finite() {
        let range = axis_range([f64::NAN, 1.0, 3.0].into_iter());
        assert!(range.start < 1.0 && range.end > 3.0);

        let empty = axis_range(std::iter::empty());
        assert_eq!(empty, 0.0..1.0);
    }

    fn table() -> MeasurementData {
        let measurements = [100.0, 400.0, 1600.0, 6400.0]
            .iter()
            .enumerate()
            .map(|(i, &photons)| Measurement {
                exposure: 1e5 * (i + 1) as f64,
                photons,
                signal: 0.21 * photons,
                temporal_variance: 0.0441 * photons,
                spatial_variance: 1.0,
                dark_mean: 20.0,
                dark_temporal_variance: 4.0,
                dark_spatial_variance: 0.5,
                frames: 2,
            })
            .collect();
        MeasurementData {
            bit_depth: 12,
            width: 32,
            height: 24,
            measurements,
        }
    }

    #[test]
    fn test_renders_both_charts() {
        let dir = tempfile::tempdir().unwrap();
        let outdir = dir.path().join("Plots");

        let plots = PngPlotter::new(320, 240).plot(&table(), &outdir).unwrap();

        assert_eq!(
            plots,
            vec![
                outdir.join("photon_transfer.png"),
                outdir.join("sensitivity.png")
            ]
        );
        for plot in &plots {
            let image = image::open(plot).unwrap();
            assert_eq!((image.width(), image.height()), (320, 240));
        }
    }

    #[test]
    fn test_empty_table_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outdir = dir.path().join("Plots");
        let data = MeasurementData {
            bit_depth: 12,
            width: 1,
            height: 1,
            measurements: vec![],
        };

        assert!(matches!(
            PngPlotter::default().plot(&data, &outdir),
            Err(BenchError::NoMeasurements)
        ));
        assert!(!outdir.exists());
    }
}

//! Measurement table and summary.
//!
//! [`MeasurementData`] is the dark-corrected view of the loaded frames, one
//! [`Measurement`] per operating point sorted by photon count. It is what
//! EMVA1288 estimation consumes; the estimators themselves live outside the
//! bench. [`ResultsSummary`] condenses the table into the figures printed
//! after a run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};
use crate::loader::ImageData;

/// One operating point after dark subtraction. Signals in DN, variances in DN².
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Exposure time in ns
    pub exposure: f64,
    /// Mean photons per pixel
    pub photons: f64,
    /// Bright mean minus dark mean
    pub signal: f64,
    /// Bright temporal variance minus dark temporal variance
    pub temporal_variance: f64,
    /// Bright spatial variance minus dark spatial variance
    pub spatial_variance: f64,
    pub dark_mean: f64,
    pub dark_temporal_variance: f64,
    pub dark_spatial_variance: f64,
    pub frames: usize,
}

/// The measurement table of one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementData {
    pub bit_depth: u32,
    pub width: u32,
    pub height: u32,
    pub measurements: Vec<Measurement>,
}

impl MeasurementData {
    /// Build the table from loaded frame statistics.
    pub fn from_images(images: &ImageData) -> Self {
        let mut measurements: Vec<Measurement> = images
            .points
            .iter()
            .map(|point| Measurement {
                exposure: point.exposure,
                photons: point.photons,
                signal: point.bright.mean - point.dark.mean,
                temporal_variance: point.bright.temporal_variance - point.dark.temporal_variance,
                spatial_variance: point.bright.spatial_variance - point.dark.spatial_variance,
                dark_mean: point.dark.mean,
                dark_temporal_variance: point.dark.temporal_variance,
                dark_spatial_variance: point.dark.spatial_variance,
                frames: point.bright.frames,
            })
            .collect();
        measurements.sort_by(|a, b| {
            a.photons
                .total_cmp(&b.photons)
                .then(a.exposure.total_cmp(&b.exposure))
        });

        Self {
            bit_depth: images.bit_depth,
            width: images.width,
            height: images.height,
            measurements,
        }
    }

    /// Index of the point with the largest temporal variance. Past it the
    /// sensor is saturating and the variance collapses.
    pub fn saturation_index(&self) -> Option<usize> {
        self.measurements
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.temporal_variance.total_cmp(&b.temporal_variance))
            .map(|(i, _)| i)
    }
}

/// Turns loaded frames into the measurement table.
pub trait DataProcessor {
    fn process(&self, images: &ImageData) -> BenchResult<MeasurementData>;
}

/// Dark-subtracting processor.
#[derive(Debug, Clone, Copy, Default)]
pub struct DarkCorrectedProcessor;

impl DataProcessor for DarkCorrectedProcessor {
    fn process(&self, images: &ImageData) -> BenchResult<MeasurementData> {
        let data = MeasurementData::from_images(images);
        if data.measurements.is_empty() {
            return Err(BenchError::NoMeasurements);
        }
        Ok(data)
    }
}

/// Headline figures of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub points: usize,
    pub bit_depth: u32,
    pub width: u32,
    pub height: u32,
    /// Pixel area in µm²
    pub pixel_area: f64,
    pub exposure_min: f64,
    pub exposure_max: f64,
    pub photons_min: f64,
    pub photons_max: f64,
    /// Largest photon density reached, photons per µm². `None` without a
    /// positive pixel area.
    pub photon_density_max: Option<f64>,
    /// Mean dark level in DN over all points
    pub dark_level: f64,
    /// Temporal dark noise in DN at the shortest exposure
    pub dark_noise: f64,
    /// Signal in DN at the saturation point
    pub saturation_signal: f64,
    /// Photons per pixel at the saturation point
    pub saturation_photons: f64,
    /// Largest dark-corrected signal relative to the digital full scale.
    /// `None` for a zero bit depth.
    pub full_scale_fraction: Option<f64>,
}

impl ResultsSummary {
    pub fn new(data: &MeasurementData, pixel_area: f64) -> BenchResult<Self> {
        let rows = &data.measurements;
        let (Some(first), Some(saturation)) = (rows.first(), data.saturation_index()) else {
            return Err(BenchError::NoMeasurements);
        };

        let (exposure_min, exposure_max) = value_range(rows, |m| m.exposure);
        let (photons_min, photons_max) = value_range(rows, |m| m.photons);
        let (_, signal_max) = value_range(rows, |m| m.signal);

        let shortest = rows
            .iter()
            .min_by(|a, b| a.exposure.total_cmp(&b.exposure))
            .unwrap_or(first);
        let dark_level = rows.iter().map(|m| m.dark_mean).sum::<f64>() / rows.len() as f64;
        let full_scale = 2f64.powi(data.bit_depth as i32) - 1.0;

        Ok(Self {
            points: rows.len(),
            bit_depth: data.bit_depth,
            width: data.width,
            height: data.height,
            pixel_area,
            exposure_min,
            exposure_max,
            photons_min,
            photons_max,
            photon_density_max: (pixel_area > 0.0)
                .then(|| photons_max / pixel_area)
                .filter(|v| v.is_finite()),
            dark_level,
            dark_noise: shortest.dark_temporal_variance.max(0.0).sqrt(),
            saturation_signal: rows[saturation].signal,
            saturation_photons: rows[saturation].photons,
            full_scale_fraction: (full_scale > 0.0)
                .then(|| signal_max / full_scale)
                .filter(|v| v.is_finite()),
        })
    }
}

fn value_range(rows: &[Measurement], value: impl Fn(&Measurement) -> f64) -> (f64, f64) {
    rows.iter()
        .map(value)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
}

impl fmt::Display for ResultsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "EMVA1288 measurement summary")?;
        writeln!(
            f,
            "  Sensor              : {}x{} px, {} bit, {:.2} um^2 pixel area",
            self.width, self.height, self.bit_depth, self.pixel_area
        )?;
        writeln!(f, "  Operating points    : {}", self.points)?;
        writeln!(
            f,
            "  Exposure range      : {:.0} .. {:.0} ns",
            self.exposure_min, self.exposure_max
        )?;
        write!(
            f,
            "  Photon range        : {:.3} .. {:.3} p/px",
            self.photons_min, self.photons_max
        )?;
        match self.photon_density_max {
            Some(density) => writeln!(f, " ({density:.3} p/um^2 max)")?,
            None => writeln!(f)?,
        }
        writeln!(f, "  Dark level          : {:.3} DN", self.dark_level)?;
        writeln!(f, "  Dark temporal noise : {:.3} DN", self.dark_noise)?;
        writeln!(
            f,
            "  Saturation          : {:.3} DN at {:.3} p/px",
            self.saturation_signal, self.saturation_photons
        )?;
        match self.full_scale_fraction {
            Some(fraction) => write!(f, "  Full scale reached  : {:.1} %", fraction * 100.0),
            None => write!(f, "  Full scale reached  : n/a"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{FrameStatistics, PointStatistics};
    use approx::assert_relative_eq;

    fn stats(mean: f64, temporal_variance: f64) -> FrameStatistics {
        FrameStatistics {
            frames: 5,
            mean,
            temporal_variance,
            spatial_variance: temporal_variance / 10.0,
        }
    }

    fn images() -> ImageData {
        let point = |exposure: f64, photons: f64, mean: f64, var: f64| PointStatistics {
            exposure,
            photons,
            bright: stats(mean, var),
            dark: stats(10.0, 4.0),
        };
        ImageData {
            bit_depth: 12,
            width: 640,
            height: 480,
            // deliberately out of photon order
            points: vec![
                point(3000.0, 300.0, 2010.0, 400.0),
                point(1000.0, 100.0, 710.0, 150.0),
                point(4000.0, 400.0, 4005.0, 20.0),
                point(2000.0, 200.0, 1410.0, 290.0),
            ],
        }
    }

    #[test]
    fn test_table_is_dark_corrected_and_sorted() {
        let data = DarkCorrectedProcessor.process(&images()).unwrap();

        let photons: Vec<f64> = data.measurements.iter().map(|m| m.photons).collect();
        assert_eq!(photons, vec![100.0, 200.0, 300.0, 400.0]);
        assert_relative_eq!(data.measurements[0].signal, 700.0);
        assert_relative_eq!(data.measurements[0].temporal_variance, 146.0);
        assert_relative_eq!(data.measurements[0].dark_mean, 10.0);
    }

    #[test]
    fn test_saturation_index_is_variance_peak() {
        let data = MeasurementData::from_images(&images());
        assert_eq!(data.saturation_index(), Some(2));
    }

    #[test]
    fn test_summary_figures() {
        let data = MeasurementData::from_images(&images());
        let summary = ResultsSummary::new(&data, 25.0).unwrap();

        assert_eq!(summary.points, 4);
        assert_relative_eq!(summary.exposure_min, 1000.0);
        assert_relative_eq!(summary.exposure_max, 4000.0);
        assert_relative_eq!(summary.photon_density_max.unwrap(), 16.0);
        assert_relative_eq!(summary.dark_level, 10.0);
        assert_relative_eq!(summary.dark_noise, 2.0);
        assert_relative_eq!(summary.saturation_signal, 2000.0);
        assert_relative_eq!(summary.saturation_photons, 300.0);
        assert_relative_eq!(summary.full_scale_fraction.unwrap(), 3995.0 / 4095.0);
    }

    #[test]
    fn test_summary_display_mentions_points() {
        let data = MeasurementData::from_images(&images());
        let text = ResultsSummary::new(&data, 25.0).unwrap().to_string();

        assert!(text.contains("Operating points    : 4"));
        assert!(text.contains("640x480 px, 12 bit"));
    }

    #[test]
    fn test_degenerate_geometry_survives_json() {
        let mut data = MeasurementData::from_images(&images());
        data.bit_depth = 0;
        let summary = ResultsSummary::new(&data, 0.0).unwrap();

        assert_eq!(summary.photon_density_max, None);
        assert_eq!(summary.full_scale_fraction, None);
        assert!(summary.to_string().contains("Full scale reached  : n/a"));

        let json = serde_json::to_string(&summary).unwrap();
        let back: ResultsSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.photon_density_max, None);
        assert_eq!(back.full_scale_fraction, None);
        assert_eq!(back.points, summary.points);
    }

    #[test]
    fn test_empty_table_is_an_error() {
        let empty = ImageData {
            bit_depth: 12,
            width: 1,
            height: 1,
            points: vec![],
        };
        assert!(DarkCorrectedProcessor.process(&empty).is_err());
        assert!(ResultsSummary::new(&MeasurementData::from_images(&empty), 25.0).is_err());
    }
}

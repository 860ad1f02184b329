//! Report assembly.
//!
//! A [`Report`] collects the setup, camera and marketing sections plus any
//! number of operation points, each bound to the measurement table it was
//! computed from. Rendering is behind [`ReportRenderer`]; the bundled
//! [`JsonReportRenderer`] writes the assembled report as `report.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{BenchConfig, MarketingInfo, ReportConfig};
use crate::error::{BenchError, BenchResult};
use crate::processing::{MeasurementData, ResultsSummary};

/// Camera settings shown with an operation point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    #[serde(rename = "Number of images")]
    pub images: u32,
    #[serde(rename = "Number of frames")]
    pub frames: u32,
    #[serde(rename = "Configuration version")]
    pub version: u32,
    #[serde(rename = "Image format")]
    pub image_format: String,
    #[serde(rename = "Radiance minimum")]
    pub radiance_min: Option<f64>,
    #[serde(rename = "Radiance maximum")]
    pub radiance_max: Option<f64>,
    #[serde(rename = "Exposure fixed")]
    pub exposure_fixed: Option<f64>,
}

/// A named camera configuration at which results are reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationPoint {
    pub name: String,
    pub id: u32,
    pub summary_only: bool,
    pub camera_settings: CameraSettings,
}

impl OperationPoint {
    /// The operation point described by `config`.
    pub fn from_config(config: &BenchConfig) -> Self {
        let sweep = &config.sweep;
        Self {
            name: config.operation_point.name.clone(),
            id: config.operation_point.id,
            summary_only: config.operation_point.summary_only,
            camera_settings: CameraSettings {
                images: sweep.steps,
                frames: sweep.frames,
                version: sweep.version,
                image_format: sweep.image_format.clone(),
                radiance_min: sweep.radiance_min,
                radiance_max: sweep.radiance_max,
                exposure_fixed: sweep.exposure_fixed,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupSection {
    #[serde(rename = "Light source")]
    pub light_source: String,
    #[serde(rename = "Light source non uniformity")]
    pub light_source_non_uniformity: String,
    #[serde(rename = "Standard version")]
    pub standard_version: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicSection {
    pub vendor: String,
    pub model: String,
    pub data_type: String,
    pub sensor_type: String,
    pub resolution: String,
    pub pixel_size: f64,
    pub bit_depth: u32,
    pub shutter_type: String,
    pub maximum_readout_rate: String,
    pub interface_type: String,
    pub qe_plot: Option<PathBuf>,
}

/// An operation point with the results computed for it. The full table is
/// dropped for summary-only points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedOperationPoint {
    pub operation_point: OperationPoint,
    pub summary: ResultsSummary,
    pub data: Option<MeasurementData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub outdir: PathBuf,
    pub marketing: MarketingInfo,
    pub setup: SetupSection,
    pub basic: BasicSection,
    pub operation_points: Vec<ReportedOperationPoint>,
}

impl Report {
    /// Start a report rendered into `outdir`.
    pub fn new(outdir: impl Into<PathBuf>, report: &ReportConfig, bit_depth: u32) -> Self {
        let setup = &report.setup;
        let basic = &report.basic;
        Self {
            outdir: outdir.into(),
            marketing: report.marketing.clone(),
            setup: SetupSection {
                light_source: setup.light_source.clone(),
                light_source_non_uniformity: setup.light_source_non_uniformity.clone(),
                standard_version: setup.standard_version,
            },
            basic: BasicSection {
                vendor: basic.vendor.clone(),
                model: basic.model.clone(),
                data_type: basic.data_type.clone(),
                sensor_type: basic.sensor_type.clone(),
                resolution: basic.resolution.clone(),
                pixel_size: basic.pixel_size,
                bit_depth,
                shutter_type: basic.shutter_type.clone(),
                maximum_readout_rate: basic.maximum_readout_rate.clone(),
                interface_type: basic.interface_type.clone(),
                qe_plot: basic.qe_plot.clone(),
            },
            operation_points: Vec::new(),
        }
    }

    /// Bind an operation point to the results computed for it.
    pub fn add(
        &mut self,
        operation_point: OperationPoint,
        data: &MeasurementData,
        summary: &ResultsSummary,
    ) {
        let data = (!operation_point.summary_only).then(|| data.clone());
        self.operation_points.push(ReportedOperationPoint {
            operation_point,
            summary: summary.clone(),
            data,
        });
    }
}

/// Turns an assembled report into documents.
pub trait ReportRenderer {
    /// Render `report`, returning the main document written.
    fn render(&self, report: &Report) -> BenchResult<PathBuf>;
}

/// Writes the assembled report as pretty JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReportRenderer;

impl JsonReportRenderer {
    pub const FILE_NAME: &'static str = "report.json";
}

impl ReportRenderer for JsonReportRenderer {
    fn render(&self, report: &Report) -> BenchResult<PathBuf> {
        std::fs::create_dir_all(&report.outdir).map_err(|e| BenchError::io(&report.outdir, e))?;
        let path = report.outdir.join(Self::FILE_NAME);
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json).map_err(|e| BenchError::io(&path, e))?;
        info!(
            "Rendered report with {} operation point(s) to {}",
            report.operation_points.len(),
            path.display()
        );
        Ok(path)
    }
}

/// Read a report previously written by [`JsonReportRenderer`].
pub fn load_report(path: &Path) -> BenchResult<Report> {
    let json = std::fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
    Ok(serde_json::from_str(&json)?)
}

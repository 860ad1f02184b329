//! Test-bench configuration.
//!
//! One [`BenchConfig`] describes a complete run: where the dataset lives, how
//! the exposure/radiance sweep is laid out, the simulated sensor, and the
//! metadata printed in the report. Values are forwarded to the collaborators
//! verbatim; nothing here is range checked.
//!
//! The defaults reproduce the reference 12-bit simulation run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};

/// File name of the descriptor inside the dataset directory.
pub const DESCRIPTOR_FILE_NAME: &str = "EMVA1288descriptor.txt";

/// Name of the report subdirectory inside the dataset directory.
pub const REPORT_DIR_NAME: &str = "Report";

/// Name of the plot subdirectory inside the dataset directory.
pub const PLOT_DIR_NAME: &str = "Plots";

/// Complete configuration of one bench run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BenchConfig {
    pub output: OutputConfig,
    pub sweep: SweepConfig,
    pub sensor: SensorParams,
    pub report: ReportConfig,
    pub operation_point: OperationPointConfig,
}

impl BenchConfig {
    /// Dataset directory `{dir}/{name}`, if both parts are configured.
    pub fn dataset_dir(&self) -> Option<PathBuf> {
        self.output.dataset_dir()
    }

    /// Descriptor used when processing a dataset that was not generated in
    /// this run.
    pub fn default_descriptor_path(&self) -> Option<PathBuf> {
        self.dataset_dir().map(|dir| dir.join(DESCRIPTOR_FILE_NAME))
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> BenchResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| BenchError::io(path, e))
    }

    /// Load from JSON file. Missing fields fall back to their defaults.
    pub fn load_from_file(path: &Path) -> BenchResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Output location and stage switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Parent directory of the dataset. When unset together with `name`, a
    /// scratch directory is used for generation and removed after the run.
    pub dir: Option<PathBuf>,
    /// Dataset directory name under `dir`.
    pub name: Option<String>,
    /// Synthesize a dataset before processing.
    pub generate: bool,
    /// Run the EMVA1288 processing and report stages.
    pub process: bool,
}

impl OutputConfig {
    pub fn dataset_dir(&self) -> Option<PathBuf> {
        match (&self.dir, &self.name) {
            (Some(dir), Some(name)) if !name.is_empty() => Some(dir.join(name)),
            _ => None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: Some(PathBuf::from("Results")),
            name: Some("EMVA1288_Simulation_12Bit".to_string()),
            generate: true,
            process: true,
        }
    }
}

/// Exposure / radiance sweep of the measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Number of operating points.
    pub steps: u32,
    /// Frames captured per operating point (L).
    pub frames: u32,
    /// Configuration revision written into the descriptor.
    pub version: u32,
    /// Image file format of the generated frames.
    pub image_format: String,
    /// Minimal radiance in W/cm²/sr. Chosen by the generator when unset.
    pub radiance_min: Option<f64>,
    /// Maximal radiance in W/cm²/sr. Chosen by the generator when unset.
    pub radiance_max: Option<f64>,
    /// Fixed exposure in ns. Unset means an exposure-variation sweep, set means
    /// an illumination-variation sweep at this exposure.
    pub exposure_fixed: Option<f64>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            steps: 40,
            frames: 5,
            version: 15,
            image_format: "tiff".to_string(),
            radiance_min: None,
            radiance_max: None,
            exposure_fixed: None,
        }
    }
}

/// Per-pixel parameter: one value for every pixel, or a map stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PixelMap {
    Uniform(f64),
    File(PathBuf),
}

/// Simulated sensor description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorParams {
    /// F-number of the light source / camera setup
    pub f_number: f64,
    /// Pixel area in µm²
    pub pixel_area: f64,
    pub bit_depth: u32,
    pub width: u32,
    pub height: u32,
    /// Temperature (°C) at which the dark current equals `dark_current_ref`
    pub temperature_ref: f64,
    /// Temperature increase (°C) that doubles the dark current
    pub temperature_doubling: f64,
    /// Illumination wavelength in nm
    pub wavelength: f64,
    /// Quantum efficiency in [0, 1]. Simulated when unset.
    pub qe: Option<f64>,
    /// Exposure time in ns
    pub exposure: f64,
    pub exposure_min: f64,
    pub exposure_max: f64,
    /// Overall system gain in DN/e⁻
    pub k: f64,
    pub k_min: f64,
    pub k_max: f64,
    pub k_steps: u32,
    /// Dark signal offset in DN
    pub blackoffset: f64,
    pub blackoffset_min: f64,
    pub blackoffset_max: Option<f64>,
    pub blackoffset_steps: u32,
    pub dark_current_ref: f64,
    /// Mean electrons generated by the electronics
    pub dark_signal_0: f64,
    /// Variance of electrons generated by the electronics
    pub sigma2_dark_0: f64,
    /// Full well capacity in e⁻
    pub u_esat: f64,
    pub radiance_factor: PixelMap,
    /// DSNU in DN
    pub dsnu: PixelMap,
    /// PRNU as a fraction (1.0 = 100 %)
    pub prnu: PixelMap,
}

impl Default for SensorParams {
    fn default() -> Self {
        Self {
            f_number: 8.0,
            pixel_area: 25.0,
            bit_depth: 12,
            width: 640,
            height: 480,
            temperature_ref: 25.0,
            temperature_doubling: 3.0,
            wavelength: 550.0,
            qe: None,
            exposure: 1_000_000.0,
            exposure_min: 100_000.0,
            exposure_max: 500_000_000.0,
            k: 0.21,
            k_min: 0.05,
            k_max: 17.0,
            k_steps: 255,
            blackoffset: 3.0,
            blackoffset_min: 0.0,
            blackoffset_max: None,
            blackoffset_steps: 255,
            dark_current_ref: 5.0,
            dark_signal_0: 20.0,
            sigma2_dark_0: 15.0,
            u_esat: 45_000.0,
            radiance_factor: PixelMap::Uniform(1.0),
            dsnu: PixelMap::Uniform(5.0),
            prnu: PixelMap::Uniform(0.8),
        }
    }
}

/// Report metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReportConfig {
    pub setup: SetupInfo,
    pub basic: BasicInfo,
    pub marketing: MarketingInfo,
}

/// Description of the measurement setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupInfo {
    /// EMVA1288 standard version the measurement follows
    pub standard_version: f64,
    /// Light source type
    pub light_source: String,
    /// Non uniformity introduced by the light source
    pub light_source_non_uniformity: String,
}

impl Default for SetupInfo {
    fn default() -> Self {
        Self {
            standard_version: 3.1,
            light_source: "Led".to_string(),
            light_source_non_uniformity: "0.5%".to_string(),
        }
    }
}

/// Camera identification block of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicInfo {
    pub vendor: String,
    pub model: String,
    pub data_type: String,
    pub sensor_type: String,
    pub resolution: String,
    /// Pixel pitch in µm
    pub pixel_size: f64,
    pub shutter_type: String,
    pub maximum_readout_rate: String,
    pub interface_type: String,
    /// Quantum efficiency plot image
    pub qe_plot: Option<PathBuf>,
}

impl Default for BasicInfo {
    fn default() -> Self {
        Self {
            vendor: "Electronic Engineering Department".to_string(),
            model: "CMOS Sensor".to_string(),
            data_type: "Single".to_string(),
            sensor_type: "Area".to_string(),
            resolution: "640x480".to_string(),
            pixel_size: 5.0,
            shutter_type: "Global".to_string(),
            maximum_readout_rate: "120fps".to_string(),
            interface_type: "GigE".to_string(),
            qe_plot: None,
        }
    }
}

/// Branding assets. All optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MarketingInfo {
    pub logo: Option<PathBuf>,
    /// Text printed transparently in the background of every page
    pub watermark: Option<String>,
    pub missing_plot: Option<PathBuf>,
    pub cover_page: Option<PathBuf>,
}

/// The single operation point reported for this run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationPointConfig {
    pub name: String,
    pub id: u32,
    pub summary_only: bool,
}

impl Default for OperationPointConfig {
    fn default() -> Self {
        Self {
            name: "Config case B".to_string(),
            id: 1,
            summary_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = BenchConfig::default();

        assert_eq!(config.sweep.steps, 40);
        assert_eq!(config.sweep.frames, 5);
        assert_eq!(config.sensor.bit_depth, 12);
        assert_eq!(config.sensor.width, 640);
        assert_eq!(config.sensor.height, 480);
        assert_relative_eq!(config.sensor.k, 0.21);
        assert_relative_eq!(config.sensor.u_esat, 45_000.0);
        assert_eq!(config.sensor.dsnu, PixelMap::Uniform(5.0));
        assert!(config.sensor.qe.is_none());
        assert_eq!(config.operation_point.name, "Config case B");
        assert!(config.output.generate);
        assert!(config.output.process);
    }

    #[test]
    fn test_dataset_dir_requires_both_parts() {
        let mut output = OutputConfig {
            dir: Some(PathBuf::from("/data")),
            name: Some("run".to_string()),
            ..Default::default()
        };
        assert_eq!(output.dataset_dir(), Some(PathBuf::from("/data/run")));

        output.name = None;
        assert_eq!(output.dataset_dir(), None);

        output.name = Some(String::new());
        assert_eq!(output.dataset_dir(), None);
    }

    #[test]
    fn test_default_descriptor_path() {
        let mut config = BenchConfig::default();
        config.output.dir = Some(PathBuf::from("/data"));
        config.output.name = Some("sim".to_string());

        assert_eq!(
            config.default_descriptor_path(),
            Some(PathBuf::from("/data/sim/EMVA1288descriptor.txt"))
        );
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.json");

        let mut config = BenchConfig::default();
        config.sweep.exposure_fixed = Some(2_000_000.0);
        config.sensor.prnu = PixelMap::File(PathBuf::from("prnu.tiff"));
        config.report.marketing.watermark = Some("DRAFT".to_string());

        config.save_to_file(&path).unwrap();
        let loaded = BenchConfig::load_from_file(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{"sweep": {"steps": 10}, "sensor": {"dsnu": 2.5}}"#).unwrap();

        let config = BenchConfig::load_from_file(&path).unwrap();

        assert_eq!(config.sweep.steps, 10);
        assert_eq!(config.sweep.frames, 5);
        assert_eq!(config.sensor.dsnu, PixelMap::Uniform(2.5));
        assert_eq!(config.report, ReportConfig::default());
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = BenchConfig::load_from_file(Path::new("/nonexistent/bench.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/bench.json"));
    }
}

//! Synthetic dataset generation.
//!
//! The bench never simulates the sensor itself. It packs the sweep and sensor
//! parameters into a [`GeneratorRequest`] and hands it to a
//! [`DatasetGenerator`], which writes frames plus a descriptor file into the
//! requested directory and reports where the descriptor ended up.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{BenchConfig, PixelMap};
use crate::error::{BenchError, BenchResult};

/// Every parameter the generator receives, forwarded verbatim from the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorRequest {
    pub steps: u32,
    #[serde(rename = "L")]
    pub frames: u32,
    pub version: u32,
    pub image_format: String,
    pub outdir: PathBuf,
    pub radiance_min: Option<f64>,
    pub radiance_max: Option<f64>,
    pub exposure_fixed: Option<f64>,
    pub f_number: f64,
    pub pixel_area: f64,
    pub bit_depth: u32,
    pub width: u32,
    pub height: u32,
    /// Reference temperature of the dark current model
    pub temperature: f64,
    pub temperature_doubling: f64,
    pub wavelength: f64,
    pub qe: Option<f64>,
    pub exposure: f64,
    pub exposure_min: f64,
    pub exposure_max: f64,
    #[serde(rename = "K")]
    pub k: f64,
    #[serde(rename = "K_min")]
    pub k_min: f64,
    #[serde(rename = "K_max")]
    pub k_max: f64,
    #[serde(rename = "K_steps")]
    pub k_steps: u32,
    pub blackoffset: f64,
    pub blackoffset_min: f64,
    pub blackoffset_max: Option<f64>,
    pub blackoffset_steps: u32,
    pub dark_current_ref: f64,
    pub dark_signal_0: f64,
    pub sigma2_dark_0: f64,
    pub u_esat: f64,
    pub radiance_factor: PixelMap,
    pub dsnu: PixelMap,
    pub prnu: PixelMap,
}

impl GeneratorRequest {
    /// Build the request for a dataset written to `outdir`.
    pub fn from_config(config: &BenchConfig, outdir: &Path) -> Self {
        let sweep = &config.sweep;
        let sensor = &config.sensor;
        Self {
            steps: sweep.steps,
            frames: sweep.frames,
            version: sweep.version,
            image_format: sweep.image_format.clone(),
            outdir: outdir.to_path_buf(),
            radiance_min: sweep.radiance_min,
            radiance_max: sweep.radiance_max,
            exposure_fixed: sweep.exposure_fixed,
            f_number: sensor.f_number,
            pixel_area: sensor.pixel_area,
            bit_depth: sensor.bit_depth,
            width: sensor.width,
            height: sensor.height,
            temperature: sensor.temperature_ref,
            temperature_doubling: sensor.temperature_doubling,
            wavelength: sensor.wavelength,
            qe: sensor.qe,
            exposure: sensor.exposure,
            exposure_min: sensor.exposure_min,
            exposure_max: sensor.exposure_max,
            k: sensor.k,
            k_min: sensor.k_min,
            k_max: sensor.k_max,
            k_steps: sensor.k_steps,
            blackoffset: sensor.blackoffset,
            blackoffset_min: sensor.blackoffset_min,
            blackoffset_max: sensor.blackoffset_max,
            blackoffset_steps: sensor.blackoffset_steps,
            dark_current_ref: sensor.dark_current_ref,
            dark_signal_0: sensor.dark_signal_0,
            sigma2_dark_0: sensor.sigma2_dark_0,
            u_esat: sensor.u_esat,
            radiance_factor: sensor.radiance_factor.clone(),
            dsnu: sensor.dsnu.clone(),
            prnu: sensor.prnu.clone(),
        }
    }
}

/// What a generator produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedDataset {
    pub descriptor_path: PathBuf,
}

/// Synthesizes sensor frames and the descriptor that enumerates them.
pub trait DatasetGenerator {
    fn generate(&self, request: &GeneratorRequest) -> BenchResult<GeneratedDataset>;
}

/// Generator backed by an external program.
///
/// The program receives the request as JSON on stdin and must print a
/// [`GeneratedDataset`] as JSON on stdout. A relative `descriptor_path` is
/// resolved against the request's `outdir`.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl DatasetGenerator for CommandGenerator {
    fn generate(&self, request: &GeneratorRequest) -> BenchResult<GeneratedDataset> {
        let payload = serde_json::to_vec(request)?;

        info!(
            "Running generator {} for {} steps x {} frames",
            self.program.display(),
            request.steps,
            request.frames
        );
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BenchError::io(&self.program, e))?;

        // A generator may exit without reading its stdin; its exit status
        // and stdout decide the outcome.
        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&payload) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!(
                        "{} closed stdin before reading the request",
                        self.program.display()
                    );
                }
                Err(e) => return Err(BenchError::io(&self.program, e)),
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| BenchError::io(&self.program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BenchError::Generator(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        let mut dataset: GeneratedDataset = serde_json::from_slice(&output.stdout)
            .map_err(|e| BenchError::Generator(format!("unreadable generator output: {e}")))?;
        if dataset.descriptor_path.is_relative() {
            dataset.descriptor_path = request.outdir.join(&dataset.descriptor_path);
        }
        debug!("Generator wrote {}", dataset.descriptor_path.display());

        Ok(dataset)
    }
}

/// Remove a previous dataset so regeneration starts from an empty directory.
///
/// A missing directory is not an error. Returns whether anything was removed.
pub fn reset_output_dir(path: &Path) -> BenchResult<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            info!("Removed previous dataset at {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(BenchError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_forwards_sensor_and_sweep() {
        let mut config = BenchConfig::default();
        config.sweep.radiance_max = Some(1.5e-4);
        config.sensor.blackoffset_max = Some(100.0);

        let request = GeneratorRequest::from_config(&config, Path::new("/out/sim"));

        assert_eq!(request.outdir, PathBuf::from("/out/sim"));
        assert_eq!(request.steps, 40);
        assert_eq!(request.frames, 5);
        assert_eq!(request.radiance_max, Some(1.5e-4));
        assert_eq!(request.blackoffset_max, Some(100.0));
        assert_eq!(request.temperature, config.sensor.temperature_ref);
        assert_eq!(request.prnu, PixelMap::Uniform(0.8));
    }

    #[test]
    fn test_request_json_uses_generator_keywords() {
        let request = GeneratorRequest::from_config(&BenchConfig::default(), Path::new("out"));
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["L"], 5);
        assert_eq!(json["K"], 0.21);
        assert_eq!(json["K_steps"], 255);
        assert_eq!(json["dsnu"], 5.0);
        assert!(json["qe"].is_null());
        assert!(json.get("frames").is_none());
    }

    #[test]
    fn test_reset_output_dir_removes_tree() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("dataset");
        std::fs::create_dir_all(target.join("nested")).unwrap();
        std::fs::write(target.join("nested/frame.tiff"), b"x").unwrap();

        assert!(reset_output_dir(&target).unwrap());
        assert!(!target.exists());
    }

    #[test]
    fn test_reset_output_dir_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!reset_output_dir(&dir.path().join("absent")).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_generator_reads_descriptor_path() {
        let dir = tempfile::tempdir().unwrap();
        let generator = CommandGenerator::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"cat > /dev/null; echo '{"descriptor_path": "EMVA1288descriptor.txt"}'"#
                    .to_string(),
            ],
        );
        let request = GeneratorRequest::from_config(&BenchConfig::default(), dir.path());

        let dataset = generator.generate(&request).unwrap();

        assert_eq!(
            dataset.descriptor_path,
            dir.path().join("EMVA1288descriptor.txt")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_command_generator_ignoring_stdin_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let generator = CommandGenerator::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"echo '{"descriptor_path": "x.txt"}'"#.to_string(),
            ],
        );
        let request = GeneratorRequest::from_config(&BenchConfig::default(), dir.path());

        // The child often exits before the request is written.
        for _ in 0..100 {
            let dataset = generator.generate(&request).unwrap();
            assert_eq!(dataset.descriptor_path, dir.path().join("x.txt"));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_command_generator_failure_carries_stderr() {
        let generator = CommandGenerator::new(
            "sh",
            vec![
                "-c".to_string(),
                "cat > /dev/null; echo boom >&2; exit 3".to_string(),
            ],
        );
        let request = GeneratorRequest::from_config(&BenchConfig::default(), Path::new("out"));

        let err = generator.generate(&request).unwrap_err();

        assert!(matches!(err, BenchError::Generator(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_command_generator_missing_program() {
        let generator = CommandGenerator::new("/nonexistent/generator", Vec::new());
        let request = GeneratorRequest::from_config(&BenchConfig::default(), Path::new("out"));

        assert!(matches!(
            generator.generate(&request),
            Err(BenchError::Io { .. })
        ));
    }
}

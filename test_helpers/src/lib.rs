//! Testing infrastructure for the EMVA1288 test bench.
//!
//! Writes small synthetic datasets (descriptor plus 16-bit frames) so the
//! loader and full bench runs can be exercised without an external generator.
//!
//! # Usage
//!
//! ```rust,no_run
//! use test_helpers::{write_synthetic_dataset, SyntheticSweep};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let descriptor = write_synthetic_dataset(dir.path(), &SyntheticSweep::default()).unwrap();
//! assert!(descriptor.exists());
//! ```

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use image::{ImageBuffer, Luma};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Error types for test infrastructure operations.
#[derive(thiserror::Error, Debug)]
pub enum TestHelperError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write frame {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid sweep: {0}")]
    InvalidSweep(String),
}

/// Layout of a synthetic exposure sweep.
///
/// Each operating point gets `frames` bright and `frames` dark frames. Bright
/// pixels are `dark_level + gain * photons` plus Gaussian noise whose variance
/// follows the photon transfer relation `read_noise² + gain² * photons`; dark
/// pixels are `dark_level` plus read noise. Values are clipped to the bit
/// depth.
#[derive(Debug, Clone)]
pub struct SyntheticSweep {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u32,
    pub frames: usize,
    /// Photons per pixel at each operating point
    pub photons: Vec<f64>,
    /// Exposure of the first point in ns; point `i` uses `(i + 1)` times this
    pub exposure_step: f64,
    /// System gain in DN/e⁻ (quantum efficiency folded in)
    pub gain: f64,
    /// Dark offset in DN
    pub dark_level: f64,
    /// Read noise in DN
    pub read_noise: f64,
    /// Frame file extension, which picks the encoder
    pub extension: &'static str,
    pub seed: u64,
}

impl Default for SyntheticSweep {
    fn default() -> Self {
        Self {
            width: 32,
            height: 24,
            bit_depth: 12,
            frames: 2,
            photons: vec![100.0, 400.0, 1600.0, 6400.0],
            exposure_step: 100_000.0,
            gain: 0.21,
            dark_level: 20.0,
            read_noise: 2.0,
            extension: "png",
            seed: 42,
        }
    }
}

impl SyntheticSweep {
    /// Exposure of operating point `index` in ns.
    pub fn exposure(&self, index: usize) -> f64 {
        self.exposure_step * (index + 1) as f64
    }

    /// Mean bright level in DN at operating point `index`.
    pub fn expected_bright_mean(&self, index: usize) -> f64 {
        self.dark_level + self.gain * self.photons[index]
    }

    fn full_scale(&self) -> f64 {
        2f64.powi(self.bit_depth as i32) - 1.0
    }
}

/// Write `sweep` into `dir` as frames plus `EMVA1288descriptor.txt`.
///
/// Returns the descriptor path.
pub fn write_synthetic_dataset(
    dir: &Path,
    sweep: &SyntheticSweep,
) -> Result<PathBuf, TestHelperError> {
    if sweep.frames < 2 {
        return Err(TestHelperError::InvalidSweep(
            "at least two frames per block are required".to_string(),
        ));
    }
    if sweep.bit_depth == 0 || sweep.bit_depth > 16 {
        return Err(TestHelperError::InvalidSweep(format!(
            "bit depth {} does not fit 16-bit frames",
            sweep.bit_depth
        )));
    }

    let images_dir = dir.join("images");
    std::fs::create_dir_all(&images_dir).map_err(|source| TestHelperError::Io {
        path: images_dir.clone(),
        source,
    })?;

    let mut rng = StdRng::seed_from_u64(sweep.seed);
    let mut descriptor = String::new();
    writeln!(descriptor, "v 3").ok();
    writeln!(
        descriptor,
        "n {} {} {}",
        sweep.bit_depth, sweep.width, sweep.height
    )
    .ok();

    for (index, &photons) in sweep.photons.iter().enumerate() {
        let exposure = sweep.exposure(index);

        writeln!(descriptor, "b {exposure} {photons}").ok();
        let bright_sigma =
            (sweep.read_noise.powi(2) + sweep.gain.powi(2) * photons).sqrt();
        for frame in 0..sweep.frames {
            let name = format!("bright_{index:03}_{frame}.{}", sweep.extension);
            write_frame(
                &images_dir.join(&name),
                sweep,
                sweep.expected_bright_mean(index),
                bright_sigma,
                &mut rng,
            )?;
            writeln!(descriptor, "i images/{name}").ok();
        }

        writeln!(descriptor, "d {exposure}").ok();
        for frame in 0..sweep.frames {
            let name = format!("dark_{index:03}_{frame}.{}", sweep.extension);
            write_frame(
                &images_dir.join(&name),
                sweep,
                sweep.dark_level,
                sweep.read_noise,
                &mut rng,
            )?;
            writeln!(descriptor, "i images/{name}").ok();
        }
    }

    let path = dir.join("EMVA1288descriptor.txt");
    std::fs::write(&path, descriptor).map_err(|source| TestHelperError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

fn write_frame(
    path: &Path,
    sweep: &SyntheticSweep,
    mean: f64,
    sigma: f64,
    rng: &mut StdRng,
) -> Result<(), TestHelperError> {
    let noise = Normal::new(0.0, sigma.max(0.0)).map_err(|e| {
        TestHelperError::InvalidSweep(format!("bad noise sigma {sigma}: {e}"))
    })?;
    let full_scale = sweep.full_scale();

    let frame: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_fn(sweep.width, sweep.height, |_, _| {
            let value = (mean + noise.sample(rng)).round().clamp(0.0, full_scale);
            Luma([value as u16])
        });

    frame.save(path).map_err(|source| TestHelperError::Image {
        path: path.to_path_buf(),
        source,
    })
}

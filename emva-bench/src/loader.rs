//! Frame loading.
//!
//! Frames are decoded one at a time and folded into per-block statistics, so
//! memory stays at two frames per block no matter how long the sweep is.

use std::path::Path;

use image::DynamicImage;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::descriptor::Descriptor;
use crate::error::{BenchError, BenchResult};

/// Statistics of the frames of one bright or dark block, in DN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameStatistics {
    pub frames: usize,
    /// Mean over all pixels of all frames
    pub mean: f64,
    /// Half the variance of the difference of the first two frames
    pub temporal_variance: f64,
    /// Variance over pixels of the frame-averaged image
    pub spatial_variance: f64,
}

/// Bright and matching dark statistics at one operating point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointStatistics {
    /// Exposure time in ns
    pub exposure: f64,
    /// Mean photons per pixel
    pub photons: f64,
    pub bright: FrameStatistics,
    pub dark: FrameStatistics,
}

/// Everything the processing stage needs from the frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub bit_depth: u32,
    pub width: u32,
    pub height: u32,
    pub points: Vec<PointStatistics>,
}

/// Reads the frames a descriptor references.
pub trait ImageLoader {
    fn load(&self, descriptor: &Descriptor) -> BenchResult<ImageData>;
}

/// Folds frames into [`FrameStatistics`] without keeping the whole stack.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    sum: Option<Array2<f64>>,
    first: Option<Array2<f64>>,
    temporal_variance: Option<f64>,
    count: usize,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Array2<f64>) {
        match self.count {
            0 => {
                self.sum = Some(frame.clone());
                self.first = Some(frame);
            }
            _ => {
                if let Some(first) = self.first.take() {
                    let diff = &first - &frame;
                    self.temporal_variance = Some(diff.var(0.0) / 2.0);
                }
                if let Some(sum) = self.sum.as_mut() {
                    *sum += &frame;
                }
            }
        }
        self.count += 1;
    }

    /// Finish the block. `exposure` only labels the error.
    pub fn finish(self, exposure: f64) -> BenchResult<FrameStatistics> {
        let (Some(sum), Some(temporal_variance)) = (self.sum, self.temporal_variance) else {
            return Err(BenchError::InsufficientFrames {
                exposure,
                frames: self.count,
            });
        };
        let averaged = sum / self.count as f64;
        Ok(FrameStatistics {
            frames: self.count,
            mean: averaged.mean().unwrap_or(0.0),
            temporal_variance,
            spatial_variance: averaged.var(0.0),
        })
    }
}

/// Loader that decodes frames from disk through the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileImageLoader;

impl FileImageLoader {
    fn block_statistics(
        &self,
        descriptor: &Descriptor,
        exposure: f64,
        images: &[std::path::PathBuf],
    ) -> BenchResult<FrameStatistics> {
        let mut accumulator = FrameAccumulator::new();
        for path in images {
            let frame = read_frame(path)?;
            let (rows, cols) = frame.dim();
            if cols as u32 != descriptor.width || rows as u32 != descriptor.height {
                return Err(BenchError::FrameSize {
                    path: path.clone(),
                    expected_width: descriptor.width,
                    expected_height: descriptor.height,
                    actual_width: cols as u32,
                    actual_height: rows as u32,
                });
            }
            accumulator.push(frame);
        }
        accumulator.finish(exposure)
    }
}

impl ImageLoader for FileImageLoader {
    fn load(&self, descriptor: &Descriptor) -> BenchResult<ImageData> {
        if descriptor.bright.is_empty() {
            return Err(BenchError::EmptyDataset(descriptor.path.clone()));
        }

        info!(
            "Loading {} frames from {}",
            descriptor.image_count(),
            descriptor.path.display()
        );

        // Dark blocks are shared by every bright block at the same exposure.
        let mut dark_cache: Vec<Option<FrameStatistics>> = vec![None; descriptor.dark.len()];
        let mut points = Vec::with_capacity(descriptor.bright.len());

        for bright in &descriptor.bright {
            let dark_index = descriptor
                .dark
                .iter()
                .position(|d| crate::descriptor::exposures_match(d.exposure, bright.exposure))
                .ok_or(BenchError::MissingDark {
                    exposure: bright.exposure,
                })?;

            let dark = match &dark_cache[dark_index] {
                Some(stats) => stats.clone(),
                None => {
                    let block = &descriptor.dark[dark_index];
                    let stats = self.block_statistics(descriptor, block.exposure, &block.images)?;
                    dark_cache[dark_index] = Some(stats.clone());
                    stats
                }
            };
            let bright_stats =
                self.block_statistics(descriptor, bright.exposure, &bright.images)?;

            debug!(
                "Point exposure={} photons={:.3}: bright mean {:.2} DN, dark mean {:.2} DN",
                bright.exposure, bright.photons, bright_stats.mean, dark.mean
            );
            points.push(PointStatistics {
                exposure: bright.exposure,
                photons: bright.photons,
                bright: bright_stats,
                dark,
            });
        }

        Ok(ImageData {
            bit_depth: descriptor.bit_depth,
            width: descriptor.width,
            height: descriptor.height,
            points,
        })
    }
}

/// Decode one frame into a (rows, cols) array of raw DN values.
pub fn read_frame(path: &Path) -> BenchResult<Array2<f64>> {
    let image = image::open(path).map_err(|source| BenchError::Image {
        path: path.to_path_buf(),
        source,
    })?;

    let frame = match image {
        DynamicImage::ImageLuma8(buf) => {
            let (w, h) = buf.dimensions();
            Array2::from_shape_fn((h as usize, w as usize), |(r, c)| {
                f64::from(buf.get_pixel(c as u32, r as u32)[0])
            })
        }
        DynamicImage::ImageLuma16(buf) => {
            let (w, h) = buf.dimensions();
            Array2::from_shape_fn((h as usize, w as usize), |(r, c)| {
                f64::from(buf.get_pixel(c as u32, r as u32)[0])
            })
        }
        other => {
            let buf = other.into_luma16();
            let (w, h) = buf.dimensions();
            Array2::from_shape_fn((h as usize, w as usize), |(r, c)| {
                f64::from(buf.get_pixel(c as u32, r as u32)[0])
            })
        }
    };
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{parse_descriptor, BrightBlock, DarkBlock};
    use approx::assert_relative_eq;
    use image::{ImageBuffer, Luma};
    use ndarray::array;

    fn write_u16(path: &Path, values: &Array2<f64>) {
        let (rows, cols) = values.dim();
        let img: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(cols as u32, rows as u32, |x, y| {
                Luma([values[[y as usize, x as usize]] as u16])
            });
        img.save(path).unwrap();
    }

    #[test]
    fn test_accumulator_statistics() {
        let mut acc = FrameAccumulator::new();
        acc.push(array![[10.0, 12.0], [14.0, 16.0]]);
        acc.push(array![[12.0, 12.0], [12.0, 16.0]]);

        let stats = acc.finish(1.0).unwrap();

        assert_eq!(stats.frames, 2);
        // averaged image [[11, 12], [13, 16]]
        assert_relative_eq!(stats.mean, 13.0, epsilon = 1e-12);
        assert_relative_eq!(stats.spatial_variance, 3.5, epsilon = 1e-12);
        // diff [[-2, 0], [2, 0]] has variance 2
        assert_relative_eq!(stats.temporal_variance, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_accumulator_temporal_variance_uses_first_pair() {
        let mut acc = FrameAccumulator::new();
        acc.push(array![[0.0, 0.0]]);
        acc.push(array![[0.0, 0.0]]);
        acc.push(array![[30.0, 90.0]]);

        let stats = acc.finish(1.0).unwrap();

        assert_eq!(stats.frames, 3);
        assert_relative_eq!(stats.temporal_variance, 0.0);
        assert_relative_eq!(stats.mean, 20.0, epsilon = 1e-12);
    }

    #[test]
    fn test_single_frame_is_insufficient() {
        let mut acc = FrameAccumulator::new();
        acc.push(array![[1.0]]);

        assert!(matches!(
            acc.finish(5.0),
            Err(BenchError::InsufficientFrames { frames: 1, .. })
        ));
    }

    #[test]
    fn test_read_frame_keeps_raw_dn() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let values = array![[0.0, 4095.0, 7.0], [1.0, 2.0, 3.0]];
        write_u16(&path, &values);

        let frame = read_frame(&path).unwrap();

        assert_eq!(frame, values);
    }

    #[test]
    fn test_read_frame_missing_file() {
        let err = read_frame(Path::new("/nonexistent/frame.png")).unwrap_err();
        assert!(matches!(err, BenchError::Image { .. }));
    }

    #[test]
    fn test_load_matches_dark_by_exposure() {
        let dir = tempfile::tempdir().unwrap();
        let bright = Array2::from_elem((2, 3), 100.0);
        let dark = Array2::from_elem((2, 3), 10.0);
        for name in ["b0.png", "b1.png"] {
            write_u16(&dir.path().join(name), &bright);
        }
        for name in ["d0.png", "d1.png"] {
            write_u16(&dir.path().join(name), &dark);
        }
        let text = "n 12 3 2\nb 500 2.0\ni b0.png\ni b1.png\nd 500\ni d0.png\ni d1.png\n";
        let descriptor = parse_descriptor(text, &dir.path().join("desc.txt")).unwrap();

        let data = FileImageLoader.load(&descriptor).unwrap();

        assert_eq!(data.points.len(), 1);
        assert_relative_eq!(data.points[0].bright.mean, 100.0);
        assert_relative_eq!(data.points[0].dark.mean, 10.0);
        assert_relative_eq!(data.points[0].photons, 2.0);
    }

    #[test]
    fn test_load_without_dark_fails() {
        let descriptor = Descriptor {
            path: "desc.txt".into(),
            format_version: None,
            bit_depth: 12,
            width: 2,
            height: 2,
            bright: vec![BrightBlock {
                exposure: 100.0,
                photons: 1.0,
                images: vec![],
            }],
            dark: vec![DarkBlock {
                exposure: 200.0,
                images: vec![],
            }],
        };

        assert!(matches!(
            FileImageLoader.load(&descriptor),
            Err(BenchError::MissingDark { .. })
        ));
    }

    #[test]
    fn test_load_rejects_wrong_frame_size() {
        let dir = tempfile::tempdir().unwrap();
        let frame = Array2::from_elem((2, 2), 5.0);
        for name in ["b0.png", "b1.png", "d0.png", "d1.png"] {
            write_u16(&dir.path().join(name), &frame);
        }
        let text = "n 12 4 4\nb 500 2.0\ni b0.png\ni b1.png\nd 500\ni d0.png\ni d1.png\n";
        let descriptor = parse_descriptor(text, &dir.path().join("desc.txt")).unwrap();

        assert!(matches!(
            FileImageLoader.load(&descriptor),
            Err(BenchError::FrameSize { actual_width: 2, .. })
        ));
    }

    #[test]
    fn test_load_empty_descriptor() {
        let descriptor = parse_descriptor("n 12 4 4\n", Path::new("desc.txt")).unwrap();
        assert!(matches!(
            FileImageLoader.load(&descriptor),
            Err(BenchError::EmptyDataset(_))
        ));
    }
}

//! EMVA1288 descriptor files.
//!
//! A descriptor enumerates the frames of a measurement:
//!
//! ```text
//! v 3
//! n 12 640 480
//! b 100000 3.2
//! i images/bright_000_0.tiff
//! i images/bright_000_1.tiff
//! d 100000
//! i images/dark_000_0.tiff
//! i images/dark_000_1.tiff
//! ```
//!
//! `b <exposure> <photons>` and `d <exposure>` open bright and dark blocks,
//! `i <path>` lines name the frames of the open block relative to the
//! descriptor. `#` starts a comment, except inside an image path.

use std::path::{Path, PathBuf};

use crate::error::{BenchError, BenchResult};

/// Frames recorded under illumination at one exposure.
#[derive(Debug, Clone, PartialEq)]
pub struct BrightBlock {
    /// Exposure time in ns
    pub exposure: f64,
    /// Mean photons per pixel
    pub photons: f64,
    pub images: Vec<PathBuf>,
}

/// Frames recorded without illumination at one exposure.
#[derive(Debug, Clone, PartialEq)]
pub struct DarkBlock {
    pub exposure: f64,
    pub images: Vec<PathBuf>,
}

/// Parsed contents of a descriptor file. Image paths are absolute, or relative
/// to the working directory when the descriptor path itself was relative.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub path: PathBuf,
    pub format_version: Option<String>,
    pub bit_depth: u32,
    pub width: u32,
    pub height: u32,
    pub bright: Vec<BrightBlock>,
    pub dark: Vec<DarkBlock>,
}

impl Descriptor {
    /// Dark block recorded at `exposure`, if any.
    pub fn dark_for(&self, exposure: f64) -> Option<&DarkBlock> {
        self.dark
            .iter()
            .find(|block| exposures_match(block.exposure, exposure))
    }

    /// Total number of frames referenced by the descriptor.
    pub fn image_count(&self) -> usize {
        self.bright.iter().map(|b| b.images.len()).sum::<usize>()
            + self.dark.iter().map(|d| d.images.len()).sum::<usize>()
    }
}

/// Exposure equality tolerant to the formatting of the descriptor writer.
pub fn exposures_match(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

/// Reads descriptor files.
pub trait DescriptorParser {
    fn parse(&self, path: &Path) -> BenchResult<Descriptor>;
}

/// Parser for the plain-text descriptor format.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDescriptorParser;

impl DescriptorParser for TextDescriptorParser {
    fn parse(&self, path: &Path) -> BenchResult<Descriptor> {
        let text = std::fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        parse_descriptor(&text, path)
    }
}

enum OpenBlock {
    None,
    Bright(usize),
    Dark(usize),
}

/// Parse descriptor text. `path` locates the images and labels errors.
pub fn parse_descriptor(text: &str, path: &Path) -> BenchResult<Descriptor> {
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let mut descriptor = Descriptor {
        path: path.to_path_buf(),
        format_version: None,
        bit_depth: 0,
        width: 0,
        height: 0,
        bright: Vec::new(),
        dark: Vec::new(),
    };
    let mut geometry_seen = false;
    let mut open = OpenBlock::None;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let err = |message: String| BenchError::Descriptor {
            path: path.to_path_buf(),
            line: line_no,
            message,
        };

        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (tag, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        // Image paths may contain '#'.
        let rest = match tag {
            "i" => rest.trim(),
            _ => rest.split('#').next().unwrap_or("").trim(),
        };
        let fields: Vec<&str> = rest.split_whitespace().collect();

        match tag {
            "v" => {
                if fields.is_empty() {
                    return Err(err("version line without a value".to_string()));
                }
                descriptor.format_version = Some(rest.to_string());
            }
            "n" => {
                let [bits, width, height] = fields[..] else {
                    return Err(err(format!(
                        "expected 'n <bits> <width> <height>', got '{line}'"
                    )));
                };
                descriptor.bit_depth = parse_field(bits, "bit depth").map_err(&err)?;
                descriptor.width = parse_field(width, "width").map_err(&err)?;
                descriptor.height = parse_field(height, "height").map_err(&err)?;
                geometry_seen = true;
            }
            "b" => {
                let [exposure, photons] = fields[..] else {
                    return Err(err(format!(
                        "expected 'b <exposure> <photons>', got '{line}'"
                    )));
                };
                descriptor.bright.push(BrightBlock {
                    exposure: parse_field(exposure, "exposure").map_err(&err)?,
                    photons: parse_field(photons, "photons").map_err(&err)?,
                    images: Vec::new(),
                });
                open = OpenBlock::Bright(descriptor.bright.len() - 1);
            }
            "d" => {
                let [exposure] = fields[..] else {
                    return Err(err(format!("expected 'd <exposure>', got '{line}'")));
                };
                let exposure: f64 = parse_field(exposure, "exposure").map_err(&err)?;
                // Repeated dark blocks at one exposure extend the first.
                let existing = descriptor
                    .dark
                    .iter()
                    .position(|block| exposures_match(block.exposure, exposure));
                let index = match existing {
                    Some(index) => index,
                    None => {
                        descriptor.dark.push(DarkBlock {
                            exposure,
                            images: Vec::new(),
                        });
                        descriptor.dark.len() - 1
                    }
                };
                open = OpenBlock::Dark(index);
            }
            "i" => {
                if rest.is_empty() {
                    return Err(err("image line without a path".to_string()));
                }
                let image = base.join(rest);
                match open {
                    OpenBlock::Bright(i) => descriptor.bright[i].images.push(image),
                    OpenBlock::Dark(i) => descriptor.dark[i].images.push(image),
                    OpenBlock::None => {
                        return Err(err("image listed before any 'b' or 'd' block".to_string()))
                    }
                }
            }
            other => return Err(err(format!("unknown line tag '{other}'"))),
        }
    }

    if !geometry_seen {
        return Err(BenchError::Descriptor {
            path: path.to_path_buf(),
            line: 0,
            message: "missing 'n <bits> <width> <height>' line".to_string(),
        });
    }

    Ok(descriptor)
}

fn parse_field<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid {what} '{value}'"))
}

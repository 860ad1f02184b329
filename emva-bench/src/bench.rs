//! The test-bench run.
//!
//! [`TestBench::run`] performs up to two stages, each switched by the config:
//!
//! 1. generation: clear `{dir}/{name}`, then ask the generator for a fresh
//!    dataset there (or in a scratch directory when no output is configured),
//! 2. processing: parse the descriptor, load frames, build the measurement
//!    table and its summary, plot, then render a report with one operation
//!    point bound to the table.
//!
//! The summary is returned in [`ProcessedRun`] for the caller to print.
//!
//! Every collaborator sits behind a trait so runs can be driven against mocks.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::config::{BenchConfig, PLOT_DIR_NAME, REPORT_DIR_NAME};
use crate::descriptor::{DescriptorParser, TextDescriptorParser};
use crate::error::{BenchError, BenchResult};
use crate::generator::{reset_output_dir, DatasetGenerator, GeneratedDataset, GeneratorRequest};
use crate::loader::{FileImageLoader, ImageLoader};
use crate::plotting::{PngPlotter, Plotter};
use crate::processing::{DarkCorrectedProcessor, DataProcessor, MeasurementData, ResultsSummary};
use crate::report::{JsonReportRenderer, OperationPoint, Report, ReportRenderer};

/// The services a run is wired to.
pub struct Collaborators {
    /// Required only when generation is enabled.
    pub generator: Option<Box<dyn DatasetGenerator>>,
    pub parser: Box<dyn DescriptorParser>,
    pub loader: Box<dyn ImageLoader>,
    pub processor: Box<dyn DataProcessor>,
    pub plotter: Box<dyn Plotter>,
    pub renderer: Box<dyn ReportRenderer>,
}

impl Collaborators {
    /// Bundled implementations, with an optional generator.
    pub fn standard(generator: Option<Box<dyn DatasetGenerator>>) -> Self {
        Self {
            generator,
            parser: Box::new(TextDescriptorParser),
            loader: Box::new(FileImageLoader),
            processor: Box::new(DarkCorrectedProcessor),
            plotter: Box::new(PngPlotter::default()),
            renderer: Box::new(JsonReportRenderer),
        }
    }
}

/// Outputs of the processing stage.
#[derive(Debug, Clone)]
pub struct ProcessedRun {
    pub descriptor_path: PathBuf,
    pub data: MeasurementData,
    pub summary: ResultsSummary,
    pub plots: Vec<PathBuf>,
    pub report: Report,
    pub report_path: PathBuf,
}

/// What a run did.
///
/// A dataset generated into a scratch directory lives as long as this value.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub generated: Option<GeneratedDataset>,
    pub processed: Option<ProcessedRun>,
    scratch: Option<TempDir>,
}

impl RunOutcome {
    /// Scratch directory holding a dataset generated without an output
    /// directory.
    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(|dir| dir.path())
    }
}

pub struct TestBench {
    config: BenchConfig,
    collaborators: Collaborators,
}

impl TestBench {
    pub fn new(config: BenchConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn run(&self) -> BenchResult<RunOutcome> {
        let mut outcome = RunOutcome::default();

        if self.config.output.generate {
            let (dataset, scratch) = self.generate()?;
            outcome.generated = Some(dataset);
            outcome.scratch = scratch;
        }

        if self.config.output.process {
            let descriptor_path = self.descriptor_path(outcome.generated.as_ref())?;
            let root = self
                .config
                .dataset_dir()
                .or_else(|| outcome.scratch_dir().map(Path::to_path_buf))
                .or_else(|| descriptor_path.parent().map(Path::to_path_buf))
                .ok_or(BenchError::MissingOutputDir)?;
            outcome.processed = Some(self.process(descriptor_path, &root)?);
        }

        Ok(outcome)
    }

    /// Descriptor to process: the one just generated, else the fixed file in
    /// the dataset directory.
    pub fn descriptor_path(&self, generated: Option<&GeneratedDataset>) -> BenchResult<PathBuf> {
        match generated {
            Some(dataset) => Ok(dataset.descriptor_path.clone()),
            None => self
                .config
                .default_descriptor_path()
                .ok_or(BenchError::MissingOutputDir),
        }
    }

    fn generate(&self) -> BenchResult<(GeneratedDataset, Option<TempDir>)> {
        let generator = self.collaborators.generator.as_deref().ok_or_else(|| {
            BenchError::Generator("generation enabled but no generator configured".to_string())
        })?;

        let (outdir, scratch) = match self.config.dataset_dir() {
            Some(dir) => {
                reset_output_dir(&dir)?;
                (dir, None)
            }
            None => {
                let scratch = tempfile::Builder::new()
                    .prefix("emva1288-")
                    .tempdir()
                    .map_err(|e| BenchError::io(std::env::temp_dir(), e))?;
                debug!("No output directory configured, using {}", scratch.path().display());
                (scratch.path().to_path_buf(), Some(scratch))
            }
        };
        std::fs::create_dir_all(&outdir).map_err(|e| BenchError::io(&outdir, e))?;

        let request = GeneratorRequest::from_config(&self.config, &outdir);
        info!(
            "Generating {} operating points x {} frames into {}",
            request.steps,
            request.frames,
            outdir.display()
        );
        let dataset = generator.generate(&request)?;

        Ok((dataset, scratch))
    }

    fn process(&self, descriptor_path: PathBuf, root: &Path) -> BenchResult<ProcessedRun> {
        let c = &self.collaborators;

        info!("Processing {}", descriptor_path.display());
        let descriptor = c.parser.parse(&descriptor_path)?;
        let images = c.loader.load(&descriptor)?;
        let data = c.processor.process(&images)?;

        let summary = ResultsSummary::new(&data, self.config.sensor.pixel_area)?;
        debug!("\n{summary}");

        let plots = c.plotter.plot(&data, &root.join(PLOT_DIR_NAME))?;

        let mut report = Report::new(
            root.join(REPORT_DIR_NAME),
            &self.config.report,
            self.config.sensor.bit_depth,
        );
        report.add(OperationPoint::from_config(&self.config), &data, &summary);
        let report_path = c.renderer.render(&report)?;

        Ok(ProcessedRun {
            descriptor_path,
            data,
            summary,
            plots,
            report,
            report_path,
        })
    }
}

//! EMVA1288 test-bench runner.
//!
//! Generates a synthetic dataset through an external generator program and/or
//! processes an existing one into plots and a report.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use emva_bench::generator::{CommandGenerator, DatasetGenerator};
use emva_bench::{BenchConfig, Collaborators, TestBench};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "EMVA1288 sensor test bench", long_about = None)]
struct Args {
    #[arg(short, long, help = "JSON configuration file (defaults when omitted)")]
    config: Option<PathBuf>,

    #[arg(long, help = "Write the default configuration to this file and exit")]
    write_default_config: Option<PathBuf>,

    #[arg(long, help = "Override the output directory")]
    dir: Option<PathBuf>,

    #[arg(long, help = "Override the dataset name")]
    name: Option<String>,

    #[arg(long, help = "Skip dataset generation")]
    no_generate: bool,

    #[arg(long, help = "Skip processing and report generation")]
    no_process: bool,

    #[arg(short, long, help = "Dataset generator program")]
    generator: Option<PathBuf>,

    #[arg(
        long = "generator-arg",
        help = "Argument passed to the generator program (repeatable)",
        allow_hyphen_values = true
    )]
    generator_args: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if let Some(path) = &args.write_default_config {
        BenchConfig::default()
            .save_to_file(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => BenchConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => BenchConfig::default(),
    };
    if let Some(dir) = args.dir {
        config.output.dir = Some(dir);
    }
    if let Some(name) = args.name {
        config.output.name = Some(name);
    }
    if args.no_generate {
        config.output.generate = false;
    }
    if args.no_process {
        config.output.process = false;
    }

    if config.output.generate && args.generator.is_none() {
        anyhow::bail!("Generation is enabled: pass --generator <program> or --no-generate");
    }

    let generator = args.generator.map(|program| {
        Box::new(CommandGenerator::new(program, args.generator_args)) as Box<dyn DatasetGenerator>
    });

    let bench = TestBench::new(config, Collaborators::standard(generator));
    let outcome = bench.run().context("Test bench run failed")?;

    if let Some(dataset) = &outcome.generated {
        println!("Dataset descriptor: {}", dataset.descriptor_path.display());
    }
    if let Some(processed) = &outcome.processed {
        println!("{}", processed.summary);
        for plot in &processed.plots {
            println!("Plot: {}", plot.display());
        }
        println!("Report: {}", processed.report_path.display());
    }

    Ok(())
}

//! bg-refine command-line tool
//!
//! Removes the background of one image using a pre-computed mask (or the
//! image's own alpha) and writes the transparent result. `--sweep` renders
//! every refinement value through one session.

use super::config::CliConfigBuilder;
use crate::{
    backends::{MaskImageSegmenter, SourceAlphaSegmenter},
    config::OutputFormat,
    processor::RefinementSession,
    segmenter::Segmenter,
    services::{ImageOutputEncoder, ProcessingStage, ProgressReporter, ProgressUpdate},
    tracing_config::{init_cli_tracing, spans},
    types::{CompositeResult, ProcessingTimings, RefinementParameter},
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Interactive-quality background removal from the command line
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bg-refine")]
pub struct Cli {
    /// Input image file
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Grayscale mask image (white = foreground); defaults to the input's alpha channel
    #[arg(short, long, value_name = "MASK")]
    pub mask: Option<PathBuf>,

    /// Edge refinement from -10 (softest) to 10 (sharpest); values outside are clamped
    #[arg(short, long, allow_negative_numbers = true)]
    pub refine: Option<i32>,

    /// Pull edge pixels toward the foreground colour
    #[arg(long)]
    pub defringe: bool,

    /// Output format [default: from the output extension, else png]
    #[arg(short, long, value_enum)]
    pub format: Option<CliOutputFormat>,

    /// Output file, or output directory with --sweep
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Render every refinement value from -10 to 10
    #[arg(long)]
    pub sweep: bool,

    /// JSON session configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON (requires the tracing-json feature)
    #[arg(long)]
    pub json_logs: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Tiff,
    Webp,
    Rgba8,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => OutputFormat::Png,
            CliOutputFormat::Tiff => OutputFormat::Tiff,
            CliOutputFormat::Webp => OutputFormat::WebP,
            CliOutputFormat::Rgba8 => OutputFormat::Rgba8,
        }
    }
}

/// Drives an `indicatif` bar from session progress
struct IndicatifProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter for IndicatifProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.bar.set_position(u64::from(update.progress));
        self.bar.set_message(update.description);
    }

    fn report_completion(&self, timings: ProcessingTimings) {
        tracing::debug!(timings = %timings.summary(), "Render completed");
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar
            .abandon_with_message(format!("❌ {} failed: {}", stage.description(), error));
    }
}

fn stage_bar() -> Result<ProgressBar> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );
    Ok(bar)
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose, cli.json_logs).context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    let segmenter: Arc<dyn Segmenter> = match &cli.mask {
        Some(mask) => Arc::new(
            MaskImageSegmenter::from_file(mask)
                .with_context(|| format!("Failed to load mask {}", mask.display()))?,
        ),
        None => Arc::new(SourceAlphaSegmenter),
    };

    let span = spans::file_processing(&cli.input, segmenter.name());
    run(&cli, config, segmenter).instrument(span).await
}

async fn run(cli: &Cli, config: crate::SessionConfig, segmenter: Arc<dyn Segmenter>) -> Result<()> {
    let format = CliConfigBuilder::output_format(cli, &config);
    let bar = stage_bar()?;
    let session = RefinementSession::builder(segmenter)
        .config(config)
        .progress_reporter(Arc::new(IndicatifProgressReporter { bar: bar.clone() }))
        .build()
        .context("Failed to create refinement session")?;

    info!("Processing {}", cli.input.display());
    let result = session
        .process_file(&cli.input)
        .await
        .with_context(|| format!("Failed to process {}", cli.input.display()))?
        .ok_or_else(|| anyhow!("Processing was superseded"))?;

    if cli.sweep {
        bar.finish_and_clear();
        return sweep(cli, &session, format).await;
    }

    let output = CliConfigBuilder::output_path(cli, format, None);
    save(&result, &output, format)?;
    bar.finish_with_message(format!("Saved {}", output.display()));
    log_result(&result);
    Ok(())
}

async fn sweep(cli: &Cli, session: &RefinementSession, format: OutputFormat) -> Result<()> {
    let parameters: Vec<RefinementParameter> = RefinementParameter::all().collect();
    let bar = ProgressBar::new(parameters.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );

    let sweep_start = Instant::now();
    async {
        for parameter in parameters {
            bar.set_message(format!("refine {}", parameter));
            let result = session
                .reprocess(parameter)
                .await
                .with_context(|| format!("Failed to render refine {}", parameter))?
                .ok_or_else(|| anyhow!("Render {} was superseded", parameter))?;

            let output = CliConfigBuilder::output_path(cli, format, Some(parameter));
            save(&result, &output, format)?;
            tracing::debug!(
                parameter = %parameter,
                band = result.alpha_channel().statistics().transition_pixels,
                output = %output.display(),
                "Sweep render saved"
            );
            bar.inc(1);
        }
        Ok::<_, anyhow::Error>(())
    }
    .instrument(spans::sweep(bar.length().unwrap_or_default() as usize))
    .await?;

    let elapsed = sweep_start.elapsed();
    bar.finish_with_message(format!("Rendered {} refinements", bar.position()));
    info!(
        "✅ {} renders in {:.2}s from a single segmentation ({:.1}ms per render)",
        bar.position(),
        elapsed.as_secs_f64(),
        elapsed.as_secs_f64() * 1000.0 / bar.position().max(1) as f64
    );
    Ok(())
}

fn save(result: &CompositeResult, output: &Path, format: OutputFormat) -> Result<()> {
    ImageOutputEncoder
        .save(result, output, format)
        .with_context(|| format!("Failed to write {}", output.display()))
}

fn log_result(result: &CompositeResult) {
    let stats = result.alpha_channel().statistics();
    info!(
        "✅ {}x{} refine {}: {:.1}% foreground, {} edge pixels",
        result.dimensions().0,
        result.dimensions().1,
        result.parameter(),
        stats.foreground_ratio * 100.0,
        stats.transition_pixels
    );
    info!("⏱️  {}", result.timing_summary());
    tracing::debug!(
        interactive_ratio = result.metadata.timings.interactive_ratio(),
        "Share of the run spent refining and compositing"
    );
    if stats.foreground_pixels == 0 && stats.transition_pixels == 0 {
        warn!("The mask selected no foreground; the output is fully transparent");
    }
}

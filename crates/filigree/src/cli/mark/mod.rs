//! The `filigree mark` command for watermarking a directory.

mod summary;
pub mod types;

pub use types::{ReportFormat, TopologyArg};

use clap::Args;
use filigree_core::{CancelToken, Config, Filigree, ProgressFn};
use std::path::PathBuf;
use std::sync::Arc;

use summary::{create_progress_bar, print_summary};

/// Arguments for the `mark` command.
#[derive(Args, Debug)]
pub struct MarkArgs {
    /// Directory containing the images to watermark
    #[arg(short, long)]
    pub source: PathBuf,

    /// Watermark image
    #[arg(short, long)]
    pub watermark: PathBuf,

    /// Watermark intensity in percent; values outside 0-100 fall back to 30
    #[arg(short, long, allow_negative_numbers = true)]
    pub intensity: Option<i64>,

    /// Chunks per image (defaults to the worker count)
    #[arg(short, long)]
    pub chunks: Option<usize>,

    /// Worker threads per stage
    #[arg(short = 'n', long)]
    pub workers: Option<usize>,

    /// Worker topology
    #[arg(short = 'p', long, value_enum)]
    pub topology: Option<TopologyArg>,

    /// Output subdirectory, created inside the source directory
    #[arg(short, long)]
    pub output: Option<String>,

    /// Watermark RGB sum at which a pixel counts as background (0 disables)
    #[arg(long)]
    pub background_threshold: Option<u16>,

    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    pub format: ReportFormat,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut Config, args: &MarkArgs) {
    if let Some(topology) = args.topology {
        config.processing.topology = topology.into();
    }
    if let Some(workers) = args.workers {
        config.processing.workers = workers;
    }
    if let Some(chunks) = args.chunks {
        config.processing.chunks = Some(chunks);
    }
    if let Some(intensity) = args.intensity {
        config.processing.intensity = intensity;
    }
    if let Some(threshold) = args.background_threshold {
        config.processing.background_threshold = threshold;
    }
    if let Some(output) = &args.output {
        config.output.subdir = output.clone();
    }
}

/// Execute the mark command.
pub async fn execute(args: MarkArgs) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    apply_overrides(&mut config, &args);
    let filigree = Filigree::new(config)?;

    let watermark = filigree.load_watermark(&args.watermark)?;
    let plan = filigree.plan(&args.source)?;
    if plan.is_empty() {
        tracing::warn!("No supported image files found in {:?}", args.source);
        return Ok(());
    }
    let total_bytes = plan.total_bytes;

    let progress = (!args.no_progress).then(|| create_progress_bar(plan.len() as u64));
    let on_progress: Option<ProgressFn> = progress.clone().map(|pb| {
        let start = std::time::Instant::now();
        Arc::new(move |settled: usize| {
            pb.set_position(settled as u64);
            let elapsed = start.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                pb.set_message(format!("{:.1} img/sec", settled as f64 / elapsed));
            }
        }) as ProgressFn
    });

    let cancel = CancelToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; finishing images already in flight");
                cancel.cancel();
            }
        })
    };

    let engine = filigree.clone();
    let report =
        tokio::task::spawn_blocking(move || engine.execute(plan, watermark, cancel, on_progress))
            .await?;
    interrupt.abort();

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    match args.format {
        ReportFormat::Text => print_summary(&report, total_bytes),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if report.cancelled {
        anyhow::bail!(
            "Run interrupted: {} of {} image(s) saved",
            report.processed,
            report.discovered
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use filigree_core::Topology;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: MarkArgs,
    }

    fn parse(extra: &[&str]) -> MarkArgs {
        let mut argv = vec!["filigree", "-s", "photos", "-w", "logo.png"];
        argv.extend_from_slice(extra);
        TestCli::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn test_defaults_leave_config_untouched() {
        let args = parse(&[]);
        assert_eq!(args.format, ReportFormat::Text);
        assert!(args.topology.is_none());

        let mut config = Config::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.processing.workers, 4);
        assert_eq!(config.processing.chunks, None);
        assert_eq!(config.processing.intensity, 30);
        assert_eq!(config.processing.topology, Topology::PipeOfFarms);
    }

    #[test]
    fn test_short_flags_override_config() {
        let args = parse(&[
            "-i", "45", "-c", "16", "-n", "3", "-p", "farm-of-pipes", "-o", "out", "--format",
            "json",
        ]);
        let mut config = Config::default();
        apply_overrides(&mut config, &args);

        assert_eq!(config.processing.intensity, 45);
        assert_eq!(config.processing.chunks, Some(16));
        assert_eq!(config.processing.workers, 3);
        assert_eq!(config.processing.topology, Topology::FarmOfPipes);
        assert_eq!(config.output.subdir, "out");
        assert_eq!(args.format, ReportFormat::Json);
    }

    #[test]
    fn test_negative_intensity_parses_and_config_still_validates() {
        let args = parse(&["-i", "-5"]);
        let mut config = Config::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.processing.intensity, -5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let args = parse(&["-n", "0"]);
        let mut config = Config::default();
        apply_overrides(&mut config, &args);
        assert!(Filigree::new(config).is_err());
    }

    #[test]
    fn test_source_and_watermark_are_required() {
        assert!(TestCli::try_parse_from(["filigree", "-s", "photos"]).is_err());
    }
}

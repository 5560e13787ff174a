//! Progress bar and run summary.

use filigree_core::{RunReport, StageStats};

pub fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb.set_message("starting...");
    pb
}

fn stage_line(name: &str, stats: &StageStats) -> String {
    format!(
        "    {:<8} {:>8}  mean {:>8.2}ms  max {:>8.2}ms",
        name,
        stats.count,
        stats.mean_us() as f64 / 1000.0,
        stats.max_us as f64 / 1000.0
    )
}

/// Print a formatted summary table after a run.
pub fn print_summary(report: &RunReport, total_bytes: u64) {
    let seconds = report.elapsed_ms as f64 / 1000.0;
    let throughput = if seconds > 0.0 {
        total_bytes as f64 / 1_000_000.0 / seconds
    } else {
        0.0
    };

    eprintln!();
    eprintln!("  ==================================================");
    eprintln!("                     Summary");
    eprintln!("  ==================================================");
    eprintln!("    Topology:     {:>12}", report.topology.as_str());
    eprintln!("    Workers:      {:>12}", report.workers);
    eprintln!("    Chunks:       {:>12}", report.chunks);
    eprintln!("  --------------------------------------------------");
    eprintln!("    Marked:       {:>12}", report.processed);
    if report.decode_failures > 0 {
        eprintln!("    Unreadable:   {:>12}", report.decode_failures);
    }
    if report.encode_failures > 0 {
        eprintln!("    Not saved:    {:>12}", report.encode_failures);
    }
    if report.incomplete > 0 {
        eprintln!("    Incomplete:   {:>12}", report.incomplete);
    }
    eprintln!("    Total:        {:>12}", report.discovered);
    eprintln!("    Duration:     {:>11.2}s", seconds);
    eprintln!("    Rate:         {:>7.1} img/sec", report.images_per_second());
    eprintln!("    Throughput:   {:>8.1} MB/sec", throughput);
    eprintln!("  --------------------------------------------------");
    eprintln!("{}", stage_line("load", &report.stages.load));
    eprintln!("{}", stage_line("mark", &report.stages.mark));
    eprintln!("{}", stage_line("save", &report.stages.save));
    if report.cancelled {
        eprintln!("    (cancelled before the batch finished)");
    }
    eprintln!("  ==================================================");
}

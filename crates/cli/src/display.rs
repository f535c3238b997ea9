//! Terminal progress and run summary.

use std::time::Duration;

use chessgraph_core::{ExploreProgress, ExploreStats};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use num_format::{Locale, ToFormattedString};

const TICK_INTERVAL: Duration = Duration::from_millis(120);

/// Creates the exploration spinner. Hidden when `quiet` is set.
pub fn create_spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {elapsed:>4} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("exploring");
    spinner.enable_steady_tick(TICK_INTERVAL);
    spinner
}

pub fn update_spinner(spinner: &ProgressBar, progress: ExploreProgress) {
    spinner.set_message(format!(
        "{} nodes, {} edges, {} oracle queries",
        progress.nodes.to_formatted_string(&Locale::en),
        progress.edges.to_formatted_string(&Locale::en),
        progress.oracle_calls.to_formatted_string(&Locale::en),
    ));
}

/// Prints the statistics of a finished run to stderr.
pub fn print_summary(stats: &ExploreStats, oracle: &str, cache_entries: usize) {
    eprintln!(
        "{} {} nodes, {} edges in {:.1}s",
        "Explored".green().bold(),
        stats.nodes.to_formatted_string(&Locale::en).bold(),
        stats.edges.to_formatted_string(&Locale::en).bold(),
        stats.elapsed.as_secs_f64(),
    );
    eprintln!(
        "{} {}: {} queries, {} cache hits, {} cached positions",
        "Oracle".cyan().bold(),
        oracle,
        stats.oracle_calls.to_formatted_string(&Locale::en),
        stats.cache_hits.to_formatted_string(&Locale::en),
        cache_entries.to_formatted_string(&Locale::en),
    );
    if stats.duplicate_claims > 0 {
        eprintln!(
            "{} {} transpositions merged",
            "Graph".cyan().bold(),
            stats.duplicate_claims.to_formatted_string(&Locale::en),
        );
    }
    if stats.failed_tasks > 0 {
        eprintln!(
            "{} {} branches failed and are missing from the graph",
            "Warning".yellow().bold(),
            stats.failed_tasks
        );
    }
}

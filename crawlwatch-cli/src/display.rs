//! Terminal rendering of job state

use colored::*;
use crawlwatch_core::domain::job::{JobStatus, Progress};
use crawlwatch_core::domain::sync::SyncState;

/// Colorize job status for display
pub fn colorize_status(status: JobStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        JobStatus::Pending => status_str.yellow(),
        JobStatus::Running | JobStatus::Started => status_str.cyan(),
        JobStatus::Completed => status_str.green(),
        JobStatus::Failed => status_str.red(),
        JobStatus::Cancelled => status_str.dimmed(),
    }
}

/// Render progress as `done/total (pct%)`, or `done/?` when unknown
pub fn format_progress(completed: u64, total: u64) -> String {
    let progress = Progress::new(completed, total);
    match progress.fraction() {
        Some(fraction) => format!("{} ({:.0}%)", progress, fraction * 100.0),
        None => progress.to_string(),
    }
}

/// Print one snapshot line
pub fn print_snapshot(snapshot: &SyncState) {
    let marker = if snapshot.is_terminal() {
        "■".bold()
    } else {
        "▸".cyan()
    };

    println!(
        "{} {} {} {} {}",
        marker,
        snapshot
            .updated_at
            .format("%H:%M:%S")
            .to_string()
            .dimmed(),
        colorize_status(snapshot.status),
        format_progress(snapshot.progress.completed, snapshot.progress.total),
        format!("via {}", snapshot.transport).dimmed()
    );

    if let Some(error) = &snapshot.job_error {
        println!("  {}", error.red());
    }
    if let Some(error) = &snapshot.last_error {
        println!("  {} {}", "sync error:".red().bold(), error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_progress() {
        assert_eq!(format_progress(3, 10), "3/10 (30%)");
        assert_eq!(format_progress(3, 0), "3/?");
    }
}

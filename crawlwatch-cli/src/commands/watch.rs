//! Follow a job through the synchronization controller

use anyhow::{Result, bail};
use colored::*;
use crawlwatch_core::domain::job::{JobId, JobKind, JobStatus};
use crawlwatch_core::domain::sync::SyncState;
use crawlwatch_sync::SyncController;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::Config;
use crate::display::print_snapshot;

/// Track a job and print every snapshot until it is terminal
///
/// Fails when the job could not be observed or ended failed or cancelled,
/// so scripts can rely on the exit code.
pub async fn watch_job(config: &Config, kind: JobKind, id: JobId, json: bool) -> Result<()> {
    let controller = SyncController::with_client(config.client()?, config.sync.clone());
    info!(
        "Watching {} job {} (poll fallback every {:?})",
        kind,
        id,
        controller.config().poll_interval
    );

    let (tx, mut snapshots) = mpsc::unbounded_channel::<SyncState>();
    let handle = controller.track(id.clone(), kind, move |snapshot| {
        let _ = tx.send(snapshot);
    });

    let last = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                handle.unsubscribe();
                info!("Stopped watching job {}", handle.job_id());
                if !json {
                    println!("{}", "Stopped watching.".yellow());
                }
                return Ok(());
            }
            snapshot = snapshots.recv() => {
                let Some(snapshot) = snapshot else {
                    bail!("Tracking of job {} ended without a final snapshot", id);
                };
                if json {
                    println!("{}", serde_json::to_string(&snapshot)?);
                } else {
                    print_snapshot(&snapshot);
                }
                if snapshot.is_terminal() {
                    break snapshot;
                }
            }
        }
    };

    if let Some(error) = &last.last_error {
        bail!("Lost track of job {}: {}", id, error);
    }

    match last.status {
        JobStatus::Completed => Ok(()),
        status => bail!("Job {} ended {}", id, status),
    }
}

//! State reconciliation
//!
//! One update policy for every transport: stream frames and poll results go
//! through [`reconcile`] alike, so arrival order between the two does not
//! matter once a job is terminal.

use crawlwatch_core::domain::sync::SyncState;
use crawlwatch_core::dto::StatusUpdate;

/// Outcome of applying an update to a job's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The state was already terminal; the update was dropped
    Ignored,
    /// The update was applied
    Applied {
        /// The update moved the job into a terminal status
        terminal: bool,
    },
}

/// Apply an inbound update to a job's state
///
/// - `started` is stored as `running`
/// - terminal and unobservable states are absorbing: later updates,
///   including duplicate terminal ones, are ignored
/// - the completed counter is adopted whenever present; the total only when
///   present and non-zero, so a known target never regresses to unknown
pub fn reconcile(state: &mut SyncState, update: &StatusUpdate) -> Reconciled {
    if state.is_terminal() {
        return Reconciled::Ignored;
    }

    state.status = update.status.normalized();

    if let Some(completed) = update.completed {
        state.progress.completed = completed;
    }

    if let Some(total) = update.total.filter(|total| *total > 0) {
        state.progress.total = total;
    }

    if let Some(error) = &update.error {
        state.job_error = Some(error.clone());
    }

    state.touch();

    Reconciled::Applied {
        terminal: state.is_terminal(),
    }
}

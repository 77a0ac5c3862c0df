//! Daily epoch scheduler.
//!
//! Periodic work runs at epoch boundaries (00:00 UTC). At each boundary the
//! daemon expires stale BV, unlocks due STK lots and, on the first boundary
//! of a month, pays the previous month's salaries. The salary run is keyed
//! on the last finished period rather than the calendar date, so a daemon
//! that was down over a month boundary catches up at its next boundary.

use std::sync::Arc;
use std::time::Duration;

use gbnet_types::{time, Timestamp};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::DaemonState;

/// Epoch duration in seconds (24 hours).
pub const EPOCH_DURATION_SECS: u64 = 24 * 60 * 60;

/// Epoch number of a timestamp.
pub fn epoch_of(now: Timestamp) -> u64 {
    now / EPOCH_DURATION_SECS
}

/// Seconds from `now` until the next epoch boundary, in `1..=EPOCH_DURATION_SECS`.
pub fn seconds_until_next_epoch(now: Timestamp) -> u64 {
    EPOCH_DURATION_SECS - (now % EPOCH_DURATION_SECS)
}

/// What one boundary did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BoundaryReport {
    pub maintenance: gbnet_engine::MaintenanceReport,
    /// Set when a salary run happened.
    pub salary: Option<gbnet_engine::SalaryRunReport>,
}

/// Epoch boundary operations, in order:
/// 1. BV expiry
/// 2. STK lot unlocks
/// 3. Salary run for the previous month, if not yet done
pub async fn run_epoch_boundary(
    state: &Arc<DaemonState>,
    now: Timestamp,
) -> anyhow::Result<BoundaryReport> {
    let epoch = epoch_of(now);
    info!(epoch, "running epoch boundary operations");

    let mut db = state.db.lock().await;
    let maintenance = gbnet_engine::run_daily_maintenance(&db, now)?;
    let salary = match gbnet_engine::due_salary_period(&db, now)? {
        Some(period) => {
            info!(period = %period.key, "salary run due");
            Some(gbnet_engine::pay_salaries(&mut db, now, &state.config.compensation)?)
        }
        None => None,
    };
    drop(db);

    state
        .event_bus
        .emit("MaintenanceCompleted", now, json!({ "epoch": epoch, "report": maintenance }));
    if let Some(ref report) = salary {
        state.event_bus.emit("SalaryRunCompleted", now, json!(report));
    }
    info!(epoch, "epoch boundary operations complete");
    Ok(BoundaryReport {
        maintenance,
        salary,
    })
}

/// Sleep until each boundary and run it, until shutdown.
///
/// A failed boundary is logged and retried at the next one; every step is
/// idempotent.
pub async fn run_scheduler(state: Arc<DaemonState>, mut shutdown_rx: broadcast::Receiver<()>) {
    loop {
        let wait = seconds_until_next_epoch(time::now());
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(wait)) => {}
            _ = shutdown_rx.recv() => {
                info!("scheduler stopping");
                return;
            }
        }
        if let Err(e) = run_epoch_boundary(&state, time::now()).await {
            error!(error = %e, "epoch boundary failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::state;

    /// 2024-02-01T00:00:00Z
    const FEB_1: u64 = 1_706_745_600;

    #[test]
    fn test_seconds_until_next() {
        assert_eq!(seconds_until_next_epoch(FEB_1), EPOCH_DURATION_SECS);
        assert_eq!(seconds_until_next_epoch(FEB_1 + 1), EPOCH_DURATION_SECS - 1);
        assert_eq!(seconds_until_next_epoch(FEB_1 - 1), 1);
        assert_eq!(epoch_of(FEB_1), 19_754);
    }

    #[tokio::test]
    async fn test_boundary_runs_salary_once_per_month() {
        let state = state();
        let mut events = state.event_bus.subscribe();

        let first = run_epoch_boundary(&state, FEB_1).await.expect("boundary");
        assert_eq!(first.salary.map(|r| r.period), Some("2024-01".to_string()));

        let next_day = run_epoch_boundary(&state, FEB_1 + EPOCH_DURATION_SECS)
            .await
            .expect("boundary");
        assert!(next_day.salary.is_none());

        let kinds: Vec<String> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            kinds,
            vec!["MaintenanceCompleted", "SalaryRunCompleted", "MaintenanceCompleted"]
        );
    }
}

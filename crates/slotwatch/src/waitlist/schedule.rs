//! Daily time-based trigger for the full reconciliation run.

use super::driver::ReconciliationDriver;
use super::store::StudioStore;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Time of day (UTC) at which the full run fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
}

impl DailySchedule {
    /// Returns `None` for an invalid hour or minute.
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(|at| Self { at })
    }

    /// Midnight UTC.
    pub fn midnight() -> Self {
        Self {
            at: NaiveTime::default(),
        }
    }

    /// The first firing strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive().and_time(self.at).and_utc();
        if today > now {
            today
        } else {
            today + Duration::days(1)
        }
    }
}

impl Default for DailySchedule {
    fn default() -> Self {
        Self::midnight()
    }
}

/// Runs `run_all` once per day until `shutdown` flips to true.
pub async fn run_daily<S: StudioStore + 'static>(
    driver: Arc<ReconciliationDriver<S>>,
    schedule: DailySchedule,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let now = Utc::now();
        let next = schedule.next_after(now);
        let wait = (next - now).to_std().unwrap_or_default();

        info!(next_run = %next, "Scheduled next waiting-list reconciliation");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Stopping daily reconciliation schedule");
                    return;
                }
                continue;
            }
        }

        match driver.run_all().await {
            Ok(summary) if !summary.failures.is_empty() => {
                warn!(
                    correlation_id = %summary.correlation_id,
                    failed = summary.failures.len(),
                    "Scheduled run finished with failed classes, they will be retried next run"
                );
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Scheduled reconciliation run failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_after_same_day() {
        let schedule = DailySchedule::new(23, 30).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(now),
            Utc.with_ymd_and_hms(2026, 5, 4, 23, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_next_after_rolls_to_tomorrow() {
        let schedule = DailySchedule::midnight();
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 0, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(now),
            Utc.with_ymd_and_hms(2026, 5, 5, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_invalid_time_rejected() {
        assert!(DailySchedule::new(24, 0).is_none());
        assert!(DailySchedule::new(3, 60).is_none());
    }
}

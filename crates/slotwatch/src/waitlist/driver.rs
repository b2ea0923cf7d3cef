//! Reconciliation driver: runs the aggregate → decide → apply pipeline for
//! every class (scheduled) or for one class (triggered).

use super::aggregator::WaitlistAggregator;
use super::error::ReconcileError;
use super::locks::ClassLocks;
use super::reconciler::{ActionKind, SlotContext, SlotReconciler};
use super::store::StudioStore;
use super::types::ClassSession;
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Configuration for the reconciliation driver.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Upper bound on reconciling a single class, lock wait included
    pub class_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            class_timeout: Duration::from_secs(30),
        }
    }
}

/// Result of reconciling one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClassOutcome {
    Reconciled { class_id: String, result: ActionKind },
    /// The class already took place, nothing was touched
    SkippedEnded { class_id: String },
}

/// A class whose reconciliation failed during a full run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassFailure {
    pub class_id: String,
    pub error: String,
    pub retryable: bool,
}

/// Totals for a full run over all classes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub correlation_id: String,
    pub classes: usize,
    pub skipped_ended: usize,
    pub created: usize,
    pub extended: usize,
    pub retracted: usize,
    pub unchanged: usize,
    pub failures: Vec<ClassFailure>,
    pub duration_ms: u64,
}

impl RunSummary {
    fn record(&mut self, kind: ActionKind) {
        match kind {
            ActionKind::Created { .. } => self.created += 1,
            ActionKind::Extended { .. } => self.extended += 1,
            ActionKind::Retracted => self.retracted += 1,
            ActionKind::NoOp | ActionKind::NoOpExists => self.unchanged += 1,
        }
    }
}

/// Entry point for both the daily job and explicit triggers.
pub struct ReconciliationDriver<S> {
    store: Arc<S>,
    locks: ClassLocks,
    config: DriverConfig,
}

impl<S: StudioStore> ReconciliationDriver<S> {
    pub fn new(store: Arc<S>, config: DriverConfig) -> Self {
        Self {
            store,
            locks: ClassLocks::new(),
            config,
        }
    }

    /// Reconciles every class that has not ended yet.
    ///
    /// A failing class is logged and recorded in the summary; the run only
    /// fails if the class list itself cannot be read.
    pub async fn run_all(&self) -> Result<RunSummary, ReconcileError> {
        let correlation_id = generate_correlation_id();
        let start = Instant::now();

        info!(correlation_id = %correlation_id, "Starting waiting-list reconciliation run");

        let classes = self.store.list_classes().await.map_err(|e| {
            error!(correlation_id = %correlation_id, error = %e, "Failed to list classes");
            ReconcileError::from(e)
        })?;

        let now = Utc::now();
        let mut summary = RunSummary {
            correlation_id: correlation_id.clone(),
            classes: classes.len(),
            ..RunSummary::default()
        };

        for class in &classes {
            if class.has_ended(now) {
                debug!(correlation_id = %correlation_id, class_id = %class.id, "Skipping ended class");
                summary.skipped_ended += 1;
                continue;
            }

            match self.reconcile_class(class, &correlation_id).await {
                Ok(kind) => summary.record(kind),
                Err(e) => {
                    error!(
                        correlation_id = %correlation_id,
                        class_id = %class.id,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Class reconciliation failed, continuing with next class"
                    );
                    summary.failures.push(ClassFailure {
                        class_id: class.id.clone(),
                        error: e.to_string(),
                        retryable: e.is_retryable(),
                    });
                }
            }
        }

        self.locks.prune_idle();
        summary.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            correlation_id = %correlation_id,
            classes = summary.classes,
            skipped_ended = summary.skipped_ended,
            created = summary.created,
            extended = summary.extended,
            retracted = summary.retracted,
            unchanged = summary.unchanged,
            failed = summary.failures.len(),
            duration_ms = summary.duration_ms,
            "Waiting-list reconciliation run finished"
        );

        Ok(summary)
    }

    /// Reconciles a single class and reports what happened.
    pub async fn run_one(&self, class_id: &str) -> Result<ClassOutcome, ReconcileError> {
        let correlation_id = generate_correlation_id();

        let class = self
            .store
            .get_class(class_id)
            .await?
            .ok_or_else(|| ReconcileError::ClassNotFound {
                class_id: class_id.to_string(),
            })?;

        if class.has_ended(Utc::now()) {
            debug!(correlation_id = %correlation_id, class_id = %class_id, "Skipping ended class");
            return Ok(ClassOutcome::SkippedEnded {
                class_id: class.id,
            });
        }

        let result = self.reconcile_class(&class, &correlation_id).await?;

        Ok(ClassOutcome::Reconciled {
            class_id: class.id,
            result,
        })
    }

    /// Serializes on the class lock and bounds the whole attempt by the timeout.
    async fn reconcile_class(
        &self,
        class: &ClassSession,
        correlation_id: &str,
    ) -> Result<ActionKind, ReconcileError> {
        let start = Instant::now();

        let attempt = async {
            let lock = self.locks.get(&class.id);
            let _guard = lock.lock().await;
            self.reconcile_with_retry(class, correlation_id).await
        };

        let result = match tokio::time::timeout(self.config.class_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::Timeout {
                class_id: class.id.clone(),
                elapsed_secs: start.elapsed().as_secs_f64(),
            }),
        };

        if let Ok(kind) = &result {
            info!(
                correlation_id = %correlation_id,
                class_id = %class.id,
                action = ?kind,
                duration_ms = start.elapsed().as_millis() as u64,
                "Class reconciled"
            );
        }

        result
    }

    /// Retries once on a write conflict, re-reading everything.
    async fn reconcile_with_retry(
        &self,
        class: &ClassSession,
        correlation_id: &str,
    ) -> Result<ActionKind, ReconcileError> {
        match self.reconcile_once(class).await {
            Err(ReconcileError::Conflict { tag }) => {
                warn!(
                    correlation_id = %correlation_id,
                    class_id = %class.id,
                    tag = %tag,
                    "Notification changed concurrently, retrying with fresh state"
                );
                let retried = self.reconcile_once(class).await;
                if let Err(ReconcileError::Conflict { tag }) = &retried {
                    warn!(
                        correlation_id = %correlation_id,
                        class_id = %class.id,
                        tag = %tag,
                        "Conflict persisted, deferring to next scheduled run"
                    );
                }
                retried
            }
            other => other,
        }
    }

    async fn reconcile_once(&self, class: &ClassSession) -> Result<ActionKind, ReconcileError> {
        let store = self.store.as_ref();
        let roster = WaitlistAggregator::new(store).aggregate(&class.id).await?;

        let ctx = SlotContext {
            class_id: &class.id,
            title: &class.title,
            capacity: class.capacity,
            roster: &roster,
        };

        let reconciler = SlotReconciler::new(store);
        let action = reconciler.reconcile(&ctx).await?;
        reconciler.apply(&class.id, &action).await?;

        Ok(action.kind())
    }
}

/// Short id tying together the log lines of one run.
fn generate_correlation_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFF_FFFF, random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_actions() {
        let mut summary = RunSummary::default();
        summary.record(ActionKind::Created { recipients: 2 });
        summary.record(ActionKind::NoOp);
        summary.record(ActionKind::NoOpExists);
        summary.record(ActionKind::Retracted);

        assert_eq!(summary.created, 1);
        assert_eq!(summary.unchanged, 2);
        assert_eq!(summary.retracted, 1);
        assert_eq!(summary.extended, 0);
    }

    #[test]
    fn test_correlation_ids_differ() {
        assert_ne!(generate_correlation_id(), generate_correlation_id());
    }
}

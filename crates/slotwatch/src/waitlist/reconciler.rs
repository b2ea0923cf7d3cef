//! Slot notification decisions and their application.
//!
//! `decide` is a pure function of the roster and the existing notification;
//! `SlotReconciler` performs the tag lookup and applies the chosen action
//! through the store's conditional writes.

use super::error::ReconcileError;
use super::store::StudioStore;
use super::types::{slot_tag, EffectiveRoster, Notification, NotificationDocument, UserId};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

/// What should happen to a class's slot notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotAction {
    /// No notification exists yet and there are users to notify
    Create(NotificationDocument),
    /// The notification exists and new waiting users appeared
    Extend {
        notification_id: String,
        expected_version: i64,
        recipients: Vec<UserId>,
    },
    /// The notification exists and already covers every waiting user
    NoOpExists { notification_id: String },
    /// Nothing to do
    NoOp,
    /// The class is full or nobody is waiting anymore
    Retract {
        notification_id: String,
        expected_version: i64,
    },
}

impl SlotAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            SlotAction::Create(doc) => ActionKind::Created {
                recipients: doc.to.len(),
            },
            SlotAction::Extend { recipients, .. } => ActionKind::Extended {
                recipients: recipients.len(),
            },
            SlotAction::NoOpExists { .. } => ActionKind::NoOpExists,
            SlotAction::NoOp => ActionKind::NoOp,
            SlotAction::Retract { .. } => ActionKind::Retracted,
        }
    }
}

/// Summary of an applied action, for logs and API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionKind {
    Created { recipients: usize },
    Extended { recipients: usize },
    NoOpExists,
    NoOp,
    Retracted,
}

/// Input of a single reconciliation decision.
#[derive(Debug, Clone, Copy)]
pub struct SlotContext<'a> {
    pub class_id: &'a str,
    pub title: &'a str,
    pub capacity: u32,
    pub roster: &'a EffectiveRoster,
}

impl SlotContext<'_> {
    /// A seat is free and at least one person is waiting.
    pub fn is_eligible(&self) -> bool {
        self.roster.booked_count < self.capacity as usize && self.roster.waiting_len() > 0
    }
}

/// Decides the action for a class given its current notification, if any.
pub fn decide(ctx: &SlotContext<'_>, existing: Option<&Notification>) -> SlotAction {
    if !ctx.is_eligible() {
        return match existing {
            Some(n) => SlotAction::Retract {
                notification_id: n.id.clone(),
                expected_version: n.version,
            },
            None => SlotAction::NoOp,
        };
    }

    let recipients: Vec<UserId> = ctx
        .roster
        .waiting
        .iter()
        .filter(|id| !id.trim().is_empty())
        .cloned()
        .collect();

    // Only unresolved entries are waiting: an existing notification is kept as is
    if recipients.is_empty() {
        return SlotAction::NoOp;
    }

    let Some(existing) = existing else {
        return SlotAction::Create(NotificationDocument::slot_available(
            ctx.class_id,
            ctx.title,
            recipients,
            Utc::now(),
        ));
    };

    let current = dedup_preserving_order(&existing.document.to);
    let union = union_recipients(&current, &recipients);

    if union.len() > current.len() {
        SlotAction::Extend {
            notification_id: existing.id.clone(),
            expected_version: existing.version,
            recipients: union,
        }
    } else {
        SlotAction::NoOpExists {
            notification_id: existing.id.clone(),
        }
    }
}

fn dedup_preserving_order(ids: &[UserId]) -> Vec<UserId> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Existing recipients first, then any new ones in the order given.
fn union_recipients(current: &[UserId], incoming: &[UserId]) -> Vec<UserId> {
    let mut seen: HashSet<&str> = current.iter().map(String::as_str).collect();
    let mut union = current.to_vec();
    for id in incoming {
        if seen.insert(id.as_str()) {
            union.push(id.clone());
        }
    }
    union
}

/// Looks up the class's notification, decides, and applies the action.
pub struct SlotReconciler<'a, S> {
    store: &'a S,
}

impl<'a, S: StudioStore> SlotReconciler<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Finds the live notification for a class.
    ///
    /// Duplicate tags are left untouched; the oldest one is used.
    pub async fn find_existing(&self, class_id: &str) -> Result<Option<Notification>, ReconcileError> {
        let tag = slot_tag(class_id);
        let mut found = self.store.notifications_by_tag(&tag).await?;

        if found.len() > 1 {
            warn!(
                class_id = %class_id,
                tag = %tag,
                count = found.len(),
                "Multiple notifications share a tag, using the oldest"
            );
        }

        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    /// Reads the current notification and returns the action to take.
    pub async fn reconcile(&self, ctx: &SlotContext<'_>) -> Result<SlotAction, ReconcileError> {
        let existing = self.find_existing(ctx.class_id).await?;
        Ok(decide(ctx, existing.as_ref()))
    }

    /// Applies an action with a conditional write.
    ///
    /// Returns `Conflict` when the notification changed since it was read.
    pub async fn apply(&self, class_id: &str, action: &SlotAction) -> Result<(), ReconcileError> {
        let tag = slot_tag(class_id);
        let conflict = || ReconcileError::Conflict { tag: tag.clone() };

        match action {
            SlotAction::Create(doc) => {
                let created = self
                    .store
                    .create_notification_if_absent(doc)
                    .await?
                    .ok_or_else(conflict)?;
                info!(
                    class_id = %class_id,
                    notification_id = %created.id,
                    recipients = doc.to.len(),
                    "Slot notification created"
                );
            }
            SlotAction::Extend {
                notification_id,
                expected_version,
                recipients,
            } => {
                let updated = self
                    .store
                    .replace_recipients(notification_id, *expected_version, recipients)
                    .await?;
                if !updated {
                    return Err(conflict());
                }
                info!(
                    class_id = %class_id,
                    notification_id = %notification_id,
                    recipients = recipients.len(),
                    "Slot notification recipients extended"
                );
            }
            SlotAction::Retract {
                notification_id,
                expected_version,
            } => {
                let deleted = self
                    .store
                    .delete_notification(notification_id, *expected_version)
                    .await?;
                if !deleted {
                    return Err(conflict());
                }
                info!(
                    class_id = %class_id,
                    notification_id = %notification_id,
                    "Stale slot notification retracted"
                );
            }
            SlotAction::NoOpExists { notification_id } => {
                info!(
                    class_id = %class_id,
                    notification_id = %notification_id,
                    "No new recipients for slot notification"
                );
            }
            SlotAction::NoOp => {}
        }

        Ok(())
    }
}

//! Query surface the reconciler needs from the studio's document store.

use super::error::StoreError;
use super::types::{Booking, ClassSession, Notification, NotificationDocument, UserId, WaitingListEntry};
use std::future::Future;

/// Store access used by the aggregator, reconciler and driver.
///
/// Classes, bookings and waiting lists are only ever read. Notifications are
/// mutated through conditional writes so that concurrent reconciliations of
/// the same class cannot clobber each other.
pub trait StudioStore: Send + Sync {
    /// Lists every class.
    fn list_classes(&self) -> impl Future<Output = Result<Vec<ClassSession>, StoreError>> + Send;

    /// Loads a single class, `None` if it does not exist.
    fn get_class(
        &self,
        class_id: &str,
    ) -> impl Future<Output = Result<Option<ClassSession>, StoreError>> + Send;

    /// Lists all bookings that reference the class.
    fn bookings_for_class(
        &self,
        class_id: &str,
    ) -> impl Future<Output = Result<Vec<Booking>, StoreError>> + Send;

    /// Lists the explicit waiting-list entries of the class.
    fn waiting_list_for_class(
        &self,
        class_id: &str,
    ) -> impl Future<Output = Result<Vec<WaitingListEntry>, StoreError>> + Send;

    /// Finds notifications by tag, oldest first.
    fn notifications_by_tag(
        &self,
        tag: &str,
    ) -> impl Future<Output = Result<Vec<Notification>, StoreError>> + Send;

    /// Inserts the notification unless one with the same tag already exists.
    ///
    /// Returns `None` when another writer got there first.
    fn create_notification_if_absent(
        &self,
        document: &NotificationDocument,
    ) -> impl Future<Output = Result<Option<Notification>, StoreError>> + Send;

    /// Replaces the recipients if the notification is still at `expected_version`.
    ///
    /// Returns `false` when the notification changed or vanished meanwhile.
    fn replace_recipients(
        &self,
        notification_id: &str,
        expected_version: i64,
        recipients: &[UserId],
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Deletes the notification if it is still at `expected_version`.
    fn delete_notification(
        &self,
        notification_id: &str,
        expected_version: i64,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

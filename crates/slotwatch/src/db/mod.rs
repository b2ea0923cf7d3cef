/// SQLite-backed document store for classes, bookings, waiting lists and
/// notifications

mod types;

pub use types::{DbBooking, DbClass, DbNotification, DbWaitingEntry};

use crate::waitlist::{
    Booking, ClassDocument, ClassSession, Notification, NotificationDocument, StoreError,
    StudioStore, UserId, WaitingListEntry,
};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

const SCHEMA_SQL: &str = include_str!("../../../../sql/init_studio.sql");

const DOCUMENT_ID_LEN: usize = 20;

pub struct StudioDbManager {
    db: Mutex<Connection>,
}

impl StudioDbManager {
    /// Opens (or creates) the database and initializes the schema
    pub fn new(db_path: &str) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(db_path)?)
    }

    /// A private in-memory database, used by tests and dry runs
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db.lock().map_err(|e| StoreError::Unavailable {
            message: e.to_string(),
        })
    }

    /// Inserts or replaces a class document
    pub fn upsert_class(&self, class_id: &str, doc: &ClassDocument) -> Result<(), StoreError> {
        self.upsert_class_document(class_id, &serde_json::to_value(doc)?)
    }

    /// Inserts or replaces a class document exactly as the dashboard wrote it
    pub fn upsert_class_document(&self, class_id: &str, data: &Value) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO classes (class_id, data, created_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT (class_id) DO UPDATE SET data = excluded.data",
            params![class_id, serde_json::to_string(data)?],
        )?;
        Ok(())
    }

    /// Inserts a booking document and returns its generated id
    pub fn insert_booking(
        &self,
        user_id: &str,
        class_id: &str,
        data: &Value,
    ) -> Result<String, StoreError> {
        let booking_id = generate_document_id();
        let mut data = data.clone();
        if let Value::Object(map) = &mut data {
            map.insert("classid".to_string(), Value::String(class_id.to_string()));
        }

        self.conn()?.execute(
            "INSERT INTO bookings (booking_id, user_id, class_id, data, created_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))",
            params![booking_id, user_id, class_id, serde_json::to_string(&data)?],
        )?;
        Ok(booking_id)
    }

    /// Sets a booking's status, normalizing the field name to `Status`.
    ///
    /// Returns the booking's class id, or `None` if the booking does not exist.
    pub fn update_booking_status(
        &self,
        booking_id: &str,
        status: &str,
    ) -> Result<Option<String>, StoreError> {
        let db = self.conn()?;
        let row: Option<(String, String)> = db
            .query_row(
                "SELECT class_id, data FROM bookings WHERE booking_id = ?",
                [booking_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((class_id, data)) = row else {
            return Ok(None);
        };

        let mut doc: Value = serde_json::from_str(&data)?;
        if let Value::Object(map) = &mut doc {
            map.remove("status");
            map.insert("Status".to_string(), Value::String(status.to_string()));
        }

        db.execute(
            "UPDATE bookings SET data = ?1 WHERE booking_id = ?2",
            params![serde_json::to_string(&doc)?, booking_id],
        )?;
        Ok(Some(class_id))
    }

    /// Adds (or overwrites) a waiting-list entry keyed by `entry_id`
    pub fn put_waiting_entry(
        &self,
        class_id: &str,
        entry_id: &str,
        data: &Value,
    ) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO waiting_list (class_id, entry_id, data, created_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT (class_id, entry_id) DO UPDATE SET data = excluded.data",
            params![class_id, entry_id, serde_json::to_string(data)?],
        )?;
        Ok(())
    }

    /// Inserts a notification without the tag check, the way older writers did.
    ///
    /// Nothing in the reconciler calls this; it exists to load records that
    /// predate the conditional insert, duplicate tags included.
    pub fn insert_notification(
        &self,
        document: &NotificationDocument,
    ) -> Result<Notification, StoreError> {
        let notification_id = generate_document_id();
        self.conn()?.execute(
            "INSERT INTO notifications (notification_id, tag, version, data) VALUES (?1, ?2, 0, ?3)",
            params![
                notification_id,
                non_empty(&document.tag),
                serde_json::to_string(document)?
            ],
        )?;
        Ok(Notification {
            id: notification_id,
            version: 0,
            document: document.clone(),
        })
    }

    /// Gets every class. Undecodable documents fall back to class defaults
    pub fn load_classes(&self) -> Result<Vec<ClassSession>, StoreError> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT class_id, data FROM classes ORDER BY class_id")?;

        let rows = stmt
            .query_map([], |row| {
                Ok(DbClass {
                    class_id: row.get(0)?,
                    data: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .map(|row| class_from_row(&row.class_id, &row.data))
            .collect())
    }

    /// Gets one class by id
    pub fn load_class(&self, class_id: &str) -> Result<Option<ClassSession>, StoreError> {
        let data: Option<String> = self
            .conn()?
            .query_row(
                "SELECT data FROM classes WHERE class_id = ?",
                [class_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(data.map(|data| class_from_row(class_id, &data)))
    }

    /// Gets all bookings for a class through the class index
    pub fn load_bookings_for_class(&self, class_id: &str) -> Result<Vec<Booking>, StoreError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT booking_id, user_id, class_id, data
             FROM bookings
             WHERE class_id = ?
             ORDER BY created_at, booking_id",
        )?;

        let rows = stmt
            .query_map([class_id], |row| {
                Ok(DbBooking {
                    booking_id: row.get(0)?,
                    user_id: row.get(1)?,
                    class_id: row.get(2)?,
                    data: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match serde_json::from_str::<Value>(&row.data) {
                Ok(data) => Some(Booking::from_document(
                    &row.booking_id,
                    &row.user_id,
                    &row.class_id,
                    &data,
                )),
                Err(e) => {
                    warn!(booking_id = %row.booking_id, error = %e, "Skipping malformed booking document");
                    None
                }
            })
            .collect())
    }

    /// Gets the explicit waiting list of a class
    pub fn load_waiting_list(&self, class_id: &str) -> Result<Vec<WaitingListEntry>, StoreError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT class_id, entry_id, data
             FROM waiting_list
             WHERE class_id = ?
             ORDER BY created_at, entry_id",
        )?;

        let rows = stmt
            .query_map([class_id], |row| {
                Ok(DbWaitingEntry {
                    class_id: row.get(0)?,
                    entry_id: row.get(1)?,
                    data: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match serde_json::from_str::<Value>(&row.data) {
                Ok(data) => Some(WaitingListEntry::from_document(
                    &row.class_id,
                    &row.entry_id,
                    &data,
                )),
                Err(e) => {
                    warn!(
                        class_id = %row.class_id,
                        entry_id = %row.entry_id,
                        error = %e,
                        "Skipping malformed waiting-list entry"
                    );
                    None
                }
            })
            .collect())
    }

    /// Gets notifications with the given tag, oldest first
    pub fn load_notifications_by_tag(&self, tag: &str) -> Result<Vec<Notification>, StoreError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT notification_id, tag, version, data
             FROM notifications
             WHERE tag = ?
             ORDER BY seq",
        )?;

        let rows = stmt
            .query_map([tag], |row| {
                Ok(DbNotification {
                    notification_id: row.get(0)?,
                    tag: row.get(1)?,
                    version: row.get(2)?,
                    data: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(notification_from_row).collect()
    }

    /// Inserts the notification only if no notification carries its tag.
    ///
    /// The existence check and the insert are a single statement.
    pub fn insert_notification_if_absent(
        &self,
        document: &NotificationDocument,
    ) -> Result<Option<Notification>, StoreError> {
        let notification_id = generate_document_id();
        let inserted = self.conn()?.execute(
            "INSERT INTO notifications (notification_id, tag, version, data)
             SELECT ?1, ?2, 0, ?3
             WHERE NOT EXISTS (SELECT 1 FROM notifications WHERE tag = ?2)",
            params![notification_id, document.tag, serde_json::to_string(document)?],
        )?;

        Ok((inserted == 1).then(|| Notification {
            id: notification_id,
            version: 0,
            document: document.clone(),
        }))
    }

    /// Rewrites the `to` field if the notification is still at `expected_version`
    pub fn update_notification_recipients(
        &self,
        notification_id: &str,
        expected_version: i64,
        recipients: &[UserId],
    ) -> Result<bool, StoreError> {
        let db = self.conn()?;
        let data: Option<String> = db
            .query_row(
                "SELECT data FROM notifications WHERE notification_id = ?1 AND version = ?2",
                params![notification_id, expected_version],
                |row| row.get(0),
            )
            .optional()?;

        let Some(data) = data else {
            return Ok(false);
        };

        let mut doc: Value = serde_json::from_str(&data)?;
        if let Value::Object(map) = &mut doc {
            map.insert("to".to_string(), serde_json::to_value(recipients)?);
        }

        let updated = db.execute(
            "UPDATE notifications SET data = ?1, version = version + 1
             WHERE notification_id = ?2 AND version = ?3",
            params![serde_json::to_string(&doc)?, notification_id, expected_version],
        )?;
        Ok(updated == 1)
    }

    /// Deletes the notification if it is still at `expected_version`
    pub fn delete_notification_if_version(
        &self,
        notification_id: &str,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        let deleted = self.conn()?.execute(
            "DELETE FROM notifications WHERE notification_id = ?1 AND version = ?2",
            params![notification_id, expected_version],
        )?;
        Ok(deleted == 1)
    }
}

/// Builds a class from its stored JSON, never failing on document contents
fn class_from_row(class_id: &str, data: &str) -> ClassSession {
    let value = serde_json::from_str::<Value>(data).unwrap_or_else(|e| {
        warn!(class_id = %class_id, error = %e, "Class document is not valid JSON, using defaults");
        Value::Null
    });
    ClassSession::from_document(class_id, ClassDocument::from_value(class_id, &value))
}

fn notification_from_row(row: DbNotification) -> Result<Notification, StoreError> {
    let mut document: NotificationDocument = serde_json::from_str(&row.data)?;
    if document.tag.is_empty() {
        document.tag = row.tag.unwrap_or_default();
    }
    Ok(Notification {
        id: row.notification_id,
        version: row.version,
        document,
    })
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

/// Random alphanumeric id in the style of hosted document stores
fn generate_document_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DOCUMENT_ID_LEN)
        .map(char::from)
        .collect()
}

impl StudioStore for StudioDbManager {
    async fn list_classes(&self) -> Result<Vec<ClassSession>, StoreError> {
        self.load_classes()
    }

    async fn get_class(&self, class_id: &str) -> Result<Option<ClassSession>, StoreError> {
        self.load_class(class_id)
    }

    async fn bookings_for_class(&self, class_id: &str) -> Result<Vec<Booking>, StoreError> {
        self.load_bookings_for_class(class_id)
    }

    async fn waiting_list_for_class(
        &self,
        class_id: &str,
    ) -> Result<Vec<WaitingListEntry>, StoreError> {
        self.load_waiting_list(class_id)
    }

    async fn notifications_by_tag(&self, tag: &str) -> Result<Vec<Notification>, StoreError> {
        self.load_notifications_by_tag(tag)
    }

    async fn create_notification_if_absent(
        &self,
        document: &NotificationDocument,
    ) -> Result<Option<Notification>, StoreError> {
        self.insert_notification_if_absent(document)
    }

    async fn replace_recipients(
        &self,
        notification_id: &str,
        expected_version: i64,
        recipients: &[UserId],
    ) -> Result<bool, StoreError> {
        self.update_notification_recipients(notification_id, expected_version, recipients)
    }

    async fn delete_notification(
        &self,
        notification_id: &str,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        self.delete_notification_if_version(notification_id, expected_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waitlist::{slot_tag, BookingStatus};
    use chrono::Utc;
    use serde_json::json;

    fn slot_doc(class_id: &str, to: &[&str]) -> NotificationDocument {
        NotificationDocument::slot_available(
            class_id,
            "Yoga",
            to.iter().map(|s| s.to_string()).collect(),
            Utc::now(),
        )
    }

    #[test]
    fn test_conditional_insert_is_one_per_tag() {
        let db = StudioDbManager::in_memory().unwrap();

        let first = db.insert_notification_if_absent(&slot_doc("c1", &["u1"])).unwrap();
        let second = db.insert_notification_if_absent(&slot_doc("c1", &["u2"])).unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(db.load_notifications_by_tag(&slot_tag("c1")).unwrap().len(), 1);
    }

    #[test]
    fn test_recipient_update_checks_version() {
        let db = StudioDbManager::in_memory().unwrap();
        let n = db
            .insert_notification_if_absent(&slot_doc("c1", &["u1"]))
            .unwrap()
            .unwrap();

        let to = vec!["u1".to_string(), "u2".to_string()];
        assert!(db.update_notification_recipients(&n.id, 0, &to).unwrap());
        assert!(!db.update_notification_recipients(&n.id, 0, &to).unwrap());

        let stored = db.load_notifications_by_tag(&slot_tag("c1")).unwrap();
        assert_eq!(stored[0].version, 1);
        assert_eq!(stored[0].document.to, to);
    }

    #[test]
    fn test_delete_checks_version() {
        let db = StudioDbManager::in_memory().unwrap();
        let n = db
            .insert_notification_if_absent(&slot_doc("c1", &["u1"]))
            .unwrap()
            .unwrap();

        assert!(!db.delete_notification_if_version(&n.id, 7).unwrap());
        assert!(db.delete_notification_if_version(&n.id, 0).unwrap());
        assert!(db.load_notifications_by_tag(&slot_tag("c1")).unwrap().is_empty());
    }

    #[test]
    fn test_bookings_queried_by_class() {
        let db = StudioDbManager::in_memory().unwrap();
        db.insert_booking("u1", "c1", &json!({ "Status": "Waiting" })).unwrap();
        db.insert_booking("u2", "c1", &json!({ "status": "Booked" })).unwrap();
        db.insert_booking("u3", "c2", &json!({ "status": "Booked" })).unwrap();

        let bookings = db.load_bookings_for_class("c1").unwrap();
        assert_eq!(bookings.len(), 2);
        assert!(bookings.iter().all(|b| b.class_id == "c1"));
    }

    #[test]
    fn test_status_update_normalizes_field() {
        let db = StudioDbManager::in_memory().unwrap();
        let id = db.insert_booking("u1", "c1", &json!({ "status": "Waiting" })).unwrap();

        assert_eq!(db.update_booking_status(&id, "Cancelled").unwrap().as_deref(), Some("c1"));
        assert_eq!(db.update_booking_status("missing", "Booked").unwrap(), None);

        let bookings = db.load_bookings_for_class("c1").unwrap();
        assert_eq!(bookings[0].id, id);
        assert_eq!(bookings[0].status, BookingStatus::Cancelled);
    }

    #[test]
    fn test_malformed_class_listed_with_defaults() {
        let db = StudioDbManager::in_memory().unwrap();
        db.upsert_class("good", &ClassDocument::default()).unwrap();
        db.conn()
            .unwrap()
            .execute(
                "INSERT INTO classes (class_id, data, created_at) VALUES ('bad', 'not json', datetime('now'))",
                [],
            )
            .unwrap();

        let classes = db.load_classes().unwrap();
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].id, "bad");
        assert_eq!(classes[0].capacity, 0);
        assert_eq!(classes[0].title, "Class");

        let bad = db.load_class("bad").unwrap().unwrap();
        assert!(bad.schedule.is_none());
    }

    #[test]
    fn test_mistyped_class_fields_are_ignored() {
        let db = StudioDbManager::in_memory().unwrap();
        db.conn()
            .unwrap()
            .execute(
                "INSERT INTO classes (class_id, data, created_at) VALUES ('c1', ?1, datetime('now'))",
                [r#"{"slot":"5","title":42,"start_date_time":"next tuesday","duration_minutes":"60"}"#],
            )
            .unwrap();

        let class = db.load_class("c1").unwrap().unwrap();
        assert_eq!(class.capacity, 5);
        assert_eq!(class.title, "Class");
        assert!(class.schedule.is_none());
    }

    #[test]
    fn test_waiting_entries_overwrite_by_id() {
        let db = StudioDbManager::in_memory().unwrap();
        db.put_waiting_entry("c1", "u1", &json!({ "userId": "u1" })).unwrap();
        db.put_waiting_entry("c1", "u1", &json!({ "userid": "u1", "email": "a@b.c" })).unwrap();

        let entries = db.load_waiting_list("c1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].email.as_deref(), Some("a@b.c"));
    }
}

/// Types for classes, bookings, waiting lists and slot notifications
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::warn;

/// Identifier of a studio user (the document id of the user record).
pub type UserId = String;

/// Prefix of the deterministic tag that identifies a class's slot notification.
pub const SLOT_TAG_PREFIX: &str = "slot-available-";
pub const SLOT_SUBJECT: &str = "Slot Available in Class";
pub const SYSTEM_SENDER: &str = "SYSTEM";
pub const USERS_AUDIENCE: &str = "Users";

const DEFAULT_CLASS_TITLE: &str = "Class";

/// Returns the notification tag for a class (`slot-available-<classId>`).
pub fn slot_tag(class_id: &str) -> String {
    format!("{SLOT_TAG_PREFIX}{class_id}")
}

/// Raw class document as written by the admin dashboard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Seat capacity. Historically written as a number, sometimes as a string.
    pub slot: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
}

impl ClassDocument {
    /// Decodes a stored class document field by field.
    ///
    /// A field of the wrong type is logged and treated as absent, so it never
    /// hides the rest of the class.
    pub fn from_value(class_id: &str, data: &Value) -> Self {
        Self {
            title: lenient_field(class_id, data, "title", |v| {
                v.as_str().map(str::to_string)
            }),
            slot: data.get("slot").cloned().unwrap_or(Value::Null),
            start_date_time: lenient_field(class_id, data, "start_date_time", instant_from_value),
            end_date_time: lenient_field(class_id, data, "end_date_time", instant_from_value),
            duration_minutes: lenient_field(class_id, data, "duration_minutes", minutes_from_value),
        }
    }
}

fn lenient_field<T>(
    class_id: &str,
    data: &Value,
    key: &str,
    parse: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    let value = data.get(key).filter(|v| !v.is_null())?;
    let parsed = parse(value);
    if parsed.is_none() {
        warn!(class_id = %class_id, field = key, value = %value, "Ignoring malformed class field");
    }
    parsed
}

/// RFC 3339 strings, or stored timestamps of the form `{ "seconds", "nanoseconds" }`.
fn instant_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Object(map) => {
            let seconds = map.get("seconds").or_else(|| map.get("_seconds"))?.as_i64()?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            DateTime::from_timestamp(seconds, u32::try_from(nanos).ok()?)
        }
        _ => None,
    }
}

fn minutes_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.floor() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.floor() as i64)
            })
        }
        _ => None,
    }
}

/// When a class takes place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSchedule {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ClassSchedule {
    /// Resolves the end instant: explicit end, else start + duration, else start.
    pub fn from_parts(
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        duration_minutes: Option<i64>,
    ) -> Self {
        let end = end
            .or_else(|| {
                duration_minutes
                    .filter(|m| *m > 0)
                    .map(|m| start + Duration::minutes(m))
            })
            .unwrap_or(start);

        Self { start, end }
    }
}

/// A scheduled class with finite seating, as seen by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSession {
    pub id: String,
    pub title: String,
    pub capacity: u32,
    pub schedule: Option<ClassSchedule>,
}

impl ClassSession {
    /// Builds a session from its stored document.
    ///
    /// A missing or invalid `slot` is treated as capacity 0 and logged.
    pub fn from_document(id: &str, doc: ClassDocument) -> Self {
        let capacity = capacity_from_slot(&doc.slot).unwrap_or_else(|| {
            warn!(class_id = %id, slot = %doc.slot, "Class has no usable capacity, treating as 0");
            0
        });

        let title = doc
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_CLASS_TITLE.to_string());

        let schedule = doc
            .start_date_time
            .map(|start| ClassSchedule::from_parts(start, doc.end_date_time, doc.duration_minutes));

        Self {
            id: id.to_string(),
            title,
            capacity,
            schedule,
        }
    }

    /// Returns true once the class has fully elapsed.
    ///
    /// Classes without a schedule never count as ended.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.schedule.is_some_and(|s| s.end < now)
    }
}

/// Parses a capacity value. Returns `None` when the value is unusable.
pub fn capacity_from_slot(slot: &Value) -> Option<u32> {
    match slot {
        Value::Number(n) => n
            .as_u64()
            .map(clamp_u32)
            .or_else(|| n.as_f64().and_then(floor_non_negative)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .map(clamp_u32)
                .or_else(|| s.parse::<f64>().ok().and_then(floor_non_negative))
        }
        _ => None,
    }
}

fn clamp_u32(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

fn floor_non_negative(f: f64) -> Option<u32> {
    if f.is_finite() && f >= 0.0 {
        Some(f.floor().min(f64::from(u32::MAX)) as u32)
    } else {
        None
    }
}

/// Status of a booking. Source data mixes case, so parsing ignores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Booked,
    Waiting,
    Cancelled,
    Completed,
    /// Any other non-empty status string, kept verbatim
    Other(String),
    /// No status field on the document
    Missing,
}

impl BookingStatus {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return BookingStatus::Missing;
        };

        match raw.to_ascii_lowercase().as_str() {
            "booked" => BookingStatus::Booked,
            "waiting" => BookingStatus::Waiting,
            "cancelled" | "canceled" => BookingStatus::Cancelled,
            "completed" => BookingStatus::Completed,
            _ => BookingStatus::Other(raw.to_string()),
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, BookingStatus::Waiting)
    }

    /// True for every status except waiting and cancelled.
    pub fn occupies_seat(&self) -> bool {
        !matches!(self, BookingStatus::Waiting | BookingStatus::Cancelled)
    }
}

/// A user's claim on a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub user_id: UserId,
    pub class_id: String,
    pub status: BookingStatus,
}

impl Booking {
    /// Builds a booking from its stored document.
    ///
    /// The status lives under `Status`, or `status` on some documents.
    pub fn from_document(id: &str, user_id: &str, class_id: &str, data: &Value) -> Self {
        let raw_status = string_field(data, &["Status", "status"]);
        let status = BookingStatus::parse(raw_status.as_deref());

        if let BookingStatus::Other(ref other) = status {
            warn!(booking_id = %id, class_id = %class_id, status = %other, "Unrecognised booking status");
        }

        Self {
            id: id.to_string(),
            user_id: user_id.trim().to_string(),
            class_id: class_id.to_string(),
            status,
        }
    }
}

/// An explicit entry on a class's waiting list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingListEntry {
    pub id: String,
    pub class_id: String,
    /// `None` when the entry carries neither `userId` nor `userid`
    pub user_id: Option<UserId>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub added_at: Option<DateTime<Utc>>,
}

impl WaitingListEntry {
    pub fn from_document(class_id: &str, entry_id: &str, data: &Value) -> Self {
        let added_at = string_field(data, &["addedAt", "added_at"])
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Self {
            id: entry_id.to_string(),
            class_id: class_id.to_string(),
            user_id: string_field(data, &["userId", "userid"]),
            full_name: string_field(data, &["fullname", "full_name", "name"]),
            email: string_field(data, &["email"]),
            added_at,
        }
    }
}

/// First non-blank string among the given keys of a JSON object.
fn string_field(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| data.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Stored shape of a notification. Field names are read by the delivery
/// path, so they must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDocument {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub announcement: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub by: String,
    #[serde(default)]
    pub to: Vec<UserId>,
    #[serde(rename = "type", default)]
    pub audience: String,
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
}

impl NotificationDocument {
    /// The "slot available" notification for a class.
    pub fn slot_available(
        class_id: &str,
        title: &str,
        recipients: Vec<UserId>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            tag: slot_tag(class_id),
            announcement: format!(
                "A slot has opened up for the class: {title}. Please book now to secure your spot."
            ),
            subject: SLOT_SUBJECT.to_string(),
            by: SYSTEM_SENDER.to_string(),
            to: recipients,
            audience: USERS_AUDIENCE.to_string(),
            timestamp,
        }
    }
}

/// A persisted notification together with its store-managed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub version: i64,
    #[serde(flatten)]
    pub document: NotificationDocument,
}

/// Effective waiting-list membership and booked count for one class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveRoster {
    /// Deduplicated union of waiting-list entries and waiting bookings
    pub waiting: BTreeSet<UserId>,
    /// Waiting-list entries that carry no user id
    pub unresolved_entries: usize,
    /// Bookings holding a seat, excluding anyone in `waiting`
    pub booked_count: usize,
}

impl EffectiveRoster {
    /// Size of the waiting list, including entries without a user id.
    pub fn waiting_len(&self) -> usize {
        self.waiting.len() + self.unresolved_entries
    }
}

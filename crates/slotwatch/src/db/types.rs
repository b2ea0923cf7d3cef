/// Raw rows of the studio document store

#[derive(Debug, Clone)]
pub struct DbClass {
    pub class_id: String,
    pub data: String, // JSON document
}

#[derive(Debug, Clone)]
pub struct DbBooking {
    pub booking_id: String,
    pub user_id: String,
    pub class_id: String,
    pub data: String, // JSON document
}

#[derive(Debug, Clone)]
pub struct DbWaitingEntry {
    pub class_id: String,
    pub entry_id: String,
    pub data: String, // JSON document
}

#[derive(Debug, Clone)]
pub struct DbNotification {
    pub notification_id: String,
    pub tag: Option<String>,
    pub version: i64,
    pub data: String, // JSON document
}

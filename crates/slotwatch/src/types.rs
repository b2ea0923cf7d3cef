use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::db::StudioDbManager;
use crate::waitlist::ReconciliationDriver;

/// State shared by the HTTP handlers and the daily schedule.
pub struct WaitlistState {
    pub db: Arc<StudioDbManager>,
    pub driver: Arc<ReconciliationDriver<StudioDbManager>>,
    pub config: ServiceConfig,
}

impl WaitlistState {
    pub fn new(db: Arc<StudioDbManager>, config: ServiceConfig) -> Self {
        let driver = Arc::new(ReconciliationDriver::new(db.clone(), config.driver_config()));
        Self { db, driver, config }
    }
}

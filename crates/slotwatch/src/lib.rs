//! Waiting-list reconciliation service for the studio dashboard.
//!
//! Keeps one "slot available" notification per class in sync with the
//! class's capacity, bookings and waiting list. Runs daily over every class
//! and on demand for a single class after roster changes.

pub mod config;
pub mod db;
pub mod server;
pub mod types;
pub mod waitlist;

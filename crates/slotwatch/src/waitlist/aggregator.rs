/// Effective waiting-list computation
use super::error::StoreError;
use super::store::StudioStore;
use super::types::{Booking, EffectiveRoster, WaitingListEntry};
use tracing::{debug, warn};

/// Merges the explicit waiting list with waiting-status bookings for a class
/// and counts the seats actually held.
pub struct WaitlistAggregator<'a, S> {
    store: &'a S,
}

impl<'a, S: StudioStore> WaitlistAggregator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Loads the waiting list and the class's bookings and builds the roster.
    ///
    /// Bookings are read with a single class-indexed query.
    pub async fn aggregate(&self, class_id: &str) -> Result<EffectiveRoster, StoreError> {
        let entries = self.store.waiting_list_for_class(class_id).await?;
        let bookings = self.store.bookings_for_class(class_id).await?;

        let roster = build_roster(&entries, &bookings);

        if roster.unresolved_entries > 0 {
            warn!(
                class_id = %class_id,
                count = roster.unresolved_entries,
                "Waiting-list entries without a user id"
            );
        }

        debug!(
            class_id = %class_id,
            entries = entries.len(),
            bookings = bookings.len(),
            waiting = roster.waiting.len(),
            booked = roster.booked_count,
            "Aggregated roster"
        );

        Ok(roster)
    }
}

/// Builds the effective roster from already loaded records.
///
/// A user on the waiting list is never counted as booked, even when they
/// also hold a seat-occupying booking for the same class.
pub fn build_roster(entries: &[WaitingListEntry], bookings: &[Booking]) -> EffectiveRoster {
    let mut roster = EffectiveRoster::default();

    for entry in entries {
        match &entry.user_id {
            Some(user_id) => {
                roster.waiting.insert(user_id.clone());
            }
            None => roster.unresolved_entries += 1,
        }
    }

    for booking in bookings.iter().filter(|b| !b.user_id.is_empty()) {
        if booking.status.is_waiting() {
            roster.waiting.insert(booking.user_id.clone());
        }
    }

    roster.booked_count = bookings
        .iter()
        .filter(|b| !b.user_id.is_empty())
        .filter(|b| b.status.occupies_seat())
        .filter(|b| !roster.waiting.contains(&b.user_id))
        .count();

    roster
}

//! Per-session map of pending delivery-IDs to parcel keys (§4.6).
//!
//! A plain owned object, not global state. No cross-session sharing — each
//! parcel collection session constructs its own. The three operations are
//! synchronous; a caller juggling the delivery and ACK directions as
//! concurrent tasks is responsible for serializing access (e.g. behind a
//! `tokio::sync::Mutex`), as `gateway-transport-ws` does.

use std::collections::HashMap;

use gateway_core::model::ParcelKey;
use uuid::Uuid;

#[derive(Default)]
pub struct CollectionTracker {
    pending: HashMap<Uuid, ParcelKey>,
    all_sent: bool,
}

impl CollectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a `ParcelDelivery` for `parcel_key` was sent under
    /// `delivery_id`, awaiting an ACK.
    pub fn add_pending_ack(&mut self, delivery_id: Uuid, parcel_key: ParcelKey) {
        self.pending.insert(delivery_id, parcel_key);
    }

    /// Consume the pending entry for `delivery_id`, if any. `None` means the
    /// ID was never issued by this session — callers must treat that as the
    /// unknown-ACK failure case (§4.5), not a no-op.
    pub fn pop_pending_parcel_key(&mut self, delivery_id: Uuid) -> Option<ParcelKey> {
        self.pending.remove(&delivery_id)
    }

    /// Mark that the delivery-side stream has ended; no further entries
    /// will be added.
    pub fn mark_all_parcels_delivered(&mut self) {
        self.all_sent = true;
    }

    /// Completion ≡ all parcels sent and every delivery-ID acknowledged.
    pub fn is_complete(&self) -> bool {
        self.all_sent && self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ParcelKey {
        ParcelKey(s.to_owned())
    }

    #[test]
    fn not_complete_until_all_sent_and_drained() {
        let mut tracker = CollectionTracker::new();
        assert!(!tracker.is_complete());

        let id = Uuid::new_v4();
        tracker.add_pending_ack(id, key("k1"));
        assert!(!tracker.is_complete());

        tracker.mark_all_parcels_delivered();
        assert!(!tracker.is_complete(), "one pending ack still outstanding");

        let popped = tracker.pop_pending_parcel_key(id);
        assert_eq!(popped, Some(key("k1")));
        assert!(tracker.is_complete());
    }

    #[test]
    fn popping_unknown_id_returns_none() {
        let mut tracker = CollectionTracker::new();
        assert_eq!(tracker.pop_pending_parcel_key(Uuid::new_v4()), None);
    }

    #[test]
    fn popping_twice_is_not_idempotent_by_design() {
        let mut tracker = CollectionTracker::new();
        let id = Uuid::new_v4();
        tracker.add_pending_ack(id, key("k1"));
        assert_eq!(tracker.pop_pending_parcel_key(id), Some(key("k1")));
        assert_eq!(tracker.pop_pending_parcel_key(id), None);
    }

    #[test]
    fn empty_tracker_with_all_sent_is_complete() {
        let mut tracker = CollectionTracker::new();
        tracker.mark_all_parcels_delivered();
        assert!(tracker.is_complete());
    }
}

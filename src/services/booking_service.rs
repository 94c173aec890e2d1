use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::errors::BookingError;
use crate::models::{Activity, Booking, CurrentUser};
use crate::services::availability_service;
use crate::services::event_bus::{EventBus, Topic};
use crate::services::lifecycle_service;
use crate::services::marketplace_api::Marketplace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKey {
    Book { activity_id: i64 },
    Cancel { booking_id: i64 },
}

/// At most one request in flight per action button.
#[derive(Debug, Default)]
pub struct ActionGate {
    pending: Mutex<HashSet<ActionKey>>,
}

impl ActionGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn try_begin(self: &Arc<Self>, key: ActionKey) -> Option<PendingAction> {
        if !self.pending.lock().insert(key) {
            return None;
        }
        Some(PendingAction {
            gate: Arc::clone(self),
            key,
        })
    }

    /// Whether the matching button should render disabled.
    pub fn is_pending(&self, key: ActionKey) -> bool {
        self.pending.lock().contains(&key)
    }
}

pub struct PendingAction {
    gate: Arc<ActionGate>,
    key: ActionKey,
}

impl Drop for PendingAction {
    fn drop(&mut self) {
        self.gate.pending.lock().remove(&self.key);
    }
}

pub struct BookingService {
    api: Arc<dyn Marketplace>,
    bus: EventBus,
    gate: Arc<ActionGate>,
}

impl BookingService {
    pub fn new(api: Arc<dyn Marketplace>, bus: EventBus) -> Self {
        Self {
            api,
            bus,
            gate: ActionGate::new(),
        }
    }

    pub fn gate(&self) -> &Arc<ActionGate> {
        &self.gate
    }

    /// Books `tickets` for `activity`. The local snapshot is checked first
    /// and nothing is sent unless it allows the booking.
    pub async fn book(
        &self,
        activity: &Activity,
        tickets: i64,
        now: NaiveDateTime,
    ) -> Result<Booking, BookingError> {
        let verdict = availability_service::check_availability(activity, tickets, now);
        if !verdict.is_ok() {
            info!(
                activity_id = activity.id,
                tickets,
                verdict = verdict.as_str(),
                "booking_refused_locally"
            );
            return Err(BookingError::Unavailable(verdict));
        }

        let _pending = self
            .gate
            .try_begin(ActionKey::Book {
                activity_id: activity.id,
            })
            .ok_or(BookingError::AlreadyPending)?;

        let booking = self
            .api
            .create_booking(activity.id, tickets)
            .await
            .map_err(|e| {
                warn!(activity_id = activity.id, tickets, error = %e, "booking_rejected");
                e
            })?;

        info!(
            booking_id = booking.id,
            activity_id = activity.id,
            tickets,
            "booking_created"
        );
        self.bus.publish(Topic::BookingCreated);
        Ok(booking)
    }

    /// Cancels `booking` if both its cached status and the live clock
    /// still allow it and `user` owns it (or is an admin).
    pub async fn cancel(
        &self,
        booking: &Booking,
        activity_time: NaiveDateTime,
        user: &CurrentUser,
        now: NaiveDateTime,
    ) -> Result<(), BookingError> {
        if let Some(refusal) = lifecycle_service::cancel_refusal(booking, activity_time, user, now)
        {
            info!(booking_id = booking.id, refusal = ?refusal, "cancel_refused_locally");
            return Err(BookingError::CancelRefused(refusal));
        }

        let _pending = self
            .gate
            .try_begin(ActionKey::Cancel {
                booking_id: booking.id,
            })
            .ok_or(BookingError::AlreadyPending)?;

        self.api.cancel_booking(booking.id).await.map_err(|e| {
            warn!(booking_id = booking.id, error = %e, "cancel_rejected");
            e
        })?;

        info!(booking_id = booking.id, "booking_cancelled");
        self.bus.publish(Topic::BookingCancelled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_allows_one_in_flight_per_key() {
        let gate = ActionGate::new();
        let key = ActionKey::Book { activity_id: 1 };
        let first = gate.try_begin(key);
        assert!(first.is_some());
        assert!(gate.is_pending(key));
        assert!(gate.try_begin(key).is_none());
        assert!(gate
            .try_begin(ActionKey::Cancel { booking_id: 1 })
            .is_some());

        drop(first);
        assert!(!gate.is_pending(key));
        assert!(gate.try_begin(key).is_some());
    }
}

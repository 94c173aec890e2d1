use chrono::NaiveDateTime;

use crate::errors::{Notice, NoticeKind};
use crate::models::Activity;
use crate::services::lifecycle_service;

/// UI ceiling on the ticket picker, independent of remaining capacity.
pub const MAX_TICKETS_PER_BOOKING: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ok { spots_left: i64 },
    PastActivity,
    SoldOut,
    InsufficientSpots { spots_left: i64 },
    InvalidQuantity,
}

impl Verdict {
    pub fn is_ok(self) -> bool {
        matches!(self, Verdict::Ok { .. })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Ok { .. } => "ok",
            Verdict::PastActivity => "past_activity",
            Verdict::SoldOut => "sold_out",
            Verdict::InsufficientSpots { .. } => "insufficient_spots",
            Verdict::InvalidQuantity => "invalid_quantity",
        }
    }

    pub fn notice(self) -> Notice {
        match self {
            Verdict::Ok { .. } => Notice::new(NoticeKind::Validation, "Tickets available."),
            Verdict::PastActivity => Notice::new(
                NoticeKind::Validation,
                "This activity has already taken place.",
            ),
            Verdict::SoldOut => Notice::new(NoticeKind::Capacity, "This activity is sold out."),
            Verdict::InsufficientSpots { spots_left } => Notice::new(
                NoticeKind::Capacity,
                format!("Only {} spot(s) left.", spots_left),
            ),
            Verdict::InvalidQuantity => Notice::new(
                NoticeKind::Validation,
                "Choose at least one ticket.",
            ),
        }
    }
}

pub fn spots_left(activity: &Activity) -> i64 {
    activity.max_capacity - activity.current_capacity
}

pub fn max_tickets(activity: &Activity) -> i64 {
    spots_left(activity).clamp(0, MAX_TICKETS_PER_BOOKING)
}

/// Pre-flight check against the locally held snapshot. The backend still
/// enforces capacity; a local `Ok` can be rejected there.
pub fn check_availability(activity: &Activity, requested: i64, now: NaiveDateTime) -> Verdict {
    let spots_left = spots_left(activity);

    if !lifecycle_service::is_upcoming(activity.date_time, now) {
        return Verdict::PastActivity;
    }
    if spots_left <= 0 {
        return Verdict::SoldOut;
    }
    if spots_left < requested {
        return Verdict::InsufficientSpots { spots_left };
    }
    if requested < 1 {
        return Verdict::InvalidQuantity;
    }
    Verdict::Ok { spots_left }
}

/// Derived per render, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityView {
    pub activity_id: i64,
    pub title: String,
    pub spots_left: i64,
    pub max_tickets: i64,
    pub is_upcoming: bool,
    pub is_sold_out: bool,
    pub capacity_pct: i64,
}

impl ActivityView {
    pub fn derive(activity: &Activity, now: NaiveDateTime) -> Self {
        let raw_spots = spots_left(activity);
        let capacity_pct = if activity.max_capacity > 0 {
            ((activity.current_capacity * 100) / activity.max_capacity).clamp(0, 100)
        } else {
            100
        };

        Self {
            activity_id: activity.id,
            title: activity.title.clone(),
            spots_left: raw_spots.max(0),
            max_tickets: max_tickets(activity),
            is_upcoming: lifecycle_service::is_upcoming(activity.date_time, now),
            is_sold_out: raw_spots <= 0,
            capacity_pct,
        }
    }
}

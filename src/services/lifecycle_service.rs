use chrono::NaiveDateTime;

use crate::errors::{Notice, NoticeKind};
use crate::models::{Booking, BookingStatus, CurrentUser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Upcoming,
    Today,
    Past,
}

impl Lifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Lifecycle::Upcoming => "upcoming",
            Lifecycle::Today => "today",
            Lifecycle::Past => "past",
        }
    }
}

impl From<BookingStatus> for Lifecycle {
    fn from(status: BookingStatus) -> Self {
        match status {
            BookingStatus::Upcoming => Lifecycle::Upcoming,
            BookingStatus::Today => Lifecycle::Today,
            BookingStatus::Past => Lifecycle::Past,
        }
    }
}

pub fn is_upcoming(timestamp: NaiveDateTime, now: NaiveDateTime) -> bool {
    timestamp > now
}

/// Client-side classification for activities. Booking status is owned by
/// the backend and is not re-derived here.
pub fn classify(timestamp: NaiveDateTime, now: NaiveDateTime) -> Lifecycle {
    if !is_upcoming(timestamp, now) {
        Lifecycle::Past
    } else if timestamp.date() == now.date() {
        Lifecycle::Today
    } else {
        Lifecycle::Upcoming
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelRefusal {
    StatusPast,
    AlreadyStarted,
    NotOwner,
}

impl CancelRefusal {
    pub fn notice(self) -> Notice {
        match self {
            CancelRefusal::StatusPast | CancelRefusal::AlreadyStarted => Notice::new(
                NoticeKind::Validation,
                "This booking can no longer be cancelled.",
            ),
            CancelRefusal::NotOwner => Notice::new(
                NoticeKind::Authorization,
                "Only the owner of a booking can cancel it.",
            ),
        }
    }
}

/// Returns the first reason a cancellation must be refused, if any.
/// Both the cached status and the live clock have to agree.
pub fn cancel_refusal(
    booking: &Booking,
    activity_time: NaiveDateTime,
    user: &CurrentUser,
    now: NaiveDateTime,
) -> Option<CancelRefusal> {
    if booking.status == BookingStatus::Past {
        return Some(CancelRefusal::StatusPast);
    }
    if !is_upcoming(activity_time, now) {
        return Some(CancelRefusal::AlreadyStarted);
    }
    if !user.is_admin && booking.user_id != user.id {
        return Some(CancelRefusal::NotOwner);
    }
    None
}

pub fn can_cancel(
    booking: &Booking,
    activity_time: NaiveDateTime,
    user: &CurrentUser,
    now: NaiveDateTime,
) -> bool {
    cancel_refusal(booking, activity_time, user, now).is_none()
}

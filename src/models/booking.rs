use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::Activity;

/// Assigned by the backend when the booking list is fetched; can be stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Upcoming,
    Today,
    Past,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Upcoming => "upcoming",
            BookingStatus::Today => "today",
            BookingStatus::Past => "past",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub activity_id: i64,
    pub user_id: i64,
    pub tickets_number: i64,
    pub status: BookingStatus,
    pub booked_at: NaiveDateTime,
    #[serde(default)]
    pub activity: Option<Activity>,
}

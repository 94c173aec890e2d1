#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::oneshot;

use marketplace_sync::errors::ApiError;
use marketplace_sync::models::{Activity, Booking, BookingStatus, FavoriteIds, ItemType};
use marketplace_sync::services::cross_tab_signal::{SignalStore, SqliteSignalStore};
use marketplace_sync::services::marketplace_api::Marketplace;

pub fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 7, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .unwrap()
}

pub fn activity(id: i64, max: i64, current: i64, when: NaiveDateTime) -> Activity {
    Activity {
        id,
        title: format!("Activity {}", id),
        description: None,
        price: 10.0,
        date_time: when,
        duration_minutes: 60,
        max_capacity: max,
        current_capacity: current,
        category: Some("outdoor".into()),
        location: None,
        image_url: None,
    }
}

type HeldReply = (i64, bool, oneshot::Sender<Result<(), ApiError>>);

/// In-memory backend. Capacity is enforced here the way the real backend
/// does it; favorite requests can be held and released one by one.
#[derive(Default)]
pub struct FakeMarketplace {
    pub activities: Mutex<Vec<Activity>>,
    pub bookings: Mutex<Vec<Booking>>,
    pub favorites: Mutex<FavoriteIds>,
    pub user_id: i64,
    calls: Mutex<HashMap<&'static str, usize>>,
    fail_next: Mutex<Option<ApiError>>,
    hold_favorites: AtomicBool,
    held: Mutex<Vec<HeldReply>>,
}

impl FakeMarketplace {
    pub fn with_activities(activities: Vec<Activity>) -> Arc<Self> {
        let fake = Self {
            user_id: 42,
            ..Default::default()
        };
        *fake.activities.lock() = activities;
        Arc::new(fake)
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().get(op).copied().unwrap_or(0)
    }

    pub fn fail_next(&self, err: ApiError) {
        *self.fail_next.lock() = Some(err);
    }

    pub fn hold_favorites(&self, hold: bool) {
        self.hold_favorites.store(hold, Ordering::SeqCst);
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }

    /// Releases the `index`-th held favorite request (in arrival order).
    pub fn release(&self, index: usize, reply: Result<(), ApiError>) {
        let (item_id, add, tx) = self.held.lock().remove(index);
        if reply.is_ok() {
            self.apply_favorite(item_id, add);
        }
        let _ = tx.send(reply);
    }

    pub async fn wait_held(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.held_count() < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("favorite requests never arrived");
    }

    fn record(&self, op: &'static str) -> Result<(), ApiError> {
        *self.calls.lock().entry(op).or_insert(0) += 1;
        match self.fail_next.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn apply_favorite(&self, item_id: i64, add: bool) {
        let mut favs = self.favorites.lock();
        favs.activities.retain(|id| *id != item_id);
        if add {
            favs.activities.push(item_id);
        }
    }

    async fn favorite(&self, op: &'static str, item_id: i64, add: bool) -> Result<(), ApiError> {
        self.record(op)?;
        if !self.hold_favorites.load(Ordering::SeqCst) {
            self.apply_favorite(item_id, add);
            return Ok(());
        }
        let (tx, rx) = oneshot::channel();
        self.held.lock().push((item_id, add, tx));
        rx.await.unwrap_or(Err(ApiError::Transport {
            url: "fake".into(),
            detail: "dropped".into(),
        }))
    }
}

#[async_trait]
impl Marketplace for FakeMarketplace {
    async fn fetch_activities(
        &self,
        _upcoming_only: bool,
        _search: Option<&str>,
    ) -> Result<Vec<Activity>, ApiError> {
        self.record("fetch_activities")?;
        Ok(self.activities.lock().clone())
    }

    async fn fetch_activity(&self, id: i64) -> Result<Activity, ApiError> {
        self.record("fetch_activity")?;
        self.activities
            .lock()
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn create_booking(
        &self,
        activity_id: i64,
        tickets_number: i64,
    ) -> Result<Booking, ApiError> {
        self.record("create_booking")?;
        let mut activities = self.activities.lock();
        let activity = activities
            .iter_mut()
            .find(|a| a.id == activity_id)
            .ok_or(ApiError::NotFound)?;
        if activity.max_capacity - activity.current_capacity < tickets_number {
            return Err(ApiError::CapacityExceeded);
        }
        activity.current_capacity += tickets_number;

        let mut bookings = self.bookings.lock();
        let booking = Booking {
            id: bookings.len() as i64 + 1,
            activity_id,
            user_id: self.user_id,
            tickets_number,
            status: BookingStatus::Upcoming,
            booked_at: at(1, 9),
            activity: Some(activity.clone()),
        };
        bookings.push(booking.clone());
        Ok(booking)
    }

    async fn cancel_booking(&self, booking_id: i64) -> Result<(), ApiError> {
        self.record("cancel_booking")?;
        let mut bookings = self.bookings.lock();
        let before = bookings.len();
        bookings.retain(|b| b.id != booking_id);
        if bookings.len() == before {
            return Err(ApiError::NotFound);
        }
        Ok(())
    }

    async fn fetch_my_bookings(&self) -> Result<Vec<Booking>, ApiError> {
        self.record("fetch_my_bookings")?;
        Ok(self.bookings.lock().clone())
    }

    async fn add_favorite(&self, item_id: i64, _item_type: ItemType) -> Result<(), ApiError> {
        self.favorite("add_favorite", item_id, true).await
    }

    async fn remove_favorite(&self, item_id: i64, _item_type: ItemType) -> Result<(), ApiError> {
        self.favorite("remove_favorite", item_id, false).await
    }

    async fn fetch_favorite_ids(
        &self,
        _item_type: Option<ItemType>,
    ) -> Result<FavoriteIds, ApiError> {
        self.record("fetch_favorite_ids")?;
        Ok(self.favorites.lock().clone())
    }
}

pub async fn memory_signal_store() -> Arc<dyn SignalStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    Arc::new(SqliteSignalStore::from_pool(pool).await.unwrap())
}

pub async fn wait_revision(rx: &mut tokio::sync::watch::Receiver<u64>) {
    tokio::time::timeout(Duration::from_secs(2), rx.changed())
        .await
        .expect("view never refreshed")
        .expect("view dropped");
}

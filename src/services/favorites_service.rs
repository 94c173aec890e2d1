//! Optimistic favoriting.
//!
//! A toggle flips the local set before the request resolves. Every flip is
//! recorded with the value it replaced, so a failure can restore it, and
//! once the last pending flip for an item settles the local value is reset
//! to what the backend last confirmed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::errors::{ApiError, Notice};
use crate::models::{FavoriteIds, ItemType};
use crate::services::cross_tab_signal::CrossTabSignal;
use crate::services::event_bus::{EventBus, Topic};
use crate::services::marketplace_api::Marketplace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimisticMutation {
    pub item_type: ItemType,
    pub item_id: i64,
    pub previous: bool,
    pub next: bool,
    pub seq: u64,
}

#[derive(Debug, Default)]
struct PendingItem {
    latest_seq: u64,
    outstanding: usize,
}

#[derive(Debug, Default)]
struct FavoritesState {
    local: HashMap<ItemType, HashSet<i64>>,
    confirmed: HashMap<ItemType, HashSet<i64>>,
    pending: HashMap<(ItemType, i64), PendingItem>,
    next_seq: u64,
    notice: Option<Notice>,
}

fn set_member(
    sets: &mut HashMap<ItemType, HashSet<i64>>,
    item_type: ItemType,
    id: i64,
    on: bool,
) {
    let set = sets.entry(item_type).or_default();
    if on {
        set.insert(id);
    } else {
        set.remove(&id);
    }
}

fn is_member(sets: &HashMap<ItemType, HashSet<i64>>, item_type: ItemType, id: i64) -> bool {
    sets.get(&item_type).is_some_and(|s| s.contains(&id))
}

impl FavoritesState {
    fn begin(&mut self, item_type: ItemType, item_id: i64) -> OptimisticMutation {
        let previous = is_member(&self.local, item_type, item_id);
        let next = !previous;
        self.next_seq += 1;
        let seq = self.next_seq;

        set_member(&mut self.local, item_type, item_id, next);
        let pending = self.pending.entry((item_type, item_id)).or_default();
        pending.latest_seq = seq;
        pending.outstanding += 1;

        OptimisticMutation {
            item_type,
            item_id,
            previous,
            next,
            seq,
        }
    }

    fn settle(&mut self, m: OptimisticMutation, outcome: &Result<(), ApiError>) {
        let key = (m.item_type, m.item_id);
        let is_latest = self
            .pending
            .get(&key)
            .is_some_and(|p| p.latest_seq == m.seq);

        match outcome {
            Ok(()) => set_member(&mut self.confirmed, m.item_type, m.item_id, m.next),
            Err(e) => {
                if is_latest {
                    set_member(&mut self.local, m.item_type, m.item_id, m.previous);
                }
                self.notice = Some(e.notice());
            }
        }

        let drained = match self.pending.get_mut(&key) {
            Some(p) => {
                p.outstanding = p.outstanding.saturating_sub(1);
                p.outstanding == 0
            }
            None => true,
        };
        if drained {
            self.pending.remove(&key);
            let confirmed = is_member(&self.confirmed, m.item_type, m.item_id);
            set_member(&mut self.local, m.item_type, m.item_id, confirmed);
        }
    }

    fn replace(&mut self, ids: &FavoriteIds) {
        for item_type in [ItemType::Product, ItemType::Activity] {
            let fresh: HashSet<i64> = ids.of(item_type).iter().copied().collect();
            let mut local = fresh.clone();
            // Items still in flight keep their optimistic value.
            for (pending_type, id) in self.pending.keys() {
                if *pending_type != item_type {
                    continue;
                }
                if is_member(&self.local, item_type, *id) {
                    local.insert(*id);
                } else {
                    local.remove(id);
                }
            }
            self.confirmed.insert(item_type, fresh);
            self.local.insert(item_type, local);
        }
    }
}

pub struct FavoritesCoordinator {
    api: Arc<dyn Marketplace>,
    bus: EventBus,
    signal: Option<Arc<CrossTabSignal>>,
    state: Mutex<FavoritesState>,
}

impl FavoritesCoordinator {
    pub fn new(
        api: Arc<dyn Marketplace>,
        bus: EventBus,
        signal: Option<Arc<CrossTabSignal>>,
    ) -> Self {
        Self {
            api,
            bus,
            signal,
            state: Mutex::new(FavoritesState::default()),
        }
    }

    /// Replaces both the local and confirmed sets with the backend's.
    pub async fn load(&self) -> Result<(), ApiError> {
        match self.api.fetch_favorite_ids(None).await {
            Ok(ids) => {
                self.state.lock().replace(&ids);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "favorites_load_failed");
                self.state.lock().notice = Some(e.notice());
                Err(e)
            }
        }
    }

    /// Flips the favorite flag for one item. Returns the value the backend
    /// confirmed, or the error after rolling back.
    pub async fn toggle(&self, item_id: i64, item_type: ItemType) -> Result<bool, ApiError> {
        let mutation = self.state.lock().begin(item_type, item_id);

        let outcome = if mutation.next {
            self.api.add_favorite(item_id, item_type).await
        } else {
            self.api.remove_favorite(item_id, item_type).await
        };

        self.state.lock().settle(mutation, &outcome);

        match outcome {
            Ok(()) => {
                info!(
                    item_id,
                    item_type = item_type.as_str(),
                    favorite = mutation.next,
                    "favorite_toggled"
                );
                self.bus.publish(Topic::FavoriteUpdated);
                if let Some(signal) = self.signal.as_ref() {
                    if let Err(e) = signal.notify().await {
                        warn!(error = %e, "favorites_cross_tab_notify_failed");
                    }
                }
                Ok(mutation.next)
            }
            Err(e) => {
                warn!(
                    item_id,
                    item_type = item_type.as_str(),
                    seq = mutation.seq,
                    error = %e,
                    "favorite_toggle_rolled_back"
                );
                Err(e)
            }
        }
    }

    pub fn is_favorite(&self, item_id: i64, item_type: ItemType) -> bool {
        is_member(&self.state.lock().local, item_type, item_id)
    }

    pub fn is_pending(&self, item_id: i64, item_type: ItemType) -> bool {
        self.state.lock().pending.contains_key(&(item_type, item_id))
    }

    /// Sorted ids currently shown as favorites.
    pub fn ids(&self, item_type: ItemType) -> Vec<i64> {
        let mut out: Vec<i64> = self
            .state
            .lock()
            .local
            .get(&item_type)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        out.sort_unstable();
        out
    }

    pub fn last_notice(&self) -> Option<Notice> {
        self.state.lock().notice.clone()
    }

    pub fn dismiss_notice(&self) {
        self.state.lock().notice = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ItemType = ItemType::Activity;

    fn fail() -> Result<(), ApiError> {
        Err(ApiError::Transport {
            url: "http://test".into(),
            detail: "offline".into(),
        })
    }

    #[test]
    fn single_failure_restores_previous() {
        let mut s = FavoritesState::default();
        let m = s.begin(A, 5);
        assert!(is_member(&s.local, A, 5));
        s.settle(m, &fail());
        assert!(!is_member(&s.local, A, 5));
        assert!(s.pending.is_empty());
        assert!(s.notice.is_some());
    }

    #[test]
    fn single_success_confirms() {
        let mut s = FavoritesState::default();
        let m = s.begin(A, 5);
        s.settle(m, &Ok(()));
        assert!(is_member(&s.local, A, 5));
        assert!(is_member(&s.confirmed, A, 5));
    }

    #[test]
    fn double_toggle_both_fail_in_reverse_order() {
        let mut s = FavoritesState::default();
        let first = s.begin(A, 5);
        let second = s.begin(A, 5);
        assert!(!is_member(&s.local, A, 5));

        s.settle(first, &fail());
        s.settle(second, &fail());
        assert!(!is_member(&s.local, A, 5));
    }

    #[test]
    fn double_toggle_ends_on_last_successful_response() {
        // add succeeds, remove fails: backend still has the favorite
        let mut s = FavoritesState::default();
        let add = s.begin(A, 5);
        let remove = s.begin(A, 5);
        s.settle(remove, &fail());
        s.settle(add, &Ok(()));
        assert!(is_member(&s.local, A, 5));

        // add fails, remove succeeds
        let mut s = FavoritesState::default();
        let add = s.begin(A, 9);
        let remove = s.begin(A, 9);
        s.settle(add, &fail());
        s.settle(remove, &Ok(()));
        assert!(!is_member(&s.local, A, 9));
    }

    #[test]
    fn reload_keeps_in_flight_items() {
        let mut s = FavoritesState::default();
        let _m = s.begin(A, 3);
        s.replace(&FavoriteIds {
            products: vec![1],
            activities: vec![8],
        });
        assert!(is_member(&s.local, A, 3));
        assert!(is_member(&s.local, A, 8));
        assert!(!is_member(&s.confirmed, A, 3));
        assert!(is_member(&s.local, ItemType::Product, 1));
    }
}

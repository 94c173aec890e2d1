mod common;

use std::sync::Arc;

use common::{memory_signal_store, wait_revision, FakeMarketplace};
use marketplace_sync::errors::{ApiError, NoticeKind};
use marketplace_sync::models::ItemType;
use marketplace_sync::services::cross_tab_signal::{CrossTabSignal, SignalOrigin};
use marketplace_sync::services::event_bus::{EventBus, Topic};
use marketplace_sync::services::favorites_service::FavoritesCoordinator;
use marketplace_sync::services::marketplace_api::Marketplace;
use marketplace_sync::services::view_reconciler::ViewStateReconciler;

const ACTIVITY: ItemType = ItemType::Activity;

fn offline() -> Result<(), ApiError> {
    Err(ApiError::Transport {
        url: "http://test".into(),
        detail: "offline".into(),
    })
}

fn coordinator(fake: &Arc<FakeMarketplace>, bus: &EventBus) -> Arc<FavoritesCoordinator> {
    let api: Arc<dyn Marketplace> = fake.clone();
    Arc::new(FavoritesCoordinator::new(api, bus.clone(), None))
}

#[tokio::test]
async fn toggle_is_visible_before_the_request_resolves() {
    let fake = FakeMarketplace::with_activities(vec![]);
    let bus = EventBus::new();
    let favs = coordinator(&fake, &bus);
    fake.hold_favorites(true);

    let task = tokio::spawn({
        let favs = favs.clone();
        async move { favs.toggle(5, ACTIVITY).await }
    });
    fake.wait_held(1).await;
    assert!(favs.is_favorite(5, ACTIVITY));
    assert!(favs.is_pending(5, ACTIVITY));

    fake.release(0, Ok(()));
    assert!(task.await.unwrap().unwrap());
    assert!(favs.is_favorite(5, ACTIVITY));
    assert!(!favs.is_pending(5, ACTIVITY));
    assert_eq!(fake.favorites.lock().activities, vec![5]);
}

#[tokio::test]
async fn failed_toggle_rolls_back_and_reports() {
    let fake = FakeMarketplace::with_activities(vec![]);
    fake.favorites.lock().activities = vec![3];
    let bus = EventBus::new();
    let favs = coordinator(&fake, &bus);
    favs.load().await.unwrap();
    assert!(favs.is_favorite(3, ACTIVITY));

    fake.fail_next(ApiError::Unauthorized);
    let err = favs.toggle(3, ACTIVITY).await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized));
    assert!(favs.is_favorite(3, ACTIVITY));
    assert_eq!(
        favs.last_notice().map(|n| n.kind),
        Some(NoticeKind::Authorization)
    );
    favs.dismiss_notice();
    assert!(favs.last_notice().is_none());
}

/// Two quick toggles of the same item. Returns the local value and the
/// backend's value once both requests have settled.
async fn double_toggle(
    first: Result<(), ApiError>,
    second: Result<(), ApiError>,
    reverse: bool,
) -> (bool, bool) {
    let fake = FakeMarketplace::with_activities(vec![]);
    let bus = EventBus::new();
    let favs = coordinator(&fake, &bus);
    fake.hold_favorites(true);

    let t1 = tokio::spawn({
        let favs = favs.clone();
        async move { favs.toggle(9, ACTIVITY).await }
    });
    fake.wait_held(1).await;
    let t2 = tokio::spawn({
        let favs = favs.clone();
        async move { favs.toggle(9, ACTIVITY).await }
    });
    fake.wait_held(2).await;
    assert!(!favs.is_favorite(9, ACTIVITY));

    if reverse {
        fake.release(1, second);
        let _ = t2.await.unwrap();
        fake.release(0, first);
        let _ = t1.await.unwrap();
    } else {
        fake.release(0, first);
        let _ = t1.await.unwrap();
        fake.release(0, second);
        let _ = t2.await.unwrap();
    }

    let server_has_it = fake.favorites.lock().activities.contains(&9);
    (favs.is_favorite(9, ACTIVITY), server_has_it)
}

#[tokio::test]
async fn double_toggle_matches_backend_in_every_settle_order() {
    for reverse in [false, true] {
        for (first_ok, second_ok) in [(true, true), (true, false), (false, true), (false, false)] {
            let first = if first_ok { Ok(()) } else { offline() };
            let second = if second_ok { Ok(()) } else { offline() };
            let (local, server) = double_toggle(first, second, reverse).await;
            assert_eq!(
                local, server,
                "first_ok={first_ok} second_ok={second_ok} reverse={reverse}"
            );
        }
    }
}

#[tokio::test]
async fn success_publishes_topic_and_cross_tab_signal() {
    let fake = FakeMarketplace::with_activities(vec![]);
    let bus = EventBus::new();
    let store = memory_signal_store().await;

    // Two contexts sharing one store and one backend.
    let signal_a = Arc::new(CrossTabSignal::favorites(store.clone()).await.unwrap());
    let signal_b = Arc::new(CrossTabSignal::favorites(store.clone()).await.unwrap());
    let mut a_local = signal_a.subscribe();

    let api: Arc<dyn Marketplace> = fake.clone();
    let favs_a = FavoritesCoordinator::new(api, bus.clone(), Some(signal_a.clone()));

    let same_tab = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let s = same_tab.clone();
    let _sub = bus.subscribe(Topic::FavoriteUpdated, move || {
        s.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    });

    let tab_b_bus = EventBus::new();
    let b_api = fake.clone();
    let mut tab_b_view = ViewStateReconciler::new("tab_b_favorites", move || {
        let api = b_api.clone();
        async move { api.fetch_favorite_ids(Some(ItemType::Activity)).await }
    });
    tab_b_view.mount(&tab_b_bus, &[Topic::FavoriteUpdated]).await;
    tab_b_view.follow_signal(signal_b.subscribe());
    assert!(tab_b_view.snapshot().unwrap().activities.is_empty());
    let mut b_rev = tab_b_view.revisions();

    assert!(favs_a.toggle(11, ACTIVITY).await.unwrap());
    assert_eq!(same_tab.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(a_local.recv().await.unwrap().origin, SignalOrigin::Local);

    // Tab B's bus never fired; only the shared store tells it.
    let seen = signal_b.poll_once().await.unwrap().unwrap();
    assert_eq!(seen.origin, SignalOrigin::Sibling);
    wait_revision(&mut b_rev).await;
    assert_eq!(tab_b_view.snapshot().unwrap().activities, vec![11]);
}

use std::collections::HashSet;
use std::env;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use dotenvy::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use marketplace_sync::config::Config;
use marketplace_sync::models::{Activity, FavoriteIds, ItemType};
use marketplace_sync::services::availability_service::{self, ActivityView};
use marketplace_sync::services::cross_tab_signal::{CrossTabSignal, SqliteSignalStore};
use marketplace_sync::services::event_bus::{EventBus, Topic};
use marketplace_sync::services::list_pipeline::{
    self, ListQuery, PageToken, SortKey, StatusFilter,
};
use marketplace_sync::services::marketplace_api::{HttpMarketplace, Marketplace};
use marketplace_sync::services::view_reconciler::ViewStateReconciler;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    info!(api = %config.api_base_url, page_size = config.page_size, "catalog starting");

    let api: Arc<dyn Marketplace> = Arc::new(HttpMarketplace::from_config(&config));
    let bus = EventBus::new();
    let query = query_from_env();

    let activities_api = Arc::clone(&api);
    let mut activities = ViewStateReconciler::new("catalog", move || {
        let api = Arc::clone(&activities_api);
        async move { api.fetch_activities(false, None).await }
    });
    if !activities
        .mount(&bus, &[Topic::BookingCreated, Topic::BookingCancelled])
        .await
    {
        if let Some(notice) = activities.last_notice() {
            eprintln!("{}", notice.message);
        }
        std::process::exit(1);
    }

    let favorites_api = Arc::clone(&api);
    let mut favorites = ViewStateReconciler::new("catalog_favorites", move || {
        let api = Arc::clone(&favorites_api);
        async move { api.fetch_favorite_ids(Some(ItemType::Activity)).await }
    });
    favorites.mount(&bus, &[Topic::FavoriteUpdated]).await;

    render(&activities, &favorites, &query, &config);

    if env::var("WATCH").ok().as_deref() != Some("1") {
        return;
    }

    let store = SqliteSignalStore::connect(&config.signal_database_url)
        .await
        .expect("cannot open signal database");
    let signal = Arc::new(
        CrossTabSignal::favorites(Arc::new(store))
            .await
            .expect("cannot read favorites signal"),
    );
    favorites.follow_signal(signal.subscribe());
    let _watcher = signal.spawn_watcher(config.signal_poll_interval);
    info!(key = signal.key(), "watching for favorite changes in sibling contexts");

    let mut revisions = favorites.revisions();
    while revisions.changed().await.is_ok() {
        render(&activities, &favorites, &query, &config);
    }
    warn!("favorites view closed");
}

fn query_from_env() -> ListQuery {
    let mut query = ListQuery::new();
    if let Ok(search) = env::var("SEARCH") {
        query.set_search(search);
    }
    query.set_category(env::var("CATEGORY").ok());
    query.set_status(StatusFilter::parse(env::var("STATUS").ok().as_deref()));
    query.set_sort(env::var("SORT").ok().as_deref().and_then(SortKey::parse));
    // Page last: every other setter resets it.
    let page = env::var("PAGE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    query.set_page(page);
    query
}

fn render(
    activities: &ViewStateReconciler<Vec<Activity>>,
    favorites: &ViewStateReconciler<FavoriteIds>,
    query: &ListQuery,
    config: &Config,
) {
    let now: NaiveDateTime = Local::now().naive_local();
    let items = activities.snapshot().unwrap_or_default();
    let starred: HashSet<i64> = favorites
        .snapshot()
        .map(|f| f.activities.into_iter().collect())
        .unwrap_or_default();

    let categories = list_pipeline::category_options(&items);
    let page = list_pipeline::run(&items, query, config.page_size, now);

    println!();
    println!("Categories: {}", categories.join(", "));
    for activity in &page.items {
        let view = ActivityView::derive(activity, now);
        let verdict = availability_service::check_availability(activity, 1, now);
        println!(
            "{} #{:<5} {:<32} {}  €{:>7.2}  {:>3} left  [{}]",
            if starred.contains(&activity.id) { "★" } else { " " },
            activity.id,
            activity.title,
            activity.date_time.format("%Y-%m-%d %H:%M"),
            activity.price,
            view.spots_left,
            verdict.as_str()
        );
    }

    let window: Vec<String> = page
        .window
        .iter()
        .map(|t| match t {
            PageToken::Page(n) if *n == page.meta.current_page => format!("[{}]", n),
            PageToken::Page(n) => n.to_string(),
            PageToken::Ellipsis => "…".to_string(),
        })
        .collect();
    println!(
        "Page {}/{} ({} items): {}",
        page.meta.current_page,
        page.meta.total_pages,
        page.meta.total_items,
        window.join(" ")
    );
}

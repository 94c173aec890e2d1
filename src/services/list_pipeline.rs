//! Filter, sort, paginate and page-window stages shared by every list view.
//!
//! Every view (catalog, profile bookings, favorites) runs the same stages so
//! two views showing the same collection with the same query always agree.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::NaiveDateTime;

use crate::models::{Activity, Booking};
use crate::services::availability_service;
use crate::services::lifecycle_service::{self, Lifecycle};

pub const DEFAULT_PAGE_SIZE: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Upcoming,
    Past,
}

impl StatusFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Upcoming => "upcoming",
            StatusFilter::Past => "past",
        }
    }

    pub fn parse(input: Option<&str>) -> StatusFilter {
        match input.map(str::trim).unwrap_or("all") {
            "upcoming" => StatusFilter::Upcoming,
            "past" => StatusFilter::Past,
            _ => StatusFilter::All,
        }
    }

    fn admits(self, lifecycle: Lifecycle) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Upcoming => lifecycle != Lifecycle::Past,
            StatusFilter::Past => lifecycle == Lifecycle::Past,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Date,
    DateDesc,
    PriceAsc,
    PriceDesc,
    Capacity,
    Duration,
    NameAsc,
    NameDesc,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Date => "date",
            SortKey::DateDesc => "date-desc",
            SortKey::PriceAsc => "price-asc",
            SortKey::PriceDesc => "price-desc",
            SortKey::Capacity => "capacity",
            SortKey::Duration => "duration",
            SortKey::NameAsc => "name-asc",
            SortKey::NameDesc => "name-desc",
        }
    }

    pub fn parse(input: &str) -> Option<SortKey> {
        match input.trim() {
            "date" => Some(SortKey::Date),
            "date-desc" => Some(SortKey::DateDesc),
            "price-asc" => Some(SortKey::PriceAsc),
            "price-desc" => Some(SortKey::PriceDesc),
            "capacity" => Some(SortKey::Capacity),
            "duration" => Some(SortKey::Duration),
            "name-asc" => Some(SortKey::NameAsc),
            "name-desc" => Some(SortKey::NameDesc),
            _ => None,
        }
    }

    fn compare<T: ListItem>(self, a: &T, b: &T) -> Ordering {
        match self {
            SortKey::Date => a.timestamp().cmp(&b.timestamp()),
            SortKey::DateDesc => b.timestamp().cmp(&a.timestamp()),
            SortKey::PriceAsc => cmp_f64(a.price(), b.price()),
            SortKey::PriceDesc => cmp_f64(b.price(), a.price()),
            SortKey::Capacity => b.spots_left().cmp(&a.spots_left()),
            SortKey::Duration => a.duration_minutes().cmp(&b.duration_minutes()),
            SortKey::NameAsc => a.title().to_lowercase().cmp(&b.title().to_lowercase()),
            SortKey::NameDesc => b.title().to_lowercase().cmp(&a.title().to_lowercase()),
        }
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// What a collection has to expose to run through the pipeline.
pub trait ListItem {
    fn title(&self) -> &str;
    fn description(&self) -> Option<&str>;
    fn category(&self) -> Option<&str>;
    fn timestamp(&self) -> NaiveDateTime;
    fn price(&self) -> f64;
    fn spots_left(&self) -> i64;
    fn duration_minutes(&self) -> i64;
    fn lifecycle(&self, now: NaiveDateTime) -> Lifecycle;

    fn default_sort() -> SortKey {
        SortKey::Date
    }
}

impl ListItem for Activity {
    fn title(&self) -> &str {
        &self.title
    }
    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }
    fn timestamp(&self) -> NaiveDateTime {
        self.date_time
    }
    fn price(&self) -> f64 {
        self.price
    }
    fn spots_left(&self) -> i64 {
        availability_service::spots_left(self)
    }
    fn duration_minutes(&self) -> i64 {
        self.duration_minutes
    }
    fn lifecycle(&self, now: NaiveDateTime) -> Lifecycle {
        lifecycle_service::classify(self.date_time, now)
    }
}

// Bookings list by booking time, newest first. Their lifecycle is the
// backend-assigned status.
impl ListItem for Booking {
    fn title(&self) -> &str {
        self.activity.as_ref().map(|a| a.title.as_str()).unwrap_or("")
    }
    fn description(&self) -> Option<&str> {
        self.activity.as_ref().and_then(|a| a.description.as_deref())
    }
    fn category(&self) -> Option<&str> {
        self.activity.as_ref().and_then(|a| a.category.as_deref())
    }
    fn timestamp(&self) -> NaiveDateTime {
        self.booked_at
    }
    fn price(&self) -> f64 {
        self.activity
            .as_ref()
            .map(|a| a.price * self.tickets_number as f64)
            .unwrap_or(0.0)
    }
    fn spots_left(&self) -> i64 {
        self.activity
            .as_ref()
            .map(availability_service::spots_left)
            .unwrap_or(0)
    }
    fn duration_minutes(&self) -> i64 {
        self.activity
            .as_ref()
            .map(|a| a.duration_minutes)
            .unwrap_or(0)
    }
    fn lifecycle(&self, _now: NaiveDateTime) -> Lifecycle {
        self.status.into()
    }

    fn default_sort() -> SortKey {
        SortKey::DateDesc
    }
}

/// The inputs of one list view. Any change to a filter or the sort key
/// sends the view back to page 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    search: String,
    category: Option<String>,
    status: StatusFilter,
    sort: Option<SortKey>,
    page: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            category: None,
            status: StatusFilter::All,
            sort: None,
            page: 1,
        }
    }
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn status(&self) -> StatusFilter {
        self.status
    }

    pub fn sort(&self) -> Option<SortKey> {
        self.sort
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn set_search(&mut self, text: impl Into<String>) {
        self.search = text.into();
        self.page = 1;
    }

    /// `None` or an empty string clears the filter.
    pub fn set_category(&mut self, category: Option<String>) {
        self.category = category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        self.page = 1;
    }

    pub fn set_status(&mut self, status: StatusFilter) {
        self.status = status;
        self.page = 1;
    }

    /// Replaces whatever sort was active; only one key is ever active.
    pub fn set_sort(&mut self, sort: Option<SortKey>) {
        self.sort = sort;
        self.page = 1;
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    fn matches<T: ListItem>(&self, item: &T, now: NaiveDateTime) -> bool {
        if !self.status.admits(item.lifecycle(now)) {
            return false;
        }

        if let Some(category) = self.category.as_deref() {
            if item.category().map(str::trim) != Some(category) {
                return false;
            }
        }

        let needle = self.search.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        [Some(item.title()), item.description(), item.category()]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageToken {
    Page(usize),
    Ellipsis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMeta {
    pub total_items: usize,
    pub total_pages: usize,
    pub current_page: usize,
    pub page_size: usize,
}

#[derive(Debug, Clone)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
    pub window: Vec<PageToken>,
}

/// Sorted distinct categories of the unfiltered collection.
pub fn category_options<T: ListItem>(items: &[T]) -> Vec<String> {
    items
        .iter()
        .filter_map(|i| i.category())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn run<T: ListItem + Clone>(
    items: &[T],
    query: &ListQuery,
    page_size: usize,
    now: NaiveDateTime,
) -> ListPage<T> {
    let page_size = page_size.max(1);

    let mut filtered: Vec<&T> = items.iter().filter(|i| query.matches(*i, now)).collect();

    let sort = query.sort.unwrap_or_else(T::default_sort);
    filtered.sort_by(|a, b| sort.compare(*a, *b));

    let total_items = filtered.len();
    let total_pages = total_items.div_ceil(page_size);
    let current_page = query.page.clamp(1, total_pages.max(1));

    let page_items = filtered
        .into_iter()
        .skip((current_page - 1) * page_size)
        .take(page_size)
        .cloned()
        .collect();

    ListPage {
        items: page_items,
        meta: PageMeta {
            total_items,
            total_pages,
            current_page,
            page_size,
        },
        window: page_window(total_pages, current_page),
    }
}

pub fn page_window(total_pages: usize, current_page: usize) -> Vec<PageToken> {
    use PageToken::{Ellipsis, Page};

    if total_pages <= 5 {
        return (1..=total_pages).map(Page).collect();
    }
    if current_page <= 3 {
        return vec![Page(1), Page(2), Page(3), Page(4), Ellipsis, Page(total_pages)];
    }
    if current_page >= total_pages - 2 {
        let mut out = vec![Page(1), Ellipsis];
        out.extend((total_pages - 3..=total_pages).map(Page));
        return out;
    }
    vec![
        Page(1),
        Ellipsis,
        Page(current_page - 1),
        Page(current_page),
        Page(current_page + 1),
        Ellipsis,
        Page(total_pages),
    ]
}

//! Per-view controller that keeps one view's locally fetched copy in step
//! with the rest of the app.
//!
//! A reconciler never trusts event payloads: a bus topic or cross-tab
//! change only triggers a fresh fetch through the view's loader. Responses
//! race freely; the last one to resolve is applied. Anything that resolves
//! after `unmount` (or during a later mount) is dropped.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::{ApiError, Notice};
use crate::services::cross_tab_signal::SignalChange;
use crate::services::event_bus::{EventBus, Subscription, Topic};

type Loader<S> = Arc<dyn Fn() -> BoxFuture<'static, Result<S, ApiError>> + Send + Sync>;

struct ViewState<S> {
    data: Option<S>,
    notice: Option<Notice>,
}

struct Shared<S> {
    name: &'static str,
    loader: Loader<S>,
    mounted: AtomicBool,
    epoch: AtomicU64,
    state: Mutex<ViewState<S>>,
    revision: watch::Sender<u64>,
}

impl<S: Send + 'static> Shared<S> {
    async fn refresh(self: Arc<Self>) -> bool {
        if !self.mounted.load(Ordering::Acquire) {
            return false;
        }
        let epoch = self.epoch.load(Ordering::Acquire);

        let result = (self.loader)().await;

        // `unmount` flips the flags under this lock, so nothing is applied
        // once it has returned.
        let mut state = self.state.lock();
        if !self.mounted.load(Ordering::Acquire) || self.epoch.load(Ordering::Acquire) != epoch {
            debug!(view = self.name, "view_response_discarded");
            return false;
        }

        match result {
            Ok(data) => {
                state.data = Some(data);
                state.notice = None;
                drop(state);
                self.revision.send_modify(|r| *r += 1);
                true
            }
            Err(e) => {
                warn!(view = self.name, error = %e, "view_refresh_failed");
                state.notice = Some(e.notice());
                false
            }
        }
    }
}

impl<S> Shared<S> {
    fn retire(&self) {
        let _state = self.state.lock();
        self.mounted.store(false, Ordering::Release);
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }
}

pub struct ViewStateReconciler<S> {
    shared: Arc<Shared<S>>,
    subscriptions: Vec<Subscription>,
    followers: Vec<JoinHandle<()>>,
}

impl<S: Clone + Send + 'static> ViewStateReconciler<S> {
    pub fn new<F, Fut>(name: &'static str, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, ApiError>> + Send + 'static,
    {
        let loader: Loader<S> = Arc::new(move || loader().boxed());
        let (revision, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                name,
                loader,
                mounted: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                state: Mutex::new(ViewState {
                    data: None,
                    notice: None,
                }),
                revision,
            }),
            subscriptions: Vec::new(),
            followers: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    /// Subscribes to `topics` and performs the initial fetch. Returns whether
    /// the initial fetch was applied. Must be called inside a tokio runtime.
    pub async fn mount(&mut self, bus: &EventBus, topics: &[Topic]) -> bool {
        if self.is_mounted() {
            return self.refresh().await;
        }
        self.shared.epoch.fetch_add(1, Ordering::AcqRel);
        self.shared.mounted.store(true, Ordering::Release);

        let handle = Handle::current();
        for &topic in topics {
            let shared = Arc::clone(&self.shared);
            let handle = handle.clone();
            let sub = bus.subscribe(topic, move || {
                debug!(view = shared.name, topic = topic.as_str(), "view_invalidated");
                handle.spawn(Arc::clone(&shared).refresh());
            });
            self.subscriptions.push(sub);
        }

        self.refresh().await
    }

    /// Refetches on every change seen on a cross-tab channel while mounted.
    pub fn follow_signal(&mut self, mut changes: broadcast::Receiver<SignalChange>) {
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        debug!(view = shared.name, key = %change.key, "view_signal_received");
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(view = shared.name, skipped, "view_signal_lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                Arc::clone(&shared).refresh().await;
            }
        });
        self.followers.push(task);
    }

    /// Stops all deliveries. In-flight fetches are left to finish and their
    /// results are discarded.
    pub fn unmount(&mut self) {
        self.shared.retire();
        self.subscriptions.clear();
        for task in self.followers.drain(..) {
            task.abort();
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.shared.mounted.load(Ordering::Acquire)
    }

    pub async fn refresh(&self) -> bool {
        Arc::clone(&self.shared).refresh().await
    }

    pub fn snapshot(&self) -> Option<S> {
        self.shared.state.lock().data.clone()
    }

    pub fn last_notice(&self) -> Option<Notice> {
        self.shared.state.lock().notice.clone()
    }

    pub fn dismiss_notice(&self) {
        self.shared.state.lock().notice = None;
    }

    /// Ticks once per applied response.
    pub fn revisions(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }
}

impl<S> Drop for ViewStateReconciler<S> {
    fn drop(&mut self) {
        self.shared.retire();
        self.subscriptions.clear();
        for task in self.followers.drain(..) {
            task.abort();
        }
    }
}

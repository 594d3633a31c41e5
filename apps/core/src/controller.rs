use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::model::{normalize_for_search, WindowEntry};
use crate::registry::{ListenerId, WindowRegistry};
use crate::search::filter_windows;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("failed to start search worker: {0}")]
    Worker(#[from] std::io::Error),
}

/// Result set delivered to observers after a recomputation changed what a
/// switcher should display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsUpdate {
    pub generation: u64,
    pub query: String,
    pub matches: Arc<[WindowEntry]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub type ResultsObserver = Arc<dyn Fn(&ResultsUpdate) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Ask the registry to re-enumerate before matching a new query.
    pub refresh_on_query: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            refresh_on_query: true,
        }
    }
}

impl From<&Config> for ControllerOptions {
    fn from(config: &Config) -> Self {
        Self {
            refresh_on_query: config.refresh_on_query,
        }
    }
}

enum Request {
    Recompute { refresh: bool },
    Shutdown,
}

struct SearchState {
    query: String,
    requested_generation: u64,
}

struct Published {
    generation: u64,
    // Generation whose observers have all run; `wait_until_settled` keys on it.
    delivered_generation: u64,
    query: String,
    matches: Arc<[WindowEntry]>,
}

struct Shared {
    registry: Arc<dyn WindowRegistry>,
    options: ControllerOptions,
    state: Mutex<SearchState>,
    published: Mutex<Published>,
    settled: Condvar,
    observers: Mutex<Vec<(ObserverId, ResultsObserver)>>,
    next_observer_id: AtomicU64,
}

/// Keeps the list of windows matching the current query in sync with the
/// registry.
///
/// Query changes and registry notifications only bump a generation counter
/// and queue a request; one background worker does the matching. The worker
/// coalesces queued requests and always computes against the latest query,
/// and a result whose generation is not newer than the last published one is
/// dropped, so published results never go back to an older query.
pub struct SearchController {
    shared: Arc<Shared>,
    requests: Sender<Request>,
    worker: Option<JoinHandle<()>>,
    registry_listener: ListenerId,
}

impl SearchController {
    pub fn new(
        registry: Arc<dyn WindowRegistry>,
        options: ControllerOptions,
    ) -> Result<Self, ControllerError> {
        let shared = Arc::new(Shared {
            registry,
            options,
            state: Mutex::new(SearchState {
                query: String::new(),
                requested_generation: 0,
            }),
            published: Mutex::new(Published {
                generation: 0,
                delivered_generation: 0,
                query: String::new(),
                matches: Arc::from(Vec::new()),
            }),
            settled: Condvar::new(),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(1),
        });

        let (requests, inbox) = mpsc::channel();
        let worker = std::thread::Builder::new()
            .name("windowwalker-search".to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                move || run_worker(&shared, &inbox)
            })?;

        let listener_state: Weak<Shared> = Arc::downgrade(&shared);
        let listener_requests = requests.clone();
        let registry_listener = shared.registry.subscribe(Arc::new(move || {
            if let Some(shared) = listener_state.upgrade() {
                shared.request_recompute(&listener_requests, false);
            }
        }));

        let controller = Self {
            shared,
            requests,
            worker: Some(worker),
            registry_listener,
        };
        controller.notify_windows_changed();
        Ok(controller)
    }

    /// Stores the case-folded query and schedules a recomputation. Setting
    /// the query it already holds is a no-op.
    pub fn set_query(&self, text: &str) {
        let normalized = normalize_for_search(text);
        {
            let mut state = lock(&self.shared.state);
            if state.query == normalized {
                tracing::debug!(query = %normalized, "query unchanged; skipping recompute");
                return;
            }
            state.query = normalized;
            state.requested_generation += 1;
        }
        self.shared
            .send(&self.requests, self.shared.options.refresh_on_query);
    }

    pub fn clear_query(&self) {
        self.set_query("");
    }

    /// Query as last set, which may not have been published yet.
    pub fn query(&self) -> String {
        lock(&self.shared.state).query.clone()
    }

    /// Copy of the last published match list.
    pub fn matches(&self) -> Vec<WindowEntry> {
        lock(&self.shared.published).matches.to_vec()
    }

    pub fn current_results(&self) -> ResultsUpdate {
        let published = lock(&self.shared.published);
        ResultsUpdate {
            generation: published.generation,
            query: published.query.clone(),
            matches: Arc::clone(&published.matches),
        }
    }

    pub fn published_generation(&self) -> u64 {
        lock(&self.shared.published).generation
    }

    /// Entry point for registry change notifications. Recomputes against a
    /// fresh snapshot without forcing a registry refresh.
    pub fn notify_windows_changed(&self) {
        self.shared.request_recompute(&self.requests, false);
    }

    /// Registers an observer. It runs on the search worker after each
    /// recomputation whose results differ from the previously published ones.
    /// A panicking observer is logged and skipped; it stays registered.
    ///
    /// Observers must not wait on the controller: [`Self::wait_until_settled`]
    /// called from an observer returns `false` immediately.
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&ResultsUpdate) + Send + Sync + 'static,
    {
        let id = ObserverId(self.shared.next_observer_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.shared.observers).push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = lock(&self.shared.observers);
        let before = observers.len();
        observers.retain(|(known, _)| *known != id);
        observers.len() != before
    }

    pub fn subscribe_channel(&self) -> Receiver<ResultsUpdate> {
        let (sender, receiver) = mpsc::channel();
        self.subscribe(move |update| {
            let _ = sender.send(update.clone());
        });
        receiver
    }

    /// Blocks until every scheduled recomputation has been published and its
    /// observers have run. Returns false if `timeout` elapses first, or at
    /// once when called on the search worker (from inside an observer).
    pub fn wait_until_settled(&self, timeout: Duration) -> bool {
        if self.on_worker_thread() {
            let requested = lock(&self.shared.state).requested_generation;
            return lock(&self.shared.published).delivered_generation >= requested;
        }

        let deadline = Instant::now() + timeout;
        let mut published = lock(&self.shared.published);
        loop {
            let requested = lock(&self.shared.state).requested_generation;
            if published.delivered_generation >= requested {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .shared
                .settled
                .wait_timeout(published, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            published = guard;
        }
    }

    fn on_worker_thread(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| worker.thread().id() == std::thread::current().id())
    }
}

impl Drop for SearchController {
    fn drop(&mut self) {
        self.shared.registry.unsubscribe(self.registry_listener);
        let _ = self.requests.send(Request::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() != std::thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl Shared {
    fn request_recompute(&self, requests: &Sender<Request>, refresh: bool) {
        lock(&self.state).requested_generation += 1;
        self.send(requests, refresh);
    }

    fn send(&self, requests: &Sender<Request>, refresh: bool) {
        if requests.send(Request::Recompute { refresh }).is_err() {
            tracing::debug!("search worker stopped; dropping recompute request");
        }
    }

    fn recompute(&self, refresh: bool) {
        if refresh {
            if let Err(error) = self.registry.refresh() {
                tracing::warn!(
                    registry = self.registry.registry_name(),
                    %error,
                    "window registry refresh failed; matching last known windows"
                );
            }
        }

        let (generation, query) = {
            let state = lock(&self.state);
            (state.requested_generation, state.query.clone())
        };

        let windows = match self.registry.snapshot() {
            Ok(windows) => windows,
            Err(error) => {
                tracing::warn!(
                    registry = self.registry.registry_name(),
                    %error,
                    "window registry unavailable; publishing empty results"
                );
                Vec::new()
            }
        };

        let matches: Arc<[WindowEntry]> = filter_windows(&windows, &query).into();
        tracing::debug!(
            generation,
            query = %query,
            windows = windows.len(),
            matches = matches.len(),
            "recomputed window matches"
        );
        self.publish(generation, query, matches);
    }

    fn publish(&self, generation: u64, query: String, matches: Arc<[WindowEntry]>) {
        let update = {
            let mut published = lock(&self.published);
            if generation <= published.generation {
                tracing::debug!(
                    generation,
                    published = published.generation,
                    "discarding superseded results"
                );
                return;
            }

            let changed = published.query != query || published.matches != matches;
            published.generation = generation;
            published.query = query;
            published.matches = matches;
            changed.then(|| ResultsUpdate {
                generation,
                query: published.query.clone(),
                matches: Arc::clone(&published.matches),
            })
        };

        if let Some(update) = update {
            let observers: Vec<ResultsObserver> = lock(&self.observers)
                .iter()
                .map(|(_, observer)| Arc::clone(observer))
                .collect();
            for observer in observers {
                if panic::catch_unwind(AssertUnwindSafe(|| observer(&update))).is_err() {
                    tracing::warn!(
                        generation,
                        query = %update.query,
                        "results observer panicked; continuing with the next one"
                    );
                }
            }
        }

        let mut published = lock(&self.published);
        published.delivered_generation = published.delivered_generation.max(generation);
        self.settled.notify_all();
    }
}

fn run_worker(shared: &Shared, inbox: &Receiver<Request>) {
    while let Ok(request) = inbox.recv() {
        let Request::Recompute { mut refresh } = request else {
            break;
        };

        // Everything queued behind this request is folded into one pass that
        // reads the latest query.
        loop {
            match inbox.try_recv() {
                Ok(Request::Recompute { refresh: queued }) => refresh |= queued,
                Ok(Request::Shutdown) => return,
                Err(_) => break,
            }
        }

        shared.recompute(refresh);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{ControllerOptions, SearchController};
    use crate::model::{WindowEntry, WindowHandle};
    use crate::registry::InMemoryRegistry;

    const SETTLE: Duration = Duration::from_secs(5);

    #[test]
    fn initial_results_list_titled_windows() {
        let registry = Arc::new(InMemoryRegistry::deterministic_fixture());
        let controller = SearchController::new(registry, ControllerOptions::default()).unwrap();

        assert!(controller.wait_until_settled(SETTLE));
        let titles: Vec<String> = controller
            .matches()
            .into_iter()
            .map(|entry| entry.title)
            .collect();
        assert_eq!(
            titles,
            vec![
                "Visual Studio Code",
                "Windows Terminal",
                "Untitled - Notepad",
                "Inbox - Outlook",
            ]
        );
    }

    #[test]
    fn query_is_case_folded() {
        let registry = Arc::new(InMemoryRegistry::new(Vec::new()));
        let controller = SearchController::new(registry, ControllerOptions::default()).unwrap();

        controller.set_query("VsC");
        assert_eq!(controller.query(), "vsc");
    }

    #[test]
    fn matches_returns_an_independent_copy() {
        let registry = Arc::new(InMemoryRegistry::new(vec![WindowEntry::new(
            WindowHandle(1),
            "Notepad",
            "notepad",
        )]));
        let controller = SearchController::new(registry, ControllerOptions::default()).unwrap();
        assert!(controller.wait_until_settled(SETTLE));

        let mut copy = controller.matches();
        copy.clear();

        assert_eq!(controller.matches().len(), 1);
    }

    #[test]
    fn superseded_results_are_discarded() {
        let registry = Arc::new(InMemoryRegistry::deterministic_fixture());
        let controller = SearchController::new(registry, ControllerOptions::default()).unwrap();
        controller.set_query("code");
        assert!(controller.wait_until_settled(SETTLE));
        let current = controller.current_results();
        let updates = controller.subscribe_channel();

        controller
            .shared
            .publish(current.generation, "stale".to_string(), Arc::from(Vec::new()));
        controller.shared.publish(0, "older".to_string(), Arc::from(Vec::new()));

        assert_eq!(controller.current_results(), current);
        assert!(updates.try_recv().is_err());
    }

    #[test]
    fn unsubscribe_reports_unknown_ids() {
        let registry = Arc::new(InMemoryRegistry::new(Vec::new()));
        let controller = SearchController::new(registry, ControllerOptions::default()).unwrap();

        let id = controller.subscribe(|_| {});
        assert!(controller.unsubscribe(id));
        assert!(!controller.unsubscribe(id));
    }
}

//! The download scheduler.
//!
//! [`Downloader`] accepts download requests from any number of callers,
//! coalesces concurrent requests for the same URL onto one fetch, drives
//! the queue one item at a time, retries transient failures a bounded
//! number of times by requeueing to the tail, persists completed
//! `lookup_key -> local_name` mappings, and sweeps stale files from disk
//! once per instance.
//!
//! # Concurrency model
//!
//! - All queue and store mutation happens under one mutex, from the
//!   scheduler's execution context; callers only enqueue and receive
//!   callbacks.
//! - The `busy` flag is the single-flight discipline: at most one fetch is
//!   in flight regardless of how many runtime workers exist.
//! - Waiters are drained under the lock and invoked after it is released,
//!   so a callback may re-enter [`Downloader::request_download`].
//!
//! # Failure model
//!
//! Precondition failures (unusable files dir, invalid URL) are reported
//! synchronously and never enqueued. Fetch failures of any kind fold into
//! a single boolean; after [`DEFAULT_MAX_RETRIES`] failed attempts every
//! waiter receives `(false, None)` and the resource is forgotten.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::client::{DEFAULT_REQUEST_TIMEOUT, Fetcher, HttpClient};
use crate::error::DownloadError;
use crate::item::{DownloadCallback, DownloadItem, is_generated_disk_name};
use crate::queue::DownloadQueue;
use crate::store::{JsonFileStore, KeyStore};
use crate::task::TaskRunner;

/// Default bound on failed attempts per resource.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// File name of the persisted store when built via [`Downloader::with_defaults`].
const DEFAULT_STORE_FILE: &str = "fetchqueue-store.json";

/// Configuration for a [`Downloader`].
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Directory downloaded files are written into.
    pub files_dir: PathBuf,
    /// Per-attempt timeout handed to the default HTTP client.
    pub request_timeout: Duration,
    /// Failed attempts allowed per resource before giving up.
    pub max_retries: u32,
    /// Whether to sweep stale files on the first request.
    pub cleanup_on_first_use: bool,
}

impl DownloaderConfig {
    /// Creates a configuration with default timeout, retry, and cleanup
    /// settings for the given files directory.
    #[must_use]
    pub fn new(files_dir: impl Into<PathBuf>) -> Self {
        Self {
            files_dir: files_dir.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            cleanup_on_first_use: true,
        }
    }
}

/// Mutable scheduler state, guarded by one mutex.
struct SchedulerState {
    queue: DownloadQueue,
    busy: bool,
    cleaned_up: bool,
    files_dir_ready: bool,
}

/// Everything a fetch task needs, captured before the lock is released.
struct FetchJob {
    url: String,
    local_name: String,
    lookup_key: String,
    dest: PathBuf,
}

struct Inner {
    config: DownloaderConfig,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn KeyStore>,
    runner: TaskRunner,
    state: Mutex<SchedulerState>,
}

/// Sequential, deduplicating download scheduler.
///
/// A cheap cloneable handle over shared state; clone it freely into any
/// caller that needs to request downloads.
#[derive(Clone)]
pub struct Downloader {
    inner: Arc<Inner>,
}

impl Downloader {
    /// Creates a downloader with explicitly injected capabilities.
    #[must_use]
    pub fn new(
        config: DownloaderConfig,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn KeyStore>,
        runner: TaskRunner,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                fetcher,
                store,
                runner,
                state: Mutex::new(SchedulerState {
                    queue: DownloadQueue::new(),
                    busy: false,
                    cleaned_up: false,
                    files_dir_ready: false,
                }),
            }),
        }
    }

    /// Creates a downloader with the production HTTP client, a JSON file
    /// store inside the files directory, and the ambient tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime context.
    #[must_use]
    pub fn with_defaults(config: DownloaderConfig) -> Self {
        let fetcher = Arc::new(HttpClient::with_timeout(config.request_timeout));
        let store = Arc::new(JsonFileStore::open(config.files_dir.join(DEFAULT_STORE_FILE)));
        Self::new(config, fetcher, store, TaskRunner::current())
    }

    /// Requests a download and registers a callback for the outcome.
    ///
    /// The callback receives `(true, Some(local_path))` on success and
    /// `(false, None)` on any failure; it fires exactly once. Concurrent
    /// requests for the same URL share one underlying fetch, and a request
    /// arriving while the resource is still marked on disk is answered
    /// immediately without touching the network.
    #[instrument(level = "debug", skip_all, fields(url = %url))]
    pub fn request_download<F>(&self, url: &str, callback: F)
    where
        F: FnOnce(bool, Option<String>) + Send + 'static,
    {
        // Fatal precondition: without a usable files directory nothing
        // below can succeed, so fail fast and never enqueue.
        if !self.ensure_files_dir() {
            callback(false, None);
            return;
        }

        self.maybe_cleanup();

        let callback: DownloadCallback = Box::new(callback);
        {
            let mut state = self.lock_state();
            if let Some(item) = state.queue.item_for_url_mut(url) {
                if item.is_on_disk() {
                    // Cache hit: answer without a network round trip.
                    let location = self.location_for(item.identity().local_name());
                    drop(state);
                    debug!("answering from completed item");
                    callback(true, Some(location));
                } else {
                    // Single-flight: ride along on the pending fetch.
                    item.add_waiter(callback);
                    debug!(waiters = item.waiter_count(), "attached to pending item");
                }
                return;
            }

            let Some(mut item) = DownloadItem::new(url) else {
                drop(state);
                debug!("rejecting request with no derivable identity");
                callback(false, None);
                return;
            };
            item.add_waiter(callback);
            state.queue.add(item);
            debug!(queue_len = state.queue.len(), "enqueued new item");
        }

        self.pump();
    }

    /// Number of items currently queued, settled ones included.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.lock_state().queue.len()
    }

    /// Drains the queue: starts the next fetch if idle, settles exhausted
    /// items. Re-entrant and idempotent; a no-op while a fetch is in
    /// flight or when nothing is pending.
    fn pump(&self) {
        loop {
            let job = {
                let mut guard = self.lock_state();
                let state = &mut *guard;
                if state.busy {
                    return;
                }
                let max_retries = self.inner.config.max_retries;
                let Some(item) = state.queue.next_mut() else {
                    return;
                };
                let url = item.identity().source_url().to_string();

                if !item.has_retries_remaining(max_retries) {
                    let waiters = item.take_waiters();
                    state.queue.remove(&url);
                    drop(guard);
                    info!(url = %url, max_retries, "retries exhausted, giving up");
                    for waiter in waiters {
                        waiter(false, None);
                    }
                    continue;
                }

                let job = FetchJob {
                    local_name: item.identity().local_name().to_string(),
                    lookup_key: item.identity().lookup_key().to_string(),
                    dest: self.inner.config.files_dir.join(item.identity().local_name()),
                    url,
                };
                state.busy = true;
                job
            };

            debug!(url = %job.url, dest = %job.dest.display(), "starting download");
            let downloader = self.clone();
            let fetcher = Arc::clone(&self.inner.fetcher);
            let fetch_url = job.url.clone();
            let fetch_dest = job.dest.clone();
            self.inner.runner.run(
                async move { fetcher.fetch(&fetch_url, &fetch_dest).await },
                move |result| downloader.finish(&job, result),
            );
            return;
        }
    }

    /// Settles one finished fetch attempt and drains the next item.
    ///
    /// `result` is `None` when the fetch task panicked; both `None` and
    /// `Err` fold into the same boolean failure.
    fn finish(&self, job: &FetchJob, result: Option<Result<u64, DownloadError>>) {
        let success = match result {
            Some(Ok(bytes_written)) => {
                info!(url = %job.url, bytes_written, "download complete");
                true
            }
            Some(Err(error)) => {
                warn!(url = %job.url, %error, "download attempt failed");
                false
            }
            None => {
                warn!(url = %job.url, "download task panicked");
                false
            }
        };

        let waiters = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            state.busy = false;
            if success {
                match state.queue.item_for_url_mut(&job.url) {
                    Some(item) => {
                        // The durable mapping is written before anyone is
                        // told the file exists.
                        self.inner.store.put(&job.lookup_key, &job.local_name);
                        item.set_on_disk(true);
                        item.take_waiters()
                    }
                    None => Vec::new(),
                }
            } else {
                if let Some(item) = state.queue.item_for_url_mut(&job.url) {
                    item.increment_retry_count();
                    item.set_on_disk(false);
                    debug!(
                        url = %job.url,
                        retry_count = item.retry_count(),
                        "requeueing failed item at tail"
                    );
                }
                state.queue.move_to_back(&job.url);
                Vec::new()
            }
        };

        if success {
            let location = self.location_for(&job.local_name);
            for waiter in waiters {
                waiter(true, Some(location.clone()));
            }
        }

        self.pump();
    }

    /// Creates the files directory the first time it is needed.
    ///
    /// Success is cached so later requests skip the disk round trip; a
    /// failure is retried on the next request. If the directory vanishes
    /// after this check, the fetch itself reports the IO failure.
    fn ensure_files_dir(&self) -> bool {
        if self.lock_state().files_dir_ready {
            return true;
        }
        match std::fs::create_dir_all(&self.inner.config.files_dir) {
            Ok(()) => {
                self.lock_state().files_dir_ready = true;
                true
            }
            Err(error) => {
                warn!(
                    files_dir = %self.inner.config.files_dir.display(),
                    %error,
                    "files directory unavailable"
                );
                false
            }
        }
    }

    /// Runs the one-time disk sweep if it has not happened yet.
    fn maybe_cleanup(&self) {
        if !self.inner.config.cleanup_on_first_use {
            return;
        }
        {
            let mut state = self.lock_state();
            if state.cleaned_up {
                return;
            }
            state.cleaned_up = true;
        }
        self.cleanup();
    }

    /// Deletes files persisted by previous sessions along with their store
    /// entries, then sweeps every remaining generated file, store entry or
    /// not. Bounds storage growth across restarts.
    fn cleanup(&self) {
        let files_dir = &self.inner.config.files_dir;
        let entries = self.inner.store.entries();
        info!(
            files_dir = %files_dir.display(),
            entry_count = entries.len(),
            "running first-use disk cleanup"
        );

        for (key, local_name) in entries {
            let path = files_dir.join(&local_name);
            if path.exists() {
                if let Err(error) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), %error, "failed to delete stale file");
                }
            }
            self.inner.store.remove(&key);
        }

        // Second direction: generated files the store never knew about.
        // The store was just cleared, so every generated file left on disk
        // is stale by definition.
        let Ok(read_dir) = std::fs::read_dir(files_dir) else {
            return;
        };
        for entry in read_dir.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if is_generated_disk_name(name) {
                if let Err(error) = std::fs::remove_file(entry.path()) {
                    warn!(path = %entry.path().display(), %error, "failed to delete orphaned file");
                }
            }
        }
    }

    fn location_for(&self, local_name: &str) -> String {
        self.inner
            .config
            .files_dir
            .join(local_name)
            .to_string_lossy()
            .into_owned()
    }

    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        // Scheduler state stays consistent across a waiter panic; poison
        // recovery keeps the queue draining.
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("Downloader")
            .field("files_dir", &self.inner.config.files_dir)
            .field("queue_len", &state.queue.len())
            .field("busy", &state.busy)
            .finish()
    }
}

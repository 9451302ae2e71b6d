//! Batch downloads with order-preserving reassembly.
//!
//! [`ListDownloader`] fans a list of URLs out through a shared, still
//! deduplicating [`Downloader`] and hands back one result list, the same
//! length and order as the input, once every resource has settled.
//! Completion order on the wire does not matter: each result is written
//! into the slot of its original index.

use std::sync::{Arc, Mutex};

use tracing::{debug, instrument};

use crate::engine::Downloader;

/// Fans out multiple download requests and reassembles results in
/// caller-supplied order.
#[derive(Debug, Clone)]
pub struct ListDownloader {
    downloader: Downloader,
}

/// Shared completion state for one `download_all` call.
struct Gather {
    slots: Vec<Option<String>>,
    remaining: usize,
    on_done: Option<Box<dyn FnOnce(Vec<Option<String>>) + Send + 'static>>,
}

impl ListDownloader {
    /// Creates a list downloader over a shared [`Downloader`].
    #[must_use]
    pub fn new(downloader: Downloader) -> Self {
        Self { downloader }
    }

    /// Downloads every URL and calls back once with per-URL results.
    ///
    /// The result list always has the same length as `urls`, and slot `i`
    /// holds the local location for `urls[i]`, or `None` if that resource
    /// failed. Duplicate URLs in the list ride the same underlying fetch.
    /// An empty input calls back immediately with an empty list.
    #[instrument(level = "debug", skip_all, fields(url_count = urls.len()))]
    pub fn download_all<F>(&self, urls: Vec<String>, on_done: F)
    where
        F: FnOnce(Vec<Option<String>>) + Send + 'static,
    {
        let total = urls.len();
        if total == 0 {
            on_done(Vec::new());
            return;
        }

        let gather = Arc::new(Mutex::new(Gather {
            slots: vec![None; total],
            remaining: total,
            on_done: Some(Box::new(on_done)),
        }));

        for (index, url) in urls.into_iter().enumerate() {
            let gather = Arc::clone(&gather);
            self.downloader
                .request_download(&url, move |success, location| {
                    debug!(index, success, "list item settled");
                    Self::settle(&gather, index, if success { location } else { None });
                });
        }
    }

    /// Records one settled slot; fires the final callback on the last one.
    fn settle(gather: &Arc<Mutex<Gather>>, index: usize, location: Option<String>) {
        let finished = {
            let mut gather = match gather.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            gather.slots[index] = location;
            gather.remaining -= 1;
            if gather.remaining == 0 {
                gather
                    .on_done
                    .take()
                    .map(|on_done| (on_done, std::mem::take(&mut gather.slots)))
            } else {
                None
            }
        };

        if let Some((on_done, slots)) = finished {
            on_done(slots);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_fires_once_after_last_slot() {
        let (tx, rx) = std::sync::mpsc::channel();
        let gather = Arc::new(Mutex::new(Gather {
            slots: vec![None; 3],
            remaining: 3,
            on_done: Some(Box::new(move |slots| {
                tx.send(slots).ok();
            })),
        }));

        ListDownloader::settle(&gather, 2, Some("third".to_string()));
        ListDownloader::settle(&gather, 0, Some("first".to_string()));
        assert!(rx.try_recv().is_err(), "must not fire early");

        ListDownloader::settle(&gather, 1, None);
        let slots = rx.try_recv().unwrap();
        assert_eq!(
            slots,
            vec![Some("first".to_string()), None, Some("third".to_string())]
        );
    }
}

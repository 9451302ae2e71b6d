//! Ordered download queue with per-URL deduplication.
//!
//! The queue is a coalescing buffer, not a cache: insertion order is
//! arrival order, except that a retried item moves to the tail so other
//! queued resources get a turn before the retry (round-robin fairness
//! rather than strict FIFO per resource). At most one item exists per
//! distinct source URL; that is the dedup guarantee callers rely on.
//!
//! Lookup is a linear scan by URL equality. Queue depth is bounded by the
//! number of concurrently-requested distinct resources, so scans stay
//! cheap.

use crate::item::DownloadItem;

/// Ordered collection of [`DownloadItem`]s keyed by source URL.
#[derive(Debug, Default)]
pub struct DownloadQueue {
    items: Vec<DownloadItem>,
}

impl DownloadQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an item, refusing duplicates for an already-queued URL.
    ///
    /// Returns whether the item was added.
    pub fn add(&mut self, item: DownloadItem) -> bool {
        if self.contains(item.identity().source_url()) {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Removes the item for a URL. A no-op for absent URLs.
    pub fn remove(&mut self, url: &str) -> Option<DownloadItem> {
        let index = self.position(url)?;
        Some(self.items.remove(index))
    }

    /// Moves the item for a URL to the tail of the queue (remove + add).
    ///
    /// A no-op for absent URLs.
    pub fn move_to_back(&mut self, url: &str) {
        if let Some(item) = self.remove(url) {
            self.items.push(item);
        }
    }

    /// Whether an item exists for the given URL.
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.position(url).is_some()
    }

    /// Returns the item for a URL, if queued.
    #[must_use]
    pub fn item_for_url(&self, url: &str) -> Option<&DownloadItem> {
        let index = self.position(url)?;
        self.items.get(index)
    }

    /// Returns the item for a URL mutably, if queued.
    pub fn item_for_url_mut(&mut self, url: &str) -> Option<&mut DownloadItem> {
        let index = self.position(url)?;
        self.items.get_mut(index)
    }

    /// Returns the first item not yet on disk.
    ///
    /// This is the scheduler's sole dequeue operation and the extension
    /// point for prioritization.
    pub fn next_mut(&mut self) -> Option<&mut DownloadItem> {
        self.items.iter_mut().find(|item| !item.is_on_disk())
    }

    /// Number of queued items, settled ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue holds no items at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn position(&self, url: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.identity().source_url() == url)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn item(url: &str) -> DownloadItem {
        DownloadItem::new(url).unwrap()
    }

    #[test]
    fn test_add_and_lookup() {
        let mut queue = DownloadQueue::new();
        assert!(queue.is_empty());
        assert!(queue.add(item("https://example.com/a.mp4")));
        assert_eq!(queue.len(), 1);
        assert!(queue.contains("https://example.com/a.mp4"));
        assert!(!queue.contains("https://example.com/b.mp4"));
        assert!(queue.item_for_url("https://example.com/a.mp4").is_some());
        assert!(queue.item_for_url("https://example.com/b.mp4").is_none());
    }

    #[test]
    fn test_add_rejects_duplicate_url() {
        let mut queue = DownloadQueue::new();
        assert!(queue.add(item("https://example.com/a.mp4")));
        assert!(!queue.add(item("https://example.com/a.mp4")));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove_absent_url_is_noop() {
        let mut queue = DownloadQueue::new();
        queue.add(item("https://example.com/a.mp4"));
        assert!(queue.remove("https://example.com/missing.mp4").is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_move_to_back_reorders() {
        let mut queue = DownloadQueue::new();
        queue.add(item("https://example.com/a.mp4"));
        queue.add(item("https://example.com/b.mp4"));
        queue.move_to_back("https://example.com/a.mp4");

        let next = queue.next_mut().unwrap();
        assert_eq!(next.identity().source_url(), "https://example.com/b.mp4");
    }

    #[test]
    fn test_move_to_back_absent_url_is_noop() {
        let mut queue = DownloadQueue::new();
        queue.add(item("https://example.com/a.mp4"));
        queue.move_to_back("https://example.com/missing.mp4");
        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.next_mut().unwrap().identity().source_url(),
            "https://example.com/a.mp4"
        );
    }

    #[test]
    fn test_next_skips_on_disk_items() {
        let mut queue = DownloadQueue::new();
        queue.add(item("https://example.com/a.mp4"));
        queue.add(item("https://example.com/b.mp4"));
        queue
            .item_for_url_mut("https://example.com/a.mp4")
            .unwrap()
            .set_on_disk(true);

        let next = queue.next_mut().unwrap();
        assert_eq!(next.identity().source_url(), "https://example.com/b.mp4");
    }

    #[test]
    fn test_next_none_when_all_on_disk() {
        let mut queue = DownloadQueue::new();
        queue.add(item("https://example.com/a.mp4"));
        queue
            .item_for_url_mut("https://example.com/a.mp4")
            .unwrap()
            .set_on_disk(true);
        assert!(queue.next_mut().is_none());
        // The settled item still counts toward length.
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_next_empty_queue() {
        let mut queue = DownloadQueue::new();
        assert!(queue.next_mut().is_none());
    }
}

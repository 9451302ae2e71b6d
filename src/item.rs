//! Resource identity derivation and per-resource download state.
//!
//! A [`ResourceIdentity`] names one remote resource three ways: the source
//! URL callers asked for, the generated local file name the bytes land in,
//! and the durable lookup key the name is persisted under. A
//! [`DownloadItem`] couples one identity with its scheduling state (retry
//! budget, on-disk flag) and the list of callers waiting on it.

use rand::Rng;
use url::Url;

/// Prefix applied to every generated disk name.
const DISK_NAME_PREFIX: &str = "dlq_";

/// Prefix applied to disk names to form durable store keys.
const LOOKUP_KEY_PREFIX: &str = "dlqkey_";

/// Callback invoked when a download settles.
///
/// Receives `(success, local_location)`; the location is the full on-disk
/// path on success and `None` on any failure. No richer failure reason is
/// ever surfaced.
pub type DownloadCallback = Box<dyn FnOnce(bool, Option<String>) + Send + 'static>;

/// Stable naming for one remote resource.
///
/// Constructed only through [`ResourceIdentity::derive`], which returns
/// `None` for unusable URLs. A constructed identity is therefore always
/// fully populated; partially-derived identities cannot exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIdentity {
    source_url: String,
    local_name: String,
    lookup_key: String,
}

impl ResourceIdentity {
    /// Derives an identity from a remote URL.
    ///
    /// Returns `None` if the URL is empty, unparsable, or its path carries
    /// no file extension. The extension requirement is intentional: the
    /// format of the stored file is inferred from it, and an
    /// extension-less URL cannot be safely cached.
    #[must_use]
    pub fn derive(url: &str) -> Option<Self> {
        if url.is_empty() {
            return None;
        }
        let parsed = Url::parse(url).ok()?;
        let extension = path_extension(parsed.path())?;

        let token = rand::thread_rng().r#gen::<u32>();
        let local_name = format!("{DISK_NAME_PREFIX}{token}.{extension}");
        let lookup_key = format!("{LOOKUP_KEY_PREFIX}{local_name}");

        Some(Self {
            source_url: url.to_string(),
            local_name,
            lookup_key,
        })
    }

    /// The remote URL this identity was derived from.
    #[must_use]
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// The generated local file name (unique token + source extension).
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// The durable key the local name is persisted under.
    #[must_use]
    pub fn lookup_key(&self) -> &str {
        &self.lookup_key
    }
}

/// Returns true if a file name carries the generated disk-name prefix.
///
/// Used by cleanup to recognize files this component owns without touching
/// anything else in the shared directory.
#[must_use]
pub(crate) fn is_generated_disk_name(name: &str) -> bool {
    name.starts_with(DISK_NAME_PREFIX)
}

/// Extracts the extension from a URL path: the substring after the last
/// `.`, rejected if missing, empty, or spanning a path separator.
fn path_extension(path: &str) -> Option<&str> {
    let (_, extension) = path.rsplit_once('.')?;
    if extension.is_empty() || extension.contains('/') {
        return None;
    }
    Some(extension)
}

/// In-flight or queued record for one distinct remote resource.
///
/// Owns the identity, the retry budget, the on-disk flag the queue uses to
/// skip settled items, and the waiters to notify when the item settles.
pub struct DownloadItem {
    identity: ResourceIdentity,
    on_disk: bool,
    retry_count: u32,
    waiters: Vec<DownloadCallback>,
}

impl DownloadItem {
    /// Creates an item for a previously-unseen URL.
    ///
    /// Returns `None` when no valid identity can be derived; the caller
    /// reports that as an immediate failure without enqueueing anything.
    #[must_use]
    pub fn new(url: &str) -> Option<Self> {
        Some(Self {
            identity: ResourceIdentity::derive(url)?,
            on_disk: false,
            retry_count: 0,
            waiters: Vec::new(),
        })
    }

    /// The identity this item downloads.
    #[must_use]
    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    /// Whether the resource has been written to disk.
    #[must_use]
    pub fn is_on_disk(&self) -> bool {
        self.on_disk
    }

    /// Flips the on-disk flag after a settled attempt.
    pub fn set_on_disk(&mut self, on_disk: bool) {
        self.on_disk = on_disk;
    }

    /// Number of failed attempts so far.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Records one failed attempt.
    pub fn increment_retry_count(&mut self) {
        self.retry_count += 1;
    }

    /// Whether the item may still be attempted under the given budget.
    #[must_use]
    pub fn has_retries_remaining(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries
    }

    /// Attaches one more caller to be notified when this item settles.
    ///
    /// Waiters are invoked in attachment order.
    pub fn add_waiter(&mut self, waiter: DownloadCallback) {
        self.waiters.push(waiter);
    }

    /// Drains all attached waiters, leaving the list empty.
    ///
    /// The scheduler takes waiters under its lock and invokes them after
    /// releasing it, so each waiter fires exactly once.
    #[must_use]
    pub fn take_waiters(&mut self) -> Vec<DownloadCallback> {
        std::mem::take(&mut self.waiters)
    }

    /// Number of waiters currently attached.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}

impl std::fmt::Debug for DownloadItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadItem")
            .field("identity", &self.identity)
            .field("on_disk", &self.on_disk)
            .field("retry_count", &self.retry_count)
            .field("waiters", &self.waiters.len())
            .finish()
    }
}

//! Sequential, deduplicating file-download queue.
//!
//! This library accepts remote-resource download requests from many
//! independent callers, guarantees each distinct resource is fetched from
//! the network at most once no matter how many callers asked for it
//! concurrently, retries transient failures a bounded number of times,
//! and persists a durable mapping from resource identity to local file
//! name. Useful when many components want the same large files (videos,
//! media assets) and must not each pay for their own fetch.
//!
//! # Architecture
//!
//! - [`item`] - resource identity derivation and per-resource state
//! - [`queue`] - ordered, URL-deduplicated download queue
//! - [`store`] - durable `lookup_key -> local_name` mapping
//! - [`client`] - the fetch capability (streaming reqwest implementation)
//! - [`task`] - run work off the caller's thread, call back with the result
//! - [`engine`] - the scheduler driving one download at a time
//! - [`list`] - batch downloads with order-preserving reassembly
//!
//! # Example
//!
//! ```no_run
//! use fetchqueue::{Downloader, DownloaderConfig};
//!
//! # async fn example() {
//! let downloader = Downloader::with_defaults(DownloaderConfig::new("./downloads"));
//! downloader.request_download("https://cdn.example.com/clip.mp4", |success, location| {
//!     if success {
//!         println!("saved to {}", location.unwrap_or_default());
//!     }
//! });
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod engine;
pub mod error;
pub mod item;
pub mod list;
pub mod queue;
pub mod store;
pub mod task;

// Re-export commonly used types
pub use client::{DEFAULT_REQUEST_TIMEOUT, Fetcher, HttpClient};
pub use engine::{DEFAULT_MAX_RETRIES, Downloader, DownloaderConfig};
pub use error::DownloadError;
pub use item::{DownloadCallback, DownloadItem, ResourceIdentity};
pub use list::ListDownloader;
pub use queue::DownloadQueue;
pub use store::{JsonFileStore, KeyStore, MemoryStore};
pub use task::TaskRunner;

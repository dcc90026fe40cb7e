//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline walks the eligible pages of a datasheet. Hosts
//! forward them to a terminal progress bar, a websocket or a job table
//! without the library knowing how they communicate.
//!
//! # Example
//!
//! ```rust
//! use sensor_datasheet::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     recovered: Arc<AtomicUsize>,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_page_recovered(&self, page_num: usize, total_pages: usize, fields: usize) {
//!         self.recovered.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{}: {} fields", page_num, total_pages, fields);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     recovered: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extraction pipeline as it processes each page.
///
/// Implementations must be `Send + Sync`: several runs may share one
/// callback when a host processes documents concurrently. All methods have
/// default no-op implementations so callers only override what they care
/// about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after the document is loaded.
    ///
    /// # Arguments
    /// * `eligible_pages` — pages that will be sent to the model
    fn on_extraction_start(&self, eligible_pages: usize) {
        let _ = eligible_pages;
    }

    /// Called just before the model request is sent for a page.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page's response yielded a record.
    ///
    /// # Arguments
    /// * `fields` — number of filled fields in the page's record
    fn on_page_recovered(&self, page_num: usize, total_pages: usize, fields: usize) {
        let _ = (page_num, total_pages, fields);
    }

    /// Called when a page contributed nothing (gateway error or unrecoverable output).
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called when no page was recoverable and the reduced fallback prompt is sent.
    fn on_fallback(&self) {}

    /// Called once after merging, before persistence.
    ///
    /// # Arguments
    /// * `eligible_pages`  — pages sent to the model
    /// * `recovered_pages` — pages that yielded a record
    fn on_extraction_complete(&self, eligible_pages: usize, recovered_pages: usize) {
        let _ = (eligible_pages, recovered_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        recovered: AtomicUsize,
        errors: AtomicUsize,
        fallbacks: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_recovered(&self, _page_num: usize, _total_pages: usize, _fields: usize) {
            self.recovered.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_fallback(&self) {
            self.fallbacks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start(5);
        cb.on_page_start(1, 5);
        cb.on_page_recovered(1, 5, 4);
        cb.on_page_error(2, 5, "some error");
        cb.on_fallback();
        cb.on_extraction_complete(5, 4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_page_start(1, 3);
        tracker.on_page_recovered(1, 3, 2);
        tracker.on_page_start(2, 3);
        tracker.on_page_error(2, 3, "unrecoverable");
        tracker.on_fallback();

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.recovered.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.fallbacks.load(Ordering::SeqCst), 1);
    }
}

//! Link discovery over a paginated listing
//!
//! Walks listing pages 1, 2, ... and grows the pending set with every candidate
//! link that is not already pending, scraped or exhausted. The pending file is
//! rewritten after each page that added something.
//!
//! Failed pages are retried with exponential backoff, then skipped. Too many
//! skipped pages in a row abort the run instead of walking an unreachable
//! listing forever.

use crate::config::DiscoveryConfig;
use crate::crawler::backoff::{sleep_or_cancel, CourtesyDelay, ExponentialBackoff};
use crate::crawler::listing::ListingSource;
use crate::crawler::parser::ListingPage;
use crate::output::ErrorLog;
use crate::storage::LinkStateStore;
use crate::url::listing_page_url;
use crate::HarvestError;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Error log category for listing pages that were given up on
pub const DISCOVERY_ERROR_CATEGORY: &str = "Observation Link scraping";

/// Summary of one discovery run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Listing pages fetched and parsed
    pub pages_visited: u32,

    /// Listing pages given up on after their last attempt
    pub pages_skipped: u32,

    /// Links added to the pending set by this run
    pub new_links: usize,

    /// Size of the pending set at the end of the run
    pub total_pending: usize,

    /// The run stopped because the token was cancelled
    pub cancelled: bool,

    /// The run stopped after too many consecutive skipped pages
    pub aborted: bool,
}

enum PageFetch {
    Loaded(ListingPage),
    Skipped(HarvestError),
    Cancelled,
}

/// Grows the pending set from a paginated listing
pub struct LinkDiscoverer<'a, S: LinkStateStore, L: ListingSource> {
    store: &'a S,
    source: &'a L,
    error_log: &'a ErrorLog,
    delay: CourtesyDelay,
    backoff: ExponentialBackoff,
    max_page_attempts: u32,
    max_consecutive_skips: u32,
}

impl<'a, S: LinkStateStore, L: ListingSource> LinkDiscoverer<'a, S, L> {
    pub fn new(
        store: &'a S,
        source: &'a L,
        error_log: &'a ErrorLog,
        config: &DiscoveryConfig,
    ) -> Self {
        Self {
            store,
            source,
            error_log,
            delay: CourtesyDelay::new(config.min_delay_ms, config.max_delay_ms),
            backoff: ExponentialBackoff::new(config.backoff_base_ms, config.backoff_max_ms),
            max_page_attempts: config.max_page_attempts.max(1),
            max_consecutive_skips: config.max_consecutive_skips.max(1),
        }
    }

    /// Walks the listing starting at page 1
    ///
    /// `page_limit` of 0 means no limit. Only storage failures are returned as
    /// errors; page failures are logged and counted in the report.
    pub async fn discover(
        &self,
        seed: &Url,
        page_limit: u32,
        cancel: &CancellationToken,
    ) -> Result<DiscoveryReport, HarvestError> {
        let mut pending = self.store.load_pending().await?;
        let scraped = self.store.load_scraped().await?;
        let exhausted = self.store.load_exhausted().await?;

        let mut report = DiscoveryReport::default();
        let mut consecutive_skips = 0u32;
        let mut page = 1u32;

        tracing::info!(
            "Discovering links from {} ({} pending, page limit {})",
            seed,
            pending.len(),
            if page_limit == 0 {
                "none".to_string()
            } else {
                page_limit.to_string()
            }
        );

        loop {
            if cancel.is_cancelled() {
                tracing::info!("Discovery cancelled before page {}", page);
                report.cancelled = true;
                break;
            }

            let url = listing_page_url(seed, page);
            match self.fetch_with_retry(&url, cancel).await {
                PageFetch::Loaded(listing) => {
                    consecutive_skips = 0;
                    report.pages_visited += 1;

                    let mut added = 0usize;
                    for link in listing.links.iter() {
                        if scraped.contains(link) || exhausted.contains(link) {
                            continue;
                        }
                        if pending.insert(link.as_str()) {
                            added += 1;
                        }
                    }

                    if added > 0 {
                        self.store.save_pending(&pending).await?;
                        report.new_links += added;
                    }
                    tracing::info!(
                        "Page {}: {} link(s), {} new, {} pending",
                        page,
                        listing.links.len(),
                        added,
                        pending.len()
                    );

                    if listing.is_last_page {
                        tracing::info!("Reached the last listing page ({})", page);
                        break;
                    }
                    if listing.links.is_empty() {
                        tracing::info!("Page {} lists no observations, stopping", page);
                        break;
                    }
                }
                PageFetch::Skipped(error) => {
                    report.pages_skipped += 1;
                    consecutive_skips += 1;
                    tracing::warn!("Skipping listing page {}: {}", page, error);
                    self.error_log
                        .record(DISCOVERY_ERROR_CATEGORY, &format!("page {}", page), &error)
                        .await;

                    if consecutive_skips >= self.max_consecutive_skips {
                        tracing::error!(
                            "Aborting discovery after {} consecutive skipped pages",
                            consecutive_skips
                        );
                        report.aborted = true;
                        break;
                    }
                }
                PageFetch::Cancelled => {
                    report.cancelled = true;
                    break;
                }
            }

            if page_limit > 0 && page >= page_limit {
                tracing::info!("Page limit {} reached", page_limit);
                break;
            }
            page += 1;

            if !self.delay.wait(cancel).await {
                report.cancelled = true;
                break;
            }
        }

        report.total_pending = pending.len();
        tracing::info!(
            "Discovery finished: {} page(s) visited, {} skipped, {} new link(s), {} pending",
            report.pages_visited,
            report.pages_skipped,
            report.new_links,
            report.total_pending
        );
        Ok(report)
    }

    /// Fetches one page, retrying transient failures with backoff
    async fn fetch_with_retry(&self, url: &Url, cancel: &CancellationToken) -> PageFetch {
        let mut attempt = 0u32;
        loop {
            match self.source.fetch_listing(url).await {
                Ok(listing) => return PageFetch::Loaded(listing),
                Err(error) => {
                    attempt += 1;
                    if attempt >= self.max_page_attempts || !error.is_transient() {
                        return PageFetch::Skipped(error);
                    }

                    let wait = self.backoff.delay(attempt - 1);
                    tracing::warn!(
                        "Attempt {}/{} for {} failed ({}); retrying in {:?}",
                        attempt,
                        self.max_page_attempts,
                        url,
                        error,
                        wait
                    );
                    if !sleep_or_cancel(wait, cancel).await {
                        return PageFetch::Cancelled;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LinkSet;
    use crate::storage::{sample_record, LinkSetStore, ObservationStore};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serves scripted listing pages; unknown pages are empty
    #[derive(Default)]
    struct ScriptedSource {
        pages: HashMap<u32, ListingPage>,
        failures: Mutex<HashMap<u32, VecDeque<HarvestError>>>,
        calls: Mutex<Vec<u32>>,
    }

    impl ScriptedSource {
        fn page(mut self, number: u32, links: &[&str], last: bool) -> Self {
            self.pages.insert(
                number,
                ListingPage {
                    links: links.iter().copied().collect(),
                    is_last_page: last,
                },
            );
            self
        }

        fn failing(self, number: u32, errors: Vec<HarvestError>) -> Self {
            self.failures
                .lock()
                .unwrap()
                .insert(number, errors.into_iter().collect());
            self
        }

        fn calls(&self) -> Vec<u32> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ListingSource for ScriptedSource {
        async fn fetch_listing(&self, url: &Url) -> Result<ListingPage, HarvestError> {
            let number: u32 = url
                .query_pairs()
                .find(|(k, _)| k == "page")
                .and_then(|(_, v)| v.parse().ok())
                .unwrap();
            self.calls.lock().unwrap().push(number);

            if let Some(queue) = self.failures.lock().unwrap().get_mut(&number) {
                if let Some(error) = queue.pop_front() {
                    return Err(error);
                }
            }
            Ok(self.pages.get(&number).cloned().unwrap_or_default())
        }
    }

    fn unavailable(page: u32) -> HarvestError {
        HarvestError::HttpStatus {
            url: format!("https://example.com/list?page={}", page),
            status: 503,
        }
    }

    fn not_found(page: u32) -> HarvestError {
        HarvestError::HttpStatus {
            url: format!("https://example.com/list?page={}", page),
            status: 404,
        }
    }

    struct Fixture {
        dir: TempDir,
        store: LinkSetStore,
        log: ErrorLog,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let p = |name: &str| dir.path().join(name);
            let store = LinkSetStore::new(
                p("fetched-links.json"),
                p("failed-links.json"),
                p("exhausted-links.json"),
                p("link-attempts.json"),
                p("scraped-observations.json"),
            );
            let log = ErrorLog::new(dir.path().join("error-logs"), Utc::now());
            Self { dir, store, log }
        }

        fn config(&self) -> DiscoveryConfig {
            DiscoveryConfig {
                default_page_limit: 0,
                min_delay_ms: 0,
                max_delay_ms: 0,
                max_page_attempts: 3,
                backoff_base_ms: 0,
                backoff_max_ms: 0,
                max_consecutive_skips: 2,
            }
        }

        async fn discover(&self, source: &ScriptedSource, limit: u32) -> DiscoveryReport {
            let seed = Url::parse("https://example.com/list?sort=date").unwrap();
            LinkDiscoverer::new(&self.store, source, &self.log, &self.config())
                .discover(&seed, limit, &CancellationToken::new())
                .await
                .unwrap()
        }

        async fn pending(&self) -> LinkSet {
            self.store.load_pending().await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_walks_until_last_page() {
        let fx = Fixture::new();
        let source = ScriptedSource::default()
            .page(1, &["/observation/1/", "/observation/2/"], false)
            .page(2, &["/observation/2/", "/observation/3/"], true)
            .page(3, &["/observation/4/"], false);

        let report = fx.discover(&source, 0).await;

        assert_eq!(source.calls(), vec![1, 2]);
        assert_eq!(report.pages_visited, 2);
        assert_eq!(report.new_links, 3);
        assert_eq!(
            fx.pending().await.as_slice(),
            &["/observation/1/", "/observation/2/", "/observation/3/"]
        );
    }

    #[tokio::test]
    async fn test_page_limit_is_inclusive() {
        let fx = Fixture::new();
        let source = ScriptedSource::default()
            .page(1, &["/observation/1/"], false)
            .page(2, &["/observation/2/"], false)
            .page(3, &["/observation/3/"], false);

        let report = fx.discover(&source, 2).await;

        assert_eq!(source.calls(), vec![1, 2]);
        assert_eq!(report.total_pending, 2);
    }

    #[tokio::test]
    async fn test_empty_listing_ends_discovery() {
        let fx = Fixture::new();
        let source = ScriptedSource::default().page(1, &["/observation/1/"], false);

        let report = fx.discover(&source, 0).await;

        assert_eq!(source.calls(), vec![1, 2]);
        assert_eq!(report.pages_visited, 2);
        assert!(!report.aborted);
    }

    #[tokio::test]
    async fn test_known_links_are_not_pending_again() {
        let fx = Fixture::new();
        let mut observations = ObservationStore::open(fx.store.observations_path())
            .await
            .unwrap();
        observations
            .append(&sample_record("/observation/1/"))
            .await
            .unwrap();
        fx.store
            .save_exhausted(&LinkSet::from(vec!["/observation/2/".to_string()]))
            .await
            .unwrap();

        let source = ScriptedSource::default().page(
            1,
            &["/observation/1/", "/observation/2/", "/observation/3/"],
            true,
        );
        let report = fx.discover(&source, 0).await;

        assert_eq!(report.new_links, 1);
        assert_eq!(fx.pending().await.as_slice(), &["/observation/3/"]);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let fx = Fixture::new();
        let source = ScriptedSource::default()
            .page(1, &["/observation/1/"], true)
            .failing(1, vec![unavailable(1), unavailable(1)]);

        let report = fx.discover(&source, 0).await;

        assert_eq!(source.calls(), vec![1, 1, 1]);
        assert_eq!(report.pages_skipped, 0);
        assert_eq!(report.total_pending, 1);
        assert!(!fx.log.has_entries());
    }

    #[tokio::test]
    async fn test_failed_page_is_skipped_and_logged() {
        let fx = Fixture::new();
        let source = ScriptedSource::default()
            .page(1, &["/observation/1/"], false)
            .page(2, &["/observation/2/"], false)
            .page(3, &["/observation/3/"], true)
            .failing(2, vec![not_found(2)]);

        let report = fx.discover(&source, 0).await;

        assert_eq!(source.calls(), vec![1, 2, 3]);
        assert_eq!(report.pages_skipped, 1);
        assert_eq!(
            fx.pending().await.as_slice(),
            &["/observation/1/", "/observation/3/"]
        );

        let log_path = fx.log.finalize().await.unwrap().unwrap();
        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.starts_with("[Observation Link scraping]: Item page 2:"));
    }

    #[tokio::test]
    async fn test_consecutive_skips_abort() {
        let fx = Fixture::new();
        let source = ScriptedSource::default()
            .page(1, &["/observation/1/"], false)
            .failing(2, (0..3).map(|_| unavailable(2)).collect())
            .failing(3, (0..3).map(|_| unavailable(3)).collect());

        let report = fx.discover(&source, 0).await;

        assert!(report.aborted);
        assert_eq!(report.pages_skipped, 2);
        assert_eq!(source.calls(), vec![1, 2, 2, 2, 3, 3, 3]);
        assert_eq!(fx.log.entry_count(), 2);
        assert!(fx.dir.path().join("fetched-links.json").exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_page() {
        let fx = Fixture::new();
        let source = ScriptedSource::default().page(1, &["/observation/1/"], true);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let seed = Url::parse("https://example.com/list").unwrap();
        let report = LinkDiscoverer::new(&fx.store, &source, &fx.log, &fx.config())
            .discover(&seed, 0, &cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(source.calls().is_empty());
        assert!(fx.pending().await.is_empty());
    }
}

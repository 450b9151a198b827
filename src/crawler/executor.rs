//! Sequential scrape loop
//!
//! Processes the work queue one link at a time. After every successful item
//! the record is appended and the remaining queue is written back as the
//! pending set, so the files on disk always describe exactly the work left.

use crate::crawler::backoff::CourtesyDelay;
use crate::crawler::extractor::PageExtractor;
use crate::output::ErrorLog;
use crate::state::WorkQueue;
use crate::storage::{AppendOutcome, LinkStateStore, ObservationStore};
use crate::HarvestError;
use tokio_util::sync::CancellationToken;

/// Error log category for links that could not be scraped
pub const SCRAPE_ERROR_CATEGORY: &str = "Scraping observation failed";

/// Tally of one scrape run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeReport {
    /// Links in the work queue at the start of the run
    pub total: usize,

    /// Links whose record was written
    pub completed: usize,

    /// Links moved to the failed set
    pub failed: usize,

    /// Links whose record already existed
    pub duplicates: usize,

    /// The run stopped early because the token was cancelled
    pub cancelled: bool,
}

impl ScrapeReport {
    /// Links still pending after the run
    pub fn remaining(&self) -> usize {
        self.total - self.completed - self.duplicates
    }
}

/// Runs the work queue against an extractor
pub struct ScrapeExecutor<'a, S: LinkStateStore, E: PageExtractor> {
    store: &'a S,
    observations: &'a mut ObservationStore,
    extractor: &'a E,
    error_log: &'a ErrorLog,
    delay: CourtesyDelay,
}

impl<'a, S: LinkStateStore, E: PageExtractor> ScrapeExecutor<'a, S, E> {
    pub fn new(
        store: &'a S,
        observations: &'a mut ObservationStore,
        extractor: &'a E,
        error_log: &'a ErrorLog,
    ) -> Self {
        Self {
            store,
            observations,
            extractor,
            error_log,
            delay: CourtesyDelay::none(),
        }
    }

    /// Sets the pause taken between two items
    pub fn with_delay(mut self, delay: CourtesyDelay) -> Self {
        self.delay = delay;
        self
    }

    /// Processes the queue in order until it is empty or cancelled
    ///
    /// Per-item failures are recorded and never stop the run. Only storage
    /// errors are returned.
    pub async fn run(
        &mut self,
        queue: WorkQueue,
        cancel: &CancellationToken,
    ) -> Result<ScrapeReport, HarvestError> {
        let mut remaining = queue.into_links();
        let links: Vec<String> = remaining.as_slice().to_vec();
        let mut failed = self.store.load_failed().await?;

        let mut report = ScrapeReport {
            total: links.len(),
            ..ScrapeReport::default()
        };
        tracing::info!("Scraping {} link(s)", report.total);

        for (index, link) in links.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("Scrape cancelled with {} link(s) left", remaining.len());
                report.cancelled = true;
                break;
            }
            if index > 0 && !self.delay.wait(cancel).await {
                tracing::info!("Scrape cancelled with {} link(s) left", remaining.len());
                report.cancelled = true;
                break;
            }

            match self.extractor.extract(link).await {
                Ok(record) => {
                    match self.observations.append(&record).await? {
                        AppendOutcome::Written => report.completed += 1,
                        AppendOutcome::Duplicate => {
                            tracing::warn!("{} already has a record; not written again", link);
                            report.duplicates += 1;
                        }
                    }
                    remaining.remove(link);
                    self.store.save_pending(&remaining).await?;

                    let done = index + 1;
                    tracing::info!(
                        "({}/{}) {:.2}% done - Scraped: {}",
                        done,
                        report.total,
                        done as f64 / report.total as f64 * 100.0,
                        link
                    );
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    report.failed += 1;
                    tracing::error!("Scraping {} failed: {}", link, error);
                    self.error_log
                        .record(SCRAPE_ERROR_CATEGORY, link, &error)
                        .await;

                    if failed.insert(link.as_str()) {
                        self.store.save_failed(&failed).await?;
                    }
                }
            }
        }

        tracing::info!(
            "Scrape finished: {} completed, {} failed, {} already present, {} left in queue",
            report.completed,
            report.failed,
            report.duplicates,
            remaining.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AttemptLedger, LinkSet, LinkStateReconciler};
    use crate::storage::{
        sample_record, scan_observations, LinkSetStore, ObservationRecord, StorageError,
        StorageResult,
    };
    use crate::ValidationError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Extractor that succeeds for every link except the scripted failures
    #[derive(Default)]
    struct FakeExtractor {
        ambiguous: HashSet<String>,
        unreachable: HashSet<String>,
        cancel_after: Option<(String, CancellationToken)>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PageExtractor for FakeExtractor {
        async fn extract(&self, link: &str) -> Result<ObservationRecord, HarvestError> {
            self.seen.lock().unwrap().push(link.to_string());
            if let Some((trigger, token)) = &self.cancel_after {
                if trigger == link {
                    token.cancel();
                }
            }

            if self.ambiguous.contains(link) {
                return Err(ValidationError::AmbiguousCount {
                    link: link.to_string(),
                    text: "2 imago 1 larva".to_string(),
                }
                .into());
            }
            if self.unreachable.contains(link) {
                return Err(HarvestError::Fetch {
                    url: link.to_string(),
                    message: "Request timeout".to_string(),
                    transient: true,
                });
            }
            Ok(sample_record(link))
        }
    }

    /// Store whose pending file can never be written
    struct ReadOnlyStore(LinkSetStore);

    #[async_trait]
    impl LinkStateStore for ReadOnlyStore {
        async fn load_pending(&self) -> StorageResult<LinkSet> {
            self.0.load_pending().await
        }
        async fn load_failed(&self) -> StorageResult<LinkSet> {
            self.0.load_failed().await
        }
        async fn load_scraped(&self) -> StorageResult<LinkSet> {
            self.0.load_scraped().await
        }
        async fn load_exhausted(&self) -> StorageResult<LinkSet> {
            self.0.load_exhausted().await
        }
        async fn load_attempts(&self) -> StorageResult<AttemptLedger> {
            self.0.load_attempts().await
        }
        async fn save_pending(&self, _links: &LinkSet) -> StorageResult<()> {
            Err(StorageError::Io {
                path: self.0.pending_path().to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }
        async fn save_failed(&self, links: &LinkSet) -> StorageResult<()> {
            self.0.save_failed(links).await
        }
        async fn save_exhausted(&self, links: &LinkSet) -> StorageResult<()> {
            self.0.save_exhausted(links).await
        }
        async fn save_attempts(&self, attempts: &AttemptLedger) -> StorageResult<()> {
            self.0.save_attempts(attempts).await
        }
    }

    struct Fixture {
        _dir: TempDir,
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
            Self {
                _dir: dir,
                store,
                log,
            }
        }

        async fn queue(&self, links: &[&str]) -> WorkQueue {
            let pending: LinkSet = links.iter().copied().collect();
            self.store.save_pending(&pending).await.unwrap();
            LinkStateReconciler::new(&self.store, 0)
                .reconcile()
                .await
                .unwrap()
        }

        async fn observations(&self) -> ObservationStore {
            ObservationStore::open(self.store.observations_path())
                .await
                .unwrap()
        }

        async fn scraped(&self) -> Vec<String> {
            let scan = scan_observations(self.store.observations_path())
                .await
                .unwrap();
            scan.records.into_iter().map(|r| r.link).collect()
        }
    }

    #[tokio::test]
    async fn test_successful_run_drains_queue() {
        let fx = Fixture::new();
        let queue = fx.queue(&["/obs/1", "/obs/2"]).await;
        let mut observations = fx.observations().await;
        let extractor = FakeExtractor::default();

        let report = ScrapeExecutor::new(&fx.store, &mut observations, &extractor, &fx.log)
            .run(queue, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(fx.scraped().await, vec!["/obs/1", "/obs/2"]);
        assert!(fx.store.load_pending().await.unwrap().is_empty());
        assert!(!fx.log.has_entries());
    }

    #[tokio::test]
    async fn test_multiple_individuals_end_in_failed_set() {
        let fx = Fixture::new();
        let queue = fx.queue(&["/obs/1", "/obs/2", "/obs/3"]).await;
        let mut observations = fx.observations().await;
        let extractor = FakeExtractor {
            ambiguous: ["/obs/2".to_string()].into_iter().collect(),
            ..FakeExtractor::default()
        };

        let report = ScrapeExecutor::new(&fx.store, &mut observations, &extractor, &fx.log)
            .run(queue, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(fx.scraped().await, vec!["/obs/1", "/obs/3"]);
        assert_eq!(fx.store.load_failed().await.unwrap().as_slice(), &["/obs/2"]);
        assert_eq!(fx.store.load_pending().await.unwrap().as_slice(), &["/obs/2"]);
        assert_eq!(fx.log.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_link_retried_next_run() {
        let fx = Fixture::new();
        let queue = fx.queue(&["/obs/1", "/obs/2"]).await;
        let mut observations = fx.observations().await;
        let flaky = FakeExtractor {
            unreachable: ["/obs/1".to_string()].into_iter().collect(),
            ..FakeExtractor::default()
        };
        ScrapeExecutor::new(&fx.store, &mut observations, &flaky, &fx.log)
            .run(queue, &CancellationToken::new())
            .await
            .unwrap();

        let next = LinkStateReconciler::new(&fx.store, 0)
            .reconcile()
            .await
            .unwrap();
        assert_eq!(next.as_slice(), &["/obs/1"]);
        assert!(fx.store.load_failed().await.unwrap().is_empty());

        let mut observations = fx.observations().await;
        let healthy = FakeExtractor::default();
        let report = ScrapeExecutor::new(&fx.store, &mut observations, &healthy, &fx.log)
            .run(next, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(fx.scraped().await, vec!["/obs/2", "/obs/1"]);
    }

    #[tokio::test]
    async fn test_cancellation_stops_at_next_item() {
        let fx = Fixture::new();
        let queue = fx.queue(&["/obs/1", "/obs/2", "/obs/3"]).await;
        let mut observations = fx.observations().await;
        let cancel = CancellationToken::new();
        let extractor = FakeExtractor {
            cancel_after: Some(("/obs/1".to_string(), cancel.clone())),
            ..FakeExtractor::default()
        };

        let report = ScrapeExecutor::new(&fx.store, &mut observations, &extractor, &fx.log)
            .run(queue, &cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.completed, 1);
        assert_eq!(*extractor.seen.lock().unwrap(), vec!["/obs/1"]);
        assert_eq!(
            fx.store.load_pending().await.unwrap().as_slice(),
            &["/obs/2", "/obs/3"]
        );
    }

    #[tokio::test]
    async fn test_duplicate_record_counts_as_done() {
        let fx = Fixture::new();
        let queue = fx.queue(&["/obs/1"]).await;
        let mut observations = fx.observations().await;
        observations.append(&sample_record("/obs/1")).await.unwrap();
        let extractor = FakeExtractor::default();

        let report = ScrapeExecutor::new(&fx.store, &mut observations, &extractor, &fx.log)
            .run(queue, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.duplicates, 1);
        assert_eq!(report.remaining(), 0);
        assert_eq!(fx.scraped().await, vec!["/obs/1"]);
        assert!(fx.store.load_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_is_fatal() {
        let fx = Fixture::new();
        let queue = fx.queue(&["/obs/1", "/obs/2"]).await;
        let mut observations = fx.observations().await;
        let extractor = FakeExtractor::default();
        let store = ReadOnlyStore(fx.store.clone());

        let err = ScrapeExecutor::new(&store, &mut observations, &extractor, &fx.log)
            .run(queue, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(*extractor.seen.lock().unwrap(), vec!["/obs/1"]);
    }
}

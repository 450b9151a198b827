//! Link-state reconciliation
//!
//! Runs once at the top of every scrape session. It is the only place where
//! failed links re-enter the pipeline, so a link is retried automatically at
//! most once per run.

use crate::state::{LinkSet, LinkState};
use crate::storage::{LinkStateStore, StorageResult};
use crate::Link;

/// Ordered links to attempt in the current scrape run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkQueue {
    links: LinkSet,
}

impl WorkQueue {
    pub fn new(links: LinkSet) -> Self {
        Self { links }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn contains(&self, link: &str) -> bool {
        self.links.contains(link)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    pub fn as_slice(&self) -> &[Link] {
        self.links.as_slice()
    }

    pub fn into_links(self) -> LinkSet {
        self.links
    }
}

/// What one reconciliation changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Pending links dropped because they already have a record
    pub dropped_scraped: usize,
    /// Failed links folded back into the queue
    pub requeued_failed: usize,
    /// Links that reached the attempt ceiling during this reconciliation
    pub newly_exhausted: Vec<Link>,
    /// Size of the resulting work queue
    pub queued: usize,
}

/// Merges failed links into pending and removes anything already scraped
pub struct LinkStateReconciler<'a, S: LinkStateStore> {
    store: &'a S,
    max_attempts: u32,
}

impl<'a, S: LinkStateStore> LinkStateReconciler<'a, S> {
    /// `max_attempts` of 0 disables the attempt ceiling
    pub fn new(store: &'a S, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    /// Computes and persists this run's work queue
    pub async fn reconcile(&self) -> StorageResult<WorkQueue> {
        self.reconcile_with_report().await.map(|(queue, _)| queue)
    }

    /// Like `reconcile`, also returning what changed
    ///
    /// Steps, in order: load every set; drop scraped links from pending; fold
    /// failed links into pending (or into exhausted once they hit the ceiling);
    /// persist pending, exhausted and attempts; persist an empty failed set.
    pub async fn reconcile_with_report(&self) -> StorageResult<(WorkQueue, ReconcileReport)> {
        let mut pending = self.store.load_pending().await?;
        let failed = self.store.load_failed().await?;
        let scraped = self.store.load_scraped().await?;
        let mut exhausted = self.store.load_exhausted().await?;
        let mut attempts = self.store.load_attempts().await?;

        let mut report = ReconcileReport {
            dropped_scraped: pending.remove_all(&scraped),
            ..Default::default()
        };

        for link in failed.iter() {
            let state = LinkState::classify(link, &scraped, &failed, &exhausted, &attempts);
            if state.is_terminal() {
                continue;
            }

            match state.after_failure(self.max_attempts) {
                LinkState::Exhausted { attempts: count } => {
                    tracing::warn!(
                        "{} failed {} times; parking it until requeued",
                        link,
                        count
                    );
                    attempts.insert(link.clone(), count);
                    if exhausted.insert(link.clone()) {
                        report.newly_exhausted.push(link.clone());
                    }
                }
                next => {
                    attempts.insert(link.clone(), next.attempts());
                    pending.insert(link.clone());
                    report.requeued_failed += 1;
                }
            }
        }

        pending.remove_all(&exhausted);
        exhausted.remove_all(&scraped);
        attempts.retain(|link, _| !scraped.contains(link));

        // Pending first: once it is on disk the failed links cannot be lost.
        self.store.save_pending(&pending).await?;
        self.store.save_exhausted(&exhausted).await?;
        self.store.save_attempts(&attempts).await?;
        self.store.save_failed(&LinkSet::new()).await?;

        report.queued = pending.len();
        tracing::info!(
            "Reconciled link state: {} queued, {} already scraped, {} retried, {} exhausted",
            report.queued,
            report.dropped_scraped,
            report.requeued_failed,
            report.newly_exhausted.len()
        );

        Ok((WorkQueue::new(pending), report))
    }

    /// Moves every exhausted link back to pending with a fresh attempt count
    pub async fn requeue_exhausted(&self) -> StorageResult<usize> {
        let exhausted = self.store.load_exhausted().await?;
        if exhausted.is_empty() {
            return Ok(0);
        }

        let scraped = self.store.load_scraped().await?;
        let mut pending = self.store.load_pending().await?;
        let mut attempts = self.store.load_attempts().await?;

        let mut moved = 0;
        for link in exhausted.iter() {
            attempts.remove(link);
            if !scraped.contains(link) && pending.insert(link.clone()) {
                moved += 1;
            }
        }

        self.store.save_pending(&pending).await?;
        self.store.save_attempts(&attempts).await?;
        self.store.save_exhausted(&LinkSet::new()).await?;

        tracing::info!("Requeued {} exhausted links", moved);
        Ok(moved)
    }
}

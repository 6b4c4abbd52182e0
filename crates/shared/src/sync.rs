//! Idempotent publishing of matched listings into the record store.
//!
//! A sync reads every existing `URL` key first, drops incoming listings that
//! are already present, then writes the rest in fixed-size batches. Store
//! requests are spaced by a fixed delay, both while paging and while writing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{SyncReadError, SyncWriteError};
use crate::models::{ClassifiedListing, SyncedRecord};
use crate::store::{RecordStore, MAX_RECORDS_PER_WRITE};

/// Format of the timestamp shared by every record written in one run
pub const RUN_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Local time of the run, formatted for the store's `Date` column
pub fn run_timestamp() -> String {
    chrono::Local::now().format(RUN_DATE_FORMAT).to_string()
}

/// Pause inserted between consecutive store requests
#[async_trait]
pub trait Throttle: Send + Sync {
    async fn pause(&self);
}

/// Sleeps for a fixed duration
pub struct FixedDelay(pub Duration);

#[async_trait]
impl Throttle for FixedDelay {
    async fn pause(&self) {
        tokio::time::sleep(self.0).await;
    }
}

/// No delay at all
pub struct NoDelay;

#[async_trait]
impl Throttle for NoDelay {
    async fn pause(&self) {}
}

/// Spaces requests so the first one goes out immediately
struct Pacer<'a> {
    throttle: &'a dyn Throttle,
    sent: usize,
}

impl<'a> Pacer<'a> {
    fn new(throttle: &'a dyn Throttle) -> Self {
        Self { throttle, sent: 0 }
    }

    async fn ready(&mut self) {
        if self.sent > 0 {
            self.throttle.pause().await;
        }
        self.sent += 1;
    }
}

/// Outcome of one sync run
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub existing: usize,
    pub candidates: usize,
    /// Inputs carrying `match: false`, never written
    pub rejected: usize,
    pub new_records: usize,
    pub batches: usize,
    pub written: usize,
    pub failures: Vec<SyncWriteError>,
}

pub struct SyncManager {
    store: Box<dyn RecordStore>,
    throttle: Box<dyn Throttle>,
    batch_size: usize,
}

impl SyncManager {
    /// `batch_size` is clamped to the store's per-request limit
    pub fn new(
        store: Box<dyn RecordStore>,
        throttle: Box<dyn Throttle>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            throttle,
            batch_size: batch_size.clamp(1, MAX_RECORDS_PER_WRITE),
        }
    }

    #[cfg(test)]
    pub(crate) fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Sync `listings` using `run_date` as the timestamp of every written record
    pub async fn sync(
        &self,
        listings: &[ClassifiedListing],
        run_date: &str,
    ) -> Result<SyncReport, SyncReadError> {
        let matches: Vec<ClassifiedListing> =
            listings.iter().filter(|l| l.is_match).cloned().collect();
        let rejected = listings.len() - matches.len();
        if rejected > 0 {
            warn!("ignoring {} listings not marked as a match", rejected);
        }

        let mut pacer = Pacer::new(self.throttle.as_ref());

        let existing = self.fetch_existing(&mut pacer).await?;
        info!("{} URLs already present in the store", existing.len());

        let fresh = dedup(&matches, &existing);
        info!("{} new listings to insert", fresh.len());

        let records: Vec<SyncedRecord> = fresh
            .iter()
            .map(|l| SyncedRecord::from_listing(l, run_date))
            .collect();

        let mut report = SyncReport {
            existing: existing.len(),
            candidates: matches.len(),
            rejected,
            new_records: records.len(),
            ..SyncReport::default()
        };

        for (idx, batch) in partition(&records, self.batch_size).into_iter().enumerate() {
            let number = idx + 1;
            pacer.ready().await;
            report.batches += 1;

            match self.store.create_records(batch).await {
                Ok(()) => {
                    info!("batch {}: inserted {} records", number, batch.len());
                    report.written += batch.len();
                }
                Err(e) => {
                    let failure = SyncWriteError {
                        batch: number,
                        records: batch.len(),
                        reason: format!("{:#}", e),
                    };
                    error!("{}", failure);
                    report.failures.push(failure);
                }
            }
        }

        Ok(report)
    }

    /// Page through the store until no cursor comes back
    #[cfg(test)]
    pub(crate) async fn existing_links(&self) -> Result<HashSet<String>, SyncReadError> {
        let mut pacer = Pacer::new(self.throttle.as_ref());
        self.fetch_existing(&mut pacer).await
    }

    async fn fetch_existing(
        &self,
        pacer: &mut Pacer<'_>,
    ) -> Result<HashSet<String>, SyncReadError> {
        let mut existing = HashSet::new();
        let mut cursor: Option<String> = None;
        let mut page = 0;

        loop {
            page += 1;
            pacer.ready().await;

            let result = self
                .store
                .fetch_keys(cursor.as_deref())
                .await
                .map_err(|e| SyncReadError {
                    page,
                    reason: format!("{:#}", e),
                })?;

            debug!(page, keys = result.keys.len(), "fetched existing keys");
            existing.extend(result.keys);

            match result.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(existing)
    }
}

/// Drop listings already in the store, and repeats within the same run.
/// Relative order is kept.
pub fn dedup<'a>(
    listings: &'a [ClassifiedListing],
    existing: &HashSet<String>,
) -> Vec<&'a ClassifiedListing> {
    let mut seen = HashSet::new();
    listings
        .iter()
        .filter(|l| !existing.contains(l.external_link()))
        .filter(|l| seen.insert(l.external_link().to_string()))
        .collect()
}

/// Split into consecutive groups of `size`; only the last may be shorter
pub fn partition<T>(items: &[T], size: usize) -> Vec<&[T]> {
    items.chunks(size.max(1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FilteredListing;
    use crate::testing::{CountingThrottle, MemoryStore};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn matched(n: usize) -> ClassifiedListing {
        ClassifiedListing::new(
            FilteredListing {
                source_id: "s".to_string(),
                company: "Acme".to_string(),
                position: format!("Engineer {}", n),
                department: "Vienna".to_string(),
                external_link: format!("https://x/{}", n),
            },
            true,
        )
    }

    fn manager(store: &Arc<MemoryStore>) -> SyncManager {
        SyncManager::new(Box::new(Arc::clone(store)), Box::new(NoDelay), 10)
    }

    const DATE: &str = "2026-02-01 09:30:00";

    #[test]
    fn test_partition_sizes_and_order() {
        let items: Vec<usize> = (0..23).collect();
        let batches = partition(&items, 10);
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![10, 10, 3]);
        assert_eq!(batches.concat(), items);
    }

    #[test]
    fn test_partition_exact_multiple_and_empty() {
        let items: Vec<usize> = (0..20).collect();
        assert!(partition(&items, 10).iter().all(|b| b.len() == 10));
        assert!(partition::<usize>(&[], 10).is_empty());
    }

    #[test]
    fn test_dedup_drops_existing_and_repeats() {
        let listings = vec![matched(1), matched(2), matched(1), matched(3)];
        let existing: HashSet<String> = ["https://x/2".to_string()].into_iter().collect();
        let links: Vec<&str> = dedup(&listings, &existing)
            .iter()
            .map(|l| l.external_link())
            .collect();
        assert_eq!(links, vec!["https://x/1", "https://x/3"]);
    }

    #[test]
    fn test_batch_size_is_clamped_to_store_limit() {
        let store = Arc::new(MemoryStore::default());
        let sync = SyncManager::new(Box::new(Arc::clone(&store)), Box::new(NoDelay), 50);
        assert_eq!(sync.batch_size(), MAX_RECORDS_PER_WRITE);
    }

    #[tokio::test]
    async fn test_existing_links_pages_until_no_cursor() {
        let store = Arc::new(MemoryStore::with_keys(
            &["https://a", "https://b", "https://c", "https://d", "https://e"],
            2,
        ));
        let links = manager(&store).existing_links().await.unwrap();
        assert_eq!(links.len(), 5);
        assert_eq!(store.reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_store_gives_empty_set() {
        let store = Arc::new(MemoryStore::with_keys(&[], 100));
        let links = manager(&store).existing_links().await.unwrap();
        assert!(links.is_empty());
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_existing_records_never_written() {
        let store = Arc::new(MemoryStore::with_keys(&["https://x/2", "https://x/4"], 100));
        let listings: Vec<ClassifiedListing> = (1..=5).map(matched).collect();

        let report = manager(&store).sync(&listings, DATE).await.unwrap();

        let written = store.written();
        let urls: Vec<&str> = written.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x/1", "https://x/3", "https://x/5"]);
        assert!(written.iter().all(|r| r.status == "New" && r.date == DATE));
        assert_eq!(report.existing, 2);
        assert_eq!(report.new_records, 3);
        assert_eq!(report.written, 3);
    }

    #[tokio::test]
    async fn test_listings_not_marked_as_match_are_never_written() {
        let store = Arc::new(MemoryStore::with_keys(&[], 100));
        let mut rejected = matched(2);
        rejected.is_match = false;
        let listings = vec![matched(1), rejected, matched(3)];

        let report = manager(&store).sync(&listings, DATE).await.unwrap();

        let urls: Vec<String> = store.written().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["https://x/1", "https://x/3"]);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.candidates, 2);
        assert_eq!(report.written, 2);
    }

    #[tokio::test]
    async fn test_rerun_against_unchanged_store_writes_nothing() {
        let store = Arc::new(MemoryStore::with_keys(&[], 4));
        let listings: Vec<ClassifiedListing> = (1..=12).map(matched).collect();
        let sync = manager(&store);

        let first = sync.sync(&listings, DATE).await.unwrap();
        assert_eq!(first.written, 12);
        assert_eq!(first.batches, 2);

        let second = sync.sync(&listings, DATE).await.unwrap();
        assert_eq!(second.existing, 12);
        assert_eq!(second.new_records, 0);
        assert_eq!(second.batches, 0);
        assert_eq!(store.write_calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_later_batches() {
        let store = Arc::new(MemoryStore {
            page_size: 10,
            fail_batches: vec![2],
            ..MemoryStore::default()
        });
        let listings: Vec<ClassifiedListing> = (1..=25).map(matched).collect();

        let report = manager(&store).sync(&listings, DATE).await.unwrap();

        assert_eq!(report.batches, 3);
        assert_eq!(report.written, 15);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].batch, 2);
        assert_eq!(report.failures[0].records, 10);
        assert!(report.failures[0].reason.contains("422"));
        assert_eq!(store.write_calls(), 3);
    }

    #[tokio::test]
    async fn test_read_failure_aborts_before_any_write() {
        let store = Arc::new(MemoryStore {
            page_size: 10,
            fail_reads: true,
            ..MemoryStore::default()
        });
        let listings: Vec<ClassifiedListing> = (1..=3).map(matched).collect();

        let err = manager(&store).sync(&listings, DATE).await.unwrap_err();
        assert_eq!(err.page, 1);
        assert_eq!(store.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_delay_between_every_store_request() {
        let store = Arc::new(MemoryStore::with_keys(
            &["https://old/1", "https://old/2", "https://old/3"],
            1,
        ));
        let throttle = Arc::new(CountingThrottle::default());
        let sync = SyncManager::new(
            Box::new(Arc::clone(&store)),
            Box::new(Arc::clone(&throttle)),
            10,
        );
        let listings: Vec<ClassifiedListing> = (1..=15).map(matched).collect();

        sync.sync(&listings, DATE).await.unwrap();

        // 3 read pages + 2 write batches = 5 requests, 4 gaps
        assert_eq!(throttle.0.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_run_timestamp_format() {
        let stamp = run_timestamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&stamp, RUN_DATE_FORMAT).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_sleeps() {
        let start = tokio::time::Instant::now();
        FixedDelay(Duration::from_millis(250)).pause().await;
        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}

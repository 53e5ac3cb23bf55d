//! Populate-once directory cache.
//!
//! Some resource streams must be cross-referenced against data that only an
//! independent paginated stream provides (enterprise role assignments are
//! listed per organization, but needed per user). The cache runs that stream
//! once, in full, the first time any lookup needs it.

use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::context::SyncContext;
use crate::{SlackError, SlackResult};

/// A record the cache stores, keyed by principal id.
pub trait CacheRecord: Clone + Send + Sync + 'static {
    /// Principal the record belongs to.
    fn principal_id(&self) -> &str;

    /// Folds a later record for the same principal into this one.
    fn absorb(&mut self, other: Self) {
        *self = other;
    }
}

/// One page of the enrichment stream.
#[derive(Debug, Clone)]
pub struct EnrichmentPage<R> {
    pub records: Vec<R>,
    /// Cursor of the next page; `None` or empty once exhausted.
    pub next_cursor: Option<String>,
}

/// The paginated stream a cache is populated from.
#[async_trait]
pub trait EnrichmentSource<R>: Send + Sync {
    /// Fetches the page at `cursor` (`""` for the first page).
    async fn fetch_page(&self, cursor: &str, ctx: &SyncContext) -> SlackResult<EnrichmentPage<R>>;
}

/// Population state of a [`DirectoryEntryCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulationState {
    Unpopulated,
    /// A sub-crawl holds the exclusive lock. Seen under a fresh lock only if
    /// that sub-crawl was dropped mid-flight, which counts as unpopulated.
    Populating,
    Populated,
}

#[derive(Debug)]
struct CacheInner<R> {
    state: PopulationState,
    entries: HashMap<String, R>,
}

/// Cache populated at most once per handler instance.
///
/// Readers only ever see a fully populated map or none at all: the sub-crawl
/// fills a scratch map which is committed under the exclusive lock on success.
pub struct DirectoryEntryCache<R> {
    source: Arc<dyn EnrichmentSource<R>>,
    inner: RwLock<CacheInner<R>>,
}

impl<R> std::fmt::Debug for DirectoryEntryCache<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryEntryCache").finish_non_exhaustive()
    }
}

impl<R: CacheRecord> DirectoryEntryCache<R> {
    /// Creates an unpopulated cache over `source`.
    pub fn new(source: Arc<dyn EnrichmentSource<R>>) -> Self {
        Self {
            source,
            inner: RwLock::new(CacheInner {
                state: PopulationState::Unpopulated,
                entries: HashMap::new(),
            }),
        }
    }

    /// Looks up a principal, populating the cache first if needed.
    ///
    /// `Ok(None)` means the populated cache has no entry for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SlackError::CachePopulationFailed`] to the caller whose lookup
    /// triggered a failed sub-crawl, and [`SlackError::Cancelled`] if the context
    /// was cancelled meanwhile. The cache stays unpopulated in both cases.
    #[instrument(skip(self, ctx))]
    pub async fn get(&self, id: &str, ctx: &SyncContext) -> SlackResult<Option<R>> {
        {
            let inner = self.inner.read().await;
            if inner.state == PopulationState::Populated {
                return Ok(inner.entries.get(id).cloned());
            }
        }

        let mut inner = self.inner.write().await;
        // Another caller may have populated while we waited for the write lock.
        if inner.state != PopulationState::Populated {
            inner.state = PopulationState::Populating;
            match self.crawl(ctx).await {
                Ok(entries) => {
                    info!(entries = entries.len(), "Directory cache populated");
                    inner.entries = entries;
                    inner.state = PopulationState::Populated;
                }
                Err(e) => {
                    inner.entries.clear();
                    inner.state = PopulationState::Unpopulated;
                    if matches!(e, SlackError::Cancelled) {
                        debug!("Directory cache population cancelled");
                        return Err(e);
                    }
                    warn!(error = %e, "Directory cache population failed");
                    return Err(SlackError::CachePopulationFailed(Box::new(e)));
                }
            }
        }

        Ok(inner.entries.get(id).cloned())
    }

    /// Current population state.
    pub async fn state(&self) -> PopulationState {
        self.inner.read().await.state
    }

    /// Returns true once a sub-crawl completed.
    pub async fn is_populated(&self) -> bool {
        self.state().await == PopulationState::Populated
    }

    /// Number of cached principals (zero until populated).
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    async fn crawl(&self, ctx: &SyncContext) -> SlackResult<HashMap<String, R>> {
        let mut entries: HashMap<String, R> = HashMap::new();
        let mut cursor = String::new();
        let mut pages = 0usize;

        loop {
            let page = ctx.run(self.source.fetch_page(&cursor, ctx)).await?;
            pages += 1;
            debug!(page = pages, records = page.records.len(), "Fetched enrichment page");

            for record in page.records {
                match entries.entry(record.principal_id().to_string()) {
                    Entry::Occupied(mut existing) => existing.get_mut().absorb(record),
                    Entry::Vacant(slot) => {
                        slot.insert(record);
                    }
                }
            }

            match page.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) if next == cursor => {
                    return Err(SlackError::Decode(format!(
                        "enrichment stream repeated cursor {next:?}"
                    )));
                }
                Some(next) => cursor = next,
                None => break,
            }
        }

        debug!(pages, entries = entries.len(), "Enrichment sub-crawl complete");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{ErrorOutcome, OutcomeCategory};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug, Clone, PartialEq)]
    struct Assignment {
        id: String,
        roles: Vec<String>,
    }

    impl CacheRecord for Assignment {
        fn principal_id(&self) -> &str {
            &self.id
        }

        fn absorb(&mut self, other: Self) {
            self.roles.extend(other.roles);
        }
    }

    fn entry(id: &str, role: &str) -> Assignment {
        Assignment {
            id: id.to_string(),
            roles: vec![role.to_string()],
        }
    }

    /// Three pages: cursors "", "p2", "p3".
    struct PagedSource {
        calls: AtomicUsize,
        cursors: Mutex<Vec<String>>,
        fail_second_page_times: AtomicUsize,
        delay: Duration,
    }

    impl PagedSource {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                cursors: Mutex::new(Vec::new()),
                fail_second_page_times: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl EnrichmentSource<Assignment> for PagedSource {
        async fn fetch_page(&self, cursor: &str, _ctx: &SyncContext) -> SlackResult<EnrichmentPage<Assignment>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.cursors.lock().unwrap().push(cursor.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            match cursor {
                "" => Ok(EnrichmentPage {
                    records: vec![entry("U1", "R1"), entry("U2", "R1")],
                    next_cursor: Some("p2".to_string()),
                }),
                "p2" => {
                    if self.fail_second_page_times.load(Ordering::SeqCst) > 0 {
                        self.fail_second_page_times.fetch_sub(1, Ordering::SeqCst);
                        return Err(SlackError::api(
                            ErrorOutcome::new(OutcomeCategory::Unavailable),
                            "service_unavailable",
                        ));
                    }
                    Ok(EnrichmentPage {
                        records: vec![entry("U1", "R2"), entry("U3", "R3")],
                        next_cursor: Some("p3".to_string()),
                    })
                }
                _ => Ok(EnrichmentPage {
                    records: vec![entry("U4", "R1")],
                    next_cursor: None,
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_get_populates_once_and_merges() {
        let source = Arc::new(PagedSource::new());
        let cache = DirectoryEntryCache::new(source.clone());
        let ctx = SyncContext::new();

        let u1 = cache.get("U1", &ctx).await.unwrap().unwrap();
        assert_eq!(u1.roles, vec!["R1".to_string(), "R2".to_string()]);
        assert!(cache.get("U4", &ctx).await.unwrap().is_some());
        assert!(cache.get("missing", &ctx).await.unwrap().is_none());

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(cache.is_populated().await);
        assert_eq!(cache.len().await, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_gets_populate_exactly_once() {
        let source = Arc::new(PagedSource {
            delay: Duration::from_millis(20),
            ..PagedSource::new()
        });
        let cache = Arc::new(DirectoryEntryCache::new(source.clone()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                let id = format!("U{}", i % 4 + 1);
                cache.get(&id, &SyncContext::new()).await
            }));
        }

        for handle in handles {
            let found = handle.await.unwrap().unwrap();
            assert!(found.is_some());
        }

        // One sub-crawl of three pages, no matter how many callers raced.
        let cursors = source.cursors.lock().unwrap().clone();
        assert_eq!(cursors, vec!["", "p2", "p3"]);
        assert_eq!(cache.len().await, 4);
    }

    #[tokio::test]
    async fn test_failed_second_page_leaves_cache_unpopulated() {
        let source = Arc::new(PagedSource::new());
        source.fail_second_page_times.store(1, Ordering::SeqCst);
        let cache = DirectoryEntryCache::new(source.clone());
        let ctx = SyncContext::new();

        let err = cache.get("U1", &ctx).await.unwrap_err();
        assert!(matches!(err, SlackError::CachePopulationFailed(_)));
        assert!(err.is_retryable());
        assert_eq!(cache.state().await, PopulationState::Unpopulated);
        assert_eq!(cache.len().await, 0);

        // The retry restarts from the first page.
        let u1 = cache.get("U1", &ctx).await.unwrap().unwrap();
        assert_eq!(u1.roles.len(), 2);
        let cursors = source.cursors.lock().unwrap().clone();
        assert_eq!(cursors, vec!["", "p2", "", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_cancelled_population_commits_nothing() {
        let source = Arc::new(PagedSource::new());
        let cache = DirectoryEntryCache::new(source.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = cache
            .get("U1", &SyncContext::with_cancellation(cancel))
            .await
            .unwrap_err();
        assert!(matches!(err, SlackError::Cancelled));
        assert_eq!(cache.state().await, PopulationState::Unpopulated);

        assert!(cache.get("U1", &SyncContext::new()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_repeated_cursor_is_an_error() {
        struct Stuck;

        #[async_trait]
        impl EnrichmentSource<Assignment> for Stuck {
            async fn fetch_page(&self, _cursor: &str, _ctx: &SyncContext) -> SlackResult<EnrichmentPage<Assignment>> {
                Ok(EnrichmentPage {
                    records: vec![],
                    next_cursor: Some("same".to_string()),
                })
            }
        }

        let cache: DirectoryEntryCache<Assignment> = DirectoryEntryCache::new(Arc::new(Stuck));
        let err = cache.get("U1", &SyncContext::new()).await.unwrap_err();
        assert!(matches!(err, SlackError::CachePopulationFailed(_)));
    }
}

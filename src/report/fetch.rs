//! Pulling per-date totals across a boundary that may not answer, the way the web dashboard asks
//! the extension for its data.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    storage::{SerializedStore, Store},
    utils::clock::Clock,
};

use super::{date_totals, DateTotals};

/// Something that answers a `GET_EXTENSION_DATA` request.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn request(&self) -> Result<DateTotals>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// How long one attempt may take.
    pub timeout: Duration,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(1),
            backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Live(DateTotals),
    /// Nothing answered in time, sample data instead.
    Fallback(DateTotals),
    Cancelled,
}

impl FetchOutcome {
    pub fn totals(self) -> Option<DateTotals> {
        match self {
            FetchOutcome::Live(totals) | FetchOutcome::Fallback(totals) => Some(totals),
            FetchOutcome::Cancelled => None,
        }
    }
}

/// What the dashboard shows when the extension never answers.
pub fn sample_totals() -> DateTotals {
    BTreeMap::from([(
        "Thu Dec 26 2025".to_string(),
        BTreeMap::from([
            ("github.com".to_string(), 7_200_000),
            ("stackoverflow.com".to_string(), 3_600_000),
            ("netlify.com".to_string(), 40_000),
        ]),
    )])
}

/// Asks `source` for its data, retrying on errors and timeouts. Never fails: when every attempt
/// is used up the sample payload is returned.
pub async fn fetch_extension_data(
    source: &dyn DataSource,
    policy: &RetryPolicy,
    clock: &dyn Clock,
    cancel: &CancellationToken,
) -> FetchOutcome {
    for attempt in 1..=policy.attempts {
        debug!("Attempt {attempt} to fetch extension data");

        let result = tokio::select! {
            _ = cancel.cancelled() => return FetchOutcome::Cancelled,
            result = tokio::time::timeout(policy.timeout, source.request()) => result,
        };

        match result {
            Ok(Ok(totals)) => {
                debug!("Received data for {} dates", totals.len());
                return FetchOutcome::Live(totals);
            }
            Ok(Err(e)) => warn!("Attempt {attempt} failed {e:?}"),
            Err(_) => warn!("Attempt {attempt} timed out after {:?}", policy.timeout),
        }

        if attempt < policy.attempts {
            tokio::select! {
                _ = cancel.cancelled() => return FetchOutcome::Cancelled,
                _ = clock.sleep(policy.backoff) => (),
            }
        }
    }

    info!("All attempts failed, using sample data");
    FetchOutcome::Fallback(sample_totals())
}

/// Answers straight from the local store, grouping by local days.
pub struct StoreSource<S> {
    store: Arc<SerializedStore<S>>,
}

impl<S> StoreSource<S> {
    pub fn new(store: Arc<SerializedStore<S>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: Store + Send + Sync> DataSource for StoreSource<S> {
    async fn request(&self) -> Result<DateTotals> {
        let data = self.store.read().await?;
        Ok(date_totals(&data.sites, &Local))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::bail;
    use chrono::Utc;
    use tokio::time::Instant;

    use super::*;
    use crate::{
        storage::memory::MemoryStore,
        utils::{clock::DefaultClock, time::date_label},
    };

    /// Fails the first `failures` calls, or never answers at all when `hang` is set.
    #[derive(Default)]
    struct ScriptedSource {
        calls: AtomicUsize,
        failures: usize,
        hang: bool,
    }

    #[async_trait]
    impl DataSource for ScriptedSource {
        async fn request(&self) -> Result<DateTotals> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if call < self.failures {
                bail!("No listener yet");
            }
            Ok(BTreeMap::from([(
                "Mon Jan 01 2024".to_string(),
                BTreeMap::from([("github.com".to_string(), 1000)]),
            )]))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn answers_on_first_attempt() {
        let source = ScriptedSource::default();
        let outcome =
            fetch_extension_data(&source, &RetryPolicy::default(), &DefaultClock, &CancellationToken::new()).await;

        assert!(matches!(outcome, FetchOutcome::Live(totals) if totals.contains_key("Mon Jan 01 2024")));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_errors_until_an_answer() {
        let source = ScriptedSource {
            failures: 2,
            ..Default::default()
        };
        let started = Instant::now();

        let outcome =
            fetch_extension_data(&source, &RetryPolicy::default(), &DefaultClock, &CancellationToken::new()).await;

        assert!(matches!(outcome, FetchOutcome::Live(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn silence_falls_back_to_sample_after_three_attempts() {
        let source = ScriptedSource {
            hang: true,
            ..Default::default()
        };
        let started = Instant::now();

        let outcome =
            fetch_extension_data(&source, &RetryPolicy::default(), &DefaultClock, &CancellationToken::new()).await;

        assert_eq!(outcome, FetchOutcome::Fallback(sample_totals()));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(3 * 1000 + 2 * 500));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_retrying() {
        let source = ScriptedSource {
            hang: true,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = fetch_extension_data(&source, &RetryPolicy::default(), &DefaultClock, &cancel).await;

        assert_eq!(outcome, FetchOutcome::Cancelled);
        assert_eq!(outcome.totals(), None);
    }

    #[tokio::test]
    async fn store_source_groups_sites_by_local_day() -> Result<()> {
        let store = Arc::new(SerializedStore::new(MemoryStore::default()));
        let now = Utc::now();
        store.update_site_data("github.com", 4000, now).await?;

        let totals = StoreSource::new(store).request().await?;

        assert_eq!(totals[&date_label(now, &Local)]["github.com"], 4000);
        Ok(())
    }
}

//! Route-matched data prefetching.

use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use ssr_core::{DataBinding, Loader, LoaderError, RouteParams, RouteTable};

use crate::client::QueryClient;
use crate::retry::RetryPolicy;

/// Prefetch configuration.
#[derive(Debug, Clone, Default)]
pub struct PrefetchOptions {
    /// Retry policy; `None` derives it from the client's options.
    pub retry: Option<RetryPolicy>,
    /// Upper bound for each loader attempt.
    pub loader_timeout: Option<Duration>,
}

impl PrefetchOptions {
    /// Set the retry policy.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Set the per-attempt loader timeout.
    pub fn with_loader_timeout(mut self, timeout: Duration) -> Self {
        self.loader_timeout = Some(timeout);
        self
    }
}

/// Summary of a prefetch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    /// Routes in the matched branch.
    pub matched_routes: usize,
    /// Loaders that stored data.
    pub fetched: usize,
    /// Loaders that stored an error.
    pub failed: usize,
}

impl PrefetchReport {
    /// Number of loaders that ran.
    pub fn loaders(&self) -> usize {
        self.fetched + self.failed
    }
}

/// Run every loader bound to the routes matching `path` and store the
/// results in `client`.
///
/// All loaders start together and the call returns once each one has
/// settled. A failing loader is stored as an error entry under its key and
/// never affects its siblings.
pub async fn prefetch(
    table: &RouteTable,
    path: &str,
    client: &QueryClient,
    options: &PrefetchOptions,
) -> PrefetchReport {
    let Some(matches) = table.match_path(path) else {
        return PrefetchReport::default();
    };

    let policy = options
        .retry
        .clone()
        .unwrap_or_else(|| RetryPolicy::from_options(client.options()));

    let jobs: Vec<(DataBinding, RouteParams)> = matches
        .iter()
        .filter_map(|m| m.route.data.clone().map(|b| (b, m.params.clone())))
        .collect();

    let mut report = PrefetchReport {
        matched_routes: matches.len(),
        ..Default::default()
    };
    if jobs.is_empty() {
        return report;
    }

    let outcomes = join_all(jobs.into_iter().map(|(binding, params)| {
        let policy = &policy;
        let timeout = options.loader_timeout;
        async move {
            client.mark_pending(&binding.key);
            match load_with_policy(binding.loader.as_ref(), &params, policy, timeout).await {
                Ok(data) => {
                    client.set_query_data(&binding.key, data);
                    true
                }
                Err((err, attempts)) => {
                    client.set_query_error(&binding.key, &err, attempts);
                    false
                }
            }
        }
    }))
    .await;

    for ok in outcomes {
        if ok {
            report.fetched += 1;
        } else {
            report.failed += 1;
        }
    }
    report
}

/// Run a loader under a retry policy; on failure returns the last error and
/// the number of failed attempts.
pub async fn load_with_policy(
    loader: &dyn Loader,
    params: &RouteParams,
    policy: &RetryPolicy,
    timeout: Option<Duration>,
) -> Result<Value, (LoaderError, u32)> {
    let mut attempt = 0;
    loop {
        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, loader.load(params))
                .await
                .unwrap_or_else(|_| Err(LoaderError::Timeout(limit))),
            None => loader.load(params).await,
        };

        match result {
            Ok(data) => return Ok(data),
            Err(err) if policy.should_retry(&err, attempt) => {
                let delay = policy.backoff.delay_for_attempt(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(err) => return Err((err, attempt + 1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::QueryStatus;
    use serde_json::json;
    use ssr_core::{loader_fn, QueryKey, RouteDescriptor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::{sleep, Instant};

    fn slow(ms: u64, value: Value) -> impl Loader {
        loader_fn(move |_params: RouteParams| {
            let value = value.clone();
            async move {
                sleep(Duration::from_millis(ms)).await;
                Ok::<_, LoaderError>(value)
            }
        })
    }

    fn failing(ms: u64) -> impl Loader {
        loader_fn(move |_params: RouteParams| async move {
            sleep(Duration::from_millis(ms)).await;
            Err::<Value, _>(LoaderError::failed("upstream down"))
        })
    }

    // === Fan-out / Fan-in Tests ===

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_every_loader_concurrently() {
        let table = RouteTable::new(vec![RouteDescriptor::new("/:locale?")
            .with_data("layout", slow(300, json!("layout")))
            .child(RouteDescriptor::index().with_data("home", slow(100, json!("home"))))])
        .unwrap();
        let client = QueryClient::new();

        let started = Instant::now();
        let report = prefetch(&table, "/en", &client, &PrefetchOptions::default()).await;

        // Concurrent: bounded by the slowest loader, not the sum.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(400));
        assert_eq!(report.fetched, 2);
        for q in client.snapshot() {
            assert!(q.state.is_settled());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_affect_siblings() {
        let table = RouteTable::new(vec![RouteDescriptor::new("/")
            .with_data("bad", failing(10))
            .child(RouteDescriptor::index().with_data("good", slow(50, json!([1]))))])
        .unwrap();
        let client = QueryClient::new();

        let report = prefetch(&table, "/", &client, &PrefetchOptions::default()).await;

        assert_eq!(report, PrefetchReport { matched_routes: 2, fetched: 1, failed: 1 });
        assert_eq!(client.get_query_data(&QueryKey::named("good")), Some(json!([1])));
        let bad = client.get_query_state(&QueryKey::named("bad")).unwrap();
        assert_eq!(bad.status, QueryStatus::Error);
        assert_eq!(bad.error.as_deref(), Some("loader failed: upstream down"));
    }

    #[tokio::test]
    async fn test_no_loaders_leaves_cache_untouched() {
        let table = RouteTable::new(vec![RouteDescriptor::new("/about")]).unwrap();
        let client = QueryClient::new();

        let report = prefetch(&table, "/about", &client, &PrefetchOptions::default()).await;

        assert_eq!(report.matched_routes, 1);
        assert_eq!(report.loaders(), 0);
        assert!(client.is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_path() {
        let table = RouteTable::new(vec![RouteDescriptor::new("/about")]).unwrap();
        let client = QueryClient::new();

        let report = prefetch(&table, "/missing", &client, &PrefetchOptions::default()).await;
        assert_eq!(report, PrefetchReport::default());
        assert!(client.is_empty());
    }

    #[tokio::test]
    async fn test_loader_receives_route_params() {
        let table = RouteTable::new(vec![RouteDescriptor::new("/product/:id").with_data(
            "product",
            loader_fn(|params: RouteParams| async move {
                Ok::<_, LoaderError>(params.get("id").cloned())
            }),
        )])
        .unwrap();
        let client = QueryClient::new();

        prefetch(&table, "/product/42", &client, &PrefetchOptions::default()).await;
        assert_eq!(client.get_query_data(&QueryKey::named("product")), Some(json!("42")));
    }

    // === Retry / Timeout Tests ===

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_flaky_loader() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let flaky = loader_fn(move |_params: RouteParams| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(LoaderError::failed("first attempt"))
                } else {
                    Ok(json!("ok"))
                }
            }
        });
        let table = RouteTable::new(vec![RouteDescriptor::new("/").with_data("flaky", flaky)]).unwrap();
        let client = QueryClient::new();
        let options = PrefetchOptions::default().with_retry(RetryPolicy::new(1));

        let report = prefetch(&table, "/", &client, &options).await;

        assert_eq!(report.fetched, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loader_timeout_is_an_error_entry() {
        let table = RouteTable::new(vec![RouteDescriptor::new("/").with_data("slow", slow(10_000, json!(1)))])
            .unwrap();
        let client = QueryClient::new();
        let options = PrefetchOptions::default().with_loader_timeout(Duration::from_millis(100));

        let report = prefetch(&table, "/", &client, &options).await;

        assert_eq!(report.failed, 1);
        let state = client.get_query_state(&QueryKey::named("slow")).unwrap();
        assert_eq!(state.status, QueryStatus::Error);
        assert_eq!(state.failure_count, 1);
    }

    // === Isolation Tests ===

    #[tokio::test]
    async fn test_concurrent_requests_do_not_share_entries() {
        let table = RouteTable::new(vec![RouteDescriptor::new("/:user").with_data(
            "profile",
            loader_fn(|params: RouteParams| async move {
                sleep(Duration::from_millis(5)).await;
                Ok::<_, LoaderError>(params.get("user").cloned())
            }),
        )])
        .unwrap();

        let alice = QueryClient::new();
        let bob = QueryClient::new();
        let options = PrefetchOptions::default();
        tokio::join!(
            prefetch(&table, "/alice", &alice, &options),
            prefetch(&table, "/bob", &bob, &options),
        );

        let key = QueryKey::named("profile");
        assert_eq!(alice.get_query_data(&key), Some(json!("alice")));
        assert_eq!(bob.get_query_data(&key), Some(json!("bob")));
        assert_eq!(alice.len(), 1);
        assert_eq!(bob.len(), 1);
    }
}

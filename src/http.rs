//! HTTP client for the log-search backend.
//!
//! This module fetches route fragments with:
//! - Connection pooling shared across trips
//! - Request pacing per API key, paused client-wide on 429 until the
//!   server's `X-RateLimit-Reset`
//! - Parallel fetching of many trips with bounded concurrency
//! - Bounded retries with doubling backoff

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::records::{fragments_for_trip, parse_search_response};
use crate::source::{collect_fragments, FragmentBatch, LogSource, MAX_FRAGMENTS};
use crate::SourceError;

/// Minimum spacing between request starts for one API key.
const REQUEST_INTERVAL: Duration = Duration::from_millis(100);
const MAX_CONCURRENCY: usize = 8;
const MAX_RETRIES: u32 = 3;
/// First pause after a 429 that carries no reset hint; doubles per repeat.
const BASE_BACKOFF_MS: u64 = 1000;
const MAX_PAUSE: Duration = Duration::from_secs(60);

/// Connection settings for the log-search API.
#[derive(Debug, Clone)]
pub struct LogSearchConfig {
    /// Search endpoint, e.g. `https://api.datadoghq.com/api/v2/logs/events/search`.
    pub api_url: String,
    pub api_key: String,
    pub app_key: String,
    /// Base URL for per-event source links.
    pub link_base: String,
    /// Query template; `{trip}` is replaced by the trip id.
    pub query: String,
    /// How far back to search.
    pub lookback_days: i64,
    /// Fragments requested per trip. More matches than this marks the batch truncated.
    pub page_limit: usize,
}

impl Default for LogSearchConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.datadoghq.com/api/v2/logs/events/search".to_string(),
            api_key: String::new(),
            app_key: String::new(),
            link_base: "https://app.datadoghq.com/logs".to_string(),
            query: "env:prod @tripID:{trip} @route:*".to_string(),
            lookback_days: 7,
            page_limit: MAX_FRAGMENTS,
        }
    }
}

/// Progress callback type
pub type ProgressCallback = Arc<dyn Fn(u32, u32) + Send + Sync>;

/// Request pacing shared by every fetch on one client.
///
/// Starts are spaced at least `interval` apart. A 429 moves the next start
/// for all callers out to the server's reset hint, or to a doubling backoff
/// when the response has none.
struct SearchThrottle {
    interval: Duration,
    state: Mutex<ThrottleState>,
}

struct ThrottleState {
    next_start: Instant,
    issued: u32,
    rate_limited: u32,
}

impl SearchThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(ThrottleState {
                next_start: Instant::now(),
                issued: 0,
                rate_limited: 0,
            }),
        }
    }

    /// Take the next start slot and sleep until it. Returns the request number.
    async fn acquire(&self) -> u32 {
        let (wait, number) = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let start = state.next_start.max(now);
            state.next_start = start + self.interval;
            state.issued += 1;
            (start - now, state.issued)
        };

        if !wait.is_zero() {
            debug!("[SearchThrottle] request #{} waits {:?}", number, wait);
            tokio::time::sleep(wait).await;
        }
        number
    }

    async fn on_success(&self) {
        self.state.lock().await.rate_limited = 0;
    }

    /// Push back every pending start after a 429. Returns the pause applied.
    async fn on_rate_limited(&self, reset_hint: Option<Duration>) -> Duration {
        let mut state = self.state.lock().await;
        state.rate_limited += 1;
        let pause = reset_hint
            .unwrap_or_else(|| backoff(state.rate_limited))
            .min(MAX_PAUSE);

        let resume_at = Instant::now() + pause;
        if resume_at > state.next_start {
            state.next_start = resume_at;
        }
        warn!(
            "[SearchThrottle] rate limited ({} in a row), pausing requests for {:?}",
            state.rate_limited, pause
        );
        pause
    }
}

/// 1s, 2s, 4s ... for the n-th consecutive failure (1-based).
fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS << attempt.saturating_sub(1).min(5))
}

/// Seconds until the rate-limit window resets, from the `X-RateLimit-Reset` header.
fn reset_hint(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("x-ratelimit-reset")?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Fetches route fragments for trips from the log-search API.
pub struct LogSearchClient {
    client: Client,
    config: LogSearchConfig,
    throttle: SearchThrottle,
}

impl LogSearchClient {
    pub fn new(config: LogSearchConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .pool_max_idle_per_host(MAX_CONCURRENCY * 2)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SourceError::Http(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            throttle: SearchThrottle::new(REQUEST_INTERVAL),
        })
    }

    pub fn config(&self) -> &LogSearchConfig {
        &self.config
    }

    /// JSON body of the search request for one trip.
    fn request_body(&self, trip_ref: Uuid, now: DateTime<Utc>) -> Value {
        let from = now - chrono::Duration::days(self.config.lookback_days);
        json!({
            "filter": {
                "query": self.config.query.replace("{trip}", &trip_ref.to_string()),
                "from": from.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                "to": now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            },
            "sort": "timestamp",
            "page": { "limit": self.config.page_limit },
        })
    }

    /// Fetch and validate every fragment of one trip.
    pub async fn fetch_fragments(&self, trip_ref: Uuid) -> Result<FragmentBatch, SourceError> {
        let start = Instant::now();

        let body = self.search(trip_ref).await?;
        let page = parse_search_response(&body)?;

        let mut batch = collect_fragments(
            trip_ref,
            fragments_for_trip(&page.records, trip_ref, &self.config.link_base),
            self.config.page_limit,
        );
        if page.next_cursor.is_some() {
            warn!(
                "[Fetch {}] more than {} route records matched, result is truncated",
                trip_ref, self.config.page_limit
            );
            batch.status.truncated = true;
        }

        info!(
            "[Fetch {}] records={} fragments={} failed={} in {:?}",
            trip_ref,
            page.records.len(),
            batch.fragments.len(),
            batch.status.failed_fragments,
            start.elapsed()
        );

        Ok(batch)
    }

    /// Fetch several trips in parallel. Results are in completion order.
    pub async fn fetch_trips(
        &self,
        trip_refs: Vec<Uuid>,
        on_progress: Option<ProgressCallback>,
    ) -> Vec<(Uuid, Result<FragmentBatch, SourceError>)> {
        use futures::stream::{self, StreamExt};

        let total = trip_refs.len() as u32;
        let completed = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        info!(
            "[LogSearchClient] fetching {} trips (request interval {:?}, max concurrent {})",
            total, REQUEST_INTERVAL, MAX_CONCURRENCY
        );

        let results: Vec<(Uuid, Result<FragmentBatch, SourceError>)> = stream::iter(trip_refs)
            .map(|trip_ref| {
                let completed = Arc::clone(&completed);
                let callback = on_progress.clone();

                async move {
                    let result = self.fetch_fragments(trip_ref).await;

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(ref cb) = callback {
                        cb(done, total);
                    }

                    (trip_ref, result)
                }
            })
            .buffer_unordered(MAX_CONCURRENCY)
            .collect()
            .await;

        let success_count = results.iter().filter(|(_, r)| r.is_ok()).count();
        info!(
            "[LogSearchClient] DONE: {}/{} trips fetched in {:.2}s",
            success_count,
            total,
            start.elapsed().as_secs_f64()
        );

        results
    }

    async fn search(&self, trip_ref: Uuid) -> Result<String, SourceError> {
        let body = self.request_body(trip_ref, Utc::now());
        let mut retries = 0;

        loop {
            let number = self.throttle.acquire().await;
            debug!("[Fetch {}] request #{} attempt {}", trip_ref, number, retries + 1);

            let response = self
                .client
                .post(&self.config.api_url)
                .header("DD-API-KEY", &self.config.api_key)
                .header("DD-APPLICATION-KEY", &self.config.app_key)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    retries += 1;
                    if retries > MAX_RETRIES {
                        return Err(SourceError::Status(resp.status().as_u16()));
                    }
                    self.throttle.on_rate_limited(reset_hint(resp.headers())).await;
                }
                Ok(resp) => {
                    self.throttle.on_success().await;
                    let status = resp.status();
                    if !status.is_success() {
                        return Err(SourceError::Status(status.as_u16()));
                    }
                    return resp
                        .text()
                        .await
                        .map_err(|e| SourceError::Http(format!("body download error: {}", e)));
                }
                Err(e) => {
                    retries += 1;
                    if retries > MAX_RETRIES {
                        return Err(SourceError::Http(e.to_string()));
                    }
                    let wait = backoff(retries);
                    warn!("[Fetch {}] {}, retry {} after {:?}", trip_ref, e, retries, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

/// Blocking fetch for synchronous callers.
///
/// Drives its own tokio runtime, so it must not be called from inside one.
impl LogSource for LogSearchClient {
    fn fetch_trip(&self, trip_ref: Uuid) -> Result<FragmentBatch, SourceError> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| SourceError::Runtime(e.to_string()))?;

        rt.block_on(self.fetch_fragments(trip_ref))
    }
}

//! Timed comparison of three ways to fetch a range of resources.
//!
//! - [`Strategy::Direct`]: one fresh connection per request, no retries.
//! - [`Strategy::Pooled`]: sequential requests through one [`ApiClient`].
//! - [`Strategy::Concurrent`]: all requests spawned at once through one
//!   [`ApiClient`], at most [`BenchConfig::workers`] in flight.
//!
//! Every strategy returns its results in identifier order.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::client::decode_body;
use crate::{ApiClient, ApiError, ClientOptions, Result};

pub const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com";
pub const DEFAULT_ENDPOINT: &str = "/posts";

/// Fixed parameters of a benchmark run.
#[derive(Clone, Debug, PartialEq)]
pub struct BenchConfig {
    pub base_url: String,
    /// Collection path; resource `id` lives at `{endpoint}/{id}`.
    pub endpoint: String,
    pub first_id: u32,
    pub last_id: u32,
    /// Size of the worker pool used by [`Strategy::Concurrent`].
    pub workers: usize,
    /// Per-request timeout for [`Strategy::Direct`].
    pub direct_timeout: Duration,
    /// Options for the clients built by the pooled strategies and [`fetch_all`].
    pub client: ClientOptions,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            first_id: 1,
            last_id: 100,
            workers: 10,
            direct_timeout: Duration::from_secs(30),
            client: ClientOptions::default(),
        }
    }
}

impl BenchConfig {
    pub fn ids(&self) -> impl Iterator<Item = u32> {
        self.first_id..=self.last_id
    }

    pub fn resource_path(&self, id: u32) -> String {
        format!("{}/{}", self.endpoint, id)
    }

    fn build_client(&self) -> Result<ApiClient> {
        ApiClient::with_config(self.base_url.as_str(), None, self.client.clone())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Strategy {
    Direct,
    Pooled,
    Concurrent,
}

impl Strategy {
    /// Run order.
    pub const ALL: [Strategy; 3] = [Strategy::Direct, Strategy::Pooled, Strategy::Concurrent];

    pub fn label(self) -> &'static str {
        match self {
            Self::Direct => "Normal Call",
            Self::Pooled => "Call with Client",
            Self::Concurrent => "Thread Calls",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Wall-clock duration of one strategy run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timing {
    pub strategy: Strategy,
    pub elapsed: Duration,
}

pub async fn fetch(strategy: Strategy, config: &BenchConfig) -> Result<Vec<Value>> {
    match strategy {
        Strategy::Direct => fetch_direct(config).await,
        Strategy::Pooled => fetch_pooled(config).await,
        Strategy::Concurrent => fetch_concurrent(config).await,
    }
}

/// Fetches each resource with its own short-lived HTTP client.
///
/// Idle connections are not kept, so every request opens a new one. The
/// status code is not checked; the body is decoded as-is.
pub async fn fetch_direct(config: &BenchConfig) -> Result<Vec<Value>> {
    let mut results = Vec::new();
    for id in config.ids() {
        let url = format!("{}{}", config.base_url, config.resource_path(id));
        let http = reqwest::Client::builder()
            .timeout(config.direct_timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(transport)?;
        let body = http
            .get(url.as_str())
            .send()
            .await
            .map_err(transport)?
            .text()
            .await
            .map_err(transport)?;
        results.push(decode_body(&body)?);
    }
    Ok(results)
}

/// Fetches each resource in turn through one pooled client.
pub async fn fetch_pooled(config: &BenchConfig) -> Result<Vec<Value>> {
    config
        .build_client()?
        .scoped(|client| async move {
            let mut results = Vec::new();
            for id in config.ids() {
                results.push(client.get(&config.resource_path(id)).await?);
            }
            Ok(results)
        })
        .await
}

/// Submits every resource fetch at once to a pool of `config.workers`
/// workers sharing one client, then collects results in submission order.
///
/// The first failed fetch aborts the tasks still pending.
pub async fn fetch_concurrent(config: &BenchConfig) -> Result<Vec<Value>> {
    let workers = Arc::new(Semaphore::new(config.workers.max(1)));

    config
        .build_client()?
        .scoped(|client| async move {
            let tasks: Vec<JoinHandle<Result<Value>>> = config
                .ids()
                .map(|id| {
                    let client = Arc::clone(&client);
                    let workers = Arc::clone(&workers);
                    let path = config.resource_path(id);
                    tokio::spawn(async move {
                        let _permit = workers
                            .acquire_owned()
                            .await
                            .map_err(|err| ApiError::Worker(err.to_string()))?;
                        client.get(&path).await
                    })
                })
                .collect();

            #[cfg(feature = "tracing")]
            tracing::debug!(tasks = tasks.len(), workers = config.workers, "fetches submitted");

            let mut results = Vec::with_capacity(tasks.len());
            let mut pending = tasks.into_iter();
            while let Some(task) = pending.next() {
                let outcome = match task.await {
                    Ok(outcome) => outcome,
                    Err(err) => Err(ApiError::Worker(err.to_string())),
                };
                match outcome {
                    Ok(value) => results.push(value),
                    Err(err) => {
                        for task in pending.by_ref() {
                            task.abort();
                        }
                        return Err(err);
                    }
                }
            }
            Ok(results)
        })
        .await
}

/// Fetches the whole collection at `config.endpoint` in one request.
///
/// HTTP status failures are reported on `out` and yield `Ok(None)`: a 404
/// prints `Not found`, anything else prints the error message. Transport
/// and decode failures are returned as errors.
pub async fn fetch_all<W: Write>(config: &BenchConfig, out: &mut W) -> Result<Option<Value>> {
    let client = config.build_client()?;

    match client.get(&config.endpoint).await {
        Ok(collection) => {
            client.close();
            Ok(Some(collection))
        }
        Err(err @ ApiError::Http { .. }) => {
            if err.status() == Some(404) {
                writeln!(out, "Not found").map_err(ApiError::Output)?;
            } else {
                writeln!(out, "{err}").map_err(ApiError::Output)?;
            }
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Runs every strategy once, in [`Strategy::ALL`] order, writing one
/// `label:<TAB>seconds` line per strategy to `out`.
pub async fn run<W: Write>(config: &BenchConfig, out: &mut W) -> Result<Vec<Timing>> {
    let mut timings = Vec::with_capacity(Strategy::ALL.len());
    for strategy in Strategy::ALL {
        let started = Instant::now();
        let results = fetch(strategy, config).await?;
        let elapsed = started.elapsed();

        debug_assert_eq!(results.len(), config.ids().count());

        #[cfg(feature = "tracing")]
        tracing::info!(%strategy, resources = results.len(), ?elapsed, "strategy finished");

        writeln!(out, "{}:\t{:.6}", strategy.label(), elapsed.as_secs_f64())
            .map_err(ApiError::Output)?;
        timings.push(Timing { strategy, elapsed });
    }
    Ok(timings)
}

fn transport(err: reqwest::Error) -> ApiError {
    ApiError::Transport(err.into())
}

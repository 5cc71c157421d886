// =====================================================================================
// BOUNDED CONCURRENT FAN-OUT
// =====================================================================================

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::error::PerformanceError;
use crate::models::{QueryResult, TaskOutcome};
use crate::services::performance::PerformanceService;

/// A named lookup for `parallel_queries`. `name` plus `params` form the
/// cache identity when results are cached.
pub struct NamedQuery<T> {
    pub name: String,
    pub params: Value,
    operation: Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<T>> + Send>,
}

impl<T> NamedQuery<T> {
    pub fn new<F, Fut>(name: impl Into<String>, params: Value, operation: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            name: name.into(),
            params,
            operation: Box::new(move || Box::pin(operation())),
        }
    }
}

impl PerformanceService {
    /// Runs `tasks` with at most `max_concurrent` in flight.
    ///
    /// `results[i]` always belongs to `tasks[i]`. A failed, panicked or
    /// timed-out task only affects its own slot; the batch always completes
    /// with one slot per task. The timeout clock starts once a task holds a
    /// concurrency permit.
    #[instrument(skip(self, tasks), fields(tasks = tasks.len()))]
    pub async fn parallel_execute<T, Fut>(
        &self,
        tasks: Vec<Fut>,
        max_concurrent: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<TaskOutcome<T>>, PerformanceError>
    where
        T: Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if max_concurrent == 0 {
            return Err(PerformanceError::InvalidConfiguration(
                "max_concurrent must be at least 1".to_string(),
            ));
        }

        let total = tasks.len();
        self.metrics.record_parallel(total);

        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut in_flight = FuturesUnordered::new();

        for (index, task) in tasks.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return TaskOutcome::Failed(anyhow::anyhow!("Concurrency limiter closed: {}", e))
                    }
                };
                run_task(index, task, timeout).await
            });
            in_flight.push(async move { (index, handle.await) });
        }

        // Indexed slots, filled in completion order.
        let mut slots: Vec<Option<TaskOutcome<T>>> = (0..total).map(|_| None).collect();
        while let Some((index, joined)) = in_flight.next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Parallel task {} aborted: {}", index, e);
                    TaskOutcome::Failed(anyhow::anyhow!("Task aborted: {}", e))
                }
            };
            slots[index] = Some(outcome);
        }

        let results: Vec<TaskOutcome<T>> = slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| TaskOutcome::Failed(anyhow::anyhow!("Task produced no result"))))
            .collect();

        let failures = results.iter().filter(|outcome| outcome.is_failure()).count();
        self.metrics.record_errors(failures);
        debug!("Parallel batch finished: {} tasks, {} failed or timed out", total, failures);

        Ok(results)
    }

    /// `parallel_execute` with the configured concurrency cap and task timeout.
    pub async fn parallel_execute_default<T, Fut>(
        &self,
        tasks: Vec<Fut>,
    ) -> Result<Vec<TaskOutcome<T>>, PerformanceError>
    where
        T: Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let max_concurrent = self.config.max_concurrent;
        let timeout = self.config.task_timeout;
        self.parallel_execute(tasks, max_concurrent, timeout).await
    }

    /// Fans out named lookups under one concurrency budget. With
    /// `cache_results` each query is memoized under its own name and params
    /// and the result reports whether it came from cache.
    #[instrument(skip(self, queries), fields(queries = queries.len()))]
    pub async fn parallel_queries<T>(
        &self,
        queries: Vec<NamedQuery<T>>,
        max_concurrent: usize,
        cache_results: bool,
        cache_ttl: Duration,
    ) -> Result<Vec<QueryResult<T>>, PerformanceError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let names: Vec<String> = queries.iter().map(|query| query.name.clone()).collect();

        let tasks: Vec<_> = queries
            .into_iter()
            .map(|query| run_query(self.clone(), query, cache_results, cache_ttl))
            .collect();

        let outcomes = self
            .parallel_execute(tasks, max_concurrent, self.config.task_timeout)
            .await?;

        Ok(outcomes
            .into_iter()
            .zip(names)
            .map(|(outcome, name)| {
                let cached = matches!(outcome, TaskOutcome::Completed((_, true)));
                QueryResult {
                    name,
                    cached,
                    outcome: outcome.map(|(value, _)| value),
                }
            })
            .collect())
    }
}

async fn run_task<T, Fut>(index: usize, task: Fut, timeout: Option<Duration>) -> TaskOutcome<T>
where
    Fut: Future<Output = anyhow::Result<T>>,
{
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Parallel task {} timed out after {:?}", index, limit);
                return TaskOutcome::TimedOut;
            }
        },
        None => task.await,
    };

    match result {
        Ok(value) => TaskOutcome::Completed(value),
        Err(e) => {
            debug!("Parallel task {} failed: {}", index, e);
            TaskOutcome::Failed(e)
        }
    }
}

async fn run_query<T>(
    service: PerformanceService,
    query: NamedQuery<T>,
    cache_results: bool,
    cache_ttl: Duration,
) -> anyhow::Result<(T, bool)>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    let NamedQuery { name, params, operation } = query;
    if !cache_results {
        return operation().await.map(|value| (value, false));
    }

    let full_key = service.cache_key(&name, &params).map_err(into_anyhow)?;
    service
        .memoize(&full_key, cache_ttl, operation)
        .await
        .map_err(into_anyhow)
}

/// Keeps the operation's own error intact when it crosses the task boundary.
fn into_anyhow(err: PerformanceError) -> anyhow::Error {
    match err {
        PerformanceError::Operation(inner) => inner,
        other => anyhow::Error::new(other),
    }
}

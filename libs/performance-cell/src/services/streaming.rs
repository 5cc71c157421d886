// =====================================================================================
// STREAMING RELAY
// =====================================================================================

use async_stream::stream;
use futures::stream::{Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::PerformanceError;
use crate::models::StreamMode;
use crate::services::metrics::PerformanceMetrics;
use crate::services::performance::PerformanceService;

/// Single-pass sequence of text fragments handed to the consumer.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, PerformanceError>> + Send>>;

impl PerformanceService {
    /// Relays `source` to the consumer in the given mode. A source error is
    /// forwarded as `PerformanceError::Stream` and ends the stream.
    pub fn stream_response<S>(&self, source: S, mode: StreamMode) -> FragmentStream
    where
        S: Stream<Item = anyhow::Result<String>> + Send + 'static,
    {
        self.metrics.record_stream();
        let metrics = Arc::clone(&self.metrics);

        match mode {
            StreamMode::Chunks => Box::pin(forward_chunks(source, metrics)),
            StreamMode::Lines => Box::pin(split_lines(source, metrics)),
        }
    }

    /// Forwards fragments like `StreamMode::Chunks` while assembling the full
    /// text. Once the source completes cleanly the text is stored under
    /// `cache_key` by a background task, so a slow backend never delays the
    /// end of the stream. A cached text is replayed as a single fragment and
    /// the source is never polled.
    ///
    /// Nothing is stored if the consumer drops the stream before the source
    /// reports its end.
    pub fn stream_with_cache<S>(&self, source: S, cache_key: &str, ttl: Duration) -> FragmentStream
    where
        S: Stream<Item = anyhow::Result<String>> + Send + 'static,
    {
        self.metrics.record_stream();
        let service = self.clone();
        let cache_key = cache_key.to_string();

        Box::pin(stream! {
            match service.cache_key(&cache_key, &()) {
                Err(e) => {
                    yield Err(e);
                }
                Ok(full_key) => {
                    let lookup_start = Instant::now();
                    let replay = service
                        .lookup(&full_key)
                        .await
                        .and_then(|value| value.as_str().map(str::to_owned));

                    if let Some(text) = replay {
                        service.metrics.record_hit(lookup_start.elapsed());
                        debug!("Replaying cached stream: key={}", full_key);
                        yield Ok(text);
                    } else {
                        service.metrics.record_miss();

                        let mut source = Box::pin(source);
                        let mut assembled = String::new();
                        let mut failed = false;

                        while let Some(fragment) = source.next().await {
                            match fragment {
                                Ok(fragment) => {
                                    assembled.push_str(&fragment);
                                    yield Ok(fragment);
                                }
                                Err(e) => {
                                    failed = true;
                                    service.metrics.record_errors(1);
                                    yield Err(PerformanceError::Stream(e.to_string()));
                                    break;
                                }
                            }
                        }

                        if failed {
                            debug!("Stream for key={} failed, partial text not cached", full_key);
                        } else {
                            let writer = service.clone();
                            tokio::spawn(async move {
                                writer.store(&full_key, &Value::String(assembled), ttl).await;
                            });
                        }
                    }
                }
            }
        })
    }

    /// Text previously stored by `stream_with_cache`, without touching metrics.
    pub async fn cached_stream(&self, cache_key: &str) -> Option<String> {
        let full_key = self.cache_key(cache_key, &()).ok()?;
        self.lookup(&full_key)
            .await
            .and_then(|value| value.as_str().map(str::to_owned))
    }
}

fn forward_chunks<S>(
    source: S,
    metrics: Arc<PerformanceMetrics>,
) -> impl Stream<Item = Result<String, PerformanceError>> + Send
where
    S: Stream<Item = anyhow::Result<String>> + Send + 'static,
{
    stream! {
        let mut source = Box::pin(source);
        while let Some(fragment) = source.next().await {
            match fragment {
                Ok(fragment) => {
                    yield Ok(fragment);
                }
                Err(e) => {
                    metrics.record_errors(1);
                    yield Err(PerformanceError::Stream(e.to_string()));
                    break;
                }
            }
        }
    }
}

fn split_lines<S>(
    source: S,
    metrics: Arc<PerformanceMetrics>,
) -> impl Stream<Item = Result<String, PerformanceError>> + Send
where
    S: Stream<Item = anyhow::Result<String>> + Send + 'static,
{
    stream! {
        let mut source = Box::pin(source);
        let mut buffer = String::new();
        let mut failed = false;

        while let Some(fragment) = source.next().await {
            match fragment {
                Ok(fragment) => {
                    buffer.push_str(&fragment);
                    while let Some(line) = take_line(&mut buffer) {
                        yield Ok(line);
                    }
                }
                Err(e) => {
                    failed = true;
                    metrics.record_errors(1);
                    yield Err(PerformanceError::Stream(e.to_string()));
                    break;
                }
            }
        }

        // Unterminated tail
        if !failed && !buffer.is_empty() {
            yield Ok(buffer);
        }
    }
}

/// Removes the first complete line from `buffer`, without its terminator.
fn take_line(buffer: &mut String) -> Option<String> {
    let end = buffer.find('\n')?;
    let mut line: String = buffer.drain(..=end).collect();
    line.pop();
    if line.ends_with('\r') {
        line.pop();
    }
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_line() {
        let mut buffer = "first\r\nsecond\nthird".to_string();
        assert_eq!(take_line(&mut buffer), Some("first".to_string()));
        assert_eq!(take_line(&mut buffer), Some("second".to_string()));
        assert_eq!(take_line(&mut buffer), None);
        assert_eq!(buffer, "third");
    }

    #[test]
    fn test_take_line_keeps_empty_lines() {
        let mut buffer = "\n\nx\n".to_string();
        assert_eq!(take_line(&mut buffer), Some(String::new()));
        assert_eq!(take_line(&mut buffer), Some(String::new()));
        assert_eq!(take_line(&mut buffer), Some("x".to_string()));
        assert!(buffer.is_empty());
    }
}

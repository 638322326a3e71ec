//! Helpers for collecting finite prefixes of infinite streams in tests.

use std::time::Duration;

use futures::{Stream, StreamExt};

use crate::ext::FeedbackStreamExt;

/// Quiet window used by most tests before a stream is considered settled.
pub const DEFAULT_IDLE: Duration = Duration::from_millis(200);

/// Collect items until `idle` passes without a new one.
pub async fn collect_until_idle<St>(stream: St, idle: Duration) -> Vec<St::Item>
where
    St: Stream + Send,
{
    stream.timeout_or_empty(idle).collect().await
}

/// Collect at most `limit` items, stopping early if the stream goes quiet.
pub async fn collect_prefix<St>(stream: St, limit: usize, idle: Duration) -> Vec<St::Item>
where
    St: Stream + Send,
{
    stream.take(limit).timeout_or_empty(idle).collect().await
}

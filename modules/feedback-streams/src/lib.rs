//! Stream primitives for feedback-loop systems.
//!
//! Provides the pieces a feedback engine is wired from: a multicast,
//! replay-latest subject for broadcasting state, latest-wins switching,
//! distinct-until-changed, delays, idle timeouts, and per-stream error
//! isolation. Everything is a plain `futures::Stream`; timers come from tokio.
//!
//! Zero knowledge of reducers, events, or feedback loops.

pub mod ext;
pub mod subject;
pub mod switch;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use ext::{DelayEach, DistinctUntilChanged, EndOnError, FeedbackStreamExt};
pub use subject::{ReplayLatest, ReplayStream};
pub use switch::SwitchMap;

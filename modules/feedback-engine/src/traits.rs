//! Core traits and types for the feedback engine.

use std::sync::Arc;

use feedback_streams::ReplayStream;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

/// The state stream a feedback loop observes. Starts with the latest state,
/// then delivers every published state in order.
pub type StateStream<S> = ReplayStream<S>;

/// Events a feedback loop sends back to the reducer.
pub type EventStream<E> = BoxStream<'static, E>;

/// Pure state transitions. No I/O, no side effects.
///
/// Called exactly once per event, never concurrently, in the order events
/// arrive. Must be total: an event that does not apply to the current state
/// returns it unchanged.
pub trait Reducer<S, E>: Send + 'static {
    fn reduce(&self, state: S, event: E) -> S;

    /// Fold a recorded sequence of events over `initial`.
    fn replay<I>(&self, initial: S, events: I) -> S
    where
        Self: Sized,
        I: IntoIterator<Item = E>,
    {
        events
            .into_iter()
            .fold(initial, |state, event| self.reduce(state, event))
    }
}

impl<S, E, F> Reducer<S, E> for F
where
    F: Fn(S, E) -> S + Send + 'static,
{
    fn reduce(&self, state: S, event: E) -> S {
        self(state, event)
    }
}

/// A transformation from the state stream to an event stream.
///
/// Cheap to clone. Every clone handed to a system runs as its own instance
/// with its own subscription to the state stream.
pub struct FeedbackLoop<S, E> {
    name: Arc<str>,
    attach: Arc<dyn Fn(StateStream<S>) -> EventStream<E> + Send + Sync>,
}

impl<S, E> Clone for FeedbackLoop<S, E> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            attach: Arc::clone(&self.attach),
        }
    }
}

impl<S: 'static, E: 'static> FeedbackLoop<S, E> {
    pub fn new<F, St>(body: F) -> Self
    where
        F: Fn(StateStream<S>) -> St + Send + Sync + 'static,
        St: Stream<Item = E> + Send + 'static,
    {
        Self {
            name: Arc::from("feedback"),
            attach: Arc::new(move |states| body(states).boxed()),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Arc::from(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start one instance of this loop against `states`.
    pub(crate) fn attach(&self, states: StateStream<S>) -> EventStream<E> {
        (self.attach)(states)
    }
}

//! React builders: feedback loops driven by a query over state.
//!
//! A query extracts a request from each state; an effect turns a request into
//! events. All three builders are latest-wins: a newer request cancels the
//! effect of the one it replaces, and effects only start once every state
//! already waiting has been seen, so a request that is superseded before the
//! loop gets to it never runs.

use std::collections::HashSet;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use feedback_streams::FeedbackStreamExt;
use futures::stream::{self, Stream};
use futures::StreamExt;
use tokio_stream::StreamMap;
use tracing::trace;

use crate::traits::{EventStream, FeedbackLoop, StateStream};

/// React to an equatable request.
///
/// The effect restarts only when the query result changes. A request that
/// disappears cancels its effect; if it comes back, it starts again.
pub fn react<S, R, E, Q, F, St>(query: Q, effect: F) -> FeedbackLoop<S, E>
where
    S: Send + 'static,
    R: PartialEq + Clone + Send + 'static,
    E: Send + 'static,
    Q: Fn(&S) -> Option<R> + Send + Sync + 'static,
    F: Fn(R) -> St + Send + Sync + 'static,
    St: Stream<Item = E> + Send + 'static,
{
    let query = Arc::new(query);
    let effect = Arc::new(effect);

    FeedbackLoop::new(move |states: StateStream<S>| {
        let query = Arc::clone(&query);
        let effect = Arc::clone(&effect);
        states
            .map(move |state| query(&state))
            .distinct_until_changed()
            .switch_map_deferred(move |request| start(&*effect, request))
    })
    .named("react")
}

/// React to a request that cannot be compared, such as a bare trigger.
///
/// Every state for which the query yields a request restarts the effect.
pub fn react_trigger<S, R, E, Q, F, St>(query: Q, effect: F) -> FeedbackLoop<S, E>
where
    S: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    Q: Fn(&S) -> Option<R> + Send + Sync + 'static,
    F: Fn(R) -> St + Send + Sync + 'static,
    St: Stream<Item = E> + Send + 'static,
{
    let query = Arc::new(query);
    let effect = Arc::new(effect);

    FeedbackLoop::new(move |states: StateStream<S>| {
        let query = Arc::clone(&query);
        let effect = Arc::clone(&effect);
        states
            .map(move |state| query(&state))
            .switch_map_deferred(move |request| start(&*effect, request))
    })
    .named("react_trigger")
}

/// React to a set of concurrent requests.
///
/// Each request gets its own effect. On every state, requests that are new
/// start, requests that are gone are cancelled, and requests still present
/// keep running untouched (or stay finished if their effect already
/// completed). Events from different requests interleave in no particular
/// order.
pub fn react_set<S, R, E, Q, F, St>(query: Q, effect: F) -> FeedbackLoop<S, E>
where
    S: Send + 'static,
    R: Hash + Eq + Clone + Unpin + Send + Sync + 'static,
    E: Send + 'static,
    Q: Fn(&S) -> HashSet<R> + Send + Sync + 'static,
    F: Fn(R) -> St + Send + Sync + 'static,
    St: Stream<Item = E> + Send + 'static,
{
    let query: Arc<dyn Fn(&S) -> HashSet<R> + Send + Sync> = Arc::new(query);
    let effect: Arc<dyn Fn(R) -> EventStream<E> + Send + Sync> =
        Arc::new(move |request| effect(request).boxed());

    FeedbackLoop::new(move |states: StateStream<S>| ReactSet {
        states: Some(states),
        query: Arc::clone(&query),
        effect: Arc::clone(&effect),
        requested: HashSet::new(),
        running: StreamMap::new(),
    })
    .named("react_set")
}

fn start<R, E, F, St>(effect: &F, request: Option<R>) -> EventStream<E>
where
    E: Send + 'static,
    F: Fn(R) -> St,
    St: Stream<Item = E> + Send + 'static,
{
    match request {
        Some(request) => effect(request).boxed(),
        None => stream::empty().boxed(),
    }
}

// ---------------------------------------------------------------------------
// ReactSet
// ---------------------------------------------------------------------------

struct ReactSet<S, R, E> {
    states: Option<StateStream<S>>,
    query: Arc<dyn Fn(&S) -> HashSet<R> + Send + Sync>,
    effect: Arc<dyn Fn(R) -> EventStream<E> + Send + Sync>,
    // Still requested, whether or not the effect has completed.
    requested: HashSet<R>,
    running: StreamMap<R, EventStream<E>>,
}

// Requests and effects are never pinned.
impl<S, R, E> Unpin for ReactSet<S, R, E> {}

impl<S, R, E> ReactSet<S, R, E>
where
    R: Hash + Eq + Clone + Unpin,
{
    fn apply_requests(&mut self, requests: HashSet<R>) {
        let mut cancelled = 0;
        for gone in self.requested.difference(&requests) {
            // Dropping an effect stream cancels it.
            if self.running.remove(gone).is_some() {
                cancelled += 1;
            }
        }

        let mut started = 0;
        for request in requests.difference(&self.requested) {
            self.running
                .insert(request.clone(), (self.effect)(request.clone()));
            started += 1;
        }

        if started > 0 || cancelled > 0 {
            trace!(
                started,
                cancelled,
                running = self.running.len(),
                "Requests changed"
            );
        }
        self.requested = requests;
    }
}

impl<S, R, E> Stream for ReactSet<S, R, E>
where
    R: Hash + Eq + Clone + Unpin,
{
    type Item = E;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<E>> {
        let this = self.get_mut();

        while let Some(states) = this.states.as_mut() {
            match states.poll_next_unpin(cx) {
                Poll::Ready(Some(state)) => {
                    let requests = (this.query)(&state);
                    this.apply_requests(requests);
                }
                Poll::Ready(None) => this.states = None,
                Poll::Pending => break,
            }
        }

        // Completed effects leave the map; their requests stay in `requested`.
        match this.running.poll_next_unpin(cx) {
            Poll::Ready(Some((_request, event))) => Poll::Ready(Some(event)),
            Poll::Ready(None) if this.states.is_none() => Poll::Ready(None),
            Poll::Ready(None) | Poll::Pending => Poll::Pending,
        }
    }
}

//! Bind builders: feedback loops assembled from the state stream by hand.
//!
//! The body receives the state stream once per system and returns
//! [`Bindings`]: side-effect streams whose items are discarded (UI wiring,
//! logging) and event streams that feed the reducer.

use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, SelectAll};
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::traits::{EventStream, FeedbackLoop, StateStream};

/// How many ready side-effect items one poll will drain before yielding back
/// to the runtime.
const SUBSCRIPTION_BUDGET: usize = 64;

/// What a bind body produces.
pub struct Bindings<E> {
    /// Run for their side effects only.
    pub subscriptions: Vec<BoxStream<'static, ()>>,
    /// Merged into the loop's output.
    pub events: Vec<EventStream<E>>,
}

impl<E> Default for Bindings<E> {
    fn default() -> Self {
        Self {
            subscriptions: Vec::new(),
            events: Vec::new(),
        }
    }
}

impl<E: Send + 'static> Bindings<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscription<St>(mut self, subscription: St) -> Self
    where
        St: Stream + Send + 'static,
    {
        self.subscriptions.push(subscription.map(|_| ()).boxed());
        self
    }

    pub fn with_events<St>(mut self, events: St) -> Self
    where
        St: Stream<Item = E> + Send + 'static,
    {
        self.events.push(events.boxed());
        self
    }
}

/// Build a loop from a body over the state stream.
pub fn bind<S, E, B>(body: B) -> FeedbackLoop<S, E>
where
    S: Send + 'static,
    E: Send + 'static,
    B: Fn(StateStream<S>) -> Bindings<E> + Send + Sync + 'static,
{
    FeedbackLoop::new(move |states| BindLoop::new(body(states), None)).named("bind")
}

/// Build a loop whose lifetime is bounded by `owner`.
///
/// Only a weak reference to the owner is kept. The body gets a borrow of it
/// while building the bindings. Once the owner is dropped, the next time the
/// loop is polled its bindings are dropped and it stops contributing events;
/// no event is forwarded after the owner is gone.
pub fn bind_with_owner<O, S, E, B>(owner: &Arc<O>, body: B) -> FeedbackLoop<S, E>
where
    O: Send + Sync + 'static,
    S: Send + 'static,
    E: Send + 'static,
    B: Fn(&O, StateStream<S>) -> Bindings<E> + Send + Sync + 'static,
{
    let owner = Arc::downgrade(owner);

    FeedbackLoop::new(move |states| {
        let Some(strong) = owner.upgrade() else {
            debug!("Bind owner already released, loop stays silent");
            return BindLoop::released();
        };
        let bindings = body(&strong, states);
        drop(strong);

        let weak: Weak<O> = owner.clone();
        BindLoop::new(
            bindings,
            Some(Box::new(move || weak.strong_count() > 0)),
        )
    })
    .named("bind_with_owner")
}

type Liveness = Box<dyn Fn() -> bool + Send + Sync>;

struct BindLoop<E> {
    subscriptions: SelectAll<BoxStream<'static, ()>>,
    events: SelectAll<EventStream<E>>,
    subscriptions_done: bool,
    events_done: bool,
    owner_alive: Option<Liveness>,
}

impl<E> BindLoop<E> {
    fn new(bindings: Bindings<E>, owner_alive: Option<Liveness>) -> Self {
        Self {
            subscriptions: stream::select_all(bindings.subscriptions),
            events: stream::select_all(bindings.events),
            subscriptions_done: false,
            events_done: false,
            owner_alive,
        }
    }

    fn released() -> Self {
        Self {
            subscriptions: SelectAll::new(),
            events: SelectAll::new(),
            subscriptions_done: true,
            events_done: true,
            owner_alive: None,
        }
    }

    fn dispose(&mut self) {
        *self = Self::released();
    }
}

impl<E> Stream for BindLoop<E> {
    type Item = E;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<E>> {
        let this = self.get_mut();

        if let Some(alive) = this.owner_alive.as_ref() {
            if !alive() {
                debug!("Bind owner released, disposing bindings");
                this.dispose();
                return Poll::Ready(None);
            }
        }

        if !this.subscriptions_done {
            let mut drained = 0;
            loop {
                if drained == SUBSCRIPTION_BUDGET {
                    cx.waker().wake_by_ref();
                    break;
                }
                match this.subscriptions.poll_next_unpin(cx) {
                    Poll::Ready(Some(())) => drained += 1,
                    Poll::Ready(None) => {
                        this.subscriptions_done = true;
                        break;
                    }
                    Poll::Pending => break,
                }
            }
        }

        if !this.events_done {
            match this.events.poll_next_unpin(cx) {
                Poll::Ready(Some(event)) => return Poll::Ready(Some(event)),
                Poll::Ready(None) => this.events_done = true,
                Poll::Pending => {}
            }
        }

        if this.subscriptions_done && this.events_done {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }
}

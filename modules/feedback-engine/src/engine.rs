//! The feedback system.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use feedback_streams::{ReplayLatest, ReplayStream};
use futures::stream::{self, SelectAll};
use futures::{ready, Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::SystemConfig;
use crate::error::FeedbackError;
use crate::traits::{EventStream, FeedbackLoop, Reducer, StateStream};

/// How many states a spawned driver publishes before yielding to the runtime.
const TRANSITIONS_PER_YIELD: u32 = 32;

/// Build a system with the default configuration. See [`System`].
pub fn system<S, E, R, L>(initial: S, reducer: R, loops: L) -> System<S, E>
where
    S: Clone + Send + 'static,
    E: Send + 'static,
    R: Reducer<S, E>,
    L: IntoIterator<Item = FeedbackLoop<S, E>>,
{
    System::with_config(SystemConfig::default(), initial, reducer, loops)
}

/// One reducer, any number of feedback loops, one state stream.
///
/// `System` is a stream of states and also the thing that drives the loops:
/// each poll takes the next event from the merged loop output, reduces it
/// against the current state, publishes the result to every loop, and yields
/// it. The first item is the initial state.
///
/// Publishing only queues the state in each loop's mailbox. Loop code runs
/// when the system polls the merged events, never inside a publish, so a loop
/// that reacts synchronously to a state cannot re-enter the reducer.
///
/// Loops that complete are removed; the state stream stays open. Dropping the
/// system drops every loop and every in-flight effect.
pub struct System<S, E> {
    config: SystemConfig,
    reducer: Box<dyn Reducer<S, E>>,
    state: Option<S>,
    states: ReplayLatest<S>,
    events: SelectAll<EventStream<E>>,
    announced: bool,
    loops_done: bool,
    finished: bool,
    transitions: u64,
}

// State is never pinned.
impl<S, E> Unpin for System<S, E> {}

impl<S, E> System<S, E>
where
    S: Clone + Send + 'static,
    E: Send + 'static,
{
    pub fn with_config<R, L>(config: SystemConfig, initial: S, reducer: R, loops: L) -> Self
    where
        R: Reducer<S, E>,
        L: IntoIterator<Item = FeedbackLoop<S, E>>,
    {
        let states = ReplayLatest::new(initial.clone());
        let events = stream::select_all(loops.into_iter().map(|feedback| {
            debug!(
                system = config.label.as_str(),
                feedback = feedback.name(),
                "Attaching feedback loop"
            );
            feedback.attach(states.subscribe())
        }));

        Self {
            config,
            reducer: Box::new(reducer),
            state: Some(initial),
            states,
            events,
            announced: false,
            loops_done: false,
            finished: false,
            transitions: 0,
        }
    }

    /// Observe the states without driving the system. Starts with the
    /// current state.
    pub fn subscribe(&self) -> StateStream<S> {
        self.states.subscribe()
    }

    pub fn current(&self) -> S {
        self.states.latest()
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    /// Drive the system on the current tokio runtime and share its states.
    ///
    /// The system keeps running while any [`SharedSystem`] handle or any
    /// [`SharedStateStream`] is alive; dropping the last one aborts it.
    pub fn spawn(self) -> Result<SharedSystem<S>, FeedbackError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| FeedbackError::NoRuntime)?;
        let states = self.states.clone();
        let label = self.config.label.clone();

        let mut system = self;
        // The subject already replays the initial state to subscribers.
        system.announced = true;
        let task = runtime.spawn(async move {
            let mut since_yield = 0;
            while system.next().await.is_some() {
                // A loop that answers every state at once never returns
                // Pending, so give the runtime a turn now and then.
                since_yield += 1;
                if since_yield == TRANSITIONS_PER_YIELD {
                    since_yield = 0;
                    tokio::task::yield_now().await;
                }
            }
        });

        debug!(system = label.as_str(), "Spawned feedback system");
        Ok(SharedSystem {
            states,
            driver: Arc::new(DriverGuard { task, label }),
        })
    }

    fn limit_reached(&self) -> bool {
        self.config
            .max_transitions
            .is_some_and(|limit| self.transitions >= limit)
    }

    fn finish(&mut self) {
        self.finished = true;
        self.events = SelectAll::new();
        self.states.close();
    }
}

impl<S, E> Stream for System<S, E>
where
    S: Clone + Send + 'static,
    E: Send + 'static,
{
    type Item = S;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S>> {
        let this = self.get_mut();

        if this.finished {
            return Poll::Ready(None);
        }
        if !this.announced {
            this.announced = true;
            return Poll::Ready(this.state.clone());
        }
        if this.limit_reached() {
            info!(
                system = this.config.label.as_str(),
                transitions = this.transitions,
                "Transition limit reached"
            );
            this.finish();
            return Poll::Ready(None);
        }
        if this.loops_done {
            return Poll::Pending;
        }

        match ready!(this.events.poll_next_unpin(cx)) {
            Some(event) => {
                let Some(current) = this.state.take() else {
                    this.finish();
                    return Poll::Ready(None);
                };
                let next = this.reducer.reduce(current, event);
                this.transitions += 1;
                this.state = Some(next.clone());
                this.states.publish(next.clone());

                debug!(
                    system = this.config.label.as_str(),
                    transition = this.transitions,
                    "State published"
                );
                Poll::Ready(Some(next))
            }
            None => {
                debug!(
                    system = this.config.label.as_str(),
                    "All feedback loops completed"
                );
                this.loops_done = true;
                Poll::Pending
            }
        }
    }
}

impl<S, E> Drop for System<S, E> {
    fn drop(&mut self) {
        info!(
            system = self.config.label.as_str(),
            transitions = self.transitions,
            "Feedback system torn down"
        );
    }
}

// ---------------------------------------------------------------------------
// SharedSystem: a spawned system with multicast subscribers
// ---------------------------------------------------------------------------

struct DriverGuard {
    task: JoinHandle<()>,
    label: String,
}

impl Drop for DriverGuard {
    fn drop(&mut self) {
        debug!(system = self.label.as_str(), "Last subscriber gone, stopping system");
        self.task.abort();
    }
}

/// Handle to a spawned system. Clone it freely; see [`System::spawn`].
pub struct SharedSystem<S> {
    states: ReplayLatest<S>,
    driver: Arc<DriverGuard>,
}

impl<S> Clone for SharedSystem<S> {
    fn clone(&self) -> Self {
        Self {
            states: self.states.clone(),
            driver: Arc::clone(&self.driver),
        }
    }
}

impl<S: Clone> SharedSystem<S> {
    /// Subscribe to the states. Starts with the most recent one. The stream
    /// keeps the system alive until it is dropped.
    pub fn subscribe(&self) -> SharedStateStream<S> {
        SharedStateStream {
            inner: self.states.subscribe(),
            _driver: Arc::clone(&self.driver),
        }
    }

    pub fn latest(&self) -> S {
        self.states.latest()
    }

    /// True once the driver has stopped, either by reaching its transition
    /// limit or by being aborted.
    pub fn is_finished(&self) -> bool {
        self.driver.task.is_finished()
    }
}

pub struct SharedStateStream<S> {
    inner: ReplayStream<S>,
    _driver: Arc<DriverGuard>,
}

impl<S> Stream for SharedStateStream<S> {
    type Item = S;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S>> {
        self.inner.poll_next_unpin(cx)
    }
}

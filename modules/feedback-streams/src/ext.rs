//! Extension combinators used to build feedback loops and their effects.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{ready, Stream, StreamExt};
use tokio::time::Sleep;
use tracing::{debug, warn};

use crate::switch::SwitchMap;

pub trait FeedbackStreamExt: Stream {
    /// Flat-map-latest. See [`SwitchMap`].
    fn switch_map<F, U>(self, f: F) -> SwitchMap<Self, F, U>
    where
        Self: Sized + Unpin,
        F: FnMut(Self::Item) -> U,
        U: Stream + Unpin,
    {
        SwitchMap::new(self, f, false)
    }

    /// Flat-map-latest that only starts the inner stream for the newest
    /// available item. See [`SwitchMap`].
    fn switch_map_deferred<F, U>(self, f: F) -> SwitchMap<Self, F, U>
    where
        Self: Sized + Unpin,
        F: FnMut(Self::Item) -> U,
        U: Stream + Unpin,
    {
        SwitchMap::new(self, f, true)
    }

    /// Drop items equal to the one forwarded just before them.
    fn distinct_until_changed(self) -> DistinctUntilChanged<Self>
    where
        Self: Sized + Unpin,
        Self::Item: PartialEq + Clone,
    {
        DistinctUntilChanged {
            stream: self,
            last: None,
        }
    }

    /// Hold every item back for `delay` before forwarding it.
    fn delay_each(self, delay: Duration) -> DelayEach<Self>
    where
        Self: Sized + Unpin,
    {
        DelayEach {
            stream: Some(self),
            delay,
            held: None,
        }
    }

    /// Complete as soon as `idle` passes without an item. Must be called
    /// inside a tokio runtime.
    fn timeout_or_empty<'a>(self, idle: Duration) -> BoxStream<'a, Self::Item>
    where
        Self: Sized + Send + 'a,
    {
        let timed = tokio_stream::StreamExt::timeout(self, idle);
        let timed = tokio_stream::StreamExt::map(timed, move |item| {
            if item.is_err() {
                debug!(?idle, "Stream idle, completing");
            }
            item
        });
        let live = tokio_stream::StreamExt::take_while(timed, Result::is_ok);
        tokio_stream::StreamExt::filter_map(live, Result::ok).boxed()
    }

    /// Forward `Ok` values; log the first `Err` and complete.
    fn end_on_error<T, E>(self, context: impl Into<String>) -> EndOnError<Self>
    where
        Self: Stream<Item = Result<T, E>> + Sized + Unpin,
        E: Display,
    {
        EndOnError {
            stream: Some(self),
            context: context.into(),
        }
    }
}

impl<St: Stream + ?Sized> FeedbackStreamExt for St {}

// ---------------------------------------------------------------------------
// DistinctUntilChanged
// ---------------------------------------------------------------------------

pub struct DistinctUntilChanged<St: Stream> {
    stream: St,
    last: Option<St::Item>,
}

// Items are never pinned.
impl<St: Stream + Unpin> Unpin for DistinctUntilChanged<St> {}

impl<St> Stream for DistinctUntilChanged<St>
where
    St: Stream + Unpin,
    St::Item: PartialEq + Clone,
{
    type Item = St::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<St::Item>> {
        let this = self.get_mut();
        loop {
            match ready!(this.stream.poll_next_unpin(cx)) {
                Some(item) if this.last.as_ref() == Some(&item) => continue,
                Some(item) => {
                    this.last = Some(item.clone());
                    return Poll::Ready(Some(item));
                }
                None => return Poll::Ready(None),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DelayEach
// ---------------------------------------------------------------------------

pub struct DelayEach<St: Stream> {
    stream: Option<St>,
    delay: Duration,
    held: Option<(St::Item, Pin<Box<Sleep>>)>,
}

impl<St: Stream + Unpin> Unpin for DelayEach<St> {}

impl<St> Stream for DelayEach<St>
where
    St: Stream + Unpin,
{
    type Item = St::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<St::Item>> {
        let this = self.get_mut();
        loop {
            if let Some((_, sleep)) = this.held.as_mut() {
                ready!(sleep.as_mut().poll(cx));
                if let Some((item, _)) = this.held.take() {
                    return Poll::Ready(Some(item));
                }
            }

            let Some(stream) = this.stream.as_mut() else {
                return Poll::Ready(None);
            };
            match ready!(stream.poll_next_unpin(cx)) {
                Some(item) => {
                    this.held = Some((item, Box::pin(tokio::time::sleep(this.delay))));
                }
                None => {
                    this.stream = None;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EndOnError
// ---------------------------------------------------------------------------

pub struct EndOnError<St> {
    stream: Option<St>,
    context: String,
}

impl<St, T, E> Stream for EndOnError<St>
where
    St: Stream<Item = Result<T, E>> + Unpin,
    E: Display,
{
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        let Some(stream) = this.stream.as_mut() else {
            return Poll::Ready(None);
        };

        match ready!(stream.poll_next_unpin(cx)) {
            Some(Ok(value)) => Poll::Ready(Some(value)),
            Some(Err(e)) => {
                warn!(context = this.context.as_str(), error = %e, "Effect stream failed, ending it");
                this.stream = None;
                Poll::Ready(None)
            }
            None => {
                this.stream = None;
                Poll::Ready(None)
            }
        }
    }
}

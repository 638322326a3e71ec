//! Multicast, replay-latest subject.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::{Stream, StreamExt};

struct Shared<T> {
    latest: T,
    subscribers: Vec<UnboundedSender<T>>,
    closed: bool,
}

/// Holds one current value and broadcasts every new value to all subscribers.
///
/// A subscriber first receives the latest value, then every later value in
/// publish order. Each subscriber has its own unbounded mailbox, so `publish`
/// never blocks and never runs subscriber code: delivery happens when the
/// subscriber is next polled.
///
/// Cloning shares the same subject. Subscriber streams complete once every
/// clone has been dropped or the subject is closed.
pub struct ReplayLatest<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> Clone for ReplayLatest<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> ReplayLatest<T> {
    pub fn new(initial: T) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                latest: initial,
                subscribers: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Replace the current value and queue it for every live subscriber.
    /// Subscribers whose stream was dropped are pruned here. Ignored once the
    /// subject is closed.
    pub fn publish(&self, value: T) {
        let mut shared = self.lock();
        if shared.closed {
            return;
        }
        shared
            .subscribers
            .retain(|tx| tx.unbounded_send(value.clone()).is_ok());
        shared.latest = value;
    }

    /// Subscribe. The returned stream yields the current value immediately.
    pub fn subscribe(&self) -> ReplayStream<T> {
        attach(&self.shared)
    }

    /// Complete every subscriber stream after its queued values. Later
    /// subscribers still receive the final value, then complete.
    pub fn close(&self) {
        let mut shared = self.lock();
        shared.closed = true;
        shared.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// A copy of the current value.
    pub fn latest(&self) -> T {
        self.lock().latest.clone()
    }

    /// Number of subscribers whose stream is still alive.
    pub fn subscriber_count(&self) -> usize {
        let mut shared = self.lock();
        shared.subscribers.retain(|tx| !tx.is_closed());
        shared.subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Shared<T>> {
        lock(&self.shared)
    }
}

fn lock<T>(shared: &Mutex<Shared<T>>) -> MutexGuard<'_, Shared<T>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn attach<T: Clone>(shared: &Arc<Mutex<Shared<T>>>) -> ReplayStream<T> {
    let (tx, rx) = mpsc::unbounded();
    let mut guard = lock(shared);
    // The receiver is alive, so this cannot fail.
    let _ = tx.unbounded_send(guard.latest.clone());
    if !guard.closed {
        guard.subscribers.push(tx);
    }
    ReplayStream {
        rx,
        source: Arc::downgrade(shared),
    }
}

/// One subscription to a [`ReplayLatest`]. Dropping it detaches.
///
/// Cloning subscribes again: the clone starts from the subject's latest value,
/// not from whatever this stream still has queued. A clone taken after the
/// subject is gone is already complete.
pub struct ReplayStream<T> {
    rx: UnboundedReceiver<T>,
    source: Weak<Mutex<Shared<T>>>,
}

impl<T> Unpin for ReplayStream<T> {}

impl<T: Clone> Clone for ReplayStream<T> {
    fn clone(&self) -> Self {
        match self.source.upgrade() {
            Some(shared) => attach(&shared),
            None => {
                let (_, rx) = mpsc::unbounded();
                ReplayStream {
                    rx,
                    source: Weak::new(),
                }
            }
        }
    }
}

impl<T> Stream for ReplayStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_next_unpin(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn ready_items<T>(stream: &mut ReplayStream<T>) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(Some(item)) = stream.next().now_or_never() {
            items.push(item);
        }
        items
    }

    #[test]
    fn subscriber_receives_latest_then_updates() {
        let subject = ReplayLatest::new(1);
        subject.publish(2);

        let mut late = subject.subscribe();
        subject.publish(3);
        subject.publish(4);

        assert_eq!(ready_items(&mut late), vec![2, 3, 4]);
        assert_eq!(subject.latest(), 4);
    }

    #[test]
    fn every_subscriber_sees_every_value_in_order() {
        let subject = ReplayLatest::new("a".to_string());
        let mut first = subject.subscribe();
        let mut second = subject.subscribe();

        subject.publish("b".into());
        subject.publish("c".into());

        assert_eq!(ready_items(&mut first), vec!["a", "b", "c"]);
        assert_eq!(ready_items(&mut second), vec!["a", "b", "c"]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let subject = ReplayLatest::new(0u32);
        let kept = subject.subscribe();
        let dropped = subject.subscribe();
        assert_eq!(subject.subscriber_count(), 2);

        drop(dropped);
        subject.publish(1);
        assert_eq!(subject.subscriber_count(), 1);
        drop(kept);
        assert_eq!(subject.subscriber_count(), 0);
    }

    #[test]
    fn close_completes_current_and_future_subscribers() {
        let subject = ReplayLatest::new(1);
        let mut early = subject.subscribe();
        subject.publish(2);
        subject.close();
        subject.publish(3);

        assert_eq!(ready_items(&mut early), vec![1, 2]);
        assert_eq!(early.next().now_or_never(), Some(None));

        let mut late = subject.subscribe();
        assert_eq!(ready_items(&mut late), vec![2]);
        assert_eq!(late.next().now_or_never(), Some(None));
        assert!(subject.is_closed());
    }

    #[test]
    fn clone_resubscribes_at_latest() {
        let subject = ReplayLatest::new(1);
        let mut original = subject.subscribe();
        subject.publish(2);

        let mut copy = original.clone();
        subject.publish(3);

        assert_eq!(ready_items(&mut original), vec![1, 2, 3]);
        assert_eq!(ready_items(&mut copy), vec![2, 3]);

        drop(subject);
        let mut orphan = copy.clone();
        assert_eq!(orphan.next().now_or_never(), Some(None));
    }

    #[test]
    fn dropping_subject_completes_subscribers() {
        let subject = ReplayLatest::new(7u8);
        let mut stream = subject.subscribe();
        drop(subject);

        assert_eq!(stream.next().now_or_never(), Some(Some(7)));
        assert_eq!(stream.next().now_or_never(), Some(None));
    }
}

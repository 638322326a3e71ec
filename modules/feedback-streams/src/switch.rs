//! Latest-wins flattening.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};

/// Maps every outer item to an inner stream and forwards only the newest
/// inner stream. Replacing the inner stream drops the previous one, which is
/// how an in-flight effect gets cancelled.
///
/// Two modes:
/// - immediate: the inner stream built for an outer item is polled before the
///   next outer item is taken, so a synchronous inner emits once per item.
/// - deferred: every outer item that is already available is taken first and
///   only the inner stream for the newest one is polled. Inner streams that
///   were superseded in the same batch never run.
pub struct SwitchMap<St, F, U> {
    outer: Option<St>,
    f: F,
    inner: Option<U>,
    deferred: bool,
}

impl<St, F, U> SwitchMap<St, F, U> {
    pub(crate) fn new(outer: St, f: F, deferred: bool) -> Self {
        Self {
            outer: Some(outer),
            f,
            inner: None,
            deferred,
        }
    }
}

// The mapping closure is never pinned.
impl<St: Unpin, F, U: Unpin> Unpin for SwitchMap<St, F, U> {}

impl<St, F, U> Stream for SwitchMap<St, F, U>
where
    St: Stream + Unpin,
    F: FnMut(St::Item) -> U,
    U: Stream + Unpin,
{
    type Item = U::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<U::Item>> {
        let this = self.get_mut();

        loop {
            let mut switched = false;

            if let Some(outer) = this.outer.as_mut() {
                loop {
                    match outer.poll_next_unpin(cx) {
                        Poll::Ready(Some(item)) => {
                            // Cancel before the replacement is built.
                            this.inner = None;
                            this.inner = Some((this.f)(item));
                            switched = true;
                            if !this.deferred {
                                break;
                            }
                        }
                        Poll::Ready(None) => {
                            this.outer = None;
                            break;
                        }
                        Poll::Pending => break,
                    }
                }
            }

            if let Some(inner) = this.inner.as_mut() {
                match inner.poll_next_unpin(cx) {
                    Poll::Ready(Some(item)) => return Poll::Ready(Some(item)),
                    Poll::Ready(None) => this.inner = None,
                    Poll::Pending => {}
                }
            }

            if this.outer.is_none() && this.inner.is_none() {
                return Poll::Ready(None);
            }
            if !switched {
                return Poll::Pending;
            }
        }
    }
}

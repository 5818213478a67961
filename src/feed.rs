//! LiveFeed: deduplicating, replay-latest, multicast broadcast.
//!
//! One feed owns the last delivered value and the list of listener channels.
//! Both are only touched from tasks submitted to the delivery executor, so a
//! serial delivery context sees publishes and registrations in one order:
//!   - a publish equal to the last value is dropped
//!   - a new listener first receives the last value, then every later change
//!   - closed listeners are pruned on the next publish

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::executor::Executor;

struct FeedState<T> {
    last: Option<T>,
    listeners: Vec<mpsc::UnboundedSender<T>>,
}

/// Handle to a shared feed. Clones observe the same sequence.
pub struct LiveFeed<T> {
    state: Arc<Mutex<FeedState<T>>>,
    delivery: Arc<dyn Executor>,
}

impl<T> Clone for LiveFeed<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            delivery: Arc::clone(&self.delivery),
        }
    }
}

fn lock<T>(state: &Mutex<FeedState<T>>) -> MutexGuard<'_, FeedState<T>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> LiveFeed<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    pub fn new(delivery: Arc<dyn Executor>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FeedState {
                last: None,
                listeners: Vec::new(),
            })),
            delivery,
        }
    }

    /// Offer a value; delivered unless it equals the previous delivery.
    pub fn publish(&self, value: T) {
        let state = Arc::clone(&self.state);
        self.delivery.execute(Box::pin(async move {
            let mut state = lock(&state);
            if state.last.as_ref() == Some(&value) {
                tracing::trace!("feed dropped duplicate emission");
                return;
            }
            state.listeners.retain(|tx| tx.send(value.clone()).is_ok());
            state.last = Some(value);
        }));
    }

    /// Register a listener. It is handed the latest value (if any) on the
    /// delivery context before any later emission.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::clone(&self.state);
        self.delivery.execute(Box::pin(async move {
            let mut state = lock(&state);
            if let Some(last) = &state.last {
                if tx.send(last.clone()).is_err() {
                    return;
                }
            }
            state.listeners.push(tx);
        }));
        Subscription { rx }
    }

    /// Forward every item of `source` into the feed. The forwarding task runs
    /// on `driver` and lives as long as `source` keeps producing; it is not
    /// stopped when listeners go away.
    pub fn drive<S>(&self, source: S, driver: &dyn Executor)
    where
        S: Stream<Item = T> + Send + 'static,
    {
        let feed = self.clone();
        driver.execute(Box::pin(async move {
            let mut source = Box::pin(source);
            while let Some(value) = source.next().await {
                feed.publish(value);
            }
            tracing::debug!("feed source ended");
        }));
    }

    /// The last value handed to listeners.
    pub fn latest(&self) -> Option<T> {
        lock(&self.state).last.clone()
    }

    /// Listeners that have not dropped their [`Subscription`].
    pub fn subscriber_count(&self) -> usize {
        let mut state = lock(&self.state);
        state.listeners.retain(|tx| !tx.is_closed());
        state.listeners.len()
    }
}

/// Receiving end of a [`LiveFeed`]. Ends only if the feed itself is gone.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next value if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

//! Observable implementation (RxJS-like)
//!
//! An [`Observable`] is cold: it holds a producer that is run once per
//! subscription. Subscribing yields a `Stream` of `Result<T>`; an `Err`
//! item is terminal. Dropping the stream unsubscribes and runs the
//! teardown registered by [`Observable::create`].

use crate::error::{DriverError, Result};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::operators;
use super::share::{share, share_replay};
use super::subject::ReplaySubject;

/// Teardown logic run when a subscription ends
pub type Teardown = Box<dyn FnOnce() + Send>;

/// A single notification travelling from producer to subscriber
#[derive(Debug, Clone)]
pub(crate) enum Signal<T> {
    Next(T),
    Error(DriverError),
    Complete,
}

/// Observer handed to [`Observable::create`] - similar to RxJS Observer
///
/// Cheap to clone, so backend callbacks can each own one. Once `error` or
/// `complete` has been called, further notifications are dropped.
pub struct Observer<T> {
    tx: mpsc::UnboundedSender<Signal<T>>,
    closed: Arc<AtomicBool>,
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<T> Observer<T> {
    fn new(tx: mpsc::UnboundedSender<Signal<T>>) -> Self {
        Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Emit a value
    pub fn next(&self, value: T) {
        if !self.is_closed() {
            let _ = self.tx.send(Signal::Next(value));
        }
    }

    /// Terminate the subscription with an error
    pub fn error(&self, error: DriverError) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(Signal::Error(error));
        }
    }

    /// Terminate the subscription successfully
    pub fn complete(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(Signal::Complete);
        }
    }

    /// True once terminated or once the subscriber has gone away
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
    }
}

/// Stream side of a channel of [`Signal`]s
///
/// Ends after the first terminal signal and runs its teardown exactly once,
/// either then or when dropped.
pub(crate) struct SignalStream<T> {
    rx: mpsc::UnboundedReceiver<Signal<T>>,
    teardown: Option<Teardown>,
    done: bool,
}

impl<T> SignalStream<T> {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Signal<T>>, teardown: Option<Teardown>) -> Self {
        Self {
            rx,
            teardown,
            done: false,
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.rx.close();
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl<T> Stream for SignalStream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Signal::Next(value))) => Poll::Ready(Some(Ok(value))),
            Poll::Ready(Some(Signal::Error(error))) => {
                self.finish();
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(Some(Signal::Complete)) | Poll::Ready(None) => {
                self.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for SignalStream<T> {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

/// Subscription handle - similar to RxJS Subscription
#[derive(Clone)]
pub struct Subscription {
    is_active: Arc<Mutex<bool>>,
    task: Option<AbortHandle>,
}

impl Subscription {
    fn new(task: AbortHandle) -> Self {
        Self {
            is_active: Arc::new(Mutex::new(true)),
            task: Some(task),
        }
    }

    /// Unsubscribe from the observable
    ///
    /// The underlying stream is dropped by the runtime shortly after, which
    /// runs the producer's teardown.
    pub fn unsubscribe(&self) {
        if let Ok(mut active) = self.is_active.lock() {
            *active = false;
        }
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Check if subscription is active
    pub fn is_active(&self) -> bool {
        let active = self.is_active.lock().map(|a| *a).unwrap_or(false);
        active && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

type Producer<T> = dyn Fn() -> BoxStream<'static, Result<T>> + Send + Sync;

/// Observable wrapper - similar to RxJS Observable
pub struct Observable<T> {
    producer: Arc<Producer<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
        }
    }
}

impl<T> Observable<T> {
    pub(crate) fn downgrade(&self) -> WeakObservable<T> {
        WeakObservable {
            producer: Arc::downgrade(&self.producer),
        }
    }
}

/// Non-owning handle to an [`Observable`]
pub(crate) struct WeakObservable<T> {
    producer: Weak<Producer<T>>,
}

impl<T> WeakObservable<T> {
    pub(crate) fn upgrade(&self) -> Option<Observable<T>> {
        self.producer.upgrade().map(|producer| Observable { producer })
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.producer.strong_count() > 0
    }
}

impl<T: Send + 'static> Observable<T> {
    pub(crate) fn from_producer<F>(producer: F) -> Self
    where
        F: Fn() -> BoxStream<'static, Result<T>> + Send + Sync + 'static,
    {
        Self {
            producer: Arc::new(producer),
        }
    }

    /// Create an Observable from subscribe/teardown logic (RxJS `Observable.create`)
    ///
    /// `subscribe` runs synchronously for every subscription and returns the
    /// teardown to run when that subscription ends.
    ///
    /// # Example
    /// ```no_run
    /// # use firebase_driver::rx::Observable;
    /// let ticks = Observable::create(|observer| {
    ///     observer.next(1);
    ///     observer.next(2);
    ///     observer.complete();
    ///     Box::new(|| {})
    /// });
    /// ```
    pub fn create<F>(subscribe: F) -> Self
    where
        F: Fn(Observer<T>) -> Teardown + Send + Sync + 'static,
    {
        Self::from_producer(move || {
            let (tx, rx) = mpsc::unbounded_channel();
            let teardown = subscribe(Observer::new(tx));
            SignalStream::new(rx, Some(teardown)).boxed()
        })
    }

    /// Create an Observable from a Stream
    ///
    /// A stream can only be consumed once: the first subscription takes it,
    /// later subscriptions complete immediately.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        let slot: Arc<Mutex<Option<BoxStream<'static, T>>>> =
            Arc::new(Mutex::new(Some(stream.boxed())));

        Self::from_producer(move || {
            let taken = slot.lock().ok().and_then(|mut s| s.take());
            match taken {
                Some(stream) => stream.map(Ok).boxed(),
                None => {
                    tracing::warn!("Stream-backed observable subscribed more than once");
                    stream::empty().boxed()
                }
            }
        })
    }

    /// Lazily run a future per subscription and emit its outcome
    pub fn from_future<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self::from_producer(move || stream::once(factory()).boxed())
    }

    /// Observable that completes without emitting
    pub fn empty() -> Self {
        Self::from_producer(|| stream::empty().boxed())
    }

    /// Observable that fails immediately with `error`
    pub fn throw(error: DriverError) -> Self {
        Self::from_producer(move || stream::once(futures::future::ready(Err(error.clone()))).boxed())
    }

    /// Subscribe and get the notifications as a Stream
    ///
    /// Dropping the stream unsubscribes.
    pub fn to_stream(&self) -> BoxStream<'static, Result<T>> {
        (self.producer)()
    }

    /// Subscribe with next/error/complete callbacks (RxJS style)
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    ///
    /// # Example
    /// ```no_run
    /// # use firebase_driver::rx::Observable;
    /// let obs = Observable::of(vec![1, 2, 3]);
    ///
    /// obs.subscribe(
    ///     |value| println!("Next: {}", value),
    ///     |err| eprintln!("Error: {}", err),
    ///     || println!("Complete!")
    /// );
    /// ```
    pub fn subscribe<N, E, C>(&self, mut next: N, mut on_error: E, mut complete: C) -> Subscription
    where
        N: FnMut(T) + Send + 'static,
        E: FnMut(DriverError) + Send + 'static,
        C: FnMut() + Send + 'static,
    {
        let mut stream = self.to_stream();

        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(value) => next(value),
                    Err(err) => {
                        on_error(err);
                        return;
                    }
                }
            }
            complete();
        });

        Subscription::new(task.abort_handle())
    }

    /// Subscribe with only next callback (simplified)
    pub fn subscribe_next<F>(&self, next: F) -> Subscription
    where
        F: FnMut(T) + Send + 'static,
    {
        self.subscribe(next, |_| {}, || {})
    }

    /// Map operator - transform values
    pub fn map<F, R>(&self, f: F) -> Observable<R>
    where
        F: Fn(T) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Observable::from_producer(move || {
            let f = Arc::clone(&f);
            source.to_stream().map(move |item| item.map(|v| f(v))).boxed()
        })
    }

    /// Filter operator - filter values
    pub fn filter<F>(&self, f: F) -> Observable<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Observable::from_producer(move || {
            let f = Arc::clone(&f);
            source
                .to_stream()
                .filter(move |item| {
                    let keep = item.as_ref().map(|v| f(v)).unwrap_or(true);
                    async move { keep }
                })
                .boxed()
        })
    }

    /// FilterMap operator - transform values, dropping those mapped to `None`
    pub fn filter_map<F, R>(&self, f: F) -> Observable<R>
    where
        F: Fn(T) -> Option<R> + Send + Sync + 'static,
        R: Send + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Observable::from_producer(move || {
            let f = Arc::clone(&f);
            source
                .to_stream()
                .filter_map(move |item| {
                    let mapped = match item {
                        Ok(value) => f(value).map(Ok),
                        Err(error) => Some(Err(error)),
                    };
                    async move { mapped }
                })
                .boxed()
        })
    }

    /// Tap operator - run a side effect for each value (RxJS `tap`/`do`)
    pub fn tap<F>(&self, f: F) -> Observable<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Observable::from_producer(move || {
            let f = Arc::clone(&f);
            source
                .to_stream()
                .inspect(move |item| {
                    if let Ok(value) = item {
                        f(value);
                    }
                })
                .boxed()
        })
    }

    /// Take operator - take first N values
    pub fn take(&self, n: usize) -> Observable<T> {
        let source = self.clone();
        Observable::from_producer(move || source.to_stream().take(n).boxed())
    }

    /// FlatMap operator - subscribe to an inner observable per value and merge them
    pub fn flat_map<F, U>(&self, f: F) -> Observable<U>
    where
        F: Fn(T) -> Observable<U> + Send + Sync + 'static,
        U: Send + 'static,
    {
        operators::flat_map(self.clone(), f)
    }
}

impl<T: Clone + Send + Sync + 'static> Observable<T> {
    /// Observable that emits each item then completes
    pub fn of(items: Vec<T>) -> Self {
        Self::from_producer(move || stream::iter(items.clone().into_iter().map(Ok)).boxed())
    }
}

impl<T: Clone + Send + 'static> Observable<T> {
    /// Share operator - multicast one upstream subscription (RxJS `share`)
    ///
    /// The upstream is subscribed when the first subscriber arrives and
    /// released when the last one leaves. Late subscribers miss earlier
    /// values.
    ///
    /// # Panics
    ///
    /// Subscribing to the shared observable spawns the forwarding task, so
    /// the first subscription panics outside a Tokio runtime.
    pub fn share(&self) -> Observable<T> {
        share(self.clone(), super::DEFAULT_SHARE_CAPACITY)
    }

    /// Share with a custom per-subscriber buffer size
    pub fn share_with_capacity(&self, capacity: usize) -> Observable<T> {
        share(self.clone(), capacity)
    }

    /// Run the upstream at most once, on first subscription, and replay its
    /// latest value and terminal signal to every subscriber
    ///
    /// The first subscription panics outside a Tokio runtime.
    pub fn share_replay(&self) -> Observable<T> {
        share_replay(self.clone())
    }

    /// Subscribe to the upstream now and replay its latest value and
    /// terminal signal to every subscriber
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn publish_replay(&self) -> Observable<T> {
        let subject = ReplaySubject::new();
        subject.feed(self.to_stream());
        subject.as_observable()
    }
}

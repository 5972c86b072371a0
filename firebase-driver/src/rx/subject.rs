//! Subject implementations (RxJS-like)

use super::observable::{Observable, Signal, SignalStream, Subscription};
use crate::error::{DriverError, Result};
use futures::stream::{BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};

/// Subject - both Observable and Observer (RxJS-like)
///
/// A Subject is a special type of Observable that allows values to be
/// multicasted to many Observers. Subscribers only see values emitted after
/// they subscribed.
///
/// # Example
/// ```no_run
/// # use firebase_driver::rx::Subject;
/// # #[tokio::main]
/// # async fn main() {
/// let subject = Subject::new();
///
/// subject.subscribe(|value| {
///     tracing::info!("Subscriber 1: {}", value);
/// });
///
/// subject.subscribe(|value| {
///     tracing::info!("Subscriber 2: {}", value);
/// });
///
/// subject.next(1);
/// subject.next(2);
/// subject.complete();
/// # }
/// ```
pub struct Subject<T: Clone + Send + 'static> {
    tx: Arc<broadcast::Sender<Signal<T>>>,
    closed: Arc<AtomicBool>,
}

impl<T: Clone + Send + 'static> Subject<T> {
    /// Create a new Subject
    pub fn new() -> Self {
        Self::with_capacity(super::DEFAULT_SHARE_CAPACITY)
    }

    /// Create a new Subject with custom buffer size
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx: Arc::new(tx),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Emit a value to all subscribers
    pub fn next(&self, value: T) {
        if !self.closed.load(Ordering::SeqCst) {
            let _ = self.tx.send(Signal::Next(value));
        }
    }

    /// Emit an error to all subscribers
    pub fn error(&self, error: DriverError) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(Signal::Error(error));
        }
    }

    /// Signal completion to all subscribers
    pub fn complete(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(Signal::Complete);
        }
    }

    /// Number of live subscribers
    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Subscribe to this Subject
    ///
    /// Returns a Subscription handle that can be used to unsubscribe.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: FnMut(T) + Send + 'static,
    {
        self.as_observable().subscribe_next(observer)
    }

    /// Convert Subject to Observable
    pub fn as_observable(&self) -> Observable<T> {
        let tx = Arc::clone(&self.tx);
        let closed = Arc::clone(&self.closed);

        Observable::from_producer(move || {
            if closed.load(Ordering::SeqCst) {
                return futures::stream::empty().boxed();
            }

            let mut rx = tx.subscribe();
            let stream = async_stream::stream! {
                loop {
                    match rx.recv().await {
                        Ok(Signal::Next(value)) => yield Ok(value),
                        Ok(Signal::Error(error)) => {
                            yield Err(error);
                            break;
                        }
                        Ok(Signal::Complete) | Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Subject subscriber lagged behind");
                        }
                    }
                }
            };

            stream.boxed()
        })
    }
}

impl<T: Clone + Send + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
            closed: Arc::clone(&self.closed),
        }
    }
}

#[derive(Clone)]
enum Terminal {
    Complete,
    Error(DriverError),
}

struct ReplayState<T> {
    latest: Option<T>,
    terminal: Option<Terminal>,
    observers: Vec<mpsc::UnboundedSender<Signal<T>>>,
}

/// ReplaySubject with a buffer of one (RxJS `ReplaySubject(1)`)
///
/// Every subscriber first receives the most recent value, then the terminal
/// signal if one has already happened, then live notifications.
pub struct ReplaySubject<T> {
    state: Arc<Mutex<ReplayState<T>>>,
}

impl<T> Clone for ReplaySubject<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + 'static> ReplaySubject<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ReplayState {
                latest: None,
                terminal: None,
                observers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReplayState<T>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn next(&self, value: T) {
        let mut state = self.lock();
        if state.terminal.is_some() {
            return;
        }
        state
            .observers
            .retain(|tx| tx.send(Signal::Next(value.clone())).is_ok());
        state.latest = Some(value);
    }

    pub fn error(&self, error: DriverError) {
        self.terminate(Terminal::Error(error));
    }

    pub fn complete(&self) {
        self.terminate(Terminal::Complete);
    }

    fn terminate(&self, terminal: Terminal) {
        let mut state = self.lock();
        if state.terminal.is_some() {
            return;
        }
        for tx in state.observers.drain(..) {
            let _ = tx.send(to_signal(&terminal));
        }
        state.terminal = Some(terminal);
    }

    /// Forward every notification of `source` into this subject on a background task
    pub(crate) fn feed(&self, mut source: BoxStream<'static, Result<T>>) {
        let subject = self.clone();
        tokio::spawn(async move {
            while let Some(item) = source.next().await {
                match item {
                    Ok(value) => subject.next(value),
                    Err(error) => {
                        subject.error(error);
                        return;
                    }
                }
            }
            subject.complete();
        });
    }

    pub fn as_observable(&self) -> Observable<T> {
        let subject = self.clone();
        Observable::from_producer(move || {
            let (tx, rx) = mpsc::unbounded_channel();
            let mut state = subject.lock();
            if let Some(latest) = &state.latest {
                let _ = tx.send(Signal::Next(latest.clone()));
            }
            match &state.terminal {
                Some(terminal) => {
                    let _ = tx.send(to_signal(terminal));
                }
                None => state.observers.push(tx),
            }
            drop(state);

            SignalStream::new(rx, None).boxed()
        })
    }
}

impl<T: Clone + Send + 'static> Default for ReplaySubject<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn to_signal<T>(terminal: &Terminal) -> Signal<T> {
    match terminal {
        Terminal::Complete => Signal::Complete,
        Terminal::Error(error) => Signal::Error(error.clone()),
    }
}

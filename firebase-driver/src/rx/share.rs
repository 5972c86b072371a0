//! Multicast operators
//!
//! `share` broadcasts one upstream subscription to all current subscribers
//! and reference-counts it. `share_replay` runs the upstream at most once and
//! replays its outcome.

use super::observable::{Observable, Signal};
use super::subject::ReplaySubject;
use crate::error::Result;
use futures::stream::{Stream, StreamExt};
use pin_project::pin_project;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, ready};
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

struct ShareState<T> {
    sender: Option<broadcast::Sender<Signal<T>>>,
    upstream: Option<AbortHandle>,
    subscribers: usize,
    generation: u64,
}

impl<T> ShareState<T> {
    fn reset(&mut self) {
        self.sender = None;
        self.subscribers = 0;
        if let Some(upstream) = self.upstream.take() {
            upstream.abort();
        }
    }
}

fn lock<T>(state: &Mutex<ShareState<T>>) -> MutexGuard<'_, ShareState<T>> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases one subscriber slot when dropped
struct ShareGuard<T> {
    state: Arc<Mutex<ShareState<T>>>,
    generation: u64,
}

impl<T> Drop for ShareGuard<T> {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if state.generation != self.generation {
            return;
        }
        state.subscribers = state.subscribers.saturating_sub(1);
        if state.subscribers == 0 {
            tracing::debug!("Last subscriber left shared observable, releasing upstream");
            state.reset();
        }
    }
}

#[pin_project]
struct ShareStream<T> {
    #[pin]
    inner: BroadcastStream<Signal<T>>,
    guard: ShareGuard<T>,
    done: bool,
}

impl<T: Clone + Send + 'static> Stream for ShareStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }

        loop {
            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(Signal::Next(value))) => return Poll::Ready(Some(Ok(value))),
                Some(Ok(Signal::Error(error))) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(error)));
                }
                Some(Ok(Signal::Complete)) | None => {
                    *this.done = true;
                    return Poll::Ready(None);
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "Shared observable subscriber lagged behind");
                }
            }
        }
    }
}

pub(crate) fn share<T: Clone + Send + 'static>(source: Observable<T>, capacity: usize) -> Observable<T> {
    let state = Arc::new(Mutex::new(ShareState {
        sender: None,
        upstream: None,
        subscribers: 0,
        generation: 0,
    }));

    Observable::from_producer(move || {
        let mut guard = lock(&state);

        let rx = match &guard.sender {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(capacity.max(1));
                guard.generation += 1;
                guard.sender = Some(tx.clone());

                // Subscribe upstream synchronously so no notification is
                // missed between here and the forwarding task's first poll.
                let mut upstream = source.to_stream();
                let generation = guard.generation;
                let task_state = Arc::clone(&state);

                let task = tokio::spawn(async move {
                    let mut errored = false;
                    while let Some(item) = upstream.next().await {
                        let signal = match item {
                            Ok(value) => Signal::Next(value),
                            Err(error) => {
                                errored = true;
                                Signal::Error(error)
                            }
                        };
                        let _ = tx.send(signal);
                        if errored {
                            break;
                        }
                    }
                    if !errored {
                        let _ = tx.send(Signal::Complete);
                    }

                    let mut state = lock(&task_state);
                    if state.generation == generation {
                        state.upstream = None;
                        state.reset();
                    }
                });

                guard.upstream = Some(task.abort_handle());
                rx
            }
        };

        guard.subscribers += 1;
        let share_guard = ShareGuard {
            state: Arc::clone(&state),
            generation: guard.generation,
        };
        drop(guard);

        ShareStream {
            inner: BroadcastStream::new(rx),
            guard: share_guard,
            done: false,
        }
        .boxed()
    })
}

pub(crate) fn share_replay<T: Clone + Send + 'static>(source: Observable<T>) -> Observable<T> {
    let subject = ReplaySubject::new();
    let started = Arc::new(AtomicBool::new(false));

    Observable::from_producer(move || {
        let stream = subject.as_observable().to_stream();
        if !started.swap(true, Ordering::SeqCst) {
            subject.feed(source.to_stream());
        }
        stream
    })
}

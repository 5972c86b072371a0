//! RxJS-style operators

use super::Observable;
use crate::error::Result;
use futures::stream::{BoxStream, SelectAll, StreamExt};

/// Retry operator - resubscribe to the source after an error, at most `count` times
///
/// The driver itself never retries; this is for applications that want to
/// layer a retry policy on top of a request or event stream.
///
/// # Example
/// ```no_run
/// # use firebase_driver::rx::{Observable, operators::retry};
/// let obs = Observable::of(vec![1, 2, 3]);
/// let with_retry = retry(obs, 3);
/// ```
pub fn retry<T: Send + 'static>(observable: Observable<T>, count: usize) -> Observable<T> {
    Observable::from_producer(move || {
        let source = observable.clone();
        let stream = async_stream::stream! {
            let mut attempts = 0;
            'subscribe: loop {
                let mut stream = source.to_stream();
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(value) => yield Ok(value),
                        Err(error) if attempts < count => {
                            attempts += 1;
                            tracing::debug!(attempt = attempts, %error, "Retrying observable");
                            continue 'subscribe;
                        }
                        Err(error) => {
                            yield Err(error);
                            break 'subscribe;
                        }
                    }
                }
                break;
            }
        };
        stream.boxed()
    })
}

/// Merge multiple observables
///
/// Values are emitted as they arrive. The first error ends the merged stream.
pub fn merge<T: Send + 'static>(observables: Vec<Observable<T>>) -> Observable<T> {
    Observable::from_producer(move || {
        let mut merged = futures::stream::select_all(observables.iter().map(|o| o.to_stream()));
        let stream = async_stream::stream! {
            while let Some(item) = merged.next().await {
                let failed = item.is_err();
                yield item;
                if failed {
                    break;
                }
            }
        };
        stream.boxed()
    })
}

enum Step<T, U> {
    Outer(Option<Result<T>>),
    Inner(Option<Result<U>>),
    Done,
}

/// FlatMap operator - map each value to an inner observable and merge all of them
///
/// Completes once the source and every inner observable have completed. An
/// error from the source or any inner observable ends the result.
pub fn flat_map<T, U, F>(source: Observable<T>, f: F) -> Observable<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Observable<U> + Send + Sync + 'static,
{
    let f = std::sync::Arc::new(f);
    Observable::from_producer(move || {
        let f = std::sync::Arc::clone(&f);
        let mut outer = source.to_stream();
        let stream = async_stream::stream! {
            let mut inner: SelectAll<BoxStream<'static, Result<U>>> = SelectAll::new();
            let mut outer_done = false;

            loop {
                let step = tokio::select! {
                    item = outer.next(), if !outer_done => Step::Outer(item),
                    item = inner.next(), if !inner.is_empty() => Step::Inner(item),
                    else => Step::Done,
                };

                match step {
                    Step::Outer(Some(Ok(value))) => inner.push(f(value).to_stream()),
                    Step::Outer(Some(Err(error))) => {
                        yield Err(error);
                        break;
                    }
                    Step::Outer(None) => outer_done = true,
                    Step::Inner(Some(Ok(value))) => yield Ok(value),
                    Step::Inner(Some(Err(error))) => {
                        yield Err(error);
                        break;
                    }
                    Step::Inner(None) | Step::Done => {
                        if outer_done && inner.is_empty() {
                            break;
                        }
                    }
                }
            }
        };
        stream.boxed()
    })
}

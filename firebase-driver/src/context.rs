//! Path-scoped driver context
//!
//! A [`Context`] is the handle application code works with: a reference at
//! a path plus the driver-wide response and auth streams. Every navigation or
//! query refinement returns a new `Context`; none mutates the receiver.

use crate::error::{DriverError, Result};
use crate::observe::ListenerRegistry;
use crate::reference::Reference;
use crate::rx::{Observable, Subscription};
use crate::types::{EventType, Request, Response, Snapshot};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Characters the backend does not accept in keys
const FORBIDDEN_KEY_CHARS: [char; 5] = ['.', '#', '$', '[', ']'];

/// Normalise a `/`-separated path: trim, drop empty segments, re-join
///
/// The root is the empty string.
pub fn normalize_path(path: &str) -> String {
    path.trim()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Join a base path and a relative path, both normalised
pub fn join_path(base: &str, relative: &str) -> String {
    let base = normalize_path(base);
    let relative = normalize_path(relative);
    match (base.is_empty(), relative.is_empty()) {
        (_, true) => base,
        (true, false) => relative,
        (false, false) => format!("{base}/{relative}"),
    }
}

fn validate_relative_path(path: &str) -> Result<()> {
    if let Some(bad) = path
        .chars()
        .find(|c| FORBIDDEN_KEY_CHARS.contains(c) || c.is_control())
    {
        return Err(DriverError::InvalidArgument(format!(
            "select() expects a relative path without `.`, `#`, `$`, `[`, `]` or \
             control characters; found {bad:?} in `{path}`"
        )));
    }
    Ok(())
}

/// Internal subscription keeping the response stream pulling requests
///
/// Owned by every Context of one `run`; unsubscribes once the last is dropped.
pub(crate) struct ResponsePump(Subscription);

impl ResponsePump {
    pub(crate) fn start(responses: &Observable<Response>) -> Self {
        tracing::debug!("Dispatching requests as they arrive");
        Self(responses.subscribe_next(|_| {}))
    }
}

impl Drop for ResponsePump {
    fn drop(&mut self) {
        self.0.unsubscribe();
    }
}

/// Path-scoped view over a backend reference
#[derive(Clone)]
pub struct Context {
    path: String,
    reference: Arc<dyn Reference>,
    responses: Observable<Response>,
    auth: Observable<Option<String>>,
    listeners: Arc<ListenerRegistry>,
    pump: Option<Arc<ResponsePump>>,
}

/// Result of [`Context::push`]
pub struct Push {
    /// Context of the newly created child
    pub context: Context,
    /// Emits the generated key once the write is acknowledged, then completes
    pub observable: Observable<Value>,
}

impl Context {
    pub(crate) fn new(
        path: String,
        reference: Arc<dyn Reference>,
        responses: Observable<Response>,
        auth: Observable<Option<String>>,
        listeners: Arc<ListenerRegistry>,
        pump: Option<ResponsePump>,
    ) -> Self {
        Self {
            path,
            reference,
            responses,
            auth,
            listeners,
            pump: pump.map(Arc::new),
        }
    }

    fn derive(&self, path: String, reference: Arc<dyn Reference>) -> Self {
        Self {
            path,
            reference,
            responses: self.responses.clone(),
            auth: self.auth.clone(),
            listeners: Arc::clone(&self.listeners),
            pump: self.pump.clone(),
        }
    }

    fn refine(&self, reference: Arc<dyn Reference>) -> Self {
        self.derive(self.path.clone(), reference)
    }

    /// Path relative to the driver root; `""` at the root
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Backend reference (possibly query-refined) this context reads from
    pub fn reference(&self) -> &Arc<dyn Reference> {
        &self.reference
    }

    /// Every response produced by the driver, shared across consumers
    pub fn responses(&self) -> Observable<Response> {
        self.responses.clone()
    }

    /// Current user id, or `None` while signed out
    pub fn auth(&self) -> Observable<Option<String>> {
        self.auth.clone()
    }

    /// Context for a path relative to this one
    ///
    /// # Example
    /// ```no_run
    /// # use firebase_driver::Context;
    /// # fn demo(root: &Context) -> firebase_driver::Result<()> {
    /// let name = root.select("events")?.select("e424/core/name")?;
    /// assert_eq!(name.path(), "events/e424/core/name");
    /// # Ok(())
    /// # }
    /// ```
    pub fn select(&self, relative: &str) -> Result<Context> {
        validate_relative_path(relative)?;

        let relative = normalize_path(relative);
        if relative.is_empty() {
            return Ok(self.clone());
        }

        let path = join_path(&self.path, &relative);
        let reference = self.reference.child(&relative);
        Ok(self.derive(path, reference))
    }

    /// Shared stream of `event` notifications at this context
    ///
    /// Valid names are `value`, `child_added`, `child_removed`,
    /// `child_changed` and `child_moved`.
    pub fn events(&self, event: &str) -> Result<Observable<Snapshot>> {
        let event: EventType = event.parse()?;
        Ok(self.events_of(event))
    }

    /// Typed variant of [`Context::events`]
    pub fn events_of(&self, event: EventType) -> Observable<Snapshot> {
        self.listeners.events(&self.reference, event)
    }

    /// Scope a path-agnostic request stream to this context
    ///
    /// Every request's `location` is overwritten with this context's path.
    pub fn isolate(&self, requests: &Observable<Request>) -> Observable<Request> {
        let path = self.path.clone();
        requests.map(move |mut request| {
            request.location = Some(path.clone());
            request
        })
    }

    /// Responses whose `location` is exactly this context's path
    ///
    /// No normalisation happens: a request without a location does not match
    /// the root context. Pair with [`Context::isolate`], which stamps the
    /// exact path.
    pub fn isolated(&self) -> Observable<Response> {
        let path = self.path.clone();
        self.responses
            .filter(move |response| response.location.as_deref() == Some(path.as_str()))
    }

    pub fn order_by_child(&self, child: &str) -> Context {
        self.refine(self.reference.order_by_child(child))
    }

    pub fn order_by_key(&self) -> Context {
        self.refine(self.reference.order_by_key())
    }

    pub fn order_by_value(&self) -> Context {
        self.refine(self.reference.order_by_value())
    }

    pub fn order_by_priority(&self) -> Context {
        self.refine(self.reference.order_by_priority())
    }

    pub fn start_at(&self, value: Value) -> Context {
        self.refine(self.reference.start_at(value))
    }

    pub fn end_at(&self, value: Value) -> Context {
        self.refine(self.reference.end_at(value))
    }

    pub fn equal_to(&self, value: Value) -> Context {
        self.refine(self.reference.equal_to(value))
    }

    pub fn limit_to_first(&self, limit: u32) -> Context {
        self.refine(self.reference.limit_to_first(limit))
    }

    pub fn limit_to_last(&self, limit: u32) -> Context {
        self.refine(self.reference.limit_to_last(limit))
    }

    pub fn limit(&self, limit: u32) -> Context {
        self.refine(self.reference.limit(limit))
    }

    /// Append `value` under a generated child key
    ///
    /// The write starts immediately. Its outcome is replayed to every
    /// subscriber of the returned observable, however late.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, since the write is spawned
    /// onto it.
    pub fn push(&self, value: Value) -> Push {
        let child = self.reference.push_child();
        let key = child.key().unwrap_or_default();
        let path = join_path(&self.path, &key);
        tracing::debug!(%path, "Pushing new child");

        let write_ref = Arc::clone(&child);
        let key = Value::String(key);
        let observable = Observable::from_future(move || {
            let reference = Arc::clone(&write_ref);
            let value = value.clone();
            let key = key.clone();
            async move {
                reference
                    .set(value)
                    .await
                    .map(|()| key)
                    .map_err(DriverError::from)
            }
        })
        .publish_replay();

        Push {
            context: self.derive(path, child),
            observable,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("path", &self.path)
            .field("url", &self.reference.url())
            .finish_non_exhaustive()
    }
}

//! Backend listeners as observables
//!
//! Bridges the callback registration API of a [`Reference`] into cold
//! observables whose teardown deregisters exactly the listener registered for
//! that subscription.

use crate::reference::Reference;
use crate::rx::{Observable, WeakObservable};
use crate::types::{EventType, Snapshot};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Observe `event` on `reference`
///
/// Every subscription registers its own backend listener. Notifications are
/// forwarded verbatim; a backend cancellation errors the subscription.
pub fn observe(reference: Arc<dyn Reference>, event: EventType) -> Observable<Snapshot> {
    Observable::create(move |observer| {
        let on_event = observer.clone();
        let on_cancel = observer;

        let token = reference.on(
            event,
            Box::new(move |snapshot| on_event.next(snapshot)),
            Box::new(move |error| on_cancel.error(error.into())),
        );
        tracing::debug!(url = %reference.url(), %event, %token, "Registered listener");

        let reference = Arc::clone(&reference);
        Box::new(move || {
            tracing::debug!(url = %reference.url(), %event, %token, "Removing listener");
            reference.off(event, token);
        })
    })
}

/// Observe the auth state of the backend `reference` belongs to
///
/// Emits the uid, or `None` while signed out, on every change including the
/// current state at registration. Never errors.
pub fn auth_state(reference: Arc<dyn Reference>) -> Observable<Option<String>> {
    Observable::create(move |observer| {
        let token = reference.on_auth(Box::new(move |auth| {
            observer.next(auth.map(|info| info.uid));
        }));
        tracing::debug!(url = %reference.url(), %token, "Registered auth listener");

        let reference = Arc::clone(&reference);
        Box::new(move || {
            tracing::debug!(url = %reference.url(), %token, "Removing auth listener");
            reference.off_auth(token);
        })
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ListenerKey {
    url: String,
    query: String,
    event: EventType,
}

/// Hands out shared event observables
///
/// With de-duplication on, every `events()` call for the same location, query
/// and event shares one backend listener, reference counted by its
/// subscribers. With it off, each call gets its own shared observable.
///
/// Entries are held weakly. An entry stays alive while the application holds
/// its observable or while its listener is registered; dead entries are
/// dropped on the next lookup.
pub struct ListenerRegistry {
    dedupe: bool,
    capacity: usize,
    shared: Mutex<HashMap<ListenerKey, WeakObservable<Snapshot>>>,
}

impl ListenerRegistry {
    pub fn new(dedupe: bool, capacity: usize) -> Self {
        Self {
            dedupe,
            capacity,
            shared: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ListenerKey, WeakObservable<Snapshot>>> {
        self.shared
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Shared observable of `event` on `reference`
    pub fn events(&self, reference: &Arc<dyn Reference>, event: EventType) -> Observable<Snapshot> {
        if !self.dedupe {
            return observe(Arc::clone(reference), event).share_with_capacity(self.capacity);
        }

        let key = ListenerKey {
            url: reference.url(),
            query: reference.query_id(),
            event,
        };

        let mut shared = self.lock();
        shared.retain(|_, entry| entry.is_alive());
        if let Some(existing) = shared.get(&key).and_then(WeakObservable::upgrade) {
            return existing;
        }

        let observable = self.pinned_events(Arc::clone(reference), event);
        tracing::debug!(url = %key.url, query = %key.query, %event, "Caching shared listener");
        shared.insert(key, observable.downgrade());
        observable
    }

    /// Shared listener whose registered upstream holds the shared observable
    /// alive, so the cache entry outlives application handles while listening
    fn pinned_events(&self, reference: Arc<dyn Reference>, event: EventType) -> Observable<Snapshot> {
        let this: Arc<OnceLock<WeakObservable<Snapshot>>> = Arc::new(OnceLock::new());
        let source = observe(reference, event);

        let slot = Arc::clone(&this);
        let observable = Observable::from_producer(move || {
            let keep = slot.get().and_then(WeakObservable::upgrade);
            source
                .to_stream()
                .map(move |item| {
                    let _pinned = &keep;
                    item
                })
                .boxed()
        })
        .share_with_capacity(self.capacity);

        let _ = this.set(observable.downgrade());
        observable
    }

    /// Number of live cached listeners
    pub fn len(&self) -> usize {
        let mut shared = self.lock();
        shared.retain(|_, entry| entry.is_alive());
        shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

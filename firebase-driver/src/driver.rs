//! Driver factory and configuration

use crate::context::{Context, ResponsePump};
use crate::dialoguer::{Dispatch, dialoguer};
use crate::error::{DriverError, Result};
use crate::observe::{ListenerRegistry, auth_state};
use crate::reference::{Connector, Reference};
use crate::rx::{DEFAULT_SHARE_CAPACITY, Observable};
use crate::types::Request;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Firebase driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Per-subscriber buffer of the shared response, auth and event streams
    pub broadcast_capacity: usize,
    /// Share one backend listener between `events()` calls on equal references
    pub dedupe_listeners: bool,
    /// Start backend calls as requests arrive instead of on first subscription
    pub eager_dispatch: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: DEFAULT_SHARE_CAPACITY,
            dedupe_listeners: true,
            eager_dispatch: false,
        }
    }
}

impl DriverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-subscriber buffer size of shared streams
    pub fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Enable or disable listener de-duplication
    pub fn with_dedupe_listeners(mut self, dedupe: bool) -> Self {
        self.dedupe_listeners = dedupe;
        self
    }

    /// Enable or disable eager dispatch
    pub fn with_eager_dispatch(mut self, eager: bool) -> Self {
        self.eager_dispatch = eager;
        self
    }

    fn dispatch(&self) -> Dispatch {
        if self.eager_dispatch {
            Dispatch::Eager
        } else {
            Dispatch::Lazy
        }
    }
}

/// What the driver is built on
pub enum DriverSource {
    /// Backend URL, opened with `connector`
    Url {
        url: String,
        connector: Arc<dyn Connector>,
    },
    /// An existing root reference
    Reference(Arc<dyn Reference>),
}

impl DriverSource {
    pub fn url(url: impl Into<String>, connector: impl Connector + 'static) -> Self {
        DriverSource::Url {
            url: url.into(),
            connector: Arc::new(connector),
        }
    }
}

impl From<Arc<dyn Reference>> for DriverSource {
    fn from(reference: Arc<dyn Reference>) -> Self {
        DriverSource::Reference(reference)
    }
}

impl fmt::Debug for DriverSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverSource::Url { url, .. } => f.debug_struct("Url").field("url", url).finish(),
            DriverSource::Reference(reference) => f
                .debug_tuple("Reference")
                .field(&reference.url())
                .finish(),
        }
    }
}

/// Validate a backend URL: absolute http(s)/ws(s) with a host
pub fn parse_backend_url(url: &str) -> Result<Url> {
    if url.trim().is_empty() {
        return Err(DriverError::InvalidArgument(
            "Firebase driver expects a backend URL or a reference, got an empty string".to_string(),
        ));
    }

    let parsed = Url::parse(url.trim())?;
    if !matches!(parsed.scheme(), "http" | "https" | "ws" | "wss") {
        return Err(DriverError::InvalidArgument(format!(
            "Unsupported URL scheme `{}` in {url}",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(DriverError::InvalidArgument(format!("Missing host in {url}")));
    }

    Ok(parsed)
}

/// Build a driver from a URL or a reference with the default configuration
///
/// # Example
/// ```no_run
/// use firebase_driver::{DriverSource, Request, make_firebase_driver, rx::Subject};
/// # use firebase_driver::reference::Reference;
/// # use std::sync::Arc;
/// # fn demo(root: Arc<dyn Reference>) -> firebase_driver::Result<()> {
/// let driver = make_firebase_driver(Some(DriverSource::Reference(root)))?;
///
/// let requests = Subject::new();
/// let firebase = driver.run(requests.as_observable());
/// let name = firebase.select("events/e424/core/name")?;
///
/// requests.next(Request::set("events/e424/core/name", "Rando event name".into()));
/// # Ok(())
/// # }
/// ```
pub fn make_firebase_driver(source: Option<DriverSource>) -> Result<FirebaseDriver> {
    make_firebase_driver_with_config(source, DriverConfig::default())
}

/// Build a driver with a custom configuration
pub fn make_firebase_driver_with_config(
    source: Option<DriverSource>,
    config: DriverConfig,
) -> Result<FirebaseDriver> {
    let root = match source {
        None => {
            return Err(DriverError::InvalidArgument(
                "Firebase driver expects a backend URL or a reference".to_string(),
            ));
        }
        Some(DriverSource::Reference(reference)) => reference,
        Some(DriverSource::Url { url, connector }) => {
            let url = parse_backend_url(&url)?;
            tracing::debug!(%url, "Connecting to backend");
            connector.connect(&url)?
        }
    };

    Ok(FirebaseDriver { root, config })
}

/// Firebase driver bound to a root reference
#[derive(Clone)]
pub struct FirebaseDriver {
    root: Arc<dyn Reference>,
    config: DriverConfig,
}

impl FirebaseDriver {
    /// Root reference
    pub fn root(&self) -> &Arc<dyn Reference> {
        &self.root
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Wire a request stream to the backend and return the root context
    ///
    /// With lazy dispatch, requests are only pulled while something
    /// subscribes to the context's responses. With eager dispatch the
    /// returned context (and every context derived from it) keeps pulling
    /// them until the last one is dropped.
    ///
    /// # Panics
    ///
    /// With eager dispatch, panics if called outside a Tokio runtime.
    pub fn run(&self, requests: Observable<Request>) -> Context {
        let capacity = self.config.broadcast_capacity;

        let responses = dialoguer(&requests, Arc::clone(&self.root), self.config.dispatch())
            .share_with_capacity(capacity);
        let auth = auth_state(Arc::clone(&self.root)).share_with_capacity(capacity);
        let listeners = Arc::new(ListenerRegistry::new(self.config.dedupe_listeners, capacity));
        let pump = self
            .config
            .eager_dispatch
            .then(|| ResponsePump::start(&responses));

        Context::new(
            String::new(),
            Arc::clone(&self.root),
            responses,
            auth,
            listeners,
            pump,
        )
    }
}

impl fmt::Debug for FirebaseDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirebaseDriver")
            .field("root", &self.root.url())
            .field("config", &self.config)
            .finish()
    }
}

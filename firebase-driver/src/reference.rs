//! Backend capability contract
//!
//! The driver never talks to the network itself. It is written against a
//! [`Reference`]: a handle to one location (optionally refined by a query)
//! in the backend's hierarchical store, provided by a client library.

use crate::error::{BackendError, Result};
use crate::types::{AuthInfo, EventType, Snapshot};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Token identifying one registered listener, handed back to `off`/`off_auth`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerToken(pub u64);

impl fmt::Display for ListenerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Called for every data notification
pub type EventCallback = Box<dyn Fn(Snapshot) + Send + Sync>;

/// Called at most once when the backend cancels a listener
pub type CancelCallback = Box<dyn Fn(BackendError) + Send + Sync>;

/// Called with the current auth state on registration and on every change
pub type AuthCallback = Box<dyn Fn(Option<AuthInfo>) + Send + Sync>;

/// Handle to a location in the backend
///
/// Query refinements return new references and never mutate the receiver.
#[async_trait]
pub trait Reference: Send + Sync {
    /// Absolute URL of the location
    fn url(&self) -> String;

    /// Last path segment; `None` at the root
    fn key(&self) -> Option<String>;

    /// Identity of the query applied to this reference, empty when none
    ///
    /// Two references with equal `url()` and `query_id()` observe the same
    /// data, so listeners on them are shared. Every query refinement must
    /// change it.
    fn query_id(&self) -> String;

    /// Reference to a descendant at a relative `/`-separated path
    fn child(&self, path: &str) -> Arc<dyn Reference>;

    /// Reference to a new child with a generated, chronologically ordered key
    fn push_child(&self) -> Arc<dyn Reference>;

    /// Register a listener for `event`
    fn on(&self, event: EventType, on_event: EventCallback, on_cancel: CancelCallback)
    -> ListenerToken;

    /// Remove exactly the listener `token` identifies
    fn off(&self, event: EventType, token: ListenerToken);

    /// Register an auth state listener
    fn on_auth(&self, callback: AuthCallback) -> ListenerToken;

    fn off_auth(&self, token: ListenerToken);

    async fn set(&self, value: Value) -> std::result::Result<(), BackendError>;

    async fn update(&self, value: Value) -> std::result::Result<(), BackendError>;

    async fn remove(&self) -> std::result::Result<(), BackendError>;

    async fn auth_anonymously(&self) -> std::result::Result<AuthInfo, BackendError>;

    async fn auth_with_password(
        &self,
        credentials: Value,
    ) -> std::result::Result<AuthInfo, BackendError>;

    async fn auth_with_custom_token(&self, token: Value)
    -> std::result::Result<AuthInfo, BackendError>;

    async fn auth_with_oauth_popup(
        &self,
        provider: Value,
    ) -> std::result::Result<AuthInfo, BackendError>;

    async fn auth_with_oauth_redirect(
        &self,
        provider: Value,
    ) -> std::result::Result<AuthInfo, BackendError>;

    /// OAuth token login with the provider-specific positional arguments
    async fn auth_with_oauth_token(
        &self,
        args: Vec<Value>,
    ) -> std::result::Result<AuthInfo, BackendError>;

    /// Drop the current session; the backend reports no completion
    fn unauth(&self);

    fn order_by_child(&self, child: &str) -> Arc<dyn Reference>;

    fn order_by_key(&self) -> Arc<dyn Reference>;

    fn order_by_value(&self) -> Arc<dyn Reference>;

    fn order_by_priority(&self) -> Arc<dyn Reference>;

    fn start_at(&self, value: Value) -> Arc<dyn Reference>;

    fn end_at(&self, value: Value) -> Arc<dyn Reference>;

    fn equal_to(&self, value: Value) -> Arc<dyn Reference>;

    fn limit_to_first(&self, limit: u32) -> Arc<dyn Reference>;

    fn limit_to_last(&self, limit: u32) -> Arc<dyn Reference>;

    /// Legacy limit, kept for backends that still accept it
    fn limit(&self, limit: u32) -> Arc<dyn Reference>;
}

/// Opens the root [`Reference`] of a backend URL
pub trait Connector: Send + Sync {
    fn connect(&self, url: &Url) -> Result<Arc<dyn Reference>>;
}

impl<F> Connector for F
where
    F: Fn(&Url) -> Result<Arc<dyn Reference>> + Send + Sync,
{
    fn connect(&self, url: &Url) -> Result<Arc<dyn Reference>> {
        self(url)
    }
}

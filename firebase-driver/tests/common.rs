//! Common test utilities
//!
//! `MockBackend` stands in for the backend client: it records every call,
//! tracks live listeners, lets tests push notifications and script failures.

#![allow(dead_code)] // Each test binary uses a different subset

use async_trait::async_trait;
use firebase_driver::reference::{AuthCallback, CancelCallback, EventCallback};
use firebase_driver::{
    AuthInfo, BackendError, EventType, ListenerToken, Reference, Result, Snapshot,
};
use futures::Stream;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const BASE_URL: &str = "https://blazing-inferno-802.firebaseio.com";

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: String,
    pub path: String,
    pub data: Value,
}

struct Listener {
    path: String,
    event: EventType,
    token: ListenerToken,
    on_event: Arc<EventCallback>,
    on_cancel: Arc<CancelCallback>,
}

#[derive(Default)]
pub struct MockBackend {
    next_token: AtomicU64,
    next_push_id: AtomicU64,
    registrations: AtomicUsize,
    listeners: Mutex<Vec<Listener>>,
    auth_listeners: Mutex<Vec<(ListenerToken, Arc<AuthCallback>)>>,
    auth: Mutex<Option<AuthInfo>>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<String, BackendError>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Root reference of this backend
    pub fn root(self: &Arc<Self>) -> Arc<dyn Reference> {
        Arc::new(MockReference {
            backend: Arc::clone(self),
            path: String::new(),
            query: Vec::new(),
        })
    }

    fn token(&self) -> ListenerToken {
        ListenerToken(self.next_token.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn record(&self, method: &str, path: &str, data: Value) {
        self.calls.lock().unwrap().push(Call {
            method: method.to_string(),
            path: path.to_string(),
            data,
        });
    }

    /// Fail calls whose method or path equals `target`
    pub fn fail(&self, target: &str, error: BackendError) {
        self.failures
            .lock()
            .unwrap()
            .insert(target.to_string(), error);
    }

    fn check(&self, method: &str, path: &str) -> std::result::Result<(), BackendError> {
        let failures = self.failures.lock().unwrap();
        match failures.get(method).or_else(|| failures.get(path)) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Total `on()` registrations ever made
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Live listeners at `path` for `event`
    pub fn listener_count(&self, path: &str, event: EventType) -> usize {
        self.listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.path == path && l.event == event)
            .count()
    }

    pub fn total_listeners(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn auth_listener_count(&self) -> usize {
        self.auth_listeners.lock().unwrap().len()
    }

    /// Deliver a notification to every listener of `event` at `path`
    pub fn emit(&self, path: &str, event: EventType, snapshot: Snapshot) {
        let callbacks: Vec<_> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.path == path && l.event == event)
            .map(|l| Arc::clone(&l.on_event))
            .collect();
        for callback in callbacks {
            callback(snapshot.clone());
        }
    }

    /// Cancel every listener of `event` at `path`, as the backend does on
    /// permission loss
    pub fn cancel(&self, path: &str, event: EventType, error: BackendError) {
        let cancelled: Vec<_> = {
            let mut listeners = self.listeners.lock().unwrap();
            let (cancelled, kept): (Vec<_>, Vec<_>) = listeners
                .drain(..)
                .partition(|l| l.path == path && l.event == event);
            *listeners = kept;
            cancelled
        };
        for listener in cancelled {
            (listener.on_cancel)(error.clone());
        }
    }

    /// Change the auth state and notify auth listeners
    pub fn set_auth(&self, auth: Option<AuthInfo>) {
        *self.auth.lock().unwrap() = auth.clone();
        let callbacks: Vec<_> = self
            .auth_listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(auth.clone());
        }
    }

    fn sign_in(&self, mut info: AuthInfo) -> AuthInfo {
        info.token = Some(uuid::Uuid::new_v4().to_string());
        self.set_auth(Some(info.clone()));
        info
    }
}

pub struct MockReference {
    backend: Arc<MockBackend>,
    path: String,
    query: Vec<String>,
}

impl MockReference {
    fn at(&self, path: String) -> Arc<dyn Reference> {
        Arc::new(MockReference {
            backend: Arc::clone(&self.backend),
            path,
            query: Vec::new(),
        })
    }

    fn refined(&self, clause: String) -> Arc<dyn Reference> {
        let mut query = self.query.clone();
        query.push(clause);
        Arc::new(MockReference {
            backend: Arc::clone(&self.backend),
            path: self.path.clone(),
            query,
        })
    }

    fn join(&self, relative: &str) -> String {
        self.path
            .split('/')
            .chain(relative.split('/'))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    async fn auth_call(
        &self,
        method: &str,
        data: Value,
        info: AuthInfo,
    ) -> std::result::Result<AuthInfo, BackendError> {
        self.backend.record(method, &self.path, data);
        self.backend.check(method, &self.path)?;
        Ok(self.backend.sign_in(info))
    }
}

fn provider_of(value: &Value) -> String {
    value.as_str().unwrap_or("unknown").to_string()
}

#[async_trait]
impl Reference for MockReference {
    fn url(&self) -> String {
        if self.path.is_empty() {
            format!("{BASE_URL}/")
        } else {
            format!("{BASE_URL}/{}", self.path)
        }
    }

    fn key(&self) -> Option<String> {
        self.path.rsplit('/').next().filter(|k| !k.is_empty()).map(str::to_string)
    }

    fn query_id(&self) -> String {
        self.query.join("&")
    }

    fn child(&self, path: &str) -> Arc<dyn Reference> {
        self.at(self.join(path))
    }

    fn push_child(&self) -> Arc<dyn Reference> {
        let id = self.backend.next_push_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.at(self.join(&format!("-K{id:04}")))
    }

    fn on(&self, event: EventType, on_event: EventCallback, on_cancel: CancelCallback) -> ListenerToken {
        let token = self.backend.token();
        self.backend.registrations.fetch_add(1, Ordering::SeqCst);
        self.backend.listeners.lock().unwrap().push(Listener {
            path: self.path.clone(),
            event,
            token,
            on_event: Arc::new(on_event),
            on_cancel: Arc::new(on_cancel),
        });
        token
    }

    fn off(&self, event: EventType, token: ListenerToken) {
        self.backend
            .listeners
            .lock()
            .unwrap()
            .retain(|l| !(l.token == token && l.event == event));
    }

    fn on_auth(&self, callback: AuthCallback) -> ListenerToken {
        let token = self.backend.token();
        let callback = Arc::new(callback);
        self.backend
            .auth_listeners
            .lock()
            .unwrap()
            .push((token, Arc::clone(&callback)));
        let current = self.backend.auth.lock().unwrap().clone();
        callback(current);
        token
    }

    fn off_auth(&self, token: ListenerToken) {
        self.backend
            .auth_listeners
            .lock()
            .unwrap()
            .retain(|(t, _)| *t != token);
    }

    async fn set(&self, value: Value) -> std::result::Result<(), BackendError> {
        self.backend.record("set", &self.path, value.clone());
        self.backend.check("set", &self.path)?;
        self.backend
            .emit(&self.path, EventType::Value, Snapshot::new(self.key(), value));
        Ok(())
    }

    async fn update(&self, value: Value) -> std::result::Result<(), BackendError> {
        self.backend.record("update", &self.path, value);
        self.backend.check("update", &self.path)
    }

    async fn remove(&self) -> std::result::Result<(), BackendError> {
        self.backend.record("remove", &self.path, Value::Null);
        self.backend.check("remove", &self.path)
    }

    async fn auth_anonymously(&self) -> std::result::Result<AuthInfo, BackendError> {
        self.auth_call("authAnonymously", Value::Null, AuthInfo::new("anon-1", "anonymous"))
            .await
    }

    async fn auth_with_password(&self, credentials: Value) -> std::result::Result<AuthInfo, BackendError> {
        let uid = credentials["email"].as_str().unwrap_or("unknown").to_string();
        self.auth_call("authWithPassword", credentials, AuthInfo::new(uid, "password"))
            .await
    }

    async fn auth_with_custom_token(&self, token: Value) -> std::result::Result<AuthInfo, BackendError> {
        self.auth_call("authWithCustomToken", token, AuthInfo::new("token-user", "custom"))
            .await
    }

    async fn auth_with_oauth_popup(&self, provider: Value) -> std::result::Result<AuthInfo, BackendError> {
        let name = provider_of(&provider);
        self.auth_call("authWithOAuthPopup", provider, AuthInfo::new(format!("{name}-user"), name))
            .await
    }

    async fn auth_with_oauth_redirect(&self, provider: Value) -> std::result::Result<AuthInfo, BackendError> {
        let name = provider_of(&provider);
        self.auth_call("authWithOAuthRedirect", provider, AuthInfo::new(format!("{name}-user"), name))
            .await
    }

    async fn auth_with_oauth_token(&self, args: Vec<Value>) -> std::result::Result<AuthInfo, BackendError> {
        let name = args.first().map(provider_of).unwrap_or_default();
        self.auth_call(
            "authWithOAuthToken",
            Value::Array(args),
            AuthInfo::new(format!("{name}-user"), name),
        )
        .await
    }

    fn unauth(&self) {
        self.backend.record("unauth", &self.path, Value::Null);
        self.backend.set_auth(None);
    }

    fn order_by_child(&self, child: &str) -> Arc<dyn Reference> {
        self.refined(format!("orderByChild={child}"))
    }

    fn order_by_key(&self) -> Arc<dyn Reference> {
        self.refined("orderByKey".to_string())
    }

    fn order_by_value(&self) -> Arc<dyn Reference> {
        self.refined("orderByValue".to_string())
    }

    fn order_by_priority(&self) -> Arc<dyn Reference> {
        self.refined("orderByPriority".to_string())
    }

    fn start_at(&self, value: Value) -> Arc<dyn Reference> {
        self.refined(format!("startAt={value}"))
    }

    fn end_at(&self, value: Value) -> Arc<dyn Reference> {
        self.refined(format!("endAt={value}"))
    }

    fn equal_to(&self, value: Value) -> Arc<dyn Reference> {
        self.refined(format!("equalTo={value}"))
    }

    fn limit_to_first(&self, limit: u32) -> Arc<dyn Reference> {
        self.refined(format!("limitToFirst={limit}"))
    }

    fn limit_to_last(&self, limit: u32) -> Arc<dyn Reference> {
        self.refined(format!("limitToLast={limit}"))
    }

    fn limit(&self, limit: u32) -> Arc<dyn Reference> {
        self.refined(format!("limit={limit}"))
    }
}

/// Connector that opens `backend`'s root for any URL
pub fn connector(backend: Arc<MockBackend>) -> impl Fn(&Url) -> Result<Arc<dyn Reference>> + Send + Sync {
    move |_url: &Url| -> Result<Arc<dyn Reference>> { Ok(backend.root()) }
}

/// Install a test tracing subscriber once per binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("firebase_driver=debug")
        .with_test_writer()
        .try_init();
}

/// Let spawned forwarding tasks run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

/// Next item of `stream`, failing the test after one second
pub async fn next_within<S>(stream: &mut S) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("stream did not produce an item in time")
}

/// Collect `stream` to its end, failing the test after one second
pub async fn collect_within<S>(stream: S) -> Vec<S::Item>
where
    S: Stream,
{
    tokio::time::timeout(Duration::from_secs(1), stream.collect::<Vec<_>>())
        .await
        .expect("stream did not complete in time")
}

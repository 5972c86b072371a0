//! Common types for the Firebase driver

use crate::error::{DriverError, Result};
use crate::rx::Observable;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

/// Backend operation a [`Request`] asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "set")]
    Set,
    #[serde(rename = "update")]
    Update,
    #[serde(rename = "remove")]
    Remove,
    #[serde(rename = "push")]
    Push,
    #[serde(rename = "authAnonymously")]
    AuthAnonymously,
    #[serde(rename = "authWithPassword")]
    AuthWithPassword,
    #[serde(rename = "authWithCustomToken")]
    AuthWithCustomToken,
    #[serde(rename = "authWithOAuthPopup")]
    AuthWithOAuthPopup,
    #[serde(rename = "authWithOAuthRedirect")]
    AuthWithOAuthRedirect,
    #[serde(rename = "authWithOAuthToken")]
    AuthWithOAuthToken,
    #[serde(rename = "unauth")]
    Unauth,
}

impl Method {
    pub const ALL: [Method; 11] = [
        Method::Set,
        Method::Update,
        Method::Remove,
        Method::Push,
        Method::AuthAnonymously,
        Method::AuthWithPassword,
        Method::AuthWithCustomToken,
        Method::AuthWithOAuthPopup,
        Method::AuthWithOAuthRedirect,
        Method::AuthWithOAuthToken,
        Method::Unauth,
    ];

    /// Wire name of the method
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Set => "set",
            Method::Update => "update",
            Method::Remove => "remove",
            Method::Push => "push",
            Method::AuthAnonymously => "authAnonymously",
            Method::AuthWithPassword => "authWithPassword",
            Method::AuthWithCustomToken => "authWithCustomToken",
            Method::AuthWithOAuthPopup => "authWithOAuthPopup",
            Method::AuthWithOAuthRedirect => "authWithOAuthRedirect",
            Method::AuthWithOAuthToken => "authWithOAuthToken",
            Method::Unauth => "unauth",
        }
    }
}

impl FromStr for Method {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| DriverError::UnknownMethod(s.to_string()))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend notification kinds for data changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Value,
    ChildAdded,
    ChildRemoved,
    ChildChanged,
    ChildMoved,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Value => "value",
            EventType::ChildAdded => "child_added",
            EventType::ChildRemoved => "child_removed",
            EventType::ChildChanged => "child_changed",
            EventType::ChildMoved => "child_moved",
        }
    }
}

impl FromStr for EventType {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "value" => Ok(EventType::Value),
            "child_added" => Ok(EventType::ChildAdded),
            "child_removed" => Ok(EventType::ChildRemoved),
            "child_changed" => Ok(EventType::ChildChanged),
            "child_moved" => Ok(EventType::ChildMoved),
            other => Err(DriverError::InvalidArgument(format!(
                "events() expects one of value, child_added, child_removed, \
                 child_changed, child_moved; got `{other}`"
            ))),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative description of a backend operation
///
/// `method` stays a string so requests decoded from untrusted input can
/// carry names the dispatcher rejects with [`DriverError::UnknownMethod`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Request {
    /// Request for `method` at the root with no payload
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            location: None,
            data: Value::Null,
        }
    }

    /// Target a path relative to the context the request is dispatched from
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Attach a payload
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn set(location: impl Into<String>, data: Value) -> Self {
        Self::new(Method::Set.as_str()).at(location).with_data(data)
    }

    pub fn update(location: impl Into<String>, data: Value) -> Self {
        Self::new(Method::Update.as_str()).at(location).with_data(data)
    }

    pub fn remove(location: impl Into<String>) -> Self {
        Self::new(Method::Remove.as_str()).at(location)
    }

    pub fn push(location: impl Into<String>, data: Value) -> Self {
        Self::new(Method::Push.as_str()).at(location).with_data(data)
    }

    pub fn auth_anonymously() -> Self {
        Self::new(Method::AuthAnonymously.as_str())
    }

    pub fn auth_with_password(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(Method::AuthWithPassword.as_str()).with_data(json!({
            "email": email.into(),
            "password": password.into(),
        }))
    }

    pub fn auth_with_custom_token(token: impl Into<String>) -> Self {
        Self::new(Method::AuthWithCustomToken.as_str()).with_data(Value::String(token.into()))
    }

    pub fn auth_with_oauth_popup(provider: impl Into<String>) -> Self {
        Self::new(Method::AuthWithOAuthPopup.as_str()).with_data(Value::String(provider.into()))
    }

    pub fn auth_with_oauth_redirect(provider: impl Into<String>) -> Self {
        Self::new(Method::AuthWithOAuthRedirect.as_str()).with_data(Value::String(provider.into()))
    }

    /// OAuth token login; `credentials` is an access token string or a
    /// provider-specific credentials object
    pub fn auth_with_oauth_token(provider: impl Into<String>, credentials: Value) -> Self {
        Self::new(Method::AuthWithOAuthToken.as_str())
            .with_data(Value::Array(vec![Value::String(provider.into()), credentials]))
    }

    pub fn unauth() -> Self {
        Self::new(Method::Unauth.as_str())
    }

    /// Parse the method name
    pub fn method(&self) -> Result<Method> {
        self.method.parse()
    }
}

/// Outcome handle produced for every dispatched [`Request`]
///
/// `observable` emits at most one value and completes, or errors.
#[derive(Clone)]
pub struct Response {
    pub method: String,
    pub location: Option<String>,
    pub observable: Observable<Value>,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("method", &self.method)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Backend data notification, delivered verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Key of the location the snapshot belongs to; `None` at the root
    pub key: Option<String>,
    pub value: Value,
    /// Key of the previous sibling, for child_added/changed/moved events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_child_key: Option<String>,
}

impl Snapshot {
    pub fn new(key: Option<String>, value: Value) -> Self {
        Self {
            key,
            value,
            prev_child_key: None,
        }
    }

    pub fn with_prev_child_key(mut self, prev: impl Into<String>) -> Self {
        self.prev_child_key = Some(prev.into());
        self
    }

    /// The snapshot's value
    pub fn val(&self) -> &Value {
        &self.value
    }

    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }
}

/// Authentication state reported by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub uid: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Session expiry, seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<u64>,
}

impl AuthInfo {
    pub fn new(uid: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            provider: provider.into(),
            token: None,
            expires: None,
        }
    }
}

//! Request dispatcher
//!
//! Turns the inbound request stream into the outbound response stream, one
//! [`Response`] per [`Request`] in arrival order. Each response carries the
//! completion observable of its backend call.

use crate::context::normalize_path;
use crate::error::{BackendError, DriverError, Result};
use crate::reference::Reference;
use crate::rx::Observable;
use crate::types::{AuthInfo, Method, Request, Response};
use serde_json::Value;
use std::sync::Arc;

/// When the backend call behind a [`Response`] runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// On first subscription to the response's observable
    #[default]
    Lazy,
    /// As soon as the request arrives
    Eager,
}

/// Map every request to a response whose observable performs the request
/// against `root`
///
/// Either way a request's backend call runs at most once and its outcome is
/// replayed to every subscriber of the response. An unknown method fails only
/// its own response.
pub fn dialoguer(
    requests: &Observable<Request>,
    root: Arc<dyn Reference>,
    dispatch: Dispatch,
) -> Observable<Response> {
    requests.map(move |request| {
        let reference = resolve(&root, request.location.as_deref());

        let completion = match request.method() {
            Ok(method) => perform_lazily(method, reference, request.data),
            Err(error) => {
                tracing::warn!(method = %request.method, "Dropping request with unknown method");
                Observable::throw(error)
            }
        };

        let observable = match dispatch {
            Dispatch::Lazy => completion.share_replay(),
            Dispatch::Eager => completion.publish_replay(),
        };

        Response {
            method: request.method,
            location: request.location,
            observable,
        }
    })
}

/// Reference a request targets: the root when `location` is absent or empty
pub(crate) fn resolve(root: &Arc<dyn Reference>, location: Option<&str>) -> Arc<dyn Reference> {
    let location = normalize_path(location.unwrap_or_default());
    if location.is_empty() {
        Arc::clone(root)
    } else {
        root.child(&location)
    }
}

fn perform_lazily(method: Method, reference: Arc<dyn Reference>, data: Value) -> Observable<Value> {
    Observable::from_future(move || {
        let reference = Arc::clone(&reference);
        let data = data.clone();
        async move { perform(method, reference.as_ref(), data).await }
    })
    .filter_map(|outcome| outcome)
}

async fn perform(method: Method, reference: &dyn Reference, data: Value) -> Result<Option<Value>> {
    tracing::debug!(%method, url = %reference.url(), "Dispatching request");

    match method {
        Method::Set => {
            reference.set(data).await?;
            Ok(None)
        }
        Method::Update => {
            reference.update(data).await?;
            Ok(None)
        }
        Method::Remove => {
            reference.remove().await?;
            Ok(Some(Value::Null))
        }
        Method::Push => {
            let child = reference.push_child();
            let key = child.key().unwrap_or_default();
            child.set(data).await?;
            Ok(Some(Value::String(key)))
        }
        Method::AuthAnonymously => auth_outcome(reference.auth_anonymously().await),
        Method::AuthWithPassword => auth_outcome(reference.auth_with_password(data).await),
        Method::AuthWithCustomToken => auth_outcome(reference.auth_with_custom_token(data).await),
        Method::AuthWithOAuthPopup => auth_outcome(reference.auth_with_oauth_popup(data).await),
        Method::AuthWithOAuthRedirect => {
            auth_outcome(reference.auth_with_oauth_redirect(data).await)
        }
        Method::AuthWithOAuthToken => {
            let args = positional_args(data)?;
            auth_outcome(reference.auth_with_oauth_token(args).await)
        }
        Method::Unauth => {
            reference.unauth();
            Ok(None)
        }
    }
}

fn auth_outcome(outcome: std::result::Result<AuthInfo, BackendError>) -> Result<Option<Value>> {
    Ok(Some(serde_json::to_value(outcome?)?))
}

fn positional_args(data: Value) -> Result<Vec<Value>> {
    match data {
        Value::Array(args) => Ok(args),
        Value::Null => Ok(Vec::new()),
        other => Err(DriverError::InvalidArgument(format!(
            "authWithOAuthToken expects its data to be an array of arguments, got {other}"
        ))),
    }
}

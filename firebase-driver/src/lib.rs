//! # Firebase Driver
//!
//! Reactive-stream driver for a real-time database backend.
//!
//! ## Features
//!
//! - 📨 **Requests in, responses out**: a stream of declarative requests
//!   (`set`, `update`, `remove`, `push`, auth methods) becomes backend calls,
//!   each answered by a response carrying its completion stream
//! - 🔔 **Live data**: backend value and child events as shared streams
//! - 🧭 **Path-scoped contexts**: `select`, ordering and limit clauses,
//!   `isolate` for scoping request streams to a sub-path
//! - 🔐 **Auth state**: the current user id as a stream
//! - 🔄 **Async/Await**: built on Tokio and `futures::Stream`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use firebase_driver::{DriverSource, Request, make_firebase_driver, rx::Subject};
//! use futures::StreamExt;
//! # use firebase_driver::reference::Reference;
//! # use std::sync::Arc;
//!
//! # async fn demo(root: Arc<dyn Reference>) -> Result<(), Box<dyn std::error::Error>> {
//! let driver = make_firebase_driver(Some(DriverSource::Reference(root)))?;
//!
//! let requests = Subject::new();
//! let firebase = driver.run(requests.as_observable());
//!
//! // Watch a value
//! let mut name = firebase.select("events/e424/core/name")?.events("value")?.to_stream();
//!
//! // Write it; `set` completes without a value once acknowledged
//! let mut acks = firebase.responses().flat_map(|r| r.observable).to_stream();
//! requests.next(Request::set("events/e424/core/name", "Rando event name".into()));
//!
//! // Push a child; the acknowledgement carries the generated key
//! requests.next(Request::push("events", serde_json::json!({"name": "Launch"})));
//! if let Some(Ok(key)) = acks.next().await {
//!     println!("pushed {key}");
//! }
//!
//! if let Some(Ok(snapshot)) = name.next().await {
//!     println!("name = {}", snapshot.val());
//! }
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod dialoguer;
pub mod driver;
pub mod error;
pub mod observe;
pub mod reference;
pub mod rx; // RxJS-style reactive programming
pub mod types;

pub use context::{Context, Push};
pub use dialoguer::Dispatch;
pub use driver::{
    DriverConfig, DriverSource, FirebaseDriver, make_firebase_driver,
    make_firebase_driver_with_config,
};
pub use error::{BackendError, DriverError, Result};
pub use reference::{Connector, ListenerToken, Reference};
pub use types::{AuthInfo, EventType, Method, Request, Response, Snapshot};

//! RxJS-style reactive programming for Rust
//!
//! The small reactive substrate the driver is written against: cold
//! observables built from subscribe/teardown functions, multicast subjects
//! and the handful of operators the driver and its users need.

pub mod observable;
pub mod operators;
mod share;
pub mod subject;

pub use observable::{Observable, Observer, Subscription, Teardown};
pub(crate) use observable::WeakObservable;
pub use subject::{ReplaySubject, Subject};

// Re-export common operators
pub use operators::{flat_map, merge, retry};

/// Default buffer size of multicast channels
pub const DEFAULT_SHARE_CAPACITY: usize = 256;

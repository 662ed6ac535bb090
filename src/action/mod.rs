//! The remote side of an unsubscribe: whatever turns a target URL into a
//! confirmed unsubscription.

pub mod http;

pub use crate::error::ActionError;
pub use http::HttpUnsubscriber;

use std::future::Future;

/// Performs the unsubscribe for one target.
///
/// Implementations must tolerate being called again for a target that was
/// already handled; the worker retries and redelivers freely.
pub trait UnsubscribeAction {
    fn unsubscribe(&self, target: &str) -> impl Future<Output = Result<(), ActionError>> + Send;
}

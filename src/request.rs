//! Request identity.
//!
//! The request-scoped file cache must never survive past the inbound
//! request that created it. Rather than relying on object lifetime, the
//! cache captures an explicit [`RequestId`] token at construction and
//! compares it against the ambient id on every access. The HTTP layer
//! (outside this crate) installs a [`RequestIdSource`] that reports the
//! id of the request currently being handled.

use std::sync::{Arc, Mutex};

/// Uniquely identifies one inbound HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Reports the id of the request currently being handled, if any.
pub trait RequestIdSource: Send + Sync {
    fn current(&self) -> Option<RequestId>;
}

/// A handle to the ambient request identity.
#[derive(Clone)]
pub struct RequestScope {
    source: Arc<dyn RequestIdSource>,
}

impl RequestScope {
    pub fn new(source: Arc<dyn RequestIdSource>) -> Self {
        Self { source }
    }

    /// The id of the request currently being handled.
    pub fn current(&self) -> Option<RequestId> {
        self.source.current()
    }
}

/// A settable [`RequestIdSource`] for tests and single-request contexts.
pub struct FixedRequestSource {
    current: Mutex<Option<RequestId>>,
}

impl FixedRequestSource {
    pub fn new(id: RequestId) -> Self {
        Self {
            current: Mutex::new(Some(id)),
        }
    }

    /// Replace the reported request id, simulating a new inbound request
    /// on a reused handler.
    pub fn set(&self, id: Option<RequestId>) {
        *self.current.lock().unwrap() = id;
    }
}

impl RequestIdSource for FixedRequestSource {
    fn current(&self) -> Option<RequestId> {
        self.current.lock().unwrap().clone()
    }
}

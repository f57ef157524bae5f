pub mod classify;
pub mod emitter;

use std::sync::Arc;

use serde_json::Value;

pub use classify::{classify, Classification, IdleTimeout, PoolFamily, PoolKind};
pub use emitter::EventEmitter;

/// Callback invoked every time a subscribed signal fires. Payloads are ignored.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Methods a pool client may expose beyond its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Connect,
    Execute,
}

/// Subscribe-by-name capability of a pool client.
pub trait SignalEmitter: Send + Sync {
    fn on(&self, signal: &str, listener: Listener);
}

/// Read-only view of a client-side connection pool.
///
/// Pool clients share no common base type, so the classifier only looks at
/// the structural view returned by [`PoolHandle::describe`] and at the
/// capabilities the handle reports. Implementors never hand ownership of the
/// pool over; the lifecycle code only reads configuration and subscribes.
pub trait PoolHandle: Send + Sync {
    /// Configuration and public fields, laid out the way the client exposes them,
    /// e.g. `{"options": {"idleTimeoutMillis": 5000}}`.
    fn describe(&self) -> Value;

    fn has_capability(&self, _capability: Capability) -> bool {
        false
    }

    /// `None` when the client cannot be subscribed to.
    fn emitter(&self) -> Option<&dyn SignalEmitter> {
        None
    }
}

impl<P: PoolHandle + ?Sized> PoolHandle for Arc<P> {
    fn describe(&self) -> Value {
        (**self).describe()
    }

    fn has_capability(&self, capability: Capability) -> bool {
        (**self).has_capability(capability)
    }

    fn emitter(&self) -> Option<&dyn SignalEmitter> {
        (**self).emitter()
    }
}

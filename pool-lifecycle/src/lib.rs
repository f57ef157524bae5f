//! Keeps a request's background lifetime open while pooled database
//! connections idle out.
//!
//! Register a pool once with [`attach_database_pool`]. Every time the pool
//! recycles a connection the idle window is re-armed for the pool's idle
//! timeout plus a small margin, and the host is asked (through the request's
//! `wait_until`) to stay alive until the window closes. Windows never reach
//! past the session ceiling measured from the first registration.
//!
//! ```no_run
//! use pool_lifecycle::{attach_database_pool, EventEmitter, PoolHandle, SignalEmitter};
//! use serde_json::{json, Value};
//!
//! struct PgPool {
//!     events: EventEmitter,
//! }
//!
//! impl PoolHandle for PgPool {
//!     fn describe(&self) -> Value {
//!         json!({ "options": { "idleTimeoutMillis": 5000 } })
//!     }
//!
//!     fn emitter(&self) -> Option<&dyn SignalEmitter> {
//!         Some(&self.events)
//!     }
//! }
//!
//! let pool = PgPool { events: EventEmitter::new() };
//! attach_database_pool(&pool);
//! ```

pub mod error;
pub mod extender;
pub mod pool;

#[macro_use]
extern crate lazy_static;

pub use error::{LifecycleError, LifecycleResult};
pub use extender::{
    config::ExtenderConfig,
    host::{ExtendLifetime, RequestContext, ScopedHost},
    state::{ExtenderStats, SessionClock, SlotState},
    ExtenderBuilder, IdleExtender,
};
pub use pool::{
    classify, Capability, Classification, EventEmitter, IdleTimeout, Listener, PoolFamily,
    PoolHandle, PoolKind, SignalEmitter,
};

lazy_static! {
    static ref DEFAULT_EXTENDER: IdleExtender = IdleExtender::new(ExtenderConfig::default());
}

/// Process-wide extender behind [`attach_database_pool`]. Its session clock
/// starts on first use.
pub fn default_extender() -> &'static IdleExtender {
    &DEFAULT_EXTENDER
}

/// Watches `pool` with the process-wide extender.
pub fn attach_database_pool(pool: &dyn PoolHandle) -> Classification {
    DEFAULT_EXTENDER.register(pool)
}

pub mod config;
pub mod host;
pub mod state;

use std::{
    cmp,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{future::BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::{runtime::Handle, sync::oneshot, time::Instant};
use tracing::{debug, info, warn};

use crate::error::LifecycleError;
use crate::pool::{classify, Classification, IdleTimeout, PoolHandle, PoolKind};
use config::ExtenderConfig;
use host::{ExtendLifetime, ScopedHost};
use state::{bump, Counters, ExtenderStats, ExtensionWindow, SessionClock, SlotState};

/// Keeps the host alive while pooled connections idle out.
///
/// One slot serves every pool registered with the extender: each recycling
/// signal supersedes the window armed by the previous one, so at most one
/// timer and one pending future exist at any time.
pub struct IdleExtender {
    inner: Arc<ExtenderInner>,
}

impl Clone for IdleExtender {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl IdleExtender {
    pub fn new(config: ExtenderConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> ExtenderBuilder {
        ExtenderBuilder::new()
    }

    /// Subscribes to the recycling signals of `pool`.
    ///
    /// Best effort: pools without a subscription capability, or whose family
    /// emits no recycling signal, are classified and otherwise left alone.
    /// Any window still armed is settled first.
    pub fn register(&self, pool: &dyn PoolHandle) -> Classification {
        self.inner.settle();

        let class = classify(pool);
        let Some(emitter) = pool.emitter() else {
            debug!(pool = class.kind.label(), "pool exposes no signal subscription");
            return class;
        };
        if class.signals.is_empty() {
            debug!(pool = class.kind.label(), "pool family emits no recycling signal");
            return class;
        }

        for &signal in class.signals {
            let inner = self.inner.clone();
            let kind = class.kind;
            let idle_timeout = class.idle_timeout;
            emitter.on(
                signal,
                Arc::new(move || {
                    debug!(pool = kind.label(), signal, "pool connection recycled");
                    inner.extend(kind, idle_timeout);
                }),
            );
        }

        debug!(
            pool = class.kind.label(),
            idle_timeout = ?class.idle_timeout,
            signals = ?class.signals,
            "registered pool"
        );
        class
    }

    /// Arms a fresh window as if a pool with `idle_timeout` had just recycled
    /// a connection.
    pub fn extend(&self, idle_timeout: IdleTimeout) {
        self.inner.extend(PoolKind::Unknown, idle_timeout);
    }

    /// Resolves the armed window, if any, without arming a new one.
    pub fn settle(&self) {
        self.inner.settle();
    }

    pub fn state(&self) -> SlotState {
        match self.inner.slot.lock().as_ref() {
            Some(window) => SlotState::Armed {
                scheduled_at: window.scheduled_at,
                expires_at: window.expires_at,
            },
            None => SlotState::Idle,
        }
    }

    pub fn stats(&self) -> ExtenderStats {
        self.inner.counters.snapshot()
    }

    pub fn clock(&self) -> SessionClock {
        self.inner.clock
    }

    pub fn config(&self) -> ExtenderConfig {
        self.inner.config
    }
}

impl std::fmt::Debug for IdleExtender {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("IdleExtender")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .finish()
    }
}

pub struct ExtenderBuilder {
    config: ExtenderConfig,
    clock: Option<SessionClock>,
    host: Option<Arc<dyn ExtendLifetime>>,
    runtime: Option<Handle>,
}

impl ExtenderBuilder {
    pub fn new() -> Self {
        Self {
            config: ExtenderConfig::default(),
            clock: None,
            host: None,
            runtime: None,
        }
    }

    pub fn config(mut self, config: ExtenderConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the session start. The ceiling still comes from the config.
    pub fn started_at(mut self, started: Instant) -> Self {
        self.clock = Some(SessionClock::starting_at(
            started,
            self.config.max_session_duration,
        ));
        self
    }

    pub fn host(mut self, host: Arc<dyn ExtendLifetime>) -> Self {
        self.host = Some(host);
        self
    }

    /// Runtime the window timers are spawned on. Defaults to the runtime
    /// current when a signal fires.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> IdleExtender {
        let config = self.config;
        let clock = match self.clock {
            Some(clock) => SessionClock::starting_at(clock.started(), config.max_session_duration),
            None => SessionClock::start(config.max_session_duration),
        };

        IdleExtender {
            inner: Arc::new(ExtenderInner {
                config,
                clock,
                host: self.host.unwrap_or_else(|| Arc::new(ScopedHost)),
                runtime: self.runtime,
                slot: Mutex::new(None),
                next_window: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }
}

impl Default for ExtenderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct ExtenderInner {
    config: ExtenderConfig,
    clock: SessionClock,
    host: Arc<dyn ExtendLifetime>,
    runtime: Option<Handle>,
    slot: Mutex<Option<ExtensionWindow>>,
    next_window: AtomicU64,
    counters: Counters,
}

impl ExtenderInner {
    fn settle(&self) {
        if let Some(window) = self.slot.lock().take() {
            window.settle();
            bump(&self.counters.superseded);
        }
    }

    /// Supersedes the armed window and arms a new one.
    ///
    /// The slot stays locked from cancelling the old timer until the new one
    /// is stored, so concurrent signals always observe a whole window.
    fn extend(self: &Arc<Self>, kind: PoolKind, idle_timeout: IdleTimeout) {
        let until = {
            let mut slot = self.slot.lock();
            if let Some(window) = slot.take() {
                window.settle();
                bump(&self.counters.superseded);
            }

            let now = Instant::now();
            let Some(remaining) = self.clock.remaining(now) else {
                bump(&self.counters.exhausted);
                debug!(pool = kind.label(), "session budget exhausted, not extending");
                return;
            };
            let wait = self.wait_time(idle_timeout, remaining);

            let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
                warn!(pool = kind.label(), error = %LifecycleError::NoRuntime, "idle window not armed");
                return;
            };

            let id = self.next_window.fetch_add(1, Ordering::AcqRel);
            let expires_at = now + wait;
            let (resolve, resolved) = oneshot::channel();
            let timer = spawn_window_timer(self, id, expires_at, &runtime);

            *slot = Some(ExtensionWindow {
                id,
                scheduled_at: now,
                expires_at,
                resolve,
                timer,
            });
            bump(&self.counters.armed);
            debug!(pool = kind.label(), wait_ms = wait.as_millis() as u64, "armed idle window");

            resolved.map(|_| ()).boxed()
        };

        self.hand_to_host(until);
    }

    fn wait_time(&self, idle_timeout: IdleTimeout, remaining: Duration) -> Duration {
        match idle_timeout {
            IdleTimeout::Millis(ms) => cmp::min(
                Duration::from_millis(ms) + self.config.safety_margin,
                remaining,
            ),
            IdleTimeout::Unlimited => remaining,
        }
    }

    fn hand_to_host(&self, until: BoxFuture<'static, ()>) {
        if let Err(error) = self.host.wait_until(until) {
            bump(&self.counters.host_failures);
            warn!(%error, "pool signal fired outside of request scope");
        }
    }

    fn expire(&self, id: u64) {
        let mut slot = self.slot.lock();
        if slot.as_ref().map(|window| window.id) != Some(id) {
            return;
        }
        if let Some(window) = slot.take() {
            let _ = window.resolve.send(());
            bump(&self.counters.expired);
            info!("idle timeout expired");
        }
    }
}

fn spawn_window_timer(
    inner: &Arc<ExtenderInner>,
    id: u64,
    expires_at: Instant,
    runtime: &Handle,
) -> tokio::task::AbortHandle {
    let inner = Arc::downgrade(inner);

    runtime
        .spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            if let Some(inner) = inner.upgrade() {
                inner.expire(id);
            }
        })
        .abort_handle()
}

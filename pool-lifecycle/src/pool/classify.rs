//! Structural classification of pool clients.
//!
//! Probes run in a fixed order and the first match wins: a configuration
//! object can satisfy more than one probe (a Redis client and a Postgres pool
//! both carry `options`), so the order is part of the contract. New clients
//! are supported by appending a [`Probe`] to [`PROBES`].

use serde_json::Value;

use super::{Capability, PoolHandle};

pub const GENERIC_IDLE_TIMEOUT_MS: u64 = 10_000;
const REDIS_IDLE_TIMEOUT_MS: u64 = 5_000;

/// Lifecycle-signal family a pool client belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolFamily {
    /// Emits `release` when a client goes back to the pool.
    ReleaseEventPool,
    /// Emits `connectionCheckedOut` from its connection pool monitor.
    CheckoutEventPool,
    /// Emits `end` once a connection is closed.
    ConnectionEndPool,
    /// Exposes status fields that can only be polled.
    PollingStatusPool,
    Unknown,
}

impl PoolFamily {
    /// Recycling signals to subscribe to. Empty for families without events.
    pub fn signals(self) -> &'static [&'static str] {
        match self {
            PoolFamily::ReleaseEventPool => &["release"],
            PoolFamily::CheckoutEventPool => &["connectionCheckedOut"],
            PoolFamily::ConnectionEndPool => &["end"],
            PoolFamily::PollingStatusPool | PoolFamily::Unknown => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Postgres,
    MongoDb,
    /// Socket-configured Redis client, which reports `end` when a connection closes.
    RedisSocket,
    Redis,
    Cassandra,
    MySql,
    /// mysql2 and MariaDB share the same configuration layout.
    MySql2,
    Oracle,
    Sqlite,
    Unknown,
}

impl PoolKind {
    pub fn family(self) -> PoolFamily {
        match self {
            PoolKind::Postgres | PoolKind::MySql | PoolKind::MySql2 => PoolFamily::ReleaseEventPool,
            PoolKind::MongoDb => PoolFamily::CheckoutEventPool,
            PoolKind::RedisSocket | PoolKind::Cassandra => PoolFamily::ConnectionEndPool,
            PoolKind::Redis | PoolKind::Oracle | PoolKind::Sqlite => PoolFamily::PollingStatusPool,
            PoolKind::Unknown => PoolFamily::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PoolKind::Postgres => "postgres",
            PoolKind::MongoDb => "mongodb",
            PoolKind::RedisSocket => "redis (socket)",
            PoolKind::Redis => "redis",
            PoolKind::Cassandra => "cassandra",
            PoolKind::MySql => "mysql",
            PoolKind::MySql2 => "mysql2/mariadb",
            PoolKind::Oracle => "oracle",
            PoolKind::Sqlite => "sqlite",
            PoolKind::Unknown => "unknown",
        }
    }
}

/// How long a pool keeps an unused connection open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleTimeout {
    Millis(u64),
    /// Idle connections are never closed by the pool.
    Unlimited,
}

impl IdleTimeout {
    /// `None` when the pool never closes idle connections.
    pub fn as_millis(self) -> Option<u64> {
        match self {
            IdleTimeout::Millis(ms) => Some(ms),
            IdleTimeout::Unlimited => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: PoolKind,
    pub family: PoolFamily,
    pub signals: &'static [&'static str],
    pub idle_timeout: IdleTimeout,
}

impl Classification {
    fn new(kind: PoolKind, idle_timeout: IdleTimeout) -> Self {
        let family = kind.family();
        Self {
            kind,
            family,
            signals: family.signals(),
            idle_timeout,
        }
    }

    /// `None` for [`IdleTimeout::Unlimited`]; `Some(0)` means connections close at once.
    pub fn idle_timeout_millis(&self) -> Option<u64> {
        self.idle_timeout.as_millis()
    }
}

/// Meaning of an explicitly configured 0.
#[derive(Debug, Clone, Copy)]
enum Zero {
    Unlimited,
    Immediate,
    Default,
}

struct Probe {
    kind: PoolKind,
    matches: fn(&Value, &dyn PoolHandle) -> bool,
    configured: fn(&Value) -> Option<u64>,
    default: IdleTimeout,
    zero: Zero,
}

impl Probe {
    fn idle_timeout(&self, shape: &Value) -> IdleTimeout {
        match (self.configured)(shape) {
            Some(0) => match self.zero {
                Zero::Unlimited => IdleTimeout::Unlimited,
                Zero::Immediate => IdleTimeout::Millis(0),
                Zero::Default => self.default,
            },
            Some(ms) => IdleTimeout::Millis(ms),
            None => self.default,
        }
    }
}

const PROBES: &[Probe] = &[
    Probe {
        kind: PoolKind::Postgres,
        matches: is_postgres,
        configured: postgres_timeout,
        default: IdleTimeout::Millis(10_000),
        zero: Zero::Unlimited,
    },
    Probe {
        kind: PoolKind::MongoDb,
        matches: is_mongodb,
        configured: mongodb_timeout,
        default: IdleTimeout::Unlimited,
        zero: Zero::Unlimited,
    },
    Probe {
        kind: PoolKind::RedisSocket,
        matches: is_redis_socket,
        configured: redis_socket_timeout,
        default: IdleTimeout::Millis(GENERIC_IDLE_TIMEOUT_MS),
        zero: Zero::Default,
    },
    Probe {
        kind: PoolKind::Redis,
        matches: is_redis,
        configured: not_configurable,
        default: IdleTimeout::Millis(REDIS_IDLE_TIMEOUT_MS),
        zero: Zero::Default,
    },
    Probe {
        kind: PoolKind::Cassandra,
        matches: is_cassandra,
        configured: not_configurable,
        default: IdleTimeout::Millis(30_000),
        zero: Zero::Default,
    },
    Probe {
        kind: PoolKind::MySql,
        matches: is_mysql,
        configured: mysql_timeout,
        default: IdleTimeout::Millis(60_000),
        zero: Zero::Default,
    },
    Probe {
        kind: PoolKind::MySql2,
        matches: is_mysql2,
        configured: mysql2_timeout,
        default: IdleTimeout::Millis(60_000),
        zero: Zero::Immediate,
    },
    Probe {
        kind: PoolKind::Oracle,
        matches: is_oracle,
        configured: oracle_timeout,
        default: IdleTimeout::Millis(60_000),
        zero: Zero::Unlimited,
    },
    Probe {
        kind: PoolKind::Sqlite,
        matches: is_sqlite,
        configured: sqlite_timeout,
        default: IdleTimeout::Unlimited,
        zero: Zero::Unlimited,
    },
];

/// Works out which family `pool` belongs to and the idle timeout it runs with.
///
/// Never fails: shapes no probe recognises come back as [`PoolKind::Unknown`]
/// with the generic 10 s timeout.
pub fn classify(pool: &dyn PoolHandle) -> Classification {
    let shape = pool.describe();

    PROBES
        .iter()
        .find(|probe| (probe.matches)(&shape, pool))
        .map(|probe| Classification::new(probe.kind, probe.idle_timeout(&shape)))
        .unwrap_or_else(|| {
            Classification::new(
                PoolKind::Unknown,
                IdleTimeout::Millis(GENERIC_IDLE_TIMEOUT_MS),
            )
        })
}

fn object<'a>(shape: &'a Value, key: &str) -> Option<&'a Value> {
    shape.get(key).filter(|value| value.is_object())
}

fn has_key(shape: &Value, key: &str) -> bool {
    shape.as_object().map_or(false, |map| map.contains_key(key))
}

/// Finite, non-negative numbers only; anything else is treated as unset.
fn millis(value: Option<&Value>) -> Option<u64> {
    let ms = value?.as_f64()?;
    if ms.is_finite() && ms >= 0.0 {
        Some(ms.round() as u64)
    } else {
        None
    }
}

fn is_postgres(shape: &Value, _: &dyn PoolHandle) -> bool {
    object(shape, "options").map_or(false, |options| has_key(options, "idleTimeoutMillis"))
}

fn postgres_timeout(shape: &Value) -> Option<u64> {
    millis(shape.pointer("/options/idleTimeoutMillis"))
}

fn is_mongodb(shape: &Value, _: &dyn PoolHandle) -> bool {
    object(shape, "options").map_or(false, |options| has_key(options, "maxIdleTimeMS"))
}

fn mongodb_timeout(shape: &Value) -> Option<u64> {
    millis(shape.pointer("/options/maxIdleTimeMS"))
}

fn is_redis_socket(shape: &Value, _: &dyn PoolHandle) -> bool {
    object(shape, "options").map_or(false, |options| object(options, "socket").is_some())
}

/// Clients that also expose `status` run with the Redis connection default.
fn redis_socket_timeout(shape: &Value) -> Option<u64> {
    has_key(shape, "status").then_some(REDIS_IDLE_TIMEOUT_MS)
}

fn is_redis(shape: &Value, _: &dyn PoolHandle) -> bool {
    object(shape, "options").is_some() && has_key(shape, "status")
}

fn is_cassandra(shape: &Value, pool: &dyn PoolHandle) -> bool {
    object(shape, "options").is_some()
        && pool.has_capability(Capability::Connect)
        && pool.has_capability(Capability::Execute)
}

fn is_mysql(shape: &Value, _: &dyn PoolHandle) -> bool {
    object(shape, "config").map_or(false, |config| object(config, "connectionConfig").is_some())
}

fn mysql_timeout(shape: &Value) -> Option<u64> {
    millis(shape.pointer("/config/connectionConfig/idleTimeout"))
}

fn is_mysql2(shape: &Value, _: &dyn PoolHandle) -> bool {
    object(shape, "config").map_or(false, |config| has_key(config, "idleTimeout"))
}

fn mysql2_timeout(shape: &Value) -> Option<u64> {
    millis(shape.pointer("/config/idleTimeout"))
}

fn is_oracle(shape: &Value, _: &dyn PoolHandle) -> bool {
    has_key(shape, "poolTimeout")
}

fn oracle_timeout(shape: &Value) -> Option<u64> {
    millis(shape.get("poolTimeout"))
}

fn is_sqlite(shape: &Value, _: &dyn PoolHandle) -> bool {
    has_key(shape, "idleTimeout")
}

fn sqlite_timeout(shape: &Value) -> Option<u64> {
    millis(shape.get("idleTimeout"))
}

fn not_configurable(_: &Value) -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Shape {
        value: Value,
        capabilities: Vec<Capability>,
    }

    impl Shape {
        fn new(value: Value) -> Self {
            Self {
                value,
                capabilities: Vec::new(),
            }
        }

        fn with(mut self, capability: Capability) -> Self {
            self.capabilities.push(capability);
            self
        }
    }

    impl PoolHandle for Shape {
        fn describe(&self) -> Value {
            self.value.clone()
        }

        fn has_capability(&self, capability: Capability) -> bool {
            self.capabilities.contains(&capability)
        }
    }

    fn classify_json(value: Value) -> Classification {
        classify(&Shape::new(value))
    }

    #[test]
    fn postgres_uses_configured_timeout() {
        let class = classify_json(json!({ "options": { "idleTimeoutMillis": 5000, "max": 50 } }));
        assert_eq!(class.kind, PoolKind::Postgres);
        assert_eq!(class.family, PoolFamily::ReleaseEventPool);
        assert_eq!(class.signals, &["release"]);
        assert_eq!(class.idle_timeout, IdleTimeout::Millis(5000));
    }

    #[test]
    fn defaults_apply_when_field_present_but_unset() {
        let cases = [
            (json!({ "options": { "idleTimeoutMillis": null } }), PoolKind::Postgres, IdleTimeout::Millis(10_000)),
            (json!({ "options": { "maxIdleTimeMS": null } }), PoolKind::MongoDb, IdleTimeout::Unlimited),
            (json!({ "options": {}, "status": "ready" }), PoolKind::Redis, IdleTimeout::Millis(5_000)),
            (json!({ "config": { "connectionConfig": {} } }), PoolKind::MySql, IdleTimeout::Millis(60_000)),
            (json!({ "config": { "idleTimeout": null } }), PoolKind::MySql2, IdleTimeout::Millis(60_000)),
            (json!({ "poolTimeout": null }), PoolKind::Oracle, IdleTimeout::Millis(60_000)),
            (json!({ "idleTimeout": null }), PoolKind::Sqlite, IdleTimeout::Unlimited),
        ];

        for (shape, kind, timeout) in cases {
            let class = classify_json(shape);
            assert_eq!(class.kind, kind);
            assert_eq!(class.idle_timeout, timeout, "{:?}", kind);
        }
    }

    #[test]
    fn cassandra_needs_both_capabilities() {
        let shape = json!({ "options": { "contactPoints": ["127.0.0.1"] } });

        let client = Shape::new(shape.clone())
            .with(Capability::Connect)
            .with(Capability::Execute);
        let class = classify(&client);
        assert_eq!(class.kind, PoolKind::Cassandra);
        assert_eq!(class.family, PoolFamily::ConnectionEndPool);
        assert_eq!(class.signals, &["end"]);
        assert_eq!(class.idle_timeout, IdleTimeout::Millis(30_000));

        let partial = Shape::new(shape).with(Capability::Connect);
        assert_eq!(classify(&partial).kind, PoolKind::Unknown);
    }

    #[test]
    fn zero_is_resolved_per_family() {
        assert_eq!(
            classify_json(json!({ "options": { "maxIdleTimeMS": 0 } })).idle_timeout,
            IdleTimeout::Unlimited
        );
        assert_eq!(
            classify_json(json!({ "options": { "idleTimeoutMillis": 0 } })).idle_timeout,
            IdleTimeout::Unlimited
        );
        assert_eq!(
            classify_json(json!({ "config": { "connectionConfig": { "idleTimeout": 0 } } })).idle_timeout,
            IdleTimeout::Millis(60_000)
        );
        assert_eq!(
            classify_json(json!({ "config": { "idleTimeout": 0 } })).idle_timeout,
            IdleTimeout::Millis(0)
        );
    }

    #[test]
    fn socket_redis_listens_for_end() {
        let class = classify_json(json!({ "options": { "socket": { "host": "cache" } } }));
        assert_eq!(class.kind, PoolKind::RedisSocket);
        assert_eq!(class.family, PoolFamily::ConnectionEndPool);
        assert_eq!(class.signals, &["end"]);
        assert_eq!(class.idle_timeout, IdleTimeout::Millis(GENERIC_IDLE_TIMEOUT_MS));

        let with_status = classify_json(json!({ "options": { "socket": {} }, "status": "ready" }));
        assert_eq!(with_status.kind, PoolKind::RedisSocket);
        assert_eq!(with_status.idle_timeout, IdleTimeout::Millis(5_000));

        let polled = classify_json(json!({ "options": {}, "status": "ready" }));
        assert_eq!(polled.kind, PoolKind::Redis);
        assert!(polled.signals.is_empty());
    }

    #[test]
    fn unlimited_is_distinct_from_immediate() {
        assert_eq!(
            classify_json(json!({ "options": { "maxIdleTimeMS": 0 } })).idle_timeout_millis(),
            None
        );
        assert_eq!(
            classify_json(json!({ "config": { "idleTimeout": 0 } })).idle_timeout_millis(),
            Some(0)
        );
    }

    #[test]
    fn probe_order_prefers_postgres_over_redis() {
        let class = classify_json(json!({ "options": { "idleTimeoutMillis": 250 }, "status": "ready" }));
        assert_eq!(class.kind, PoolKind::Postgres);
        assert_eq!(class.idle_timeout_millis(), Some(250));
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        assert_eq!(
            classify_json(json!({ "options": { "idleTimeoutMillis": "5000" } })).idle_timeout,
            IdleTimeout::Millis(10_000)
        );
        assert_eq!(
            classify_json(json!({ "config": { "idleTimeout": -1 } })).idle_timeout,
            IdleTimeout::Millis(60_000)
        );
        assert_eq!(
            classify_json(json!({ "config": { "idleTimeout": 1500.4 } })).idle_timeout,
            IdleTimeout::Millis(1500)
        );
    }

    #[test]
    fn unrecognised_shapes_degrade_to_unknown() {
        for shape in [
            json!(null),
            json!(42),
            json!("pool"),
            json!({}),
            json!({ "options": null, "config": null }),
            json!({ "options": { "socket": null } }),
        ] {
            let class = classify_json(shape);
            assert_eq!(class.kind, PoolKind::Unknown);
            assert_eq!(class.family, PoolFamily::Unknown);
            assert!(class.signals.is_empty());
            assert_eq!(class.idle_timeout_millis(), Some(GENERIC_IDLE_TIMEOUT_MS));
        }
    }
}

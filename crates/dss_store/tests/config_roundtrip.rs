use dss_store::{DatabaseConfig, DssConfig, PoolConfig};
use serde_json::json;
use tempfile::tempdir;

#[test]
fn deserializes_pool_settings() {
    let payload = json!({
        "database": { "backend": "sqlite", "path": "dss.sqlite" },
        "pool": {
            "max_connections": 20,
            "min_connections": 2,
            "connect_timeout_ms": 1000,
            "acquire_timeout_ms": 500,
            "idle_timeout_ms": 60000
        },
        "limits": { "max_subscriptions_per_owner": 500 }
    });
    let config: DssConfig = serde_json::from_value(payload).expect("config");
    match config.database {
        DatabaseConfig::Sqlite { path } => {
            assert_eq!(path.as_deref(), Some("dss.sqlite"));
        }
        _ => panic!("expected sqlite backend"),
    }
    let pool = config.pool.expect("pool");
    assert_eq!(pool.max_connections, Some(20));
    assert_eq!(pool.acquire_timeout_ms, Some(500));
    let limits = config.limits.expect("limits");
    assert_eq!(limits.max_subscriptions_per_owner, Some(500));
}

#[test]
fn postgres_config_roundtrip() {
    let config = DssConfig {
        database: DatabaseConfig::Postgres {
            host: "db.internal".to_string(),
            port: Some(26257),
            user: Some("root".to_string()),
            ssl_mode: Some("verify-full".to_string()),
            ssl_dir: Some("/etc/dss/certs".to_string()),
        },
        pool: Some(PoolConfig {
            max_connections: Some(5),
            min_connections: None,
            connect_timeout_ms: None,
            acquire_timeout_ms: Some(2000),
            idle_timeout_ms: None,
        }),
        limits: None,
    };
    let encoded = serde_json::to_string(&config).expect("encode");
    let decoded: DssConfig = serde_json::from_str(&encoded).expect("decode");
    match decoded.database {
        DatabaseConfig::Postgres { host, port, .. } => {
            assert_eq!(host, "db.internal");
            assert_eq!(port, Some(26257));
        }
        _ => panic!("expected postgres backend"),
    }
    assert_eq!(decoded.pool.unwrap().acquire_timeout_ms, Some(2000));
}

#[test]
fn load_or_init_writes_and_reloads_defaults() {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let created =
        DssConfig::load_or_init(base, &base.join("dss.sqlite")).expect("init config");
    assert_eq!(created.backend_name(), "sqlite");
    assert!(base.join("dss.json").exists());

    let reloaded =
        DssConfig::load_or_init(base, &base.join("ignored.sqlite")).expect("reload config");
    assert_eq!(reloaded.backend_name(), "sqlite");
    assert_eq!(
        reloaded
            .limits
            .expect("limits")
            .max_subscriptions_per_owner,
        Some(10_000)
    );
}

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use dss_core::{DssError, DssResult};

const DEFAULT_CONFIG_NAME: &str = "dss.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite {
        path: Option<String>,
    },
    Postgres {
        host: String,
        port: Option<u16>,
        user: Option<String>,
        ssl_mode: Option<String>,
        ssl_dir: Option<String>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_subscriptions_per_owner: Option<u32>,
}

impl LimitsConfig {
    pub fn with_defaults() -> Self {
        Self {
            max_subscriptions_per_owner: Some(10_000),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DssConfig {
    pub database: DatabaseConfig,
    pub pool: Option<PoolConfig>,
    pub limits: Option<LimitsConfig>,
}

impl DssConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            pool: None,
            limits: Some(LimitsConfig::with_defaults()),
        }
    }

    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> DssResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| DssError::internal(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| DssError::internal(format!("read config: {err}")))?;
            let config: DssConfig =
                serde_json::from_str(&raw).map_err(|err| DssError::bad_input(err.to_string()))?;
            return Ok(config);
        }
        let default = DssConfig::default_sqlite(default_sqlite_path.to_string_lossy());
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| DssError::internal(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| DssError::internal(format!("write config: {err}")))?;
        Ok(default)
    }

    /// Assembles the sea-orm connection URL for the configured backend.
    pub fn connection_url(&self, base_dir: &Path) -> String {
        match &self.database {
            DatabaseConfig::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(|| "dss.sqlite".to_string());
                let candidate = PathBuf::from(&path);
                let resolved = if candidate.is_absolute() {
                    candidate
                } else {
                    base_dir.join(candidate)
                };
                format!("sqlite://{}?mode=rwc", resolved.to_string_lossy())
            }
            DatabaseConfig::Postgres {
                host,
                port,
                user,
                ssl_mode,
                ssl_dir,
            } => {
                let user = user.as_deref().unwrap_or("dss");
                let port = port.unwrap_or(26257);
                let mut url = format!("postgres://{user}@{host}:{port}/dss");
                let mut params = Vec::new();
                if let Some(mode) = ssl_mode {
                    params.push(format!("sslmode={mode}"));
                }
                if let Some(dir) = ssl_dir {
                    params.push(format!("sslrootcert={dir}/ca.crt"));
                }
                if !params.is_empty() {
                    url.push('?');
                    url.push_str(&params.join("&"));
                }
                url
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.database {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
        }
    }
}

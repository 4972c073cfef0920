use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_address")]
    pub http_address: String,
    /// Empty disables the gRPC listener.
    #[serde(default = "default_grpc_address")]
    pub grpc_address: String,
    /// Seconds between snapshot saves; 0 saves on every push.
    #[serde(default = "default_store_interval")]
    pub store_interval_secs: u64,
    /// Snapshot file; empty keeps records in memory only.
    #[serde(default = "default_store_file")]
    pub store_file: String,
    #[serde(default = "default_restore")]
    pub restore: bool,
    /// Relational backend DSN, e.g. `postgres://...` or `sqlite://metrics.db?mode=rwc`.
    #[serde(default)]
    pub database_dsn: String,
    /// HMAC key for batch signatures; empty disables verification.
    #[serde(default)]
    pub key: String,
    /// Path to the PKCS#8 PEM private key; empty disables decryption.
    #[serde(default)]
    pub crypto_key: String,
    /// CIDR allowed to push batches; empty admits everyone.
    #[serde(default)]
    pub trusted_subnet: String,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_http_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_grpc_address() -> String {
    "127.0.0.1:3200".to_string()
}

fn default_store_interval() -> u64 {
    300
}

fn default_store_file() -> String {
    "/tmp/metrics-db.json".to_string()
}

fn default_restore() -> bool {
    true
}

fn default_shutdown_grace() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_address: default_http_address(),
            grpc_address: default_grpc_address(),
            store_interval_secs: default_store_interval(),
            store_file: default_store_file(),
            restore: default_restore(),
            database_dsn: String::new(),
            key: String::new(),
            crypto_key: String::new(),
            trusted_subnet: String::new(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

/// Storage backend selected by the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Memory,
    File { path: PathBuf, sync: bool },
    Database { dsn: String },
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::File { .. } => "file",
            Backend::Database { .. } => "database",
        }
    }
}

fn parse_var<T>(name: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid {name}={raw}: {e}"))
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads `path` if given (defaults otherwise), applies environment
    /// overrides and validates the result.
    pub fn resolve(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ADDRESS") {
            self.http_address = v;
        }
        if let Some(v) = lookup("GRPC_ADDRESS") {
            self.grpc_address = v;
        }
        if let Some(v) = lookup("STORE_INTERVAL") {
            self.store_interval_secs = parse_var("STORE_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("FILE_STORAGE_PATH") {
            self.store_file = v;
        }
        if let Some(v) = lookup("RESTORE") {
            self.restore = parse_var("RESTORE", &v.to_lowercase())?;
        }
        if let Some(v) = lookup("DATABASE_DSN") {
            self.database_dsn = v;
        }
        if let Some(v) = lookup("KEY") {
            self.key = v;
        }
        if let Some(v) = lookup("CRYPTO_KEY") {
            self.crypto_key = v;
        }
        if let Some(v) = lookup("TRUSTED_SUBNET") {
            self.trusted_subnet = v;
        }
        Ok(())
    }

    pub fn validate(&mut self) -> anyhow::Result<()> {
        if self.http_address.trim().is_empty() {
            bail!("http address is empty");
        }
        self.grpc_address = self.grpc_address.trim().to_string();
        self.trusted_subnet = self.trusted_subnet.trim().to_string();
        Ok(())
    }

    /// DSN first, then the snapshot file, then plain memory.
    pub fn backend(&self) -> Backend {
        if !self.database_dsn.is_empty() {
            Backend::Database {
                dsn: self.database_dsn.clone(),
            }
        } else if !self.store_file.is_empty() {
            Backend::File {
                path: PathBuf::from(&self.store_file),
                sync: self.store_interval_secs == 0,
            }
        } else {
            Backend::Memory
        }
    }

    pub fn grpc_enabled(&self) -> bool {
        !self.grpc_address.is_empty()
    }

    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_from_empty_file() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.http_address, "127.0.0.1:8080");
        assert_eq!(config.grpc_address, "127.0.0.1:3200");
        assert_eq!(config.store_interval(), Duration::from_secs(300));
        assert_eq!(config.store_file, "/tmp/metrics-db.json");
        assert!(config.restore);
        assert!(config.grpc_enabled());
        assert_eq!(
            config.backend(),
            Backend::File {
                path: PathBuf::from("/tmp/metrics-db.json"),
                sync: false
            }
        );
    }

    #[test]
    fn backend_selection_order() {
        let mut config = ServerConfig {
            database_dsn: "sqlite::memory:".into(),
            ..ServerConfig::default()
        };
        assert!(matches!(config.backend(), Backend::Database { .. }));

        config.database_dsn.clear();
        config.store_interval_secs = 0;
        assert!(matches!(config.backend(), Backend::File { sync: true, .. }));

        config.store_file.clear();
        assert_eq!(config.backend(), Backend::Memory);
    }

    #[test]
    fn env_overrides_file() {
        let mut config: ServerConfig =
            toml::from_str("http_address = \"0.0.0.0:9000\"\nrestore = true").unwrap();
        config
            .apply_env(env(&[
                ("ADDRESS", "127.0.0.1:8081"),
                ("GRPC_ADDRESS", ""),
                ("STORE_INTERVAL", "0"),
                ("RESTORE", "False"),
                ("KEY", "secret"),
                ("TRUSTED_SUBNET", "10.0.0.0/8"),
            ]))
            .unwrap();
        config.validate().unwrap();
        assert_eq!(config.http_address, "127.0.0.1:8081");
        assert!(!config.grpc_enabled());
        assert_eq!(config.store_interval_secs, 0);
        assert!(!config.restore);
        assert_eq!(config.key, "secret");
        assert_eq!(config.trusted_subnet, "10.0.0.0/8");
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = ServerConfig::default();
        assert!(config.apply_env(env(&[("STORE_INTERVAL", "-1")])).is_err());
        assert!(config.apply_env(env(&[("RESTORE", "maybe")])).is_err());

        let mut config = ServerConfig {
            http_address: " ".into(),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "store_file = \"\"\nshutdown_grace_secs = 3\n").unwrap();
        let config = ServerConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.backend(), Backend::Memory);
        assert_eq!(config.shutdown_grace(), Duration::from_secs(3));
        assert!(ServerConfig::load("/nonexistent/server.toml").is_err());
    }
}

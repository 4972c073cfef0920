use anyhow::{bail, Context};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Http,
    Grpc,
}

impl FromStr for TransportKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "http" => Ok(TransportKind::Http),
            "grpc" => Ok(TransportKind::Grpc),
            _ => bail!("unknown transport: {s}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// `host:port` of the server, or a full URL.
    #[serde(default = "default_server_address")]
    pub server_address: String,
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// HMAC key for batch signatures; empty disables signing.
    #[serde(default)]
    pub key: String,
    /// Number of concurrent senders per report cycle.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    /// Path to the server's SPKI PEM public key; empty disables encryption.
    #[serde(default)]
    pub crypto_key: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_server_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_rate_limit() -> usize {
    1
}

fn default_request_timeout() -> u64 {
    5
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            transport: TransportKind::default(),
            poll_interval_secs: default_poll_interval(),
            report_interval_secs: default_report_interval(),
            key: String::new(),
            rate_limit: default_rate_limit(),
            crypto_key: String::new(),
            request_timeout_secs: default_request_timeout(),
            queue_capacity: default_queue_capacity(),
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

impl AgentConfig {
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

    /// Overrides fields from `ADDRESS`, `TRANSPORT`, `POLL_INTERVAL`,
    /// `REPORT_INTERVAL`, `KEY`, `RATE_LIMIT` and `CRYPTO_KEY`.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ADDRESS") {
            self.server_address = v;
        }
        if let Some(v) = lookup("TRANSPORT") {
            self.transport = parse_var("TRANSPORT", &v)?;
        }
        if let Some(v) = lookup("POLL_INTERVAL") {
            self.poll_interval_secs = parse_var("POLL_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("REPORT_INTERVAL") {
            self.report_interval_secs = parse_var("REPORT_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("KEY") {
            self.key = v;
        }
        if let Some(v) = lookup("RATE_LIMIT") {
            // Negative limits clamp to one sender, like zero.
            let limit: i64 = parse_var("RATE_LIMIT", &v)?;
            self.rate_limit = usize::try_from(limit).unwrap_or(0);
        }
        if let Some(v) = lookup("CRYPTO_KEY") {
            self.crypto_key = v;
        }
        Ok(())
    }

    pub fn validate(&mut self) -> anyhow::Result<()> {
        self.rate_limit = self.rate_limit.max(1);
        self.queue_capacity = self.queue_capacity.max(1);
        if self.poll_interval_secs == 0 {
            bail!("poll interval must be at least one second");
        }
        if self.report_interval_secs == 0 {
            bail!("report interval must be at least one second");
        }
        if self.server_address.trim().is_empty() {
            bail!("server address is empty");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

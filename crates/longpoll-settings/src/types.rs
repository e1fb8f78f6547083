//! Settings type definitions.
//!
//! All types use camelCase JSON and `#[serde(default)]`, so a settings file only needs
//! the fields it wants to change.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 13921, "path": "/longpoll" },
///   "clients": [ { "name": "bot-a", "token": "tok-A" } ]
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LongpollSettings {
    /// HTTP listener settings.
    pub server: ServerSettings,
    /// Poll deadline and liveness sweep timing.
    pub delivery: DeliverySettings,
    /// Log output configuration.
    pub logging: LoggingSettings,
    /// The fixed set of authorized clients.
    pub clients: Vec<ClientEntry>,
}

impl LongpollSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let path = &self.server.path;
        if !path.starts_with('/') {
            return Err(SettingsError::invalid(
                "server.path",
                format!("must start with '/', got {path:?}"),
            ));
        }
        if path == "/health" {
            return Err(SettingsError::invalid(
                "server.path",
                "/health is reserved for the status endpoint",
            ));
        }
        if self.delivery.poll_timeout_ms == 0 {
            return Err(SettingsError::invalid("delivery.pollTimeoutMs", "must be > 0"));
        }
        if self.delivery.sweep_interval_ms == 0 {
            return Err(SettingsError::invalid("delivery.sweepIntervalMs", "must be > 0"));
        }
        if self.server.request_timeout_ms <= self.delivery.poll_timeout_ms {
            return Err(SettingsError::invalid(
                "server.requestTimeoutMs",
                format!(
                    "must exceed delivery.pollTimeoutMs ({})",
                    self.delivery.poll_timeout_ms
                ),
            ));
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks a free port.
    pub port: u16,
    /// Route serving both poll (GET) and post (POST).
    pub path: String,
    /// Upper bound on any single request, held polls included.
    pub request_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 13921,
            path: "/longpoll".to_string(),
            request_timeout_ms: 60_000,
        }
    }
}

impl ServerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Poll deadline and liveness sweep timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliverySettings {
    /// How long an empty-queue poll is held before answering `[]`.
    pub poll_timeout_ms: u64,
    /// Period of the liveness sweep.
    pub sweep_interval_ms: u64,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 30_000,
            sweep_interval_ms: 3_000,
        }
    }
}

impl DeliverySettings {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Log output configuration. `RUST_LOG` still wins when set.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-module level overrides, e.g. `{"longpoll_engine": "debug"}`.
    pub modules: std::collections::BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
            modules: std::collections::BTreeMap::new(),
        }
    }
}

/// One authorized client: its stable name and the token it authenticates with.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientEntry {
    #[serde(alias = "nick")]
    pub name: String,
    pub token: String,
}

impl std::fmt::Debug for ClientEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEntry")
            .field("name", &self.name)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

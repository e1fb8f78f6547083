use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "longpoll_engine" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines on stdout; compact human-readable output otherwise.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: true,
        }
    }
}

impl TelemetryConfig {
    /// Build from loosely-typed level names. Unknown names fall back to the default level
    /// (for the base level) or are dropped (for module overrides).
    pub fn from_names<'a>(
        level: &str,
        modules: impl IntoIterator<Item = (&'a str, &'a str)>,
        json: bool,
    ) -> Self {
        let log_level = Level::from_str(level).unwrap_or(Level::INFO);
        let module_levels = modules
            .into_iter()
            .filter_map(|(module, lvl)| {
                Level::from_str(lvl)
                    .ok()
                    .map(|l| (module.to_string(), l))
            })
            .collect();
        Self {
            log_level,
            module_levels,
            json,
        }
    }

    /// Filter directive string, e.g. `info,longpoll_engine=debug`.
    pub fn filter_directives(&self) -> String {
        let mut filter_str = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter_str
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Initialize the global tracing subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
    });
    let text_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_info_json() {
        let config = TelemetryConfig::default();
        assert_eq!(config.log_level, Level::INFO);
        assert!(config.json);
        assert_eq!(config.filter_directives(), "info");
    }

    #[test]
    fn directives_include_module_overrides() {
        let config = TelemetryConfig::from_names(
            "warn",
            [("longpoll_engine", "debug"), ("tower_http", "trace")],
            false,
        );
        assert_eq!(
            config.filter_directives(),
            "warn,longpoll_engine=debug,tower_http=trace"
        );
    }

    #[test]
    fn unknown_level_names_fall_back() {
        let config = TelemetryConfig::from_names("loud", [("x", "nope")], true);
        assert_eq!(config.log_level, Level::INFO);
        assert!(config.module_levels.is_empty());
    }
}

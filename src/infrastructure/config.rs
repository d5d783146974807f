use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::classifier::ClassifierSettings;
use crate::application::decision_model::ModelKind;
use crate::domain::features::FeatureLayout;
use crate::domain::label::ClassCount;
use crate::infrastructure::connection::ConnectionSettings;
use crate::infrastructure::listener::ListenerSettings;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MonitorConfig {
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ListenerConfig {
    pub bind_address: SocketAddr,
    pub max_connections: usize,
    pub shutdown_grace_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 32,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl ListenerConfig {
    pub fn settings(&self) -> ListenerSettings {
        ListenerSettings {
            max_connections: self.max_connections,
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConnectionConfig {
    pub read_chunk_bytes: usize,
    pub idle_timeout_ms: u64,
    pub max_frame_bytes: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_chunk_bytes: 1024,
            idle_timeout_ms: 10_000,
            max_frame_bytes: 4096,
        }
    }
}

impl ConnectionConfig {
    pub fn settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            read_chunk_bytes: self.read_chunk_bytes,
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            max_frame_bytes: self.max_frame_bytes,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model_kind: ModelKind,
    pub class_count: ClassCount,
    pub model_dir: PathBuf,
    pub feature_layout: FeatureLayout,
    pub cache_capacity: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_kind: ModelKind::GradientBoosted,
            class_count: ClassCount::Ternary,
            model_dir: PathBuf::from("models"),
            feature_layout: FeatureLayout::Standard,
            cache_capacity: 100,
        }
    }
}

impl ClassifierConfig {
    pub fn settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            kind: self.model_kind,
            classes: self.class_count,
            layout: self.feature_layout,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
    pub broadcast_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            broadcast_capacity: 256,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_address: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8081)),
        }
    }
}

/// `config/monitor.toml` if present, overridden by `VITALS__<SECTION>__<KEY>` variables.
pub fn load_monitor_config() -> anyhow::Result<MonitorConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/monitor").required(false))
        .add_source(config::Environment::with_prefix("VITALS").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> MonitorConfig {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = from_toml("");
        assert_eq!(config.listener.bind_address.port(), 8080);
        assert_eq!(config.connection.read_chunk_bytes, 1024);
        assert_eq!(config.classifier.model_kind, ModelKind::GradientBoosted);
        assert_eq!(config.classifier.class_count, ClassCount::Ternary);
        assert_eq!(config.classifier.cache_capacity, 100);
    }

    #[test]
    fn test_overrides() {
        let config = from_toml(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"
            max_connections = 4

            [connection]
            idle_timeout_ms = 2500

            [classifier]
            model_kind = "rf"
            class_count = 2
            feature_layout = "with_age"
            "#,
        );

        assert_eq!(config.listener.bind_address.port(), 9000);
        assert_eq!(config.listener.settings().max_connections, 4);
        assert_eq!(config.connection.settings().idle_timeout, Duration::from_millis(2500));
        assert_eq!(config.connection.max_frame_bytes, 4096);
        assert_eq!(
            config.classifier.settings(),
            ClassifierSettings {
                kind: ModelKind::RandomForest,
                classes: ClassCount::Binary,
                layout: FeatureLayout::WithAge,
            }
        );
    }
}

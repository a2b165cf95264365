use crate::codec::DecodeMode;
use crate::outbound_queue::QueuePolicy;

pub const DEFAULT_PEER_PORT: u16 = 5309;
pub const DEFAULT_PEER_ADDRESS: &str = "192.168.0.254";
pub const DEFAULT_CALLSIGN: &str = "NONE";

#[derive(serde::Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ApplicationConfig {
    pub identity: IdentityConfig,
    pub peer: PeerConfig,
    pub queue: QueuePolicy,
    pub receiver: ReceiverConfig,
    pub peers: PeerTableConfig,
}

impl ApplicationConfig {
    pub fn construct_from_path(
        path: &std::path::PathBuf,
    ) -> Result<ApplicationConfig, errors::ApplicationConfigError> {
        let string =
            std::fs::read_to_string(path).map_err(|error| errors::ApplicationConfigError::Io {
                source: error,
                path: path.clone(),
            })?;

        toml::from_str(&string).map_err(|error| errors::ApplicationConfigError::Parse {
            source: error,
            path: path.clone(),
        })
    }
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct IdentityConfig {
    pub callsign: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig {
            callsign: DEFAULT_CALLSIGN.to_string(),
        }
    }
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PeerConfig {
    pub address: String,
    pub port: u16,
}

impl Default for PeerConfig {
    fn default() -> Self {
        PeerConfig {
            address: DEFAULT_PEER_ADDRESS.to_string(),
            port: DEFAULT_PEER_PORT,
        }
    }
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReceiverConfig {
    pub poll_interval_ms: u64,
    pub accept_untyped: bool,
}

impl ReceiverConfig {
    #[must_use]
    pub fn decode_mode(&self) -> DecodeMode {
        if self.accept_untyped {
            DecodeMode::AllowUntyped
        } else {
            DecodeMode::Strict
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            poll_interval_ms: 200,
            accept_untyped: false,
        }
    }
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PeerTableConfig {
    pub retention_seconds: u32,
}

impl Default for PeerTableConfig {
    fn default() -> Self {
        PeerTableConfig {
            retention_seconds: 600,
        }
    }
}

/// Supplies the peer address. Queried once per outbound datagram.
pub trait PeerAddressProvider: Send + Sync {
    fn peer_address(&self) -> String;
}

impl<F> PeerAddressProvider for F
where
    F: Fn() -> String + Send + Sync,
{
    fn peer_address(&self) -> String {
        self()
    }
}

/// Runtime key/value settings the service reads. Values may change between calls.
pub trait ConfigurationSource: PeerAddressProvider {
    fn local_callsign(&self) -> String;
}

/// Configuration shared between the host and the running service.
#[derive(Debug, Clone, Default)]
pub struct SharedConfiguration {
    inner: std::sync::Arc<std::sync::RwLock<ApplicationConfig>>,
}

impl SharedConfiguration {
    #[must_use]
    pub fn new(config: ApplicationConfig) -> Self {
        SharedConfiguration {
            inner: std::sync::Arc::new(std::sync::RwLock::new(config)),
        }
    }

    /// Replaces the current settings with the file's contents. On error the current
    /// settings are kept.
    pub fn reload_from_path(
        &self,
        path: &std::path::PathBuf,
    ) -> Result<(), errors::ApplicationConfigError> {
        let config = ApplicationConfig::construct_from_path(path)?;
        *self.write() = config;
        log::info!("Configuration reloaded from '{}'", path.display());
        Ok(())
    }

    pub fn set_peer_address(&self, address: impl Into<String>) {
        self.write().peer.address = address.into();
    }

    pub fn set_callsign(&self, callsign: impl Into<String>) {
        self.write().identity.callsign = callsign.into();
    }

    #[must_use]
    pub fn snapshot(&self) -> ApplicationConfig {
        self.read().clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ApplicationConfig> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ApplicationConfig> {
        self.inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl PeerAddressProvider for SharedConfiguration {
    fn peer_address(&self) -> String {
        self.read().peer.address.clone()
    }
}

impl ConfigurationSource for SharedConfiguration {
    fn local_callsign(&self) -> String {
        self.read().identity.callsign.clone()
    }
}

pub mod errors {
    #[derive(Debug, thiserror::Error)]
    pub enum ApplicationConfigError {
        #[error("Failed to parse config file '{}': {source}", .path.display())]
        Parse {
            source: toml::de::Error,
            path: std::path::PathBuf,
        },
        #[error("Failed to read config file '{}': {source}", .path.display())]
        Io {
            source: std::io::Error,
            path: std::path::PathBuf,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{
        errors::ApplicationConfigError, ApplicationConfig, ConfigurationSource,
        PeerAddressProvider, SharedConfiguration,
    };
    use crate::codec::DecodeMode;
    use crate::outbound_queue::QueuePolicy;

    fn write_temp_config(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "possync-{name}-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn when_parsing_full_config_then_all_sections_are_read() {
        let config: ApplicationConfig = toml::from_str(
            r#"
            [identity]
            callsign = "K6ABC"

            [peer]
            address = "10.0.0.7"
            port = 6000

            [queue]
            policy = "drop_oldest"
            capacity = 16

            [receiver]
            poll_interval_ms = 50
            accept_untyped = true

            [peers]
            retention_seconds = 120
            "#,
        )
        .expect("Test should pass");

        assert_eq!(config.identity.callsign, "K6ABC");
        assert_eq!(config.peer.address, "10.0.0.7");
        assert_eq!(config.peer.port, 6000);
        assert_eq!(config.queue, QueuePolicy::DropOldest { capacity: 16 });
        assert_eq!(config.receiver.poll_interval_ms, 50);
        assert_eq!(config.receiver.decode_mode(), DecodeMode::AllowUntyped);
        assert_eq!(config.peers.retention_seconds, 120);
    }

    #[test]
    fn when_config_is_empty_then_defaults_apply() {
        let config: ApplicationConfig = toml::from_str("").expect("Test should pass");

        assert_eq!(config.identity.callsign, "NONE");
        assert_eq!(config.peer.address, "192.168.0.254");
        assert_eq!(config.peer.port, 5309);
        assert_eq!(config.queue, QueuePolicy::Unbounded);
        assert_eq!(config.receiver.decode_mode(), DecodeMode::Strict);
        assert_eq!(config.peers.retention_seconds, 600);
    }

    #[test]
    fn when_sample_config_is_loaded_then_untyped_records_stay_opt_in() {
        let sample = include_str!("../possync.toml");
        let config: ApplicationConfig = toml::from_str(sample).expect("Test should pass");
        assert_eq!(config.receiver.decode_mode(), DecodeMode::Strict);

        let base_station_record = br#"{"callsign":"BASE","lat":1,"long":2,"isaccurate":true,"age":4}"#;
        assert!(crate::codec::decode_with_mode(base_station_record, config.receiver.decode_mode())
            .is_err());

        let enabled: ApplicationConfig = toml::from_str(
            &sample.replace("accept_untyped = false", "accept_untyped = true"),
        )
        .expect("Test should pass");
        assert!(crate::codec::decode_with_mode(base_station_record, enabled.receiver.decode_mode())
            .is_ok());
    }

    #[test]
    fn when_file_is_missing_then_io_error_names_path() {
        let path = std::path::PathBuf::from("/nonexistent/possync.toml");
        let error = ApplicationConfig::construct_from_path(&path).unwrap_err();

        assert!(matches!(error, ApplicationConfigError::Io { .. }));
        assert!(error.to_string().contains("/nonexistent/possync.toml"));
    }

    #[test]
    fn when_file_is_invalid_then_parse_error_is_returned() {
        let path = write_temp_config("invalid", "[peer]\nport = \"not a number\"\n");
        let error = ApplicationConfig::construct_from_path(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);

        assert!(matches!(error, ApplicationConfigError::Parse { .. }));
    }

    #[test]
    fn when_shared_configuration_changes_then_next_read_sees_it() {
        let shared = SharedConfiguration::new(ApplicationConfig::default());
        let view = shared.clone();

        shared.set_peer_address("10.1.1.1");
        shared.set_callsign("W1AW");

        assert_eq!(view.peer_address(), "10.1.1.1");
        assert_eq!(view.local_callsign(), "W1AW");
    }

    #[test]
    fn when_reloading_from_path_then_settings_are_replaced() {
        let path = write_temp_config("reload", "[peer]\naddress = \"10.9.9.9\"\n");
        let shared = SharedConfiguration::new(ApplicationConfig::default());

        shared.reload_from_path(&path).expect("Test should pass");
        let _ = std::fs::remove_file(&path);

        assert_eq!(shared.peer_address(), "10.9.9.9");
        assert_eq!(shared.snapshot().identity.callsign, "NONE");
    }

    #[test]
    fn when_closure_used_as_provider_then_it_is_called_each_time() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let provider = || {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            String::from("127.0.0.1")
        };
        provider.peer_address();
        provider.peer_address();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}

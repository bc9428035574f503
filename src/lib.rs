//! Mailbox Relay
//!
//! Session relay for request/response runtimes:
//! - One invocation holds a long-lived event stream and runs the engine
//! - Any invocation submits messages into a per-session mailbox
//! - A poll loop bridges the two through an ordered external store
//! - MCP (JSON-RPC 2.0) engine behind the relay

pub mod api;
pub mod events;
pub mod mailbox;
pub mod mcp;
pub mod relay;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mailbox::{InMemoryMailbox, MailboxStore, RedisMailbox};
use relay::RelaySettings;

/// Time given to live sessions to finish cleanup on shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub mailbox: MailboxYamlConfig,
    pub relay: RelayYamlConfig,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub port: u16,
    /// Prefix in front of the submit path in advertised URLs
    pub public_base_path: String,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            public_base_path: String::new(),
        }
    }
}

/// Which store backs the mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailboxBackend {
    /// Process-local; only valid when one process serves every request
    Memory,
    Redis,
}

impl std::str::FromStr for MailboxBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(MailboxBackend::Memory),
            "redis" => Ok(MailboxBackend::Redis),
            other => anyhow::bail!("unknown mailbox backend: {other}"),
        }
    }
}

/// Mailbox store section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailboxYamlConfig {
    pub backend: MailboxBackend,
    pub redis_url: String,
    pub key_prefix: String,
    pub pool_size: usize,
}

impl Default for MailboxYamlConfig {
    fn default() -> Self {
        Self {
            backend: MailboxBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".into(),
            key_prefix: "mailbox".into(),
            pool_size: 16,
        }
    }
}

/// Relay timing section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayYamlConfig {
    pub poll_interval_ms: u64,
    pub inactivity_timeout_secs: u64,
    pub keep_alive_secs: u64,
    pub padding_bytes: usize,
    pub channel_capacity: usize,
    pub messages_path: String,
}

impl Default for RelayYamlConfig {
    fn default() -> Self {
        let relay = RelaySettings::default();
        Self {
            poll_interval_ms: relay.poll_interval.as_millis() as u64,
            inactivity_timeout_secs: relay.inactivity_timeout.as_secs(),
            keep_alive_secs: relay.keep_alive.as_secs(),
            padding_bytes: relay.padding_bytes,
            channel_capacity: relay.channel_capacity,
            messages_path: relay.messages_path,
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub mailbox_backend: MailboxBackend,
    pub redis_url: String,
    pub key_prefix: String,
    pub pool_size: usize,
    pub relay: RelaySettings,
}

impl Config {
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let mailbox_backend = match std::env::var("MAILBOX_BACKEND") {
            Ok(raw) => raw.parse()?,
            Err(_) => yaml.mailbox.backend,
        };

        let relay = RelaySettings {
            poll_interval: Duration::from_millis(env_or(
                "RELAY_POLL_INTERVAL_MS",
                yaml.relay.poll_interval_ms,
            )),
            inactivity_timeout: Duration::from_secs(env_or(
                "RELAY_INACTIVITY_TIMEOUT_SECS",
                yaml.relay.inactivity_timeout_secs,
            )),
            keep_alive: Duration::from_secs(env_or(
                "RELAY_KEEP_ALIVE_SECS",
                yaml.relay.keep_alive_secs,
            )),
            padding_bytes: yaml.relay.padding_bytes,
            channel_capacity: yaml.relay.channel_capacity.max(1),
            messages_path: yaml.relay.messages_path,
            public_base_path: std::env::var("PUBLIC_BASE_PATH")
                .unwrap_or(yaml.server.public_base_path),
        };

        Ok(Self {
            server_port: env_or("SERVER_PORT", yaml.server.port),
            mailbox_backend,
            redis_url: std::env::var("REDIS_URL").unwrap_or(yaml.mailbox.redis_url),
            key_prefix: std::env::var("MAILBOX_KEY_PREFIX").unwrap_or(yaml.mailbox.key_prefix),
            pool_size: yaml.mailbox.pool_size,
            relay,
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

fn env_or<T: std::str::FromStr>(var: &str, fallback: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(fallback)
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MailboxStore>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Connect the configured mailbox backend
    pub async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn MailboxStore> = match config.mailbox_backend {
            MailboxBackend::Memory => {
                tracing::warn!(
                    "Using in-memory mailbox; sessions are only reachable through this process"
                );
                Arc::new(InMemoryMailbox::new())
            }
            MailboxBackend::Redis => {
                let redis = RedisMailbox::connect(
                    &config.redis_url,
                    &config.key_prefix,
                    config.pool_size,
                )
                .context("Failed to create Redis pool")?;
                redis
                    .ping()
                    .await
                    .with_context(|| format!("Redis unreachable at {}", config.redis_url))?;
                tracing::info!(prefix = %config.key_prefix, "Connected to Redis mailbox");
                Arc::new(redis)
            }
        };

        Ok(Self {
            store,
            config: Arc::new(config),
        })
    }

    pub fn server_state(&self) -> api::RelayState {
        Arc::new(api::ServerState::new(
            Arc::clone(&self.store),
            self.config.relay.clone(),
        ))
    }
}

/// Serve the relay until SIGINT/SIGTERM, then drain live sessions.
pub async fn start_server(config: Config) -> Result<()> {
    let port = config.server_port;
    let state = AppState::new(config).await?.server_state();
    let registry = state.registry.clone();
    let app = api::create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Relay listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Streams stay open until their sessions drain
            registry.drain_all(SHUTDOWN_GRACE).await;
        })
        .await?;

    tracing::info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod config_tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_yaml_config_loading() {
        let yaml = r#"
server:
  port: 9090
  public_base_path: /prod

mailbox:
  backend: redis
  redis_url: redis://cache:6379
  key_prefix: relay-test

relay:
  poll_interval_ms: 250
  inactivity_timeout_secs: 30
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.public_base_path, "/prod");
        assert_eq!(config.mailbox.backend, MailboxBackend::Redis);
        assert_eq!(config.mailbox.redis_url, "redis://cache:6379");
        assert_eq!(config.mailbox.key_prefix, "relay-test");
        assert_eq!(config.mailbox.pool_size, 16);
        assert_eq!(config.relay.poll_interval_ms, 250);
        assert_eq!(config.relay.inactivity_timeout_secs, 30);
        assert_eq!(config.relay.keep_alive_secs, 5);
        assert_eq!(config.relay.messages_path, "/messages");
    }

    #[test]
    fn test_yaml_defaults() {
        let config = YamlConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.public_base_path, "");
        assert_eq!(config.mailbox.backend, MailboxBackend::Memory);
        assert_eq!(config.relay.poll_interval_ms, 500);
        assert_eq!(config.relay.inactivity_timeout_secs, 10);
        assert_eq!(config.relay.padding_bytes, 65536);
        assert_eq!(config.relay.channel_capacity, 32);
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("memory".parse::<MailboxBackend>().unwrap(), MailboxBackend::Memory);
        assert_eq!(" Redis ".parse::<MailboxBackend>().unwrap(), MailboxBackend::Redis);
        assert!("dynamodb".parse::<MailboxBackend>().is_err());
    }

    /// Combined test for YAML file loading and env var overrides.
    /// Runs as a single test to avoid parallel env var race conditions.
    #[test]
    fn test_yaml_and_env_lifecycle() {
        fn clear_env() {
            for var in &[
                "SERVER_PORT",
                "MAILBOX_BACKEND",
                "REDIS_URL",
                "MAILBOX_KEY_PREFIX",
                "RELAY_POLL_INTERVAL_MS",
                "RELAY_INACTIVITY_TIMEOUT_SECS",
                "RELAY_KEEP_ALIVE_SECS",
                "PUBLIC_BASE_PATH",
            ] {
                std::env::remove_var(var);
            }
        }

        // --- Phase 1: YAML values loaded correctly ---
        let yaml = r#"
server:
  port: 9999
mailbox:
  backend: redis
  redis_url: redis://yaml-host:6379
relay:
  poll_interval_ms: 100
"#;
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&file_path).unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        clear_env();

        let config = Config::from_yaml_and_env(Some(&file_path)).unwrap();
        assert_eq!(config.server_port, 9999);
        assert_eq!(config.mailbox_backend, MailboxBackend::Redis);
        assert_eq!(config.redis_url, "redis://yaml-host:6379");
        assert_eq!(config.relay.poll_interval, Duration::from_millis(100));
        assert_eq!(config.relay.inactivity_timeout, Duration::from_secs(10));

        // --- Phase 2: Env vars override YAML ---
        std::env::set_var("SERVER_PORT", "7777");
        std::env::set_var("MAILBOX_BACKEND", "memory");
        std::env::set_var("RELAY_INACTIVITY_TIMEOUT_SECS", "3");
        std::env::set_var("PUBLIC_BASE_PATH", "/stage");

        let config = Config::from_yaml_and_env(Some(&file_path)).unwrap();
        assert_eq!(config.server_port, 7777);
        assert_eq!(config.mailbox_backend, MailboxBackend::Memory);
        assert_eq!(config.relay.inactivity_timeout, Duration::from_secs(3));
        assert_eq!(config.relay.public_base_path, "/stage");
        // YAML value still used where no env override
        assert_eq!(config.redis_url, "redis://yaml-host:6379");

        // --- Phase 3: bad backend name is an error ---
        std::env::set_var("MAILBOX_BACKEND", "carrier-pigeon");
        assert!(Config::from_yaml_and_env(Some(&file_path)).is_err());

        clear_env();

        // --- Phase 4: No YAML file → defaults ---
        let nonexistent = Path::new("/tmp/nonexistent-relay-config-12345.yaml");
        let config = Config::from_yaml_and_env(Some(nonexistent)).unwrap();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.mailbox_backend, MailboxBackend::Memory);
        assert_eq!(config.key_prefix, "mailbox");
        assert_eq!(config.relay.poll_interval, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_memory_backend_state() {
        let config = Config {
            server_port: 0,
            mailbox_backend: MailboxBackend::Memory,
            redis_url: String::new(),
            key_prefix: "mailbox".into(),
            pool_size: 1,
            relay: RelaySettings::default(),
        };
        let state = AppState::new(config).await.unwrap();
        let server = state.server_state();
        assert_eq!(server.registry.active_count(), 0);
        assert_eq!(server.relay.messages_path, "/messages");
    }
}

//! SimpleSSL Configuration
//!
//! Shared configuration crate for the server and client binaries.
//!
//! Handles loading configuration from:
//! 1. SIMPLESSL_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.simplessl/config.toml (user home)
//!
//! Environment variables take precedence over TOML config. Command-line flags
//! are applied by the binaries on top of both.
//!
//! The field parameters are protocol constants and are not configurable here.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use simplessl_channel::handshake::BANNER;
use simplessl_channel::record::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RECORD_LEN, TAG_LEN};
use simplessl_channel::{BannerPolicy, ClientOptions, SessionOptions};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".simplessl";
const CONFIG_PATH_VAR: &str = "SIMPLESSL_CONFIG";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_LISTEN: &str = "127.0.0.1:4433";
const DEFAULT_SERVER: &str = "127.0.0.1:4433";

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleSslConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub record: RecordConfig,
    #[serde(default)]
    pub handshake: HandshakeConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

/// Where the responder gets its byte streams from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// stdin in, stdout out
    #[default]
    Stdio,
    /// One accepted TCP connection
    Tcp,
}

impl FromStr for TransportMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stdio" => Ok(TransportMode::Stdio),
            "tcp" => Ok(TransportMode::Tcp),
            other => bail!("unknown transport {other:?} (expected \"stdio\" or \"tcp\")"),
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Stdio => f.write_str("stdio"),
            TransportMode::Tcp => f.write_str("tcp"),
        }
    }
}

/// Responder process configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub transport: TransportMode,
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Read timeout on the accepted connection; unset or 0 means none.
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: TransportMode::Stdio,
            listen: DEFAULT_LISTEN.into(),
            read_timeout_secs: None,
        }
    }
}

fn default_listen() -> String {
    DEFAULT_LISTEN.into()
}

/// Record layer limits, shared by both peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_max_record_len")]
    pub max_record_len: u32,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_record_len: DEFAULT_MAX_RECORD_LEN,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_max_record_len() -> u32 {
    DEFAULT_MAX_RECORD_LEN
}

/// Handshake configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// When set, the responder rejects any other greeting banner.
    #[serde(default)]
    pub expected_banner: Option<String>,
}

/// Initiator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_banner")]
    pub banner: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.into(),
            banner: BANNER.into(),
        }
    }
}

fn default_server() -> String {
    DEFAULT_SERVER.into()
}
fn default_banner() -> String {
    BANNER.into()
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set field from variable if present
fn env_string(vars: &impl Fn(&str) -> Option<String>, key: &str, field: &mut String) {
    if let Some(v) = vars(key) {
        *field = v;
    }
}

/// Set Option<String> from variable if present; empty clears it
fn env_option_string(vars: &impl Fn(&str) -> Option<String>, key: &str, field: &mut Option<String>) {
    if let Some(v) = vars(key) {
        *field = if v.is_empty() { None } else { Some(v) };
    }
}

/// Set field from variable if present and parseable
fn env_parse<T: FromStr>(vars: &impl Fn(&str) -> Option<String>, key: &str, field: &mut T) {
    if let Some(v) = vars(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable {key}={v:?}"),
        }
    }
}

/// Set Option<T> from variable if present and parseable
fn env_parse_option<T: FromStr>(
    vars: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &mut Option<T>,
) {
    if let Some(v) = vars(key) {
        match v.parse() {
            Ok(parsed) => *field = Some(parsed),
            Err(_) => log::warn!("Ignoring unparseable {key}={v:?}"),
        }
    }
}

// ============================================================================
// Implementation
// ============================================================================

impl SimpleSslConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::parse_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        log::info!("Loading config from: {}", path.display());
        let mut config = Self::parse_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check SIMPLESSL_CONFIG env var
        if let Ok(path) = env::var(CONFIG_PATH_VAR) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("{CONFIG_PATH_VAR} points at {}, which does not exist", path.display());
        }

        // 2. Check ./config.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.simplessl/config.toml
        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from any variable source
    pub fn apply_overrides(&mut self, vars: impl Fn(&str) -> Option<String>) {
        // Server
        env_parse(&vars, "SIMPLESSL_TRANSPORT", &mut self.server.transport);
        env_string(&vars, "SIMPLESSL_LISTEN", &mut self.server.listen);
        env_parse_option(&vars, "SIMPLESSL_READ_TIMEOUT_SECS", &mut self.server.read_timeout_secs);

        // Record
        env_parse(&vars, "SIMPLESSL_CHUNK_SIZE", &mut self.record.chunk_size);
        env_parse(&vars, "SIMPLESSL_MAX_RECORD_LEN", &mut self.record.max_record_len);

        // Handshake
        env_option_string(&vars, "SIMPLESSL_EXPECTED_BANNER", &mut self.handshake.expected_banner);

        // Client
        env_string(&vars, "SIMPLESSL_SERVER", &mut self.client.server);
        env_string(&vars, "SIMPLESSL_BANNER", &mut self.client.banner);
    }

    /// Reject settings the record layer cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.record.chunk_size == 0 {
            bail!("record.chunk_size must be at least 1");
        }
        if (self.record.max_record_len as usize) < TAG_LEN {
            bail!(
                "record.max_record_len must be at least {TAG_LEN} (got {})",
                self.record.max_record_len
            );
        }
        if self.client.banner.contains('\n') {
            bail!("client.banner must be a single line");
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.server
            .read_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Options for the responder's session loop
    pub fn session_options(&self) -> SessionOptions {
        let banner = match &self.handshake.expected_banner {
            Some(expected) => BannerPolicy::Require(expected.clone()),
            None => BannerPolicy::Permissive,
        };
        SessionOptions {
            banner,
            chunk_size: self.record.chunk_size,
            max_record_len: self.record.max_record_len,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            banner: self.client.banner.clone(),
            chunk_size: self.record.chunk_size,
            max_record_len: self.record.max_record_len,
        }
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.server.read_timeout_secs = Some(30);
        sample.handshake.expected_banner = Some(BANNER.into());
        toml::to_string_pretty(&sample).unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SimpleSslConfig::default();
        assert_eq!(config.server.transport, TransportMode::Stdio);
        assert_eq!(config.server.listen, DEFAULT_LISTEN);
        assert_eq!(config.record.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.record.max_record_len, DEFAULT_MAX_RECORD_LEN);
        assert_eq!(config.client.banner, BANNER);
        assert!(config.handshake.expected_banner.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_generate_sample() {
        let sample = SimpleSslConfig::generate_sample();
        assert!(sample.contains("[server]"));
        assert!(sample.contains("[record]"));
        assert!(sample.contains("[handshake]"));
        assert!(sample.contains("[client]"));
    }

    #[test]
    fn test_parse_sample() {
        let sample = SimpleSslConfig::generate_sample();
        let parsed: SimpleSslConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.server.read_timeout_secs, Some(30));
        assert_eq!(parsed.handshake.expected_banner.as_deref(), Some(BANNER));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: SimpleSslConfig = toml::from_str(
            r#"
            [server]
            transport = "tcp"

            [record]
            chunk_size = 64
            "#,
        )
        .unwrap();
        assert_eq!(parsed.server.transport, TransportMode::Tcp);
        assert_eq!(parsed.server.listen, DEFAULT_LISTEN);
        assert_eq!(parsed.record.chunk_size, 64);
        assert_eq!(parsed.record.max_record_len, DEFAULT_MAX_RECORD_LEN);
        assert_eq!(parsed.client, ClientConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nlisten = \"0.0.0.0:9000\"\nread_timeout_secs = 5\n\n[handshake]\nexpected_banner = \"SimpleSSLv0\""
        )
        .unwrap();

        let config = SimpleSslConfig::load_from(file.path()).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:9000");
        assert_eq!(config.read_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(
            config.session_options().banner,
            BannerPolicy::Require(BANNER.into())
        );
    }

    #[test]
    fn test_load_from_bad_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\ntransport = \"carrier-pigeon\"").unwrap();
        assert!(SimpleSslConfig::load_from(file.path()).is_err());

        let dir = tempfile::tempdir().unwrap();
        assert!(SimpleSslConfig::load_from(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SimpleSslConfig::default();
        config.apply_overrides(vars(&[
            ("SIMPLESSL_TRANSPORT", "TCP"),
            ("SIMPLESSL_LISTEN", "127.0.0.1:7000"),
            ("SIMPLESSL_READ_TIMEOUT_SECS", "12"),
            ("SIMPLESSL_CHUNK_SIZE", "4096"),
            ("SIMPLESSL_MAX_RECORD_LEN", "not-a-number"),
            ("SIMPLESSL_EXPECTED_BANNER", "SimpleSSLv0"),
            ("SIMPLESSL_SERVER", "10.0.0.1:4433"),
        ]));

        assert_eq!(config.server.transport, TransportMode::Tcp);
        assert_eq!(config.server.listen, "127.0.0.1:7000");
        assert_eq!(config.server.read_timeout_secs, Some(12));
        assert_eq!(config.record.chunk_size, 4096);
        // unparseable values leave the previous setting alone
        assert_eq!(config.record.max_record_len, DEFAULT_MAX_RECORD_LEN);
        assert_eq!(config.handshake.expected_banner.as_deref(), Some("SimpleSSLv0"));
        assert_eq!(config.client.server, "10.0.0.1:4433");
        assert_eq!(config.client.banner, BANNER);

        config.apply_overrides(vars(&[("SIMPLESSL_EXPECTED_BANNER", "")]));
        assert!(config.handshake.expected_banner.is_none());
    }

    #[test]
    fn test_validate() {
        let mut config = SimpleSslConfig::default();
        config.record.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = SimpleSslConfig::default();
        config.record.max_record_len = 15;
        assert!(config.validate().is_err());
        config.record.max_record_len = 16;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let mut config = SimpleSslConfig::default();
        config.server.read_timeout_secs = Some(0);
        assert_eq!(config.read_timeout(), None);
    }

    #[test]
    fn test_options_follow_record_settings() {
        let mut config = SimpleSslConfig::default();
        config.record.chunk_size = 77;
        config.record.max_record_len = 1 << 20;
        config.client.banner = "SimpleSSLv0-test".into();

        let session = config.session_options();
        assert_eq!(session.chunk_size, 77);
        assert_eq!(session.max_record_len, 1 << 20);
        assert_eq!(session.banner, BannerPolicy::Permissive);

        let client = config.client_options();
        assert_eq!(client.chunk_size, 77);
        assert_eq!(client.banner, "SimpleSSLv0-test");
    }
}

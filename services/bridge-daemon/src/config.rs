//! Bridge daemon configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.
//! Default config path: `/etc/dividat-bridge/bridge.toml`.
//!
//! Unlike `forwarder`'s config, every field has a documented default: an
//! absent config file is not an error, only a malformed one is.

use serde::Deserialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Config types (fully resolved, defaults applied)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub bind_addr: String,
    pub allowed_origins: Vec<String>,
    pub senso: SensoConfig,
    pub tftp: TftpConfig,
    pub flex: FlexConfig,
}

#[derive(Debug, Clone)]
pub struct SensoConfig {
    pub control_port: u16,
    pub dfu_port: u16,
}

#[derive(Debug, Clone)]
pub struct TftpConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct FlexConfig {
    pub usb_vid: u16,
    pub baud: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            allowed_origins: Vec::new(),
            senso: SensoConfig { control_port: default_control_port(), dfu_port: default_control_port() },
            tftp: TftpConfig { port: default_tftp_port() },
            flex: FlexConfig { usb_vid: default_usb_vid(), baud: default_baud() },
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:8382".to_owned()
}

fn default_control_port() -> u16 {
    55567
}

fn default_tftp_port() -> u16 {
    69
}

fn default_usb_vid() -> u16 {
    0x16C0
}

fn default_baud() -> u32 {
    115_200
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (every field optional)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    bind_addr: Option<String>,
    allowed_origins: Option<Vec<String>>,
    senso: Option<RawSensoConfig>,
    tftp: Option<RawTftpConfig>,
    flex: Option<RawFlexConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSensoConfig {
    control_port: Option<u16>,
    dfu_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTftpConfig {
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFlexConfig {
    usb_vid: Option<u16>,
    baud: Option<u32>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub const DEFAULT_CONFIG_PATH: &str = "/etc/dividat-bridge/bridge.toml";

/// Load config from `path`. A missing file resolves to all-defaults; a file
/// that exists but fails to parse is an error.
pub fn load_config_from_path(path: &Path) -> Result<BridgeConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(toml_str) => load_config_from_str(&toml_str),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(BridgeConfig::default()),
        Err(error) => Err(ConfigError::Io(format!("reading config file '{}': {error}", path.display()))),
    }
}

pub fn load_config() -> Result<BridgeConfig, ConfigError> {
    load_config_from_path(Path::new(DEFAULT_CONFIG_PATH))
}

pub fn load_config_from_str(toml_str: &str) -> Result<BridgeConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let senso = raw.senso.unwrap_or_default();
    let tftp = raw.tftp.unwrap_or_default();
    let flex = raw.flex.unwrap_or_default();

    Ok(BridgeConfig {
        bind_addr: raw.bind_addr.unwrap_or_else(default_bind_addr),
        allowed_origins: raw.allowed_origins.unwrap_or_default(),
        senso: SensoConfig {
            control_port: senso.control_port.unwrap_or_else(default_control_port),
            dfu_port: senso.dfu_port.unwrap_or_else(default_control_port),
        },
        tftp: TftpConfig { port: tftp.port.unwrap_or_else(default_tftp_port) },
        flex: FlexConfig {
            usb_vid: flex.usb_vid.unwrap_or_else(default_usb_vid),
            baud: flex.baud.unwrap_or_else(default_baud),
        },
    })
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {s}"),
            ConfigError::Parse(s) => write!(f, "parse error: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_file_resolves_to_defaults() {
        let config = load_config_from_path(Path::new("/nonexistent/bridge.toml")).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8382");
        assert!(config.allowed_origins.is_empty());
        assert_eq!(config.senso.control_port, 55567);
    }

    #[test]
    fn empty_toml_resolves_to_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.flex.usb_vid, 0x16C0);
        assert_eq!(config.flex.baud, 115_200);
        assert_eq!(config.tftp.port, 69);
    }

    #[test]
    fn partial_overrides_are_merged_with_defaults() {
        let config = load_config_from_str(
            r#"
            bind_addr = "0.0.0.0:9000"
            allowed_origins = ["http://localhost:3000"]

            [senso]
            control_port = 12345
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.allowed_origins, vec!["http://localhost:3000".to_owned()]);
        assert_eq!(config.senso.control_port, 12345);
        assert_eq!(config.senso.dfu_port, 55567);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let result = load_config_from_str("not = [valid");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Viewer configuration.
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! `TRACEVIEW_*` environment variables, then command line flags. The result is
//! resolved once at startup and handed to every consumer by value.

use std::env;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};

use log::warn;
use serde::Deserialize;

pub const DEFAULT_HTTP_PORT: u16 = 8000;
pub const DEFAULT_WEBSOCKET_PORT: u16 = 18000;
/// Both ports must be strictly above this value.
pub const RESERVED_PORT_CEILING: u16 = 5000;

pub const ENV_HOST: &str = "TRACEVIEW_HOST";
pub const ENV_UI_DIR: &str = "TRACEVIEW_UI_DIR";
pub const ENV_LOG: &str = "TRACEVIEW_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MalformedPorts(String),
    PortTooLow(u16),
    SamePort(u16),
    Read { path: PathBuf, message: String },
    Parse(String),
}

impl ConfigError {
    /// Process exit status for a configuration failure.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedPorts(value) => {
                write!(f, "ports must be given as '<http>,<websocket>', got '{value}'")
            }
            Self::PortTooLow(port) => write!(
                f,
                "need to have port values > {RESERVED_PORT_CEILING} (got {port})"
            ),
            Self::SamePort(port) => write!(
                f,
                "can not use the same port for both web server and websocket server: {port}"
            ),
            Self::Read { path, message } => {
                write!(f, "could not read config {}: {message}", path.display())
            }
            Self::Parse(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// The HTTP and WebSocket listening ports. Construction validates both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    http: u16,
    websocket: u16,
}

impl PortConfig {
    pub fn new(http: u16, websocket: u16) -> Result<Self, ConfigError> {
        for port in [http, websocket] {
            if port <= RESERVED_PORT_CEILING {
                return Err(ConfigError::PortTooLow(port));
            }
        }
        if http == websocket {
            return Err(ConfigError::SamePort(http));
        }
        Ok(Self { http, websocket })
    }

    /// Parse `"<http>,<websocket>"`.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let malformed = || ConfigError::MalformedPorts(value.to_string());
        let mut parts = value.split(',').map(str::trim);
        let (Some(http), Some(websocket), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(malformed());
        };
        let http = http.parse::<u16>().map_err(|_| malformed())?;
        let websocket = websocket.parse::<u16>().map_err(|_| malformed())?;
        Self::new(http, websocket)
    }

    pub fn http(&self) -> u16 {
        self.http
    }

    pub fn websocket(&self) -> u16 {
        self.websocket
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            http: DEFAULT_HTTP_PORT,
            websocket: DEFAULT_WEBSOCKET_PORT,
        }
    }
}

/// File-backed settings. Every field is optional in the TOML document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    /// Listening address; discovered from the host when unset.
    pub host: Option<IpAddr>,
    pub http_port: u16,
    pub websocket_port: u16,
    /// Static front-end files (`index.html`, `styles.css`, `logo.svg`).
    pub ui_dir: PathBuf,
    /// Output directory for dump mode.
    pub dump_dir: PathBuf,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            host: None,
            http_port: DEFAULT_HTTP_PORT,
            websocket_port: DEFAULT_WEBSOCKET_PORT,
            ui_dir: default_ui_dir(),
            dump_dir: PathBuf::from("ui"),
        }
    }
}

impl ViewerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }

    /// Apply `TRACEVIEW_HOST` and `TRACEVIEW_UI_DIR` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup(ENV_HOST) {
            match value.trim().parse::<IpAddr>() {
                Ok(host) => self.host = Some(host),
                Err(_) => warn!("{ENV_HOST} invalid ('{value}'); ignoring"),
            }
        }
        if let Some(value) = lookup(ENV_UI_DIR).filter(|value| !value.trim().is_empty()) {
            self.ui_dir = PathBuf::from(value);
        }
        self
    }

    /// Validated port pair, with `--ports` taking precedence over the file.
    pub fn ports(&self, override_ports: Option<&str>) -> Result<PortConfig, ConfigError> {
        match override_ports {
            Some(value) => PortConfig::parse(value),
            None => PortConfig::new(self.http_port, self.websocket_port),
        }
    }

    pub fn host_addr(&self) -> IpAddr {
        self.host.unwrap_or_else(discover_host_address)
    }
}

/// Socket addresses for the two servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeAddrs {
    pub http: SocketAddr,
    pub websocket: SocketAddr,
}

impl ServeAddrs {
    pub fn new(host: IpAddr, ports: PortConfig) -> Self {
        Self {
            http: SocketAddr::new(host, ports.http()),
            websocket: SocketAddr::new(host, ports.websocket()),
        }
    }
}

/// The address of the interface that routes outward, or loopback when there
/// is none. A UDP connect sends no packets.
pub fn discover_host_address() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1))?;
        Ok(socket.local_addr()?.ip())
    };
    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        _ => IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}

/// `ui/` next to the executable when present, otherwise `./ui`.
fn default_ui_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("ui")))
        .filter(|dir| dir.is_dir())
        .unwrap_or_else(|| PathBuf::from("ui"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::below_floor("4999,6000", ConfigError::PortTooLow(4999))]
    #[case::floor_itself("6000,5000", ConfigError::PortTooLow(5000))]
    #[case::same_port("6000,6000", ConfigError::SamePort(6000))]
    #[case::single("6000", ConfigError::MalformedPorts("6000".to_string()))]
    #[case::three("6000,7000,8000", ConfigError::MalformedPorts("6000,7000,8000".to_string()))]
    #[case::not_a_number("http,7000", ConfigError::MalformedPorts("http,7000".to_string()))]
    #[case::overflow("70000,7000", ConfigError::MalformedPorts("70000,7000".to_string()))]
    fn rejects_invalid_port_pairs(#[case] value: &str, #[case] expected: ConfigError) {
        let error = PortConfig::parse(value).expect_err("invalid ports");
        assert_eq!(error, expected);
        assert_ne!(error.exit_code(), 0);
    }

    #[test]
    fn accepts_distinct_high_ports() {
        let ports = PortConfig::parse("6000,7000").expect("valid ports");
        assert_eq!((ports.http(), ports.websocket()), (6000, 7000));
        assert_eq!(PortConfig::parse(" 6000 , 7000 "), Ok(ports));
    }

    #[test]
    fn default_ports_are_valid() {
        let ports = PortConfig::default();
        assert_eq!(PortConfig::new(ports.http(), ports.websocket()), Ok(ports));
    }

    #[test]
    fn toml_fields_override_defaults() {
        let config = ViewerConfig::from_toml_str(
            r#"
            host = "127.0.0.1"
            http_port = 9100
            websocket_port = 9200
            ui_dir = "/opt/traceview/ui"
            "#,
        )
        .expect("parse");

        assert_eq!(config.host, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert_eq!(config.ui_dir, PathBuf::from("/opt/traceview/ui"));
        assert_eq!(config.dump_dir, PathBuf::from("ui"));
        let ports = config.ports(None).expect("valid");
        assert_eq!((ports.http(), ports.websocket()), (9100, 9200));
        let ports = config.ports(Some("6000,7000")).expect("valid");
        assert_eq!((ports.http(), ports.websocket()), (6000, 7000));
    }

    #[test]
    fn toml_rejects_unknown_fields_and_bad_ports() {
        assert!(matches!(
            ViewerConfig::from_toml_str("colour = \"red\""),
            Err(ConfigError::Parse(_))
        ));
        let config = ViewerConfig::from_toml_str("http_port = 80").expect("parse");
        assert_eq!(config.ports(None), Err(ConfigError::PortTooLow(80)));
    }

    #[test]
    fn env_overrides_host_and_ui_dir() {
        let config = ViewerConfig::default().with_overrides_from(|key| match key {
            ENV_HOST => Some("::1".to_string()),
            ENV_UI_DIR => Some("/srv/ui".to_string()),
            _ => None,
        });
        assert_eq!(config.host_addr(), "::1".parse::<IpAddr>().expect("ip"));
        assert_eq!(config.ui_dir, PathBuf::from("/srv/ui"));

        let config = ViewerConfig::default()
            .with_overrides_from(|key| (key == ENV_HOST).then(|| "not-an-ip".to_string()));
        assert_eq!(config.host, None);
    }
}

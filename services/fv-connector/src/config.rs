//! Configuration types and loading
//!
//! Precedence: env vars > optional TOML file > defaults. Secrets (personal
//! access token, client secret, connector key) are only read from the
//! environment, never from the TOML file.

use common::Secret;
use filevine_auth::{Credentials, DEFAULT_IDENTITY_URL};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_CONNECTIONS: usize = 1000;

/// Root configuration, built once at startup.
#[derive(Debug)]
pub struct Config {
    pub filevine: FilevineConfig,
    pub server: ServerConfig,
    /// Shared secret every protected inbound request must present
    pub connector_key: Secret<String>,
}

/// Identity provider and API settings
#[derive(Debug)]
pub struct FilevineConfig {
    pub api_base: String,
    pub identity_url: String,
    pub org_id: String,
    pub user_id: String,
    pub credentials: Credentials,
}

/// Listener settings
#[derive(Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub max_connections: usize,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

/// On-disk shape. Every field is optional because env vars may supply it.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    filevine: FileFilevine,
    #[serde(default)]
    server: FileServer,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileFilevine {
    api_base: Option<String>,
    identity_url: Option<String>,
    org_id: Option<String>,
    user_id: Option<String>,
    client_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileServer {
    port: Option<u16>,
    max_connections: Option<usize>,
}

impl Config {
    /// Load configuration from an optional TOML file, then overlay environment variables.
    pub fn load(path: Option<&Path>) -> common::Result<Self> {
        let file = match path {
            Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
            None => FileConfig::default(),
        };
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    ///
    /// Returns `None` when neither is set; the environment alone is then
    /// expected to carry every required setting.
    pub fn resolve_path(cli_path: Option<&str>) -> Option<PathBuf> {
        if let Some(p) = cli_path {
            return Some(PathBuf::from(p));
        }
        std::env::var("CONFIG_PATH").ok().map(PathBuf::from)
    }

    fn from_sources(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> common::Result<Self> {
        let lookup = |key: &str| env(key).filter(|v| !v.is_empty());
        let required = |key: &'static str, fallback: Option<String>| {
            lookup(key)
                .or_else(|| fallback.filter(|v| !v.is_empty()))
                .ok_or(common::Error::MissingSetting(key))
        };

        let api_base = required("FV_API_BASE", file.filevine.api_base)?;
        validate_url("FV_API_BASE", &api_base)?;

        let identity_url = lookup("FV_IDENTITY_URL")
            .or(file.filevine.identity_url)
            .unwrap_or_else(|| DEFAULT_IDENTITY_URL.to_string());
        validate_url("FV_IDENTITY_URL", &identity_url)?;

        let port = match lookup("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                common::Error::Config(format!("PORT must be a port number, got: {raw}"))
            })?,
            None => file.server.port.unwrap_or(DEFAULT_PORT),
        };

        let max_connections = match lookup("MAX_CONNECTIONS") {
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                common::Error::Config(format!("MAX_CONNECTIONS must be a number, got: {raw}"))
            })?,
            None => file
                .server
                .max_connections
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
        };
        if max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        let credentials = Credentials {
            personal_access_token: Secret::new(required("FV_PAT", None)?),
            client_id: required("FV_CLIENT_ID", file.filevine.client_id)?,
            client_secret: Secret::new(required("FV_CLIENT_SECRET", None)?),
        };

        Ok(Config {
            filevine: FilevineConfig {
                api_base,
                identity_url,
                org_id: required("FV_ORG_ID", file.filevine.org_id)?,
                user_id: required("FV_USER_ID", file.filevine.user_id)?,
                credentials,
            },
            server: ServerConfig {
                port,
                max_connections,
            },
            connector_key: Secret::new(required("CONNECTOR_API_KEY", None)?),
        })
    }
}

fn validate_url(key: &str, url: &str) -> common::Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{key} must start with http:// or https://, got: {url}"
        )))
    }
}

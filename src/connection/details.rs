/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/
use crate::client::ClientIdentity;
use crate::utils::{WebsocketError, join_path};
use std::env;
use std::fmt;
use url::Url;

/// Built-in development API address.
pub const DEVELOPMENT_API_URL: &str = "http://localhost:8000";
/// Built-in development websocket address.
pub const DEVELOPMENT_WEBSOCKET_URL: &str = "ws://localhost:8000/deployments/ws";

/// Where to connect and which credential to present once connected.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDetails {
    base_url: String,
    credential: String,
}

impl fmt::Debug for ConnectionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDetails")
            .field("base_url", &self.base_url)
            .field("credential", &"<redacted>")
            .finish()
    }
}

impl ConnectionDetails {
    /// Validates `base_url` and pairs it with the bearer token.
    ///
    /// # Errors
    ///
    /// Returns `WebsocketError::InvalidUrl` if `base_url` is not an absolute `ws`/`wss` URL.
    pub fn new(
        base_url: impl Into<String>,
        credential: impl Into<String>,
    ) -> Result<Self, WebsocketError> {
        let base_url = base_url.into();
        let parsed = Url::parse(&base_url).map_err(|e| WebsocketError::InvalidUrl {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;

        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(WebsocketError::InvalidUrl {
                url: base_url,
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        Ok(Self {
            base_url,
            credential: credential.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    /// The transport address for a client: `{base_url}/{identity}`.
    ///
    /// # Errors
    ///
    /// Returns `WebsocketError::InvalidUrl` if the joined address does not parse.
    pub fn endpoint(&self, identity: &ClientIdentity) -> Result<Url, WebsocketError> {
        let joined = join_path(&self.base_url, identity.as_str());
        Url::parse(&joined).map_err(|e| WebsocketError::InvalidUrl {
            url: joined,
            reason: e.to_string(),
        })
    }
}

/// Deployment mode selecting between production and development addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    Production,
    Development,
}

impl DeploymentMode {
    /// `"production"` (any case) is production, anything else is development.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            DeploymentMode::Production
        } else {
            DeploymentMode::Development
        }
    }
}

/// Addresses of the backend, chosen by deployment mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub mode: DeploymentMode,
    pub api_base_url: String,
    pub websocket_base_url: String,
}

impl Settings {
    /// Reads the settings from the process environment.
    ///
    /// Variables: `DEPLOY_MODE`, `DEPLOY_API_URL_PROD`, `DEPLOY_API_URL_DEV`,
    /// `DEPLOY_WEBSOCKET_URL_PROD`, `DEPLOY_WEBSOCKET_URL_DEV`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mode = var("DEPLOY_MODE")
            .map(|mode| DeploymentMode::parse(&mode))
            .unwrap_or(DeploymentMode::Development);

        let api_base_url = select(
            mode,
            var("DEPLOY_API_URL_PROD"),
            var("DEPLOY_API_URL_DEV"),
            DEVELOPMENT_API_URL,
        );
        let websocket_base_url = select(
            mode,
            var("DEPLOY_WEBSOCKET_URL_PROD"),
            var("DEPLOY_WEBSOCKET_URL_DEV"),
            DEVELOPMENT_WEBSOCKET_URL,
        );

        Self {
            mode,
            api_base_url,
            websocket_base_url,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn select(
    mode: DeploymentMode,
    production: Option<String>,
    development: Option<String>,
    fallback: &str,
) -> String {
    match (mode, production, development) {
        (DeploymentMode::Production, Some(production), _) => production,
        (_, _, Some(development)) => development,
        _ => fallback.to_string(),
    }
}

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/

//! Builder API for creating realtime clients.
//!
//! Collects the address, the credential, the tuning options, the logout
//! collaborator and the initial subscribers, then starts a `WebsocketClient`
//! with everything wired in.

use crate::client::WebsocketClient;
use crate::client::session::{AuthenticationHandler, Session};
use crate::connection::{BackoffPolicy, ConnectionDetails, ConnectionOptions, Settings};
use crate::subscription::Subscriber;
use crate::utils::WebsocketError;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Configuration for a realtime client.
#[derive(Clone)]
pub struct ClientBuilder {
    /// Websocket base URL (e.g. "ws://localhost:8000/deployments/ws")
    pub websocket_base_url: String,
    /// Bearer token sent after the transport opens
    pub access_token: Option<String>,
    /// Retry, backoff, timeout and date field settings
    pub options: ConnectionOptions,
    authentication_handler: Option<Arc<dyn AuthenticationHandler>>,
    subscribers: Vec<Weak<dyn Subscriber>>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("websocket_base_url", &self.websocket_base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("options", &self.options)
            .field("authentication_handler", &self.authentication_handler.is_some())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl ClientBuilder {
    /// Creates a builder for the given websocket base URL.
    ///
    /// # Arguments
    ///
    /// * `websocket_base_url` - Base address; the client identity is appended to it
    pub fn new(websocket_base_url: impl Into<String>) -> Self {
        Self {
            websocket_base_url: websocket_base_url.into(),
            access_token: None,
            options: ConnectionOptions::default(),
            authentication_handler: None,
            subscribers: Vec::new(),
        }
    }

    /// Creates a builder for the websocket address selected by `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.websocket_base_url.clone())
    }

    /// Sets the bearer token used by `start`.
    #[must_use]
    pub fn access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    /// Replaces all connection options.
    #[must_use]
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the automatic reconnect budget.
    #[must_use]
    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.options = self.options.with_max_retry_attempts(attempts);
        self
    }

    /// Sets the delay schedule between reconnect attempts.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.options = self.options.with_backoff(backoff);
        self
    }

    /// Sets the connect timeout; `None` disables it.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options = self.options.with_connect_timeout(timeout);
        self
    }

    /// Sets the collaborator told to log out when the credential is rejected.
    #[must_use]
    pub fn authentication_handler(mut self, handler: Arc<dyn AuthenticationHandler>) -> Self {
        self.authentication_handler = Some(handler);
        self
    }

    /// Adds a subscriber. Only a weak reference is kept.
    #[must_use]
    pub fn subscriber<S: Subscriber + 'static>(mut self, subscriber: &Arc<S>) -> Self {
        let subscriber: Weak<S> = Arc::downgrade(subscriber);
        let subscriber: Weak<dyn Subscriber> = subscriber;
        self.subscribers.push(subscriber);
        self
    }

    /// Connection details built from the base URL and the access token.
    ///
    /// # Errors
    ///
    /// Returns `WebsocketError::InvalidUrl` for an unusable base URL, or
    /// `WebsocketError::InvalidOptions` when no access token was given.
    pub fn details(&self) -> Result<ConnectionDetails, WebsocketError> {
        let access_token = self
            .access_token
            .clone()
            .ok_or_else(|| WebsocketError::InvalidOptions("access token is required".to_string()))?;
        ConnectionDetails::new(self.websocket_base_url.clone(), access_token)
    }

    /// Builds the session and starts an idle client. Requires a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `WebsocketError::InvalidOptions` if the options fail validation.
    pub fn build(self) -> Result<WebsocketClient, WebsocketError> {
        let mut session = Session::new(self.options)?;
        if let Some(handler) = self.authentication_handler {
            session.set_authentication_handler(handler);
        }
        for subscriber in self.subscribers {
            session.register_weak(subscriber);
        }
        Ok(WebsocketClient::from_session(session))
    }

    /// Builds the client and connects it.
    ///
    /// # Errors
    ///
    /// Returns the first error from `details` or `build`.
    pub async fn start(self) -> Result<WebsocketClient, WebsocketError> {
        let details = self.details()?;
        let client = self.build()?;
        client.connect_with(details).await?;
        Ok(client)
    }
}

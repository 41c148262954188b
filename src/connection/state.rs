/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/

//! Read-only view of the session's connection and authentication state.
//!
//! Only the session core mutates a `ConnectionStatus`; everything else (UI, health
//! checks, tests) reads snapshots of it, usually through a `StatusHandle`.

use crate::connection::management::SessionMetrics;
use crate::utils::WebsocketError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle of the transport itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionPhase::Connecting => "CONNECTING",
            ConnectionPhase::Open => "OPEN",
            ConnectionPhase::Closing => "CLOSING",
            ConnectionPhase::Closed => "CLOSED",
        })
    }
}

/// Progress of the out-of-band credential exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationPhase {
    NotAuthenticated,
    Authenticating,
    Authenticated,
    AuthenticationFailed,
}

impl fmt::Display for AuthenticationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthenticationPhase::NotAuthenticated => "not authenticated",
            AuthenticationPhase::Authenticating => "authenticating...",
            AuthenticationPhase::Authenticated => "authenticated",
            AuthenticationPhase::AuthenticationFailed => "authentication failure",
        })
    }
}

/// Last lifecycle step the session handled. Useful when debugging a stuck client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlingStage {
    NotHandling,
    InitConnection,
    OnOpen,
    SendCredentials,
    OnAuthenticationMessage,
    OnMessage,
    OnClose,
    RetryScheduled,
    Disconnected,
}

/// Why the session stopped trying on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFailure {
    /// The server rejected the credential. Needs a new login.
    AuthenticationRejected,
    /// Every automatic reconnect attempt was used up.
    RetriesExhausted,
}

/// Snapshot of the session state as seen by observers.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatus {
    connection: ConnectionPhase,
    authentication: AuthenticationPhase,
    handling: HandlingStage,
    last_message_received_at: Option<DateTime<Utc>>,
    retry_attempts: u32,
    failure: Option<SessionFailure>,
    last_warning: Option<String>,
    metrics: SessionMetrics,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            connection: ConnectionPhase::Closed,
            authentication: AuthenticationPhase::NotAuthenticated,
            handling: HandlingStage::NotHandling,
            last_message_received_at: None,
            retry_attempts: 0,
            failure: None,
            last_warning: None,
            metrics: SessionMetrics::default(),
        }
    }
}

impl ConnectionStatus {
    pub fn connection(&self) -> ConnectionPhase {
        self.connection
    }

    pub fn authentication(&self) -> AuthenticationPhase {
        self.authentication
    }

    pub fn handling(&self) -> HandlingStage {
        self.handling
    }

    pub fn last_message_received_at(&self) -> Option<DateTime<Utc>> {
        self.last_message_received_at
    }

    /// Automatic reconnect attempts made since the last successful authentication.
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    pub fn failure(&self) -> Option<SessionFailure> {
        self.failure
    }

    /// Detail of the last `warning` frame, e.g. "Your session has expired."
    pub fn last_warning(&self) -> Option<&str> {
        self.last_warning.as_deref()
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Open and authenticated.
    pub fn is_online(&self) -> bool {
        self.connection == ConnectionPhase::Open
            && self.authentication == AuthenticationPhase::Authenticated
    }

    /// Whether a frame arrived within `window` of now.
    pub fn recently_active(&self, window: Duration) -> bool {
        self.recently_active_at(window, Utc::now())
    }

    /// Like `recently_active`, against an explicit clock reading.
    pub fn recently_active_at(&self, window: Duration, now: DateTime<Utc>) -> bool {
        match self.last_message_received_at {
            None => false,
            // A timestamp ahead of `now` counts as active.
            Some(last) if last > now => true,
            Some(last) => (now - last).to_std().is_ok_and(|elapsed| elapsed <= window),
        }
    }

    pub(crate) fn set_connection(&mut self, phase: ConnectionPhase) {
        self.connection = phase;
        if phase == ConnectionPhase::Closed {
            self.authentication = AuthenticationPhase::NotAuthenticated;
        }
    }

    pub(crate) fn set_authentication(&mut self, phase: AuthenticationPhase) {
        self.authentication = phase;
    }

    pub(crate) fn set_handling(&mut self, stage: HandlingStage) {
        self.handling = stage;
    }

    pub(crate) fn set_last_message_received_at(&mut self, at: DateTime<Utc>) {
        self.last_message_received_at = Some(at);
    }

    pub(crate) fn set_retry_attempts(&mut self, attempts: u32) {
        self.retry_attempts = attempts;
    }

    pub(crate) fn set_failure(&mut self, failure: Option<SessionFailure>) {
        self.failure = failure;
    }

    pub(crate) fn set_last_warning(&mut self, detail: Option<String>) {
        self.last_warning = detail;
    }

    pub(crate) fn metrics_mut(&mut self) -> &mut SessionMetrics {
        &mut self.metrics
    }
}

/// Cloneable observer of the status published by a running client.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    receiver: watch::Receiver<ConnectionStatus>,
}

impl StatusHandle {
    pub(crate) fn new(receiver: watch::Receiver<ConnectionStatus>) -> Self {
        Self { receiver }
    }

    /// The latest published status.
    pub fn current(&self) -> ConnectionStatus {
        self.receiver.borrow().clone()
    }

    pub fn is_online(&self) -> bool {
        self.receiver.borrow().is_online()
    }

    pub fn recently_active(&self, window: Duration) -> bool {
        self.receiver.borrow().recently_active(window)
    }

    /// Waits for the next published change.
    ///
    /// # Errors
    ///
    /// Returns `WebsocketError::ClientClosed` once the client task has stopped.
    pub async fn changed(&mut self) -> Result<ConnectionStatus, WebsocketError> {
        self.receiver
            .changed()
            .await
            .map_err(|_| WebsocketError::ClientClosed)?;
        Ok(self.receiver.borrow_and_update().clone())
    }

    /// Waits until the status satisfies `predicate`, returning immediately if it already does.
    ///
    /// # Errors
    ///
    /// Returns `WebsocketError::ClientClosed` if the client task stops first.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&ConnectionStatus) -> bool,
    ) -> Result<ConnectionStatus, WebsocketError> {
        let status = self
            .receiver
            .wait_for(predicate)
            .await
            .map_err(|_| WebsocketError::ClientClosed)?;
        Ok((*status).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status() {
        let status = ConnectionStatus::default();
        assert_eq!(status.connection(), ConnectionPhase::Closed);
        assert_eq!(
            status.authentication(),
            AuthenticationPhase::NotAuthenticated
        );
        assert!(!status.is_online());
        assert!(!status.recently_active(Duration::from_secs(60)));
    }

    #[test]
    fn test_is_online_requires_both_phases() {
        let mut status = ConnectionStatus::default();
        status.set_connection(ConnectionPhase::Open);
        assert!(!status.is_online());
        status.set_authentication(AuthenticationPhase::Authenticated);
        assert!(status.is_online());
        status.set_connection(ConnectionPhase::Closing);
        assert!(!status.is_online());
    }

    #[test]
    fn test_closed_forces_not_authenticated() {
        let mut status = ConnectionStatus::default();
        status.set_connection(ConnectionPhase::Open);
        status.set_authentication(AuthenticationPhase::Authenticated);
        status.set_connection(ConnectionPhase::Closed);
        assert_eq!(
            status.authentication(),
            AuthenticationPhase::NotAuthenticated
        );
    }

    #[test]
    fn test_recently_active_window() {
        let mut status = ConnectionStatus::default();
        let now = Utc::now();
        status.set_last_message_received_at(now - chrono::Duration::seconds(5));

        assert!(status.recently_active_at(Duration::from_secs(10), now));
        assert!(!status.recently_active_at(Duration::from_secs(2), now));
    }

    #[test]
    fn test_recently_active_future_timestamp() {
        let mut status = ConnectionStatus::default();
        let now = Utc::now();
        status.set_last_message_received_at(now + chrono::Duration::seconds(5));
        assert!(status.recently_active_at(Duration::from_secs(1), now));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(ConnectionPhase::Open.to_string(), "OPEN");
        assert_eq!(
            AuthenticationPhase::Authenticating.to_string(),
            "authenticating..."
        );
    }

    #[tokio::test]
    async fn test_status_handle_wait_for() {
        let (tx, rx) = watch::channel(ConnectionStatus::default());
        let mut handle = StatusHandle::new(rx);
        assert!(!handle.is_online());

        let mut online = ConnectionStatus::default();
        online.set_connection(ConnectionPhase::Open);
        online.set_authentication(AuthenticationPhase::Authenticated);
        tx.send(online).unwrap();

        let status = handle.wait_for(ConnectionStatus::is_online).await.unwrap();
        assert!(status.is_online());
        assert!(handle.current().is_online());
    }

    #[tokio::test]
    async fn test_status_handle_closed() {
        let (tx, rx) = watch::channel(ConnectionStatus::default());
        let mut handle = StatusHandle::new(rx);
        drop(tx);
        assert!(matches!(
            handle.changed().await,
            Err(WebsocketError::ClientClosed)
        ));
    }
}

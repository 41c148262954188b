/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/

//! Connection lifecycle state machine.
//!
//! `Session` performs no I/O. Every transport callback, timer expiry and caller
//! command is a method that updates the state and returns the `Action`s the
//! driver must carry out. Transports are numbered by generation and retry timers
//! by token, so events from a superseded transport or a cancelled timer are
//! recognised and dropped.

use crate::client::ClientIdentity;
use crate::connection::{
    AuthenticationPhase, ConnectionDetails, ConnectionOptions, ConnectionPhase, ConnectionStatus,
    DisconnectionReason, HandlingStage, RetryBudget, SessionFailure,
};
use crate::message::{
    AuthenticationFrame, AuthenticationResult, AuthenticationStatus, InboundMessage, MessageKind,
    Normalizer,
};
use crate::subscription::{Dispatcher, Subscriber, SubscriberId};
use crate::utils::WebsocketError;
use chrono::Utc;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

/// External collaborator told to invalidate the user session when the server
/// rejects the credential.
pub trait AuthenticationHandler: Send + Sync {
    /// Called once per rejected credential, with the server's `detail` if any.
    fn logout(&self, detail: Option<&str>);
}

/// Lifecycle of the session as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, never connected.
    Idle,
    Connecting,
    OpenUnauthenticated,
    Authenticating,
    /// Open and authenticated.
    Ready,
    /// The server rejected the credential. The transport may still be open.
    AuthenticationFailed,
    Closed,
}

/// Side effect requested by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Open a new transport to `url`, tagged with `generation`.
    Open { generation: u64, url: Url },
    /// Send a text frame over the transport of `generation`.
    Send { generation: u64, frame: String },
    /// Close the transport of `generation`.
    Close { generation: u64 },
    /// Call `on_retry_timer(token)` after `delay`.
    ScheduleRetry { token: u64, delay: Duration },
    CancelRetry { token: u64 },
    /// Call `on_connect_timeout(generation)` after `after`.
    ScheduleConnectTimeout { generation: u64, after: Duration },
    CancelConnectTimeout { generation: u64 },
}

/// The session manager core.
pub struct Session {
    identity: ClientIdentity,
    options: ConnectionOptions,
    normalizer: Normalizer,
    dispatcher: Dispatcher,
    authentication_handler: Option<Arc<dyn AuthenticationHandler>>,
    status: ConnectionStatus,
    state: SessionState,
    details: Option<ConnectionDetails>,
    budget: RetryBudget,
    next_generation: u64,
    transport: Option<u64>,
    connect_timeout: Option<u64>,
    next_retry_token: u64,
    pending_retry: Option<u64>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("state", &self.state)
            .field("transport", &self.transport)
            .field("pending_retry", &self.pending_retry)
            .field("budget", &self.budget)
            .field("subscribers", &self.dispatcher.len())
            .finish()
    }
}

impl Session {
    /// Creates an idle session with a fresh client identity.
    ///
    /// # Errors
    ///
    /// Returns `WebsocketError::InvalidOptions` if `options` fail validation.
    pub fn new(options: ConnectionOptions) -> Result<Self, WebsocketError> {
        options.validate()?;
        Ok(Self {
            identity: ClientIdentity::new(),
            normalizer: Normalizer::new(options.date_fields.iter().map(String::as_str)),
            budget: RetryBudget::new(options.max_retry_attempts),
            options,
            dispatcher: Dispatcher::new(),
            authentication_handler: None,
            status: ConnectionStatus::default(),
            state: SessionState::Idle,
            details: None,
            next_generation: 0,
            transport: None,
            connect_timeout: None,
            next_retry_token: 0,
            pending_retry: None,
        })
    }

    #[must_use]
    pub fn with_authentication_handler(mut self, handler: Arc<dyn AuthenticationHandler>) -> Self {
        self.authentication_handler = Some(handler);
        self
    }

    pub fn set_authentication_handler(&mut self, handler: Arc<dyn AuthenticationHandler>) {
        self.authentication_handler = Some(handler);
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn retry_budget(&self) -> &RetryBudget {
        &self.budget
    }

    /// Generation of the live transport, if any.
    pub fn transport_generation(&self) -> Option<u64> {
        self.transport
    }

    pub fn pending_retry(&self) -> Option<u64> {
        self.pending_retry
    }

    pub fn register<S: Subscriber + 'static>(&mut self, subscriber: &Arc<S>) -> SubscriberId {
        self.dispatcher.register(subscriber)
    }

    pub fn register_weak(&mut self, subscriber: Weak<dyn Subscriber>) -> SubscriberId {
        self.dispatcher.register_weak(subscriber)
    }

    pub fn unregister(&mut self, id: SubscriberId) -> bool {
        self.dispatcher.unregister(id)
    }

    /// Starts a connection to `{base_url}/{identity}`.
    ///
    /// While a transport is connecting, open or authenticated this is a no-op.
    /// Otherwise any pending retry is cancelled, the retry budget is re-armed and
    /// a new transport is opened.
    ///
    /// # Errors
    ///
    /// Returns `WebsocketError::InvalidUrl` if the transport address cannot be built.
    /// The session is left untouched in that case.
    pub fn connect(&mut self, details: ConnectionDetails) -> Result<Vec<Action>, WebsocketError> {
        let url = details.endpoint(&self.identity)?;

        match self.state {
            SessionState::Connecting
            | SessionState::OpenUnauthenticated
            | SessionState::Authenticating
            | SessionState::Ready => {
                warn!(
                    "Ignoring connect request while session is {:?}; disconnect first",
                    self.state
                );
                return Ok(Vec::new());
            }
            SessionState::Idle | SessionState::AuthenticationFailed | SessionState::Closed => {}
        }

        let mut actions = Vec::new();
        if let Some(token) = self.pending_retry.take() {
            actions.push(Action::CancelRetry { token });
        }
        self.release_transport(&mut actions);

        self.budget.reset();
        self.status.set_retry_attempts(0);
        self.status.set_failure(None);
        self.details = Some(details);

        info!("Connecting to {}", url);
        self.open_transport(url, &mut actions);
        Ok(actions)
    }

    /// The transport of `generation` finished its handshake.
    pub fn on_open(&mut self, generation: u64) -> Vec<Action> {
        if !self.is_current(generation) || self.state != SessionState::Connecting {
            debug!("Ignoring open event from stale transport {}", generation);
            return Vec::new();
        }

        let mut actions = Vec::new();
        self.cancel_connect_timeout(&mut actions);

        self.state = SessionState::OpenUnauthenticated;
        self.status.set_connection(ConnectionPhase::Open);
        self.status.set_handling(HandlingStage::OnOpen);
        info!("Transport {} open, sending credentials", generation);

        let Some(credential) = self.details.as_ref().map(ConnectionDetails::credential) else {
            error!("Transport {} opened without connection details", generation);
            return actions;
        };
        let credentials = AuthenticationFrame {
            access_token: credential,
        };
        match credentials.encode() {
            Ok(frame) => {
                actions.push(Action::Send { generation, frame });
                self.state = SessionState::Authenticating;
                self.status
                    .set_authentication(AuthenticationPhase::Authenticating);
                self.status.set_handling(HandlingStage::SendCredentials);
            }
            Err(e) => {
                error!("Failed to serialize credential frame: {}", e);
                actions.push(Action::Close { generation });
            }
        }
        actions
    }

    /// A text frame arrived on the transport of `generation`.
    pub fn on_message(&mut self, generation: u64, text: &str) -> Vec<Action> {
        if !self.is_current(generation) {
            debug!("Ignoring frame from stale transport {}", generation);
            return Vec::new();
        }

        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed frame: {}", e);
                self.status.metrics_mut().dropped_frames += 1;
                return Vec::new();
            }
        };
        self.status.set_last_message_received_at(Utc::now());

        match message {
            InboundMessage::Authentication(result) => self.on_authentication(result),
            InboundMessage::Entity { kind, payload } => self.on_entity(kind, &payload),
            InboundMessage::Unknown { discriminator } => {
                debug!("Ignoring frame with unknown type '{}'", discriminator);
                self.status.metrics_mut().ignored_frames += 1;
            }
        }
        Vec::new()
    }

    /// The transport of `generation` started its closing handshake.
    pub fn on_closing(&mut self, generation: u64) -> Vec<Action> {
        if self.is_current(generation) {
            self.status.set_connection(ConnectionPhase::Closing);
        }
        Vec::new()
    }

    /// The transport of `generation` is gone.
    pub fn on_close(&mut self, generation: u64, reason: DisconnectionReason) -> Vec<Action> {
        if !self.is_current(generation) {
            debug!("Ignoring close of stale transport {}", generation);
            return Vec::new();
        }

        let mut actions = Vec::new();
        self.transport = None;
        self.cancel_connect_timeout(&mut actions);
        self.handle_close(reason, &mut actions);
        actions
    }

    /// The retry timer `token` fired.
    pub fn on_retry_timer(&mut self, token: u64) -> Vec<Action> {
        if self.pending_retry != Some(token) {
            debug!("Ignoring stale retry timer {}", token);
            return Vec::new();
        }
        self.pending_retry = None;

        if self.state != SessionState::Closed {
            debug!("Skipping reconnection attempt, session is {:?}", self.state);
            return Vec::new();
        }

        let url = match self.details.as_ref().map(|d| d.endpoint(&self.identity)) {
            Some(Ok(url)) => url,
            Some(Err(e)) => {
                error!("Cannot rebuild transport address: {}", e);
                return Vec::new();
            }
            None => return Vec::new(),
        };

        info!(
            "Attempting to reconnect ({}/{})",
            self.budget.used(),
            self.budget.max_attempts()
        );
        self.status.metrics_mut().reconnect_attempts += 1;
        let mut actions = Vec::new();
        self.open_transport(url, &mut actions);
        actions
    }

    /// The transport of `generation` did not open in time. Treated as a close.
    pub fn on_connect_timeout(&mut self, generation: u64) -> Vec<Action> {
        if self.connect_timeout != Some(generation)
            || !self.is_current(generation)
            || self.state != SessionState::Connecting
        {
            return Vec::new();
        }
        self.connect_timeout = None;

        warn!("Transport {} did not open in time", generation);
        let mut actions = vec![Action::Close { generation }];
        self.transport = None;
        self.handle_close(DisconnectionReason::ConnectTimeout, &mut actions);
        actions
    }

    /// Closes the session without scheduling any reconnection.
    pub fn disconnect(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if let Some(token) = self.pending_retry.take() {
            actions.push(Action::CancelRetry { token });
        }
        self.release_transport(&mut actions);

        self.details = None;
        self.state = SessionState::Closed;
        self.status.set_connection(ConnectionPhase::Closed);
        self.status.set_handling(HandlingStage::Disconnected);
        info!("Session disconnected: {}", DisconnectionReason::UserRequested);
        actions
    }

    fn is_current(&self, generation: u64) -> bool {
        self.transport == Some(generation)
    }

    fn open_transport(&mut self, url: Url, actions: &mut Vec<Action>) {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.transport = Some(generation);

        self.state = SessionState::Connecting;
        self.status.set_connection(ConnectionPhase::Connecting);
        self.status
            .set_authentication(AuthenticationPhase::NotAuthenticated);
        self.status.set_handling(HandlingStage::InitConnection);
        self.status.metrics_mut().total_connections += 1;

        actions.push(Action::Open { generation, url });
        if let Some(after) = self.options.connect_timeout {
            self.connect_timeout = Some(generation);
            actions.push(Action::ScheduleConnectTimeout { generation, after });
        }
    }

    /// Closes the live transport, if any, and cancels its connect timeout.
    fn release_transport(&mut self, actions: &mut Vec<Action>) {
        self.cancel_connect_timeout(actions);
        if let Some(generation) = self.transport.take() {
            actions.push(Action::Close { generation });
        }
    }

    fn cancel_connect_timeout(&mut self, actions: &mut Vec<Action>) {
        if let Some(generation) = self.connect_timeout.take() {
            actions.push(Action::CancelConnectTimeout { generation });
        }
    }

    fn handle_close(&mut self, reason: DisconnectionReason, actions: &mut Vec<Action>) {
        let rejected = self.state == SessionState::AuthenticationFailed;

        self.state = SessionState::Closed;
        self.status.set_connection(ConnectionPhase::Closed);
        self.status.set_handling(HandlingStage::OnClose);
        info!("Transport closed: {}", reason);

        if rejected {
            debug!("Not reconnecting after rejected credential");
            return;
        }

        match self.budget.try_consume() {
            Some(attempt) => {
                self.next_retry_token += 1;
                let token = self.next_retry_token;
                let delay = self.options.backoff.delay_for(attempt);
                self.pending_retry = Some(token);
                self.status.set_retry_attempts(attempt);
                self.status.set_handling(HandlingStage::RetryScheduled);
                debug!("Reconnect attempt {} scheduled in {:?}", attempt, delay);
                actions.push(Action::ScheduleRetry { token, delay });
            }
            None => {
                warn!(
                    "Giving up after {} reconnection attempts",
                    self.budget.max_attempts()
                );
                self.status.set_failure(Some(SessionFailure::RetriesExhausted));
            }
        }
    }

    fn on_authentication(&mut self, result: AuthenticationResult) {
        self.status
            .set_handling(HandlingStage::OnAuthenticationMessage);
        if self.state != SessionState::Authenticating {
            warn!(
                "Ignoring authentication result while session is {:?}",
                self.state
            );
            return;
        }

        match result.status {
            AuthenticationStatus::Success => {
                info!("Session authenticated");
                self.state = SessionState::Ready;
                self.status
                    .set_authentication(AuthenticationPhase::Authenticated);
                self.budget.reset();
                self.status.set_retry_attempts(0);
                self.status.set_failure(None);
                self.status.metrics_mut().successful_authentications += 1;
            }
            AuthenticationStatus::Failure => {
                warn!(
                    "Authentication rejected: {}",
                    result.detail.as_deref().unwrap_or("no detail")
                );
                self.state = SessionState::AuthenticationFailed;
                self.status
                    .set_authentication(AuthenticationPhase::AuthenticationFailed);
                self.status
                    .set_failure(Some(SessionFailure::AuthenticationRejected));
                if let Some(handler) = &self.authentication_handler {
                    handler.logout(result.detail.as_deref());
                }
            }
        }
    }

    fn on_entity(&mut self, kind: MessageKind, payload: &Map<String, Value>) {
        self.status.set_handling(HandlingStage::OnMessage);
        if kind == MessageKind::Warning {
            let detail = payload
                .get("detail")
                .and_then(Value::as_str)
                .map(str::to_string);
            warn!(
                "Server warning: {}",
                detail.as_deref().unwrap_or("no detail")
            );
            self.status.set_last_warning(detail);
        }

        let message = self.normalizer.normalize(kind, payload);
        let report = self.dispatcher.dispatch(&message);
        debug!(
            "Dispatched {} message to {} subscribers ({} failed)",
            kind, report.delivered, report.failed
        );

        let metrics = self.status.metrics_mut();
        metrics.dispatched_messages += 1;
        metrics.subscriber_failures += report.failed as u64;
    }
}

//! # Deploy Realtime Rust Client
//!
//! This project is a Rust client for the realtime channel of a deployment service. It keeps a
//! persistent websocket open to the server, authenticates it out-of-band with a bearer token,
//! survives unexpected disconnects with a bounded automatic retry, normalizes the inbound
//! deployment events and fans them out to any number of independent subscribers.
//!
//! ## Features
//!
//! - **Session Management**:
//!   - One transport per client at `{websocket_base_url}/{client_id}`
//!   - Credential frame sent as soon as the transport opens
//!   - Automatic reconnection bounded by a retry budget, reset on every successful authentication
//!   - Fixed backoff by default (1 second), optional exponential backoff
//!   - Connect timeout treated like a dropped connection
//!   - Rejected credentials reported to a logout collaborator, never retried
//!
//! - **Connection Status**:
//!   - Transport phase (CONNECTING, OPEN, CLOSING, CLOSED) and authentication phase tracked separately
//!   - `is_online()` and `recently_active(window)` predicates for liveness indicators
//!   - Terminal failures (`RetriesExhausted`, `AuthenticationRejected`) exposed instead of raised
//!   - Status changes published on a watch channel
//!
//! - **Message Handling**:
//!   - Inbound frames parsed into a tagged union keyed by `type`
//!   - snake_case keys converted to camelCase, date fields converted to UTC instants
//!   - Subscribers notified in registration order, each failure isolated
//!   - Malformed frames dropped and counted, unknown types ignored
//!
//! ## Architecture
//!
//! The lifecycle lives in [`client::Session`], a state machine that performs no I/O: every
//! event goes in as a method call and the side effects come out as [`client::Action`]s.
//! [`client::WebsocketClient`] runs a session on a tokio task and carries those actions out
//! with `tokio-tungstenite`.
//!
//! ## Usage
//!
//! ```no_run
//! use deploy_realtime_rs::client::ClientBuilder;
//! use deploy_realtime_rs::connection::Settings;
//! use deploy_realtime_rs::utils::setup_logger;
//! use tracing::info;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! setup_logger();
//!
//! let client = ClientBuilder::from_settings(&Settings::from_env())
//!     .access_token("token obtained from the login endpoint")
//!     .start()
//!     .await?;
//!
//! let mut messages = client.channel().await?;
//! while let Some(message) = messages.recv().await {
//!     info!("{} update: {:?}", message.kind(), message.fields());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Writing a Subscriber
//!
//! ```
//! use deploy_realtime_rs::message::{CanonicalMessage, MessageKind};
//! use deploy_realtime_rs::subscription::Subscriber;
//! use deploy_realtime_rs::utils::SubscriberError;
//!
//! struct DeploymentStore;
//!
//! impl Subscriber for DeploymentStore {
//!     fn on_message(&self, message: &CanonicalMessage) -> Result<(), SubscriberError> {
//!         if message.kind() != MessageKind::Deployment {
//!             return Ok(());
//!         }
//!         let id = message
//!             .get_i64("id")
//!             .ok_or_else(|| SubscriberError::new("deployment without id"))?;
//!         if message.is_tombstone() {
//!             println!("deployment {} removed", id);
//!         }
//!         Ok(())
//!     }
//!
//!     fn name(&self) -> &str {
//!         "deployments"
//!     }
//! }
//! ```
//!
//! ## Logging
//!
//! The crate logs through `tracing`. Call [`utils::setup_logger`] to install a formatter
//! whose level is taken from the `LOGLEVEL` environment variable.
//!

/// Module containing the session state machine and the websocket client running it.
///
/// This module provides `Session`, `WebsocketClient`, `ClientBuilder` and the client identity.
pub mod client;

/// Module containing connection-related functionality.
///
/// This module provides the connection status, the connection details and options, the
/// deployment settings and the retry primitives.
pub mod connection;

/// Module containing the wire and canonical message types and the normalizer.
pub mod message;

/// Module containing subscription-related functionality.
///
/// This module provides the `Subscriber` trait, a channel-backed subscriber and the
/// dispatcher that fans messages out.
pub mod subscription;

/// Module containing utility functions and error types.
///
/// This module provides the error types, logger setup and signal handling helpers.
pub mod utils;

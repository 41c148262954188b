/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/

//! Error types shared by the session core and the websocket driver.

/// Errors surfaced to callers of the client API.
#[derive(Debug, thiserror::Error)]
pub enum WebsocketError {
    /// The websocket base URL could not be used as a transport address.
    #[error("Invalid websocket URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL as supplied by the caller
        url: String,
        /// Why it was rejected
        reason: String,
    },
    /// The connection options failed validation.
    #[error("Invalid connection options: {0}")]
    InvalidOptions(String),
    /// A frame could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The background session task is gone.
    #[error("Client task has stopped")]
    ClientClosed,
}

/// Reasons an inbound frame is rejected before it reaches any handler.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame is not valid JSON.
    #[error("Frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The frame is JSON, but not an object.
    #[error("Frame is not a JSON object")]
    NotAnObject,
    /// The frame has no string `type` field.
    #[error("Frame has no 'type' discriminator")]
    MissingDiscriminator,
    /// An `authentication` frame without a usable `status`.
    #[error("Invalid authentication frame: {0}")]
    InvalidAuthentication(String),
}

/// Error reported by a subscriber while handling a message.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct SubscriberError(pub String);

impl SubscriberError {
    /// Creates a subscriber error from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

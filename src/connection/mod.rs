/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/

mod details;
/// Retry budget, backoff schedule and session counters.
pub mod management;
mod options;
mod state;

pub use self::details::{
    ConnectionDetails, DEVELOPMENT_API_URL, DEVELOPMENT_WEBSOCKET_URL, DeploymentMode, Settings,
};
pub use self::management::{BackoffPolicy, DisconnectionReason, RetryBudget, SessionMetrics};
pub use self::options::ConnectionOptions;
pub use self::state::{
    AuthenticationPhase, ConnectionPhase, ConnectionStatus, HandlingStage, SessionFailure,
    StatusHandle,
};

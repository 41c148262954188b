/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/

/// Module containing custom error types used throughout the library.
///
/// This module provides the error types for invalid configuration, transport failures,
/// malformed inbound frames and failing subscribers.
pub mod error;
mod util;

mod logger;

pub use error::{FrameError, SubscriberError, WebsocketError};
pub use logger::{setup_logger, setup_logger_with_level};
pub(crate) use util::join_path;
pub use util::setup_signal_hook;

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/
use std::env;
use std::sync::Once;
use tracing::{Level, debug};
use tracing_subscriber::FmtSubscriber;

static INIT: Once = Once::new();

/// Maps a level name to a tracing `Level`, defaulting to `INFO`.
fn parse_level(name: &str) -> Level {
    match name.to_uppercase().as_str() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "WARN" => Level::WARN,
        "ERROR" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Installs the global tracing subscriber, reading the level from `LOGLEVEL`.
///
/// Calling it more than once is harmless; only the first call installs anything.
pub fn setup_logger() {
    let level = env::var("LOGLEVEL").unwrap_or_else(|_| "INFO".to_string());
    setup_logger_with_level(parse_level(&level));
}

/// Installs the global tracing subscriber with an explicit level.
pub fn setup_logger_with_level(level: Level) {
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder().with_max_level(level).finish();

        // Another subscriber may already be installed by the host application.
        if tracing::subscriber::set_global_default(subscriber).is_ok() {
            debug!("Log level set to: {}", level);
        }
    });
}

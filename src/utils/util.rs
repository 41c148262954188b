use signal_hook::low_level::signal_name;
use signal_hook::{consts::SIGINT, consts::SIGTERM, iterator::Signals};
use std::io;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// Sets up a signal hook for SIGINT and SIGTERM.
///
/// Registers the signals and waits for the first one on a dedicated thread. When a
/// signal arrives it is logged and `shutdown_signal` is notified, so the owner can
/// disconnect cleanly.
///
/// # Errors
///
/// Returns the I/O error raised if the signal handlers cannot be registered.
pub fn setup_signal_hook(shutdown_signal: Arc<Notify>) -> io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!("Received signal: {}", signal_name(signal).unwrap_or("unknown"));
            shutdown_signal.notify_one();
        }
    });
    Ok(())
}

/// Joins a base address and a single path segment with exactly one `/`.
pub(crate) fn join_path(base: &str, segment: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod join_path_tests {
        use super::*;

        #[test]
        fn test_join_path_basic() {
            assert_eq!(
                join_path("ws://localhost:8000/deployments/ws", "abc"),
                "ws://localhost:8000/deployments/ws/abc"
            );
        }

        #[test]
        fn test_join_path_trailing_slash() {
            assert_eq!(join_path("ws://host/ws/", "abc"), "ws://host/ws/abc");
            assert_eq!(join_path("ws://host/ws//", "abc"), "ws://host/ws/abc");
        }
    }
}

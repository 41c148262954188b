use deploy_realtime_rs::client::{AuthenticationHandler, ClientBuilder};
use deploy_realtime_rs::connection::{ConnectionStatus, Settings};
use deploy_realtime_rs::message::{CanonicalMessage, MessageKind};
use deploy_realtime_rs::utils::{setup_logger, setup_signal_hook};
use std::env;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Stops the demo when the server rejects the token.
struct StopOnLogout {
    shutdown: Arc<Notify>,
}

impl AuthenticationHandler for StopOnLogout {
    fn logout(&self, detail: Option<&str>) {
        error!(
            "Access token rejected ({}), log in again",
            detail.unwrap_or("no detail")
        );
        self.shutdown.notify_one();
    }
}

/// Watches the deployment realtime channel and logs every event.
///
/// Addresses come from `DEPLOY_MODE` and the `DEPLOY_*_URL_*` variables, the token
/// from `DEPLOY_ACCESS_TOKEN`. Stop with Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logger();

    let settings = Settings::from_env();
    let access_token = env::var("DEPLOY_ACCESS_TOKEN")
        .map_err(|_| "DEPLOY_ACCESS_TOKEN must be set to a valid access token")?;
    info!(
        "Connecting to {} ({:?} mode)",
        settings.websocket_base_url, settings.mode
    );

    let shutdown_signal = Arc::new(Notify::new());
    setup_signal_hook(shutdown_signal.clone())?;

    let builder = ClientBuilder::from_settings(&settings)
        .access_token(access_token)
        .authentication_handler(Arc::new(StopOnLogout {
            shutdown: shutdown_signal.clone(),
        }));
    let details = builder.details()?;
    let client = builder.build()?;

    // Register before connecting so no event is missed.
    let mut messages = client.channel().await?;
    let mut status = client.status();
    client.connect_with(details).await?;

    loop {
        tokio::select! {
            _ = shutdown_signal.notified() => {
                info!("Shutting down");
                break;
            }
            changed = status.changed() => match changed {
                Ok(current) => report_status(&current),
                Err(_) => break,
            },
            message = messages.recv() => match message {
                Some(message) => report_message(&message),
                None => break,
            },
        }
    }

    client.shutdown().await;
    Ok(())
}

fn report_status(status: &ConnectionStatus) {
    info!(
        "Status: {} / {} (retries: {})",
        status.connection(),
        status.authentication(),
        status.retry_attempts()
    );
    if let Some(failure) = status.failure() {
        warn!("Session stopped retrying: {:?}", failure);
    }
}

fn report_message(message: &CanonicalMessage) {
    let id = message.get_i64("id").unwrap_or_default();
    match message.kind() {
        MessageKind::Warning => warn!(
            "Server warning: {}",
            message.get_str("detail").unwrap_or("no detail")
        ),
        kind if message.is_tombstone() => info!("{} {} deleted", kind, id),
        kind => info!("{} {}: {:?}", kind, id, message.fields()),
    }
}

use anyhow::Context;
use notification_realtime::{
    logging, metrics, Config, NotificationSession, SessionDeps, SessionIdentity, SystemEvent,
};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    let identity = SessionIdentity {
        user_id: std::env::var("SESSION_USER_ID").context("SESSION_USER_ID must be set")?,
        token: std::env::var("SESSION_TOKEN").context("SESSION_TOKEN must be set")?,
        premium: std::env::var("SESSION_PREMIUM")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false),
    };

    tracing::info!(
        user_id = %identity.user_id,
        api = %config.api.base_url,
        "Starting notification realtime session"
    );

    let deps = SessionDeps::from_config(&config, &identity.token);
    let session = NotificationSession::new(identity, deps, &config);
    let mut events = session.events();
    session.start().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, logging out");
                break;
            }
            event = events.recv() => match event {
                Ok(SystemEvent::SessionTerminated { reason }) => {
                    tracing::warn!(%reason, "Session terminated by administrator");
                    break;
                }
                Ok(SystemEvent::ResourceRemoved { resource_type, resource_id, message }) => {
                    tracing::info!(%resource_type, %resource_id, %message, "Resource removed");
                }
                Ok(SystemEvent::ConnectionStateChanged { channel, state }) => {
                    tracing::debug!(%channel, %state, "Connection state changed");
                }
                Ok(SystemEvent::ChannelExhausted { channel, attempts }) => {
                    tracing::error!(%channel, attempts, "Live push unavailable, manual refresh only");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "System event consumer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    session.logout().await;
    tracing::debug!(metrics = %metrics::render(), "Final metrics");
    Ok(())
}

/// Push channel transport
///
/// The orchestrator only needs "open a channel, get an ordered stream of text
/// frames". [`WebSocketTransport`] is the production implementation; tests
/// script the stream directly.
use crate::error::TransportError;
use crate::models::ChannelKind;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;

/// Ordered text frames from one channel. The stream ending means the server closed it.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Open (subscribe to) a channel. Authorization or entitlement rejections
    /// must come back as [`TransportError::Subscription`].
    async fn open(&self, channel: ChannelKind) -> Result<FrameStream, TransportError>;
}

pub struct WebSocketTransport {
    admin_url: String,
    notifications_url: String,
    token: String,
}

impl WebSocketTransport {
    pub fn new(
        admin_url: impl Into<String>,
        notifications_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            admin_url: admin_url.into(),
            notifications_url: notifications_url.into(),
            token: token.into(),
        }
    }

    fn url_for(&self, channel: ChannelKind) -> String {
        let base = match channel {
            ChannelKind::AdminActions => &self.admin_url,
            ChannelKind::Notifications => &self.notifications_url,
        };
        let separator = if base.contains('?') { '&' } else { '?' };
        format!(
            "{base}{separator}token={}",
            urlencoding::encode(&self.token)
        )
    }
}

#[async_trait]
impl ChannelTransport for WebSocketTransport {
    async fn open(&self, channel: ChannelKind) -> Result<FrameStream, TransportError> {
        let url = self.url_for(channel);
        let (socket, response) = connect_async(url).await.map_err(map_connect_error)?;
        debug!(%channel, status = %response.status(), "push channel handshake complete");

        let frames = socket
            .take_while(|message| {
                let open = !matches!(message, Ok(Message::Close(_)));
                async move { open }
            })
            .filter_map(|message| async move {
                match message {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(Message::Binary(bytes)) => {
                        Some(Ok(String::from_utf8_lossy(&bytes).into_owned()))
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::Transport(e.to_string()))),
                }
            });

        Ok(frames.boxed())
    }
}

fn map_connect_error(e: WsError) -> TransportError {
    match e {
        WsError::Url(url_error) => TransportError::Subscription(url_error.to_string()),
        WsError::Http(response) if response.status().is_client_error() => {
            TransportError::Subscription(format!("handshake rejected with {}", response.status()))
        }
        other => TransportError::Transport(other.to_string()),
    }
}

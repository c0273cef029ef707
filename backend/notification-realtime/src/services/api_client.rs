/// REST-style notification API
///
/// The list, counter and match-check endpoints live in an external service;
/// this module only speaks to them. [`NotificationApi`] is the seam the store
/// and the match poller depend on, [`HttpNotificationApi`] the production
/// implementation on top of reqwest.
use crate::error::ApiError;
use crate::metrics;
use crate::models::{Notification, NotificationPage};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn fetch_notifications(&self) -> Result<NotificationPage, ApiError>;

    async fn fetch_unread_count(&self) -> Result<u64, ApiError>;

    async fn mark_read(&self, id: &str) -> Result<(), ApiError>;

    async fn mark_all_read(&self) -> Result<(), ApiError>;

    async fn delete_notification(&self, id: &str) -> Result<(), ApiError>;

    async fn clear_all_notifications(&self) -> Result<(), ApiError>;

    /// Poll path for sessions without the personalized push channel
    async fn check_for_matches(&self) -> Result<Vec<Notification>, ApiError>;
}

pub struct HttpNotificationApi {
    client: Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl HttpNotificationApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            timeout,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    /// Send with timeout, record latency, and turn non-2xx into `ApiError::Status`
    async fn send(&self, operation: &'static str, request: RequestBuilder) -> Result<String, ApiError> {
        let start = Instant::now();
        let result = self.send_inner(request).await;
        metrics::observe_api_call(operation, result.is_ok(), start.elapsed());

        if let Err(e) = &result {
            warn!(operation, error = %e, "notification API call failed");
        }
        result
    }

    async fn send_inner(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let response = resilience::with_timeout(self.timeout, request.send()).await??;
        let status = response.status();
        let body = resilience::with_timeout(self.timeout, response.text()).await??;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn send_json(&self, operation: &'static str, request: RequestBuilder) -> Result<Value, ApiError> {
        let body = self.send(operation, request).await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn fetch_notifications(&self) -> Result<NotificationPage, ApiError> {
        let body = self
            .send_json("fetch_notifications", self.request(Method::GET, "/api/notifications"))
            .await?;
        parse_page(&body)
    }

    async fn fetch_unread_count(&self) -> Result<u64, ApiError> {
        let body = self
            .send_json(
                "fetch_unread_count",
                self.request(Method::GET, "/api/notifications/unread-count"),
            )
            .await?;
        parse_count(&body).ok_or_else(|| ApiError::Decode(format!("no unread count in {body}")))
    }

    async fn mark_read(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("/api/notifications/{}/read", urlencoding::encode(id));
        self.send("mark_read", self.request(Method::PUT, &path))
            .await
            .map(drop)
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.send(
            "mark_all_read",
            self.request(Method::PUT, "/api/notifications/read-all"),
        )
        .await
        .map(drop)
    }

    async fn delete_notification(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("/api/notifications/{}", urlencoding::encode(id));
        self.send("delete_notification", self.request(Method::DELETE, &path))
            .await
            .map(drop)
    }

    async fn clear_all_notifications(&self) -> Result<(), ApiError> {
        self.send(
            "clear_all_notifications",
            self.request(Method::DELETE, "/api/notifications"),
        )
        .await
        .map(drop)
    }

    async fn check_for_matches(&self) -> Result<Vec<Notification>, ApiError> {
        let body = self
            .send_json("check_for_matches", self.request(Method::GET, "/api/jobs/match-check"))
            .await?;
        let items = match &body {
            Value::Array(_) => parse_items(&body),
            other => item_array(other).map(parse_items).unwrap_or_default(),
        };
        Ok(items)
    }
}

/// Lists arrive as `items`, `notifications` or a paged `content` array
fn item_array(body: &Value) -> Option<&Value> {
    ["items", "notifications", "content"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find(|v| v.is_array())
}

fn parse_items(items: &Value) -> Vec<Notification> {
    items
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|raw| match Notification::from_loose_json(raw) {
                    Ok(n) => Some(n),
                    Err(e) => {
                        debug!(error = %e, "skipping malformed notification in response");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_count(body: &Value) -> Option<u64> {
    match body {
        Value::Number(n) => n.as_u64(),
        Value::Object(_) => ["count", "unreadCount", "unread_count"]
            .iter()
            .filter_map(|key| body.get(*key))
            .find_map(Value::as_u64),
        _ => None,
    }
}

fn parse_page(body: &Value) -> Result<NotificationPage, ApiError> {
    let items = match body {
        Value::Array(_) => parse_items(body),
        Value::Object(_) => parse_items(
            item_array(body)
                .ok_or_else(|| ApiError::Decode("response has no notification list".into()))?,
        ),
        _ => return Err(ApiError::Decode(format!("unexpected response: {body}"))),
    };

    // Servers that omit the counter get one derived from the page
    let unread_count = parse_count(body)
        .unwrap_or_else(|| items.iter().filter(|n| !n.read).count() as u64);

    Ok(NotificationPage {
        items,
        unread_count,
    })
}

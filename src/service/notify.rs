use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{NotificationMode, NotificationsConfig};
use crate::error::{Result, ServiceError};
use crate::http_client::client_for_url_with_timeout;
use crate::store::{Question, UserId};

/// Side effects fired after support messages change. Implementations must
/// not fail the operation that triggered them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn question_created(&self, question: &Question);
    async fn question_answered(&self, user_id: &UserId, answer: &str);
}

pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn question_created(&self, _question: &Question) {}
    async fn question_answered(&self, _user_id: &UserId, _answer: &str) {}
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn question_created(&self, question: &Question) {
        tracing::info!(
            id = %question.id,
            username = %question.username,
            "New support question: {}",
            question.message
        );
    }

    async fn question_answered(&self, user_id: &UserId, answer: &str) {
        tracing::info!(user_id = %user_id, "Question answered: {}", answer);
    }
}

/// Posts to the chat bot's `/webhook_question` and `/webhook_answer`.
pub struct WebhookNotifier {
    client: reqwest::Client,
    base_url: String,
}

impl WebhookNotifier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = client_for_url_with_timeout(&base_url, timeout)?;
        Ok(Self { client, base_url })
    }

    async fn post(&self, path: &str, payload: serde_json::Value) {
        let url = format!("{}/{}", self.base_url, path);
        match self.client.post(&url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("Webhook {} delivered", path);
            }
            Ok(resp) => {
                tracing::warn!("Webhook {} answered {}", path, resp.status());
            }
            Err(e) => {
                tracing::error!("Webhook {} failed: {}", path, e);
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn question_created(&self, question: &Question) {
        let payload = json!({
            "user_id": question.user_id,
            "username": question.username,
            "message": question.message,
            "file_url": question.file_url,
        });
        self.post("webhook_question", payload).await;
    }

    async fn question_answered(&self, user_id: &UserId, answer: &str) {
        let payload = json!({ "user_id": user_id, "answer": answer });
        self.post("webhook_answer", payload).await;
    }
}

pub fn notifier_from_config(config: &NotificationsConfig) -> Result<Arc<dyn Notifier>> {
    let notifier: Arc<dyn Notifier> = match config.mode {
        NotificationMode::None => Arc::new(NoopNotifier),
        NotificationMode::Log => Arc::new(LogNotifier),
        NotificationMode::Webhook => {
            let url = config.webhook_url.as_deref().ok_or_else(|| {
                ServiceError::Config("notifications.webhook_url is not set".into())
            })?;
            Arc::new(WebhookNotifier::new(
                url,
                Duration::from_secs(config.timeout_secs),
            )?)
        }
    };
    Ok(notifier)
}

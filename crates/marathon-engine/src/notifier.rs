use anyhow::Context;
use async_trait::async_trait;
use marathon_types::events::Reminder;
use tracing::info;

/// Delivers stall reminders. Rendering and transport belong to the
/// implementation; the evaluator only needs to know whether it worked.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, reminder: &Reminder) -> anyhow::Result<()>;
}

/// Writes reminders to the log. Used when no delivery endpoint is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, reminder: &Reminder) -> anyhow::Result<()> {
        info!(
            user_id = %reminder.user_id,
            target = reminder.notification_target.as_deref().unwrap_or("-"),
            activities = ?reminder.activities,
            "Reminder"
        );
        Ok(())
    }
}

/// POSTs each reminder as JSON to a delivery service (e.g. the chat bot).
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, reminder: &Reminder) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(reminder)
            .send()
            .await
            .with_context(|| format!("POST {}", self.url))?
            .error_for_status()
            .context("reminder webhook rejected the request")?;
        Ok(())
    }
}

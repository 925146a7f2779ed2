use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::Notification;

/// Delivery side of the notification boundary. Implementations may fail; the
/// dispatcher logs and drops failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: &Notification) -> anyhow::Result<()> {
        tracing::info!(
            user_id = %n.user_id,
            kind = ?n.kind,
            booking_id = ?n.related_booking_id,
            title = %n.title,
            "notification"
        );
        Ok(())
    }
}

pub struct WebhookNotifier {
    url: String,
    secret: String,
    client: reqwest::Client,
}

/// Upper bound on a single webhook delivery; the dispatcher handles one notification at a time.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

impl WebhookNotifier {
    pub fn new(url: String, secret: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .context("failed to build webhook client")?;
        Ok(Self {
            url,
            secret,
            client,
        })
    }
}

/// Base64 HMAC-SHA1 of the request body, sent as `X-Signature`.
pub fn sign_payload(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, n: &Notification) -> anyhow::Result<()> {
        let body = serde_json::to_vec(n).context("failed to encode notification")?;

        let mut req = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if !self.secret.is_empty() {
            if let Some(signature) = sign_payload(&self.secret, &body) {
                req = req.header("X-Signature", signature);
            }
        }

        req.body(body)
            .send()
            .await
            .context("failed to deliver notification")?
            .error_for_status()
            .context("notification webhook returned error")?;

        Ok(())
    }
}

/// Producer handle held by the scheduling services. Sending never blocks and never fails
/// the caller.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, notification: Notification) {
        let user_id = notification.user_id.clone();
        if self.tx.send(notification).is_err() {
            tracing::warn!(user_id = %user_id, "notification dropped: dispatcher is not running");
        }
    }
}

pub fn spawn_dispatcher(
    mut rx: mpsc::UnboundedReceiver<Notification>,
    notifier: Arc<dyn Notifier>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            if let Err(e) = notifier.notify(&notification).await {
                tracing::warn!(
                    error = %e,
                    user_id = %notification.user_id,
                    kind = ?notification.kind,
                    "failed to deliver notification"
                );
            }
        }
        tracing::debug!("notification dispatcher stopped");
    })
}

//! Web push delivery for admin broadcasts.
//!
//! Payloads are encrypted with `aes128gcm` and signed with the VAPID private
//! key from configuration. Subscriptions whose push service reports the
//! endpoint as gone are removed after each broadcast.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, SubscriptionKeys,
    VapidSignatureBuilder, WebPushClient, WebPushError, WebPushMessageBuilder,
};

use peopole_core::config::PushConfig;
use peopole_core::{PeopoleError, Result};
use peopole_storage::{PushSubscription, PushSubscriptionStore};

/// Notification shown by the service worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    /// URL opened when the notification is clicked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Why a single delivery failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The push service no longer knows the endpoint (404/410).
    #[error("subscription endpoint is gone")]
    Gone,
    #[error("push delivery failed: {0}")]
    Failed(String),
}

/// Delivers one encrypted payload to one browser subscription.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> std::result::Result<(), DeliveryError>;
}

/// [`PushSender`] backed by the `web-push` crate.
pub struct WebPushSender {
    private_key_pem: String,
    subject: Option<String>,
    client: IsahcWebPushClient,
}

impl WebPushSender {
    pub fn new(config: &PushConfig) -> Result<Self> {
        let private_key_pem = config
            .vapid_private_key_pem
            .clone()
            .ok_or_else(|| PeopoleError::Push("VAPID private key is not configured".into()))?;
        let client = IsahcWebPushClient::new().map_err(|e| PeopoleError::Push(e.to_string()))?;

        Ok(Self {
            private_key_pem,
            subject: config.subject.clone(),
            client,
        })
    }
}

#[async_trait]
impl PushSender for WebPushSender {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> std::result::Result<(), DeliveryError> {
        let info = SubscriptionInfo {
            endpoint: subscription.endpoint.clone(),
            keys: SubscriptionKeys {
                p256dh: subscription.metadata.keys.p256dh.clone(),
                auth: subscription.metadata.keys.auth.clone(),
            },
        };

        let mut signature = VapidSignatureBuilder::from_pem(self.private_key_pem.as_bytes(), &info)
            .map_err(classify)?;
        if let Some(subject) = &self.subject {
            signature.add_claim("sub", subject.as_str());
        }
        let signature = signature.build().map_err(classify)?;

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_vapid_signature(signature);
        let message = builder.build().map_err(classify)?;

        self.client.send(message).await.map_err(classify)
    }
}

fn classify(err: WebPushError) -> DeliveryError {
    match err {
        WebPushError::EndpointNotValid { .. } | WebPushError::EndpointNotFound { .. } => {
            DeliveryError::Gone
        }
        other => DeliveryError::Failed(other.to_string()),
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReport {
    pub sent: usize,
    /// Subscriptions dropped because their endpoint is gone.
    pub removed: usize,
    pub failed: usize,
}

/// Send `payload` to every stored subscription and prune dead endpoints.
pub async fn broadcast(
    sender: &dyn PushSender,
    store: &PushSubscriptionStore,
    payload: &PushPayload,
) -> Result<BroadcastReport> {
    let subscriptions = store.list().await;
    if subscriptions.is_empty() {
        debug!("No push subscriptions, skipping broadcast");
        return Ok(BroadcastReport::default());
    }

    let body = serde_json::to_vec(payload)?;
    let mut report = BroadcastReport::default();
    let mut gone = Vec::new();

    for subscription in &subscriptions {
        match sender.send(subscription, &body).await {
            Ok(()) => report.sent += 1,
            Err(DeliveryError::Gone) => {
                debug!(endpoint = %subscription.endpoint, "Push endpoint gone");
                gone.push(subscription.endpoint.clone());
            }
            Err(e) => {
                warn!(endpoint = %subscription.endpoint, error = %e, "Push delivery failed");
                report.failed += 1;
            }
        }
    }

    report.removed = store.remove_many(&gone).await?;
    info!(
        sent = report.sent,
        removed = report.removed,
        failed = report.failed,
        "Push broadcast finished"
    );
    Ok(report)
}

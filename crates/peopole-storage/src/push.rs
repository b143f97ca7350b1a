//! Web-push subscriptions (`push_subscriptions.json`).

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use peopole_core::error::Result;
use peopole_core::types::Lang;

use crate::json_file::JsonFile;

/// Browser encryption keys from `PushSubscription.toJSON()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionMetadata {
    pub keys: PushKeys,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<Lang>,
    pub created_at: DateTime<Utc>,
}

/// A stored subscription; `endpoint` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub metadata: SubscriptionMetadata,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct PushData {
    subscriptions: Vec<PushSubscription>,
}

pub struct PushSubscriptionStore {
    file: JsonFile<PushData>,
}

impl PushSubscriptionStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            file: JsonFile::open(path).await?,
        })
    }

    /// Insert or replace the subscription for `endpoint`.
    ///
    /// Returns `true` when the endpoint was new.
    pub async fn upsert(
        &self,
        endpoint: &str,
        keys: PushKeys,
        user_agent: Option<String>,
        lang: Option<Lang>,
    ) -> Result<bool> {
        let subscription = PushSubscription {
            endpoint: endpoint.to_string(),
            metadata: SubscriptionMetadata {
                keys,
                user_agent,
                lang,
                created_at: Utc::now(),
            },
        };

        let created = self
            .file
            .update(move |data| {
                match data
                    .subscriptions
                    .iter_mut()
                    .find(|s| s.endpoint == subscription.endpoint)
                {
                    Some(existing) => {
                        *existing = subscription;
                        false
                    }
                    None => {
                        data.subscriptions.push(subscription);
                        true
                    }
                }
            })
            .await?;
        debug!(endpoint, created, "Push subscription stored");
        Ok(created)
    }

    /// Remove one endpoint; returns whether it was present.
    pub async fn remove(&self, endpoint: &str) -> Result<bool> {
        let removed = self.remove_many(&[endpoint.to_string()]).await?;
        Ok(removed > 0)
    }

    /// Remove every listed endpoint; returns how many were present.
    pub async fn remove_many(&self, endpoints: &[String]) -> Result<usize> {
        if endpoints.is_empty() {
            return Ok(0);
        }
        self.file
            .update(|data| {
                let before = data.subscriptions.len();
                data.subscriptions
                    .retain(|s| !endpoints.iter().any(|e| e == &s.endpoint));
                before - data.subscriptions.len()
            })
            .await
    }

    pub async fn list(&self) -> Vec<PushSubscription> {
        self.file.read(|data| data.subscriptions.clone()).await
    }

    pub async fn len(&self) -> usize {
        self.file.read(|data| data.subscriptions.len()).await
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

//! Widget analytics events and pageview counters (`analytics.json`).

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use peopole_core::error::Result;
use peopole_core::types::{Lang, Stage};

use crate::json_file::JsonFile;

/// Events returned in [`AnalyticsSummary::recent`].
const RECENT_EVENTS: usize = 50;

/// Longest path kept as a pageview key, in characters.
pub const MAX_PATH_CHARS: usize = 256;

/// Distinct paths counted before new ones are folded into [`OTHER_PATHS`].
pub const MAX_PAGEVIEW_PATHS: usize = 1000;

/// Pageview key for paths seen after the map is full.
pub const OTHER_PATHS: &str = "(other)";

/// One recorded widget event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<Lang>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Input for [`AnalyticsLog::log_event`], as posted by the widget.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewEvent {
    pub name: String,
    pub path: Option<String>,
    pub stage: Option<Stage>,
    pub lang: Option<Lang>,
    pub data: Option<Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct AnalyticsData {
    events: Vec<AnalyticsEvent>,
    pageviews: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_events: usize,
    pub by_name: BTreeMap<String, u64>,
    pub pageviews: BTreeMap<String, u64>,
    pub total_pageviews: u64,
    pub recent: Vec<AnalyticsEvent>,
}

pub struct AnalyticsLog {
    file: JsonFile<AnalyticsData>,
    max_events: usize,
}

impl AnalyticsLog {
    pub async fn open(path: impl Into<PathBuf>, max_events: usize) -> Result<Self> {
        let file = JsonFile::open(path).await?;
        Ok(Self {
            file,
            max_events: max_events.max(1),
        })
    }

    /// Prepend an event, dropping the oldest beyond the cap.
    ///
    /// A blank name is stored as `unknown`.
    pub async fn log_event(&self, event: NewEvent) -> Result<AnalyticsEvent> {
        let name = event.name.trim();
        let record = AnalyticsEvent {
            id: Uuid::new_v4().to_string(),
            name: if name.is_empty() {
                "unknown".to_string()
            } else {
                name.to_string()
            },
            path: event.path.filter(|p| !p.is_empty()),
            stage: event.stage,
            lang: event.lang,
            data: event.data.filter(|d| !d.is_null()),
            timestamp: Utc::now(),
        };
        let max = self.max_events;

        let stored = record.clone();
        self.file
            .update(move |data| {
                data.events.insert(0, stored);
                data.events.truncate(max);
            })
            .await?;
        Ok(record)
    }

    /// Count one view of `path`; a blank path counts as `/`.
    ///
    /// Paths are cut to [`MAX_PATH_CHARS`]. Once [`MAX_PAGEVIEW_PATHS`]
    /// distinct paths exist, unseen ones are counted under [`OTHER_PATHS`].
    pub async fn log_pageview(&self, path: &str) -> Result<u64> {
        let key = match path.trim() {
            "" => "/".to_string(),
            p => p.chars().take(MAX_PATH_CHARS).collect(),
        };
        self.file
            .update(move |data| {
                let key = if data.pageviews.contains_key(&key)
                    || data.pageviews.len() < MAX_PAGEVIEW_PATHS
                {
                    key
                } else {
                    OTHER_PATHS.to_string()
                };
                let count = data.pageviews.entry(key).or_default();
                *count += 1;
                *count
            })
            .await
    }

    pub async fn summary(&self) -> AnalyticsSummary {
        self.file
            .read(|data| {
                let mut by_name: BTreeMap<String, u64> = BTreeMap::new();
                for event in &data.events {
                    *by_name.entry(event.name.clone()).or_default() += 1;
                }
                AnalyticsSummary {
                    total_events: data.events.len(),
                    by_name,
                    pageviews: data.pageviews.clone(),
                    total_pageviews: data.pageviews.values().sum(),
                    recent: data.events.iter().take(RECENT_EVENTS).cloned().collect(),
                }
            })
            .await
    }

    pub async fn reset(&self) -> Result<()> {
        self.file
            .update(|data| {
                *data = AnalyticsData::default();
            })
            .await?;
        info!("Analytics log reset");
        Ok(())
    }
}

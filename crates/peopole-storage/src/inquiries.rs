//! First-contact inquiry log and rollup counters (`inquiries.json`).

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use peopole_core::error::Result;
use peopole_core::types::{InquirySource, Lang, Stage};

use crate::json_file::JsonFile;

/// Characters of the first message kept as a preview.
pub const PREVIEW_CHARS: usize = 150;

/// Days covered by the daily series in [`StatsSummary`].
const DAILY_WINDOW_DAYS: i64 = 14;

const DEFAULT_PAGE_SIZE: usize = 25;
const MAX_PAGE_SIZE: usize = 200;

/// One persisted first-contact inquiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InquiryRecord {
    pub id: String,
    pub user_id: Option<String>,
    pub stage: Stage,
    pub lang: Lang,
    pub source: InquirySource,
    pub preview: String,
    pub timestamp: DateTime<Utc>,
    pub ip: String,
}

/// Input for [`InquiryLog::log_inquiry`].
#[derive(Debug, Clone)]
pub struct NewInquiry {
    pub user_id: Option<String>,
    pub stage: Stage,
    pub lang: Lang,
    pub source: InquirySource,
    pub message: String,
    pub ip: String,
}

/// Monotonic rollup counters, cleared only by [`InquiryLog::reset`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub total: u64,
    pub by_stage: BTreeMap<String, u64>,
    pub by_lang: BTreeMap<String, u64>,
    pub daily: BTreeMap<String, u64>,
    pub sources: BTreeMap<String, u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct InquiryData {
    inquiries: Vec<InquiryRecord>,
    stats: Stats,
}

/// Filters for [`InquiryLog::list`]; `None` matches everything.
#[derive(Debug, Clone, Default)]
pub struct InquiryFilter {
    pub stage: Option<Stage>,
    pub lang: Option<Lang>,
    pub source: Option<InquirySource>,
}

impl InquiryFilter {
    fn matches(&self, record: &InquiryRecord) -> bool {
        self.stage.is_none_or(|s| s == record.stage)
            && self.lang.is_none_or(|l| l == record.lang)
            && self.source.is_none_or(|s| s == record.source)
    }
}

/// One page of inquiries, most recent first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InquiryPage {
    pub inquiries: Vec<InquiryRecord>,
    pub total: usize,
    pub page: usize,
    pub pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCount {
    pub id: String,
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCount {
    /// `MM-DD`.
    pub date: String,
    pub count: u64,
}

/// Dashboard view of [`Stats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total: u64,
    pub today: u64,
    pub total_en: u64,
    pub total_bn: u64,
    pub stage_breakdown: Vec<StageCount>,
    pub daily: Vec<DailyCount>,
    pub sources: BTreeMap<String, u64>,
    pub recent_count: usize,
}

/// Append-only inquiry log capped to the most recent `max_records`.
pub struct InquiryLog {
    file: JsonFile<InquiryData>,
    max_records: usize,
}

impl InquiryLog {
    pub async fn open(path: impl Into<PathBuf>, max_records: usize) -> Result<Self> {
        let file = JsonFile::open(path).await?;
        Ok(Self {
            file,
            max_records: max_records.max(1),
        })
    }

    /// Record an inquiry stamped with the current time.
    pub async fn log_inquiry(&self, inquiry: NewInquiry) -> Result<InquiryRecord> {
        self.log_inquiry_at(inquiry, Utc::now()).await
    }

    /// Record an inquiry stamped with `now`.
    ///
    /// The record is prepended, the list truncated to the cap, and every
    /// counter incremented in the same write.
    pub async fn log_inquiry_at(
        &self,
        inquiry: NewInquiry,
        now: DateTime<Utc>,
    ) -> Result<InquiryRecord> {
        let record = InquiryRecord {
            id: Uuid::new_v4().to_string(),
            user_id: inquiry.user_id,
            stage: inquiry.stage,
            lang: inquiry.lang,
            source: inquiry.source,
            preview: inquiry.message.trim().chars().take(PREVIEW_CHARS).collect(),
            timestamp: now,
            ip: normalize_ip(&inquiry.ip),
        };
        let day = day_key(now.date_naive());
        let stage = record.stage.key().to_string();
        let lang = record.lang.code().to_string();
        let source = record.source.as_str().to_string();
        let max = self.max_records;

        let stored = record.clone();
        self.file
            .update(move |data| {
                data.inquiries.insert(0, stored);
                data.inquiries.truncate(max);

                let stats = &mut data.stats;
                stats.total += 1;
                *stats.by_stage.entry(stage).or_default() += 1;
                *stats.by_lang.entry(lang).or_default() += 1;
                *stats.daily.entry(day).or_default() += 1;
                *stats.sources.entry(source).or_default() += 1;
            })
            .await?;

        Ok(record)
    }

    /// Raw counters.
    pub async fn raw_stats(&self) -> Stats {
        self.file.read(|data| data.stats.clone()).await
    }

    pub async fn stats(&self) -> StatsSummary {
        self.stats_at(Utc::now().date_naive()).await
    }

    /// Dashboard summary relative to `today`.
    pub async fn stats_at(&self, today: NaiveDate) -> StatsSummary {
        self.file
            .read(|data| {
                let stats = &data.stats;

                let mut stage_breakdown: Vec<StageCount> = stats
                    .by_stage
                    .iter()
                    .map(|(id, count)| StageCount {
                        id: id.clone(),
                        name: stage_name(id),
                        count: *count,
                    })
                    .collect();
                stage_breakdown.sort_by(|a, b| b.count.cmp(&a.count).then(a.id.cmp(&b.id)));

                let daily = (0..DAILY_WINDOW_DAYS)
                    .rev()
                    .map(|offset| {
                        let date = today - Duration::days(offset);
                        DailyCount {
                            date: date.format("%m-%d").to_string(),
                            count: stats.daily.get(&day_key(date)).copied().unwrap_or(0),
                        }
                    })
                    .collect();

                StatsSummary {
                    total: stats.total,
                    today: stats.daily.get(&day_key(today)).copied().unwrap_or(0),
                    total_en: stats.by_lang.get("en").copied().unwrap_or(0),
                    total_bn: stats.by_lang.get("bn").copied().unwrap_or(0),
                    stage_breakdown,
                    daily,
                    sources: stats.sources.clone(),
                    recent_count: data.inquiries.len(),
                }
            })
            .await
    }

    /// List inquiries matching `filter`, most recent first.
    ///
    /// `page` is 1-based; `page_size` defaults to 25 and is capped at 200.
    pub async fn list(
        &self,
        filter: &InquiryFilter,
        page: Option<usize>,
        page_size: Option<usize>,
    ) -> InquiryPage {
        let page = page.unwrap_or(1).max(1);
        let size = page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        self.file
            .read(|data| {
                let matching: Vec<&InquiryRecord> = data
                    .inquiries
                    .iter()
                    .filter(|r| filter.matches(r))
                    .collect();
                let total = matching.len();
                let inquiries = matching
                    .into_iter()
                    .skip((page - 1).saturating_mul(size))
                    .take(size)
                    .cloned()
                    .collect();

                InquiryPage {
                    inquiries,
                    total,
                    page,
                    pages: total.div_ceil(size),
                }
            })
            .await
    }

    pub async fn len(&self) -> usize {
        self.file.read(|data| data.inquiries.len()).await
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every record and zero every counter.
    pub async fn reset(&self) -> Result<()> {
        self.file
            .update(|data| {
                *data = InquiryData::default();
            })
            .await?;
        info!("Inquiry log reset");
        Ok(())
    }
}

fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn stage_name(id: &str) -> String {
    match id.parse::<Stage>() {
        Ok(stage) => stage.label().to_string(),
        Err(()) => format!("Stage {}", id),
    }
}

/// First hop of a forwarded-for list, or `unknown`.
pub fn normalize_ip(raw: &str) -> String {
    raw.split(',')
        .next()
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn open_log(max: usize) -> (tempfile::TempDir, InquiryLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = InquiryLog::open(dir.path().join("inquiries.json"), max)
            .await
            .unwrap();
        (dir, log)
    }

    fn inquiry(message: &str, stage: Stage, lang: Lang, source: InquirySource) -> NewInquiry {
        NewInquiry {
            user_id: Some("u-1".to_string()),
            stage,
            lang,
            source,
            message: message.to_string(),
            ip: "203.0.113.7, 10.0.0.1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_log_inquiry_builds_record() {
        let (_dir, log) = open_log(2000).await;
        let long = "x".repeat(400);
        let record = log
            .log_inquiry(inquiry(&long, Stage::Masters, Lang::Bn, InquirySource::Ai))
            .await
            .unwrap();

        assert_eq!(record.preview.chars().count(), PREVIEW_CHARS);
        assert_eq!(record.ip, "203.0.113.7");
        assert_eq!(record.stage, Stage::Masters);
        assert_eq!(record.source, InquirySource::Ai);
        assert_eq!(log.len().await, 1);
    }

    #[tokio::test]
    async fn test_preview_counts_characters_not_bytes() {
        let (_dir, log) = open_log(10).await;
        let bengali = "আমি".repeat(100);
        let record = log
            .log_inquiry(inquiry(&bengali, Stage::Unknown, Lang::Bn, InquirySource::Faq))
            .await
            .unwrap();
        assert_eq!(record.preview.chars().count(), PREVIEW_CHARS);
    }

    #[tokio::test]
    async fn test_counters_increment() {
        let (_dir, log) = open_log(2000).await;
        log.log_inquiry(inquiry("a", Stage::Strategic, Lang::En, InquirySource::Faq))
            .await
            .unwrap();
        log.log_inquiry(inquiry("b", Stage::Strategic, Lang::Bn, InquirySource::Fallback))
            .await
            .unwrap();
        log.log_inquiry(inquiry("c", Stage::Unknown, Lang::En, InquirySource::Ai))
            .await
            .unwrap();

        let stats = log.raw_stats().await;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_stage.get("3"), Some(&2));
        assert_eq!(stats.by_stage.get("unknown"), Some(&1));
        assert_eq!(stats.by_lang.get("en"), Some(&2));
        assert_eq!(stats.by_lang.get("bn"), Some(&1));
        assert_eq!(stats.sources.get("faq"), Some(&1));
        assert_eq!(stats.sources.get("ai"), Some(&1));
        assert_eq!(stats.sources.get("fallback"), Some(&1));
        assert_eq!(stats.daily.values().sum::<u64>(), 3);
    }

    #[tokio::test]
    async fn test_cap_keeps_most_recent_first() {
        let (_dir, log) = open_log(50).await;
        for i in 0..51 {
            log.log_inquiry(inquiry(
                &format!("message {}", i),
                Stage::Foundation,
                Lang::En,
                InquirySource::Ai,
            ))
            .await
            .unwrap();
        }

        assert_eq!(log.len().await, 50);
        let page = log.list(&InquiryFilter::default(), Some(1), Some(200)).await;
        assert_eq!(page.inquiries.len(), 50);
        assert_eq!(page.inquiries[0].preview, "message 50");
        assert_eq!(page.inquiries[49].preview, "message 1");
        // Counters are never truncated.
        assert_eq!(log.raw_stats().await.total, 51);
    }

    #[tokio::test]
    async fn test_default_cap_drops_oldest_of_2001() {
        let cap = peopole_core::config::StorageConfig::default().max_inquiries;
        assert_eq!(cap, 2000);

        let (_dir, log) = open_log(cap).await;
        for i in 0..=cap {
            log.log_inquiry(inquiry(
                &format!("message {}", i),
                Stage::Unknown,
                Lang::En,
                InquirySource::Faq,
            ))
            .await
            .unwrap();
        }

        assert_eq!(log.len().await, 2000);
        let page = log.list(&InquiryFilter::default(), Some(1), Some(200)).await;
        assert_eq!(page.total, 2000);
        assert_eq!(page.inquiries[0].preview, "message 2000");

        let last = log.list(&InquiryFilter::default(), Some(10), Some(200)).await;
        assert_eq!(last.inquiries[199].preview, "message 1");
        for p in 1..=10 {
            let page = log.list(&InquiryFilter::default(), Some(p), Some(200)).await;
            assert!(page.inquiries.iter().all(|r| r.preview != "message 0"));
        }
        assert_eq!(log.raw_stats().await.total, 2001);
    }

    #[tokio::test]
    async fn test_list_filters_and_pagination() {
        let (_dir, log) = open_log(100).await;
        for i in 0..30 {
            let source = if i % 3 == 0 {
                InquirySource::Faq
            } else {
                InquirySource::Ai
            };
            let lang = if i % 2 == 0 { Lang::En } else { Lang::Bn };
            log.log_inquiry(inquiry(&format!("q{}", i), Stage::Doctoral, lang, source))
                .await
                .unwrap();
        }

        let all = log.list(&InquiryFilter::default(), None, None).await;
        assert_eq!(all.total, 30);
        assert_eq!(all.inquiries.len(), 25);
        assert_eq!(all.pages, 2);
        assert_eq!(all.page, 1);

        let second = log.list(&InquiryFilter::default(), Some(2), None).await;
        assert_eq!(second.inquiries.len(), 5);

        let faq = InquiryFilter {
            source: Some(InquirySource::Faq),
            ..Default::default()
        };
        assert_eq!(log.list(&faq, None, None).await.total, 10);

        let bn_faq = InquiryFilter {
            lang: Some(Lang::Bn),
            source: Some(InquirySource::Faq),
            ..Default::default()
        };
        // i in {3, 9, 15, 21, 27}
        assert_eq!(log.list(&bn_faq, None, None).await.total, 5);

        let other_stage = InquiryFilter {
            stage: Some(Stage::Parent),
            ..Default::default()
        };
        let empty = log.list(&other_stage, None, None).await;
        assert_eq!(empty.total, 0);
        assert_eq!(empty.pages, 0);
    }

    #[tokio::test]
    async fn test_stats_summary() {
        let (_dir, log) = open_log(100).await;
        let today = Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap();
        let yesterday = today - Duration::days(1);

        log.log_inquiry_at(inquiry("a", Stage::Parent, Lang::En, InquirySource::Ai), today)
            .await
            .unwrap();
        log.log_inquiry_at(inquiry("b", Stage::Parent, Lang::Bn, InquirySource::Ai), today)
            .await
            .unwrap();
        log.log_inquiry_at(inquiry("c", Stage::Foundation, Lang::En, InquirySource::Faq), yesterday)
            .await
            .unwrap();

        let summary = log.stats_at(today.date_naive()).await;
        assert_eq!(summary.total, 3);
        assert_eq!(summary.today, 2);
        assert_eq!(summary.total_en, 2);
        assert_eq!(summary.total_bn, 1);
        assert_eq!(summary.recent_count, 3);
        assert_eq!(summary.stage_breakdown[0].id, "7");
        assert_eq!(summary.stage_breakdown[0].name, "Parent");
        assert_eq!(summary.stage_breakdown[0].count, 2);
        assert_eq!(summary.daily.len(), 14);
        assert_eq!(summary.daily[13], DailyCount { date: "03-14".to_string(), count: 2 });
        assert_eq!(summary.daily[12], DailyCount { date: "03-13".to_string(), count: 1 });
        assert_eq!(summary.daily[0].count, 0);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let (_dir, log) = open_log(100).await;
        for _ in 0..3 {
            log.log_inquiry(inquiry("x", Stage::Masters, Lang::Bn, InquirySource::Ai))
                .await
                .unwrap();
        }

        log.reset().await.unwrap();
        log.reset().await.unwrap();

        let summary = log.stats().await;
        assert_eq!(summary.total, 0);
        assert_eq!(summary.today, 0);
        assert_eq!(summary.total_en, 0);
        assert_eq!(summary.total_bn, 0);
        assert!(summary.stage_breakdown.is_empty());
        assert!(summary.sources.is_empty());
        assert!(summary.daily.iter().all(|d| d.count == 0));
        assert!(log.is_empty().await);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inquiries.json");
        {
            let log = InquiryLog::open(&path, 10).await.unwrap();
            log.log_inquiry(inquiry("persist me", Stage::Strategic, Lang::En, InquirySource::Faq))
                .await
                .unwrap();
        }
        let log = InquiryLog::open(&path, 10).await.unwrap();
        assert_eq!(log.len().await, 1);
        assert_eq!(log.raw_stats().await.total, 1);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["inquiries"].is_array());
        assert_eq!(raw["stats"]["byStage"]["3"], 1);
        assert_eq!(raw["inquiries"][0]["source"], "faq");
    }

    #[test]
    fn test_normalize_ip() {
        assert_eq!(normalize_ip("1.2.3.4"), "1.2.3.4");
        assert_eq!(normalize_ip(" 1.2.3.4 , 5.6.7.8"), "1.2.3.4");
        assert_eq!(normalize_ip(""), "unknown");
    }

    #[test]
    fn test_stage_name_for_unexpected_key() {
        assert_eq!(stage_name("2"), "Development");
        assert_eq!(stage_name("unknown"), "Unknown");
        assert_eq!(stage_name("42"), "Stage 42");
    }
}

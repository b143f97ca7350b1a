//! Peopole storage crate - JSON-file repositories for reporting data.
//!
//! Holds the first-contact inquiry log with its rollup counters, the
//! lightweight analytics event store, and web-push subscriptions. Each store
//! is a single JSON file with an in-memory copy; all writes to a store are
//! serialized so concurrent requests cannot lose each other's updates.

pub mod analytics;
pub mod inquiries;
pub mod json_file;
pub mod push;

pub use analytics::{AnalyticsEvent, AnalyticsLog, AnalyticsSummary, NewEvent};
pub use inquiries::{
    normalize_ip, DailyCount, InquiryFilter, InquiryLog, InquiryPage, InquiryRecord, NewInquiry,
    StageCount, Stats, StatsSummary,
};
pub use json_file::JsonFile;
pub use push::{PushKeys, PushSubscription, PushSubscriptionStore, SubscriptionMetadata};

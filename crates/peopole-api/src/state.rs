//! Application state shared across all route handlers.
//!
//! AppState holds references to the chat relay and the JSON stores. It is
//! passed to handlers via axum's State extractor.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use peopole_chat::{
    ChatRelay, FallbackResponder, FaqMatcher, GroqProvider, PromptBuilder, RelaySettings,
    SessionStore,
};
use peopole_core::config::PeopoleConfig;
use peopole_core::Result;
use peopole_storage::{AnalyticsLog, InquiryLog, PushSubscriptionStore};

use crate::push::{PushSender, WebPushSender};

pub const INQUIRIES_FILE: &str = "inquiries.json";
pub const ANALYTICS_FILE: &str = "analytics.json";
pub const PUSH_SUBSCRIPTIONS_FILE: &str = "push_subscriptions.json";

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Effective configuration after file, environment and CLI overrides.
    pub config: Arc<PeopoleConfig>,
    /// Chat relay owning the session store.
    pub relay: ChatRelay,
    pub inquiries: Arc<InquiryLog>,
    pub analytics: Arc<AnalyticsLog>,
    pub push_subscriptions: Arc<PushSubscriptionStore>,
    /// Delivery backend; `None` when VAPID keys are not configured.
    pub push_sender: Option<Arc<dyn PushSender>>,
    /// Shared admin secret; the admin surface is closed when `None`.
    pub admin_token: Option<String>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Create a new AppState with the given components.
    pub fn new(
        config: PeopoleConfig,
        relay: ChatRelay,
        inquiries: Arc<InquiryLog>,
        analytics: Arc<AnalyticsLog>,
        push_subscriptions: Arc<PushSubscriptionStore>,
    ) -> Self {
        let admin_token = config
            .server
            .admin_token
            .clone()
            .filter(|token| !token.trim().is_empty());
        Self {
            config: Arc::new(config),
            relay,
            inquiries,
            analytics,
            push_subscriptions,
            push_sender: None,
            admin_token,
            start_time: Instant::now(),
        }
    }

    pub fn with_push_sender(mut self, sender: Arc<dyn PushSender>) -> Self {
        self.push_sender = Some(sender);
        self
    }

    /// Open every store under the configured data directory and assemble
    /// the relay from `config`.
    pub async fn open(config: PeopoleConfig) -> Result<Self> {
        let data_dir = PathBuf::from(&config.general.data_dir);
        tokio::fs::create_dir_all(&data_dir).await?;

        let inquiries = Arc::new(
            InquiryLog::open(data_dir.join(INQUIRIES_FILE), config.storage.max_inquiries).await?,
        );
        let analytics = Arc::new(
            AnalyticsLog::open(data_dir.join(ANALYTICS_FILE), config.storage.max_events).await?,
        );
        let push_subscriptions =
            Arc::new(PushSubscriptionStore::open(data_dir.join(PUSH_SUBSCRIPTIONS_FILE)).await?);
        info!(path = %data_dir.display(), "JSON stores opened");

        let relay = build_relay(&config, Arc::clone(&inquiries))?;
        if !relay.upstream_configured() {
            warn!("GROQ_API_KEY not set; every uncached question gets a fallback reply");
        }

        let push_sender = if config.push.is_configured() {
            let sender: Arc<dyn PushSender> = Arc::new(WebPushSender::new(&config.push)?);
            info!("Web push enabled");
            Some(sender)
        } else {
            info!("VAPID keys not set; web push disabled");
            None
        };

        let mut state = Self::new(config, relay, inquiries, analytics, push_subscriptions);
        state.push_sender = push_sender;
        Ok(state)
    }
}

/// Wire the relay to the Groq provider, the FAQ table and the inquiry log.
pub fn build_relay(config: &PeopoleConfig, inquiries: Arc<InquiryLog>) -> Result<ChatRelay> {
    let provider = Arc::new(GroqProvider::new(&config.upstream)?);
    let sessions = Arc::new(SessionStore::from_config(&config.session));
    let faq = match config.relay.faq_path.as_deref() {
        Some(path) => {
            let faq = FaqMatcher::from_json(Path::new(path))?;
            info!(path, entries = faq.len(), "FAQ table loaded");
            faq
        }
        None => FaqMatcher::builtin(&config.organization),
    };

    Ok(ChatRelay::new(
        provider,
        sessions,
        faq,
        PromptBuilder::new(config.organization.clone()),
        FallbackResponder::new(&config.organization),
        RelaySettings::from_config(config),
    )
    .with_inquiry_log(inquiries))
}

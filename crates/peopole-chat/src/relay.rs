//! Per-request streaming relay.
//!
//! Each chat request becomes one lazy stream of SSE frames. The relay first
//! checks the FAQ table and replays a hit word by word; otherwise it opens
//! an upstream completion and forwards its frames verbatim. Any upstream
//! failure before the first forwarded frame is answered with a replayed
//! apology, so the client always receives a terminating `[DONE]`.
//!
//! Dropping the stream (client disconnect) drops the upstream body with it.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use peopole_core::config::{PeopoleConfig, UpstreamConfig};
use peopole_core::types::{ChatMessage, ChatRequest, InquirySource, Role};
use peopole_storage::{InquiryLog, NewInquiry};

use crate::fallback::FallbackResponder;
use crate::faq::FaqMatcher;
use crate::prompt::PromptBuilder;
use crate::session::{Session, SessionStore};
use crate::sse::{delta_payload, encode_data, SseDecoder, UpstreamFrame, DONE_SENTINEL};
use crate::upstream::{CompletionProvider, CompletionRequest};

// =============================================================================
// Frames and settings
// =============================================================================

/// One event written to the browser.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayFrame {
    /// A completion-chunk JSON payload.
    Data(String),
    /// End of stream; nothing follows.
    Done,
}

impl RelayFrame {
    /// The payload after `data: `.
    pub fn payload(&self) -> &str {
        match self {
            RelayFrame::Data(payload) => payload,
            RelayFrame::Done => DONE_SENTINEL,
        }
    }

    /// Wire form, `data: <payload>\n\n`.
    pub fn to_sse(&self) -> String {
        encode_data(self.payload())
    }
}

/// A chat request plus the caller's address for inquiry records.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub chat: ChatRequest,
    pub ip: String,
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub upstream: UpstreamConfig,
    /// Pause between replayed words.
    pub replay_delay: Duration,
}

impl RelaySettings {
    pub fn from_config(config: &PeopoleConfig) -> Self {
        Self {
            upstream: config.upstream.clone(),
            replay_delay: Duration::from_millis(config.relay.replay_delay_ms),
        }
    }
}

// =============================================================================
// ChatRelay
// =============================================================================

/// Routes chat requests to the FAQ table, the upstream model or the
/// fallback pool. Cheap to clone.
#[derive(Clone)]
pub struct ChatRelay {
    provider: Arc<dyn CompletionProvider>,
    sessions: Arc<SessionStore>,
    faq: Arc<FaqMatcher>,
    prompts: Arc<PromptBuilder>,
    fallback: Arc<FallbackResponder>,
    inquiries: Option<Arc<InquiryLog>>,
    settings: Arc<RelaySettings>,
}

impl ChatRelay {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        sessions: Arc<SessionStore>,
        faq: FaqMatcher,
        prompts: PromptBuilder,
        fallback: FallbackResponder,
        settings: RelaySettings,
    ) -> Self {
        Self {
            provider,
            sessions,
            faq: Arc::new(faq),
            prompts: Arc::new(prompts),
            fallback: Arc::new(fallback),
            inquiries: None,
            settings: Arc::new(settings),
        }
    }

    /// Record first-contact inquiries to `log`.
    pub fn with_inquiry_log(mut self, log: Arc<InquiryLog>) -> Self {
        self.inquiries = Some(log);
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn upstream_configured(&self) -> bool {
        self.provider.is_configured()
    }

    /// Answer one chat request as a stream of frames ending in
    /// [`RelayFrame::Done`].
    ///
    /// Nothing happens until the stream is polled.
    pub fn respond(&self, request: RelayRequest) -> impl Stream<Item = RelayFrame> + Send + 'static {
        let relay = self.clone();

        async_stream::stream! {
            let RelayRequest { chat, ip } = request;
            let user_id = chat.user_id().map(str::to_string);
            let id = user_id.as_deref();
            let mut guard = DisconnectGuard::new(user_id.clone());

            // Init: snapshot the session before this turn is recorded.
            let session = relay.sessions.get_or_create(id);
            let first_message = is_first_message(&session, &chat);
            let conversation = merge_conversation(&session, &chat.messages);
            let latest = chat.latest_user_text().map(str::to_string);

            if let Some(text) = latest.as_deref() {
                relay.sessions.append(id, Role::User, text);
            }
            relay.sessions.set_profile(id, chat.stage, chat.lang);

            let inquiry_text = if first_message { latest.clone() } else { None };
            let delay = relay.settings.replay_delay;

            // Dispatch: FAQ first.
            let faq_answer = latest
                .as_deref()
                .and_then(|text| relay.faq.lookup(text, chat.lang))
                .map(str::to_string);

            if let Some(answer) = faq_answer {
                debug!(user_id = ?id, lang = %chat.lang, "Answering from FAQ");
                relay.record_inquiry(inquiry_text.as_deref(), &chat, &ip, InquirySource::Faq).await;
                relay.sessions.append(id, Role::Assistant, &answer);

                for await frame in replay(answer, delay) {
                    yield frame;
                }
                guard.completed = true;
                yield RelayFrame::Done;
                return;
            }

            let system = relay.prompts.build(chat.stage, chat.lang);
            let request = CompletionRequest::new(&relay.settings.upstream, system, &conversation);

            let mut use_fallback = false;
            match relay.provider.open_stream(request).await {
                Ok(mut body) => {
                    let mut decoder = SseDecoder::new();
                    let mut reply = String::new();
                    let mut forwarded = false;
                    let mut ended = false;

                    while !ended {
                        let frames = match body.next().await {
                            Some(Ok(bytes)) => decoder.push(&bytes),
                            Some(Err(e)) => {
                                warn!(error = %e, forwarded, "Upstream stream failed");
                                use_fallback = !forwarded;
                                break;
                            }
                            None => {
                                ended = true;
                                decoder.finish()
                            }
                        };

                        for frame in frames {
                            match frame {
                                UpstreamFrame::Done => {
                                    ended = true;
                                    break;
                                }
                                UpstreamFrame::Chunk { raw, delta } => {
                                    if let Some(text) = delta {
                                        reply.push_str(&text);
                                    }
                                    if !forwarded {
                                        forwarded = true;
                                        relay
                                            .record_inquiry(inquiry_text.as_deref(), &chat, &ip, InquirySource::Ai)
                                            .await;
                                    }
                                    yield RelayFrame::Data(raw);
                                }
                            }
                        }
                    }
                    drop(body);

                    // Tagged with whichever branch ends up answering.
                    if !forwarded {
                        let source = if use_fallback {
                            InquirySource::Fallback
                        } else {
                            InquirySource::Ai
                        };
                        relay.record_inquiry(inquiry_text.as_deref(), &chat, &ip, source).await;
                    }

                    if !reply.is_empty() {
                        relay.sessions.append(id, Role::Assistant, &reply);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Upstream unavailable, replaying fallback");
                    relay.record_inquiry(inquiry_text.as_deref(), &chat, &ip, InquirySource::Fallback).await;
                    use_fallback = true;
                }
            }

            if use_fallback {
                for await frame in replay(relay.fallback.pick(chat.lang), delay) {
                    yield frame;
                }
            }

            guard.completed = true;
            yield RelayFrame::Done;
        }
    }

    async fn record_inquiry(
        &self,
        text: Option<&str>,
        chat: &ChatRequest,
        ip: &str,
        source: InquirySource,
    ) {
        let (Some(log), Some(text)) = (self.inquiries.as_ref(), text) else {
            return;
        };

        let inquiry = NewInquiry {
            user_id: chat.user_id().map(str::to_string),
            stage: chat.stage,
            lang: chat.lang,
            source,
            message: text.to_string(),
            ip: ip.to_string(),
        };
        match log.log_inquiry(inquiry).await {
            Ok(record) => info!(
                inquiry_id = %record.id,
                source = %source,
                stage = %record.stage,
                lang = %record.lang,
                "New inquiry"
            ),
            Err(e) => warn!(error = %e, "Failed to persist inquiry"),
        }
    }
}

/// First turn of a conversation.
///
/// Identified users: the server held no user messages yet and the payload
/// carries at most one. Anonymous users: the payload carries exactly one.
fn is_first_message(session: &Session, chat: &ChatRequest) -> bool {
    let in_payload = chat.user_message_count();
    if session.is_ephemeral() {
        in_payload == 1
    } else {
        session.user_message_count() == 0 && in_payload <= 1
    }
}

/// Server-held history plus the new message when the client sent only one
/// message; the client payload otherwise.
fn merge_conversation(session: &Session, payload: &[ChatMessage]) -> Vec<ChatMessage> {
    match payload {
        [single] if !session.messages.is_empty() => {
            let mut merged = session.messages.clone();
            merged.push(single.clone());
            merged
        }
        _ => payload.to_vec(),
    }
}

/// Split `text` into words that keep their trailing whitespace, so that
/// joining the pieces reproduces `text` exactly.
pub fn split_words(text: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut start = 0;
    let mut seen_word = false;
    let mut prev_whitespace = false;

    for (idx, ch) in text.char_indices() {
        let whitespace = ch.is_whitespace();
        if !whitespace {
            if prev_whitespace && seen_word {
                words.push(&text[start..idx]);
                start = idx;
            }
            seen_word = true;
        }
        prev_whitespace = whitespace;
    }
    if start < text.len() {
        words.push(&text[start..]);
    }
    words
}

/// Replay `text` as completion-chunk frames, one word each.
fn replay(text: String, delay: Duration) -> impl Stream<Item = RelayFrame> + Send {
    async_stream::stream! {
        for (i, word) in split_words(&text).into_iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            yield RelayFrame::Data(delta_payload(word));
        }
    }
}

/// Logs a disconnect when the response stream is dropped early.
struct DisconnectGuard {
    user_id: Option<String>,
    completed: bool,
}

impl DisconnectGuard {
    fn new(user_id: Option<String>) -> Self {
        Self {
            user_id,
            completed: false,
        }
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.completed {
            debug!(
                user_id = self.user_id.as_deref().unwrap_or("anonymous"),
                "Client disconnected before the stream completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use peopole_core::config::OrganizationConfig;
    use peopole_core::types::Lang;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::error::ChatError;
    use crate::upstream::{ByteStream, GroqProvider};

    const HELLO: &str = r#"{"choices":[{"delta":{"content":"Hello"}}]}"#;
    const WORLD: &str = r#"{"choices":[{"delta":{"content":" world"}}]}"#;

    // =========================================================================
    // Fake provider
    // =========================================================================

    enum Outcome {
        Unconfigured,
        Status(u16),
        Body(Vec<&'static str>),
        BodyThenError(Vec<&'static str>),
    }

    struct FakeProvider {
        outcome: Outcome,
        calls: AtomicUsize,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl FakeProvider {
        fn new(outcome: Outcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_messages(&self) -> Vec<(String, String)> {
            let requests = self.requests.lock().unwrap();
            requests
                .last()
                .unwrap()
                .messages
                .iter()
                .map(|m| (m.role.clone(), m.content.clone()))
                .collect()
        }
    }

    #[async_trait]
    impl CompletionProvider for FakeProvider {
        fn is_configured(&self) -> bool {
            !matches!(self.outcome, Outcome::Unconfigured)
        }

        async fn open_stream(&self, request: CompletionRequest) -> Result<ByteStream, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);

            match &self.outcome {
                Outcome::Unconfigured => Err(ChatError::NotConfigured),
                Outcome::Status(status) => Err(ChatError::UpstreamStatus {
                    status: *status,
                    body: "boom".to_string(),
                }),
                Outcome::Body(parts) => Ok(Box::pin(futures::stream::iter(chunks(parts)))),
                Outcome::BodyThenError(parts) => {
                    let mut items = chunks(parts);
                    items.push(Err(ChatError::Transport("connection reset".to_string())));
                    Ok(Box::pin(futures::stream::iter(items)))
                }
            }
        }
    }

    fn chunks(parts: &[&'static str]) -> Vec<Result<Bytes, ChatError>> {
        parts
            .iter()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect()
    }

    // =========================================================================
    // Harness
    // =========================================================================

    struct Harness {
        relay: ChatRelay,
        sessions: Arc<SessionStore>,
        inquiries: Arc<InquiryLog>,
        faq: FaqMatcher,
        fallback: FallbackResponder,
        _dir: tempfile::TempDir,
    }

    async fn harness(provider: Arc<dyn CompletionProvider>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let org = OrganizationConfig::default();
        let sessions = Arc::new(SessionStore::new(30, chrono::Duration::hours(3)));
        let inquiries = Arc::new(
            InquiryLog::open(dir.path().join("inquiries.json"), 2000)
                .await
                .unwrap(),
        );
        let settings = RelaySettings {
            upstream: UpstreamConfig {
                api_key: Some("test-key".to_string()),
                ..Default::default()
            },
            replay_delay: Duration::ZERO,
        };
        let relay = ChatRelay::new(
            provider,
            sessions.clone(),
            FaqMatcher::builtin(&org),
            PromptBuilder::new(org.clone()),
            FallbackResponder::with_seed(&org, 1),
            settings,
        )
        .with_inquiry_log(inquiries.clone());

        Harness {
            relay,
            sessions,
            inquiries,
            faq: FaqMatcher::builtin(&org),
            fallback: FallbackResponder::new(&org),
            _dir: dir,
        }
    }

    async fn run(relay: &ChatRelay, body: Value) -> Vec<RelayFrame> {
        let chat: ChatRequest = serde_json::from_value(body).unwrap();
        relay
            .respond(RelayRequest {
                chat,
                ip: "198.51.100.4".to_string(),
            })
            .collect()
            .await
    }

    /// Concatenated delta text of every data frame.
    fn streamed_text(frames: &[RelayFrame]) -> String {
        frames
            .iter()
            .filter_map(|f| match f {
                RelayFrame::Data(payload) => {
                    let value: Value = serde_json::from_str(payload).unwrap();
                    value["choices"][0]["delta"]["content"]
                        .as_str()
                        .map(str::to_string)
                }
                RelayFrame::Done => None,
            })
            .collect()
    }

    fn assert_single_terminal_done(frames: &[RelayFrame]) {
        assert_eq!(frames.last(), Some(&RelayFrame::Done));
        assert_eq!(
            frames.iter().filter(|f| **f == RelayFrame::Done).count(),
            1
        );
    }

    fn user(content: &str) -> Value {
        json!({"role": "user", "content": content})
    }

    // =========================================================================
    // FAQ branch
    // =========================================================================

    #[tokio::test]
    async fn test_faq_hit_replays_answer_without_upstream() {
        let provider = FakeProvider::new(Outcome::Body(vec![]));
        let h = harness(provider.clone()).await;

        let frames = run(
            &h.relay,
            json!({"messages": [user("how much does it cost")], "lang": "en"}),
        )
        .await;

        let expected = h.faq.lookup("cost", Lang::En).unwrap();
        assert_eq!(streamed_text(&frames), expected);
        assert!(frames.len() > 2);
        assert_single_terminal_done(&frames);
        assert_eq!(provider.calls(), 0);

        let page = h.inquiries.list(&Default::default(), None, None).await;
        assert_eq!(page.total, 1);
        assert_eq!(page.inquiries[0].source, InquirySource::Faq);
        assert_eq!(page.inquiries[0].ip, "198.51.100.4");
    }

    #[tokio::test]
    async fn test_faq_answer_in_bengali_is_recorded_in_session() {
        let provider = FakeProvider::new(Outcome::Body(vec![]));
        let h = harness(provider.clone()).await;

        let frames = run(
            &h.relay,
            json!({"messages": [user("IELTS কত লাগবে?")], "lang": "bn", "userId": "u1", "stage": 4}),
        )
        .await;

        let expected = h.faq.lookup("ielts", Lang::Bn).unwrap();
        assert_eq!(streamed_text(&frames), expected);

        let session = h.sessions.get_or_create(Some("u1"));
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[1], ChatMessage::assistant(expected));
        assert_eq!(session.stage, peopole_core::types::Stage::Undergraduate);
        assert_eq!(session.lang, Lang::Bn);
    }

    // =========================================================================
    // Upstream branch
    // =========================================================================

    #[tokio::test]
    async fn test_upstream_frames_forwarded_verbatim() {
        let server = MockServer::start().await;
        let body = format!("data: {}\n\ndata: [DONE]\n\n", HELLO);
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GroqProvider::new(&UpstreamConfig {
            base_url: server.uri(),
            api_key: Some("test-key".to_string()),
            ..Default::default()
        })
        .unwrap();
        let h = harness(Arc::new(provider)).await;

        let frames = run(
            &h.relay,
            json!({"messages": [user("tell me about penguins")], "userId": "u1"}),
        )
        .await;

        assert_eq!(frames, vec![RelayFrame::Data(HELLO.to_string()), RelayFrame::Done]);
        assert_eq!(frames[0].to_sse(), format!("data: {}\n\n", HELLO));
        assert_eq!(frames[1].to_sse(), "data: [DONE]\n\n");

        let session = h.sessions.get_or_create(Some("u1"));
        assert_eq!(
            session.messages,
            vec![
                ChatMessage::user("tell me about penguins"),
                ChatMessage::assistant("Hello"),
            ]
        );

        let page = h.inquiries.list(&Default::default(), None, None).await;
        assert_eq!(page.inquiries[0].source, InquirySource::Ai);
    }

    #[tokio::test]
    async fn test_body_end_without_done_still_terminates() {
        let provider = FakeProvider::new(Outcome::Body(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel",
            "lo\"}}]}\n\ndata: ",
            "{\"choices\":[{\"delta\":{\"content\":\" world\"}}]}",
        ]));
        let h = harness(provider.clone()).await;

        let frames = run(&h.relay, json!({"messages": [user("hi there")], "userId": "u9"})).await;

        assert_eq!(
            frames,
            vec![
                RelayFrame::Data(HELLO.to_string()),
                RelayFrame::Data(WORLD.to_string()),
                RelayFrame::Done,
            ]
        );
        let session = h.sessions.get_or_create(Some("u9"));
        assert_eq!(session.messages[1].content, "Hello world");
    }

    #[tokio::test]
    async fn test_frames_after_done_are_ignored() {
        let provider = FakeProvider::new(Outcome::Body(vec![
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n",
        ]));
        let h = harness(provider).await;

        let frames = run(&h.relay, json!({"messages": [user("hi there")]})).await;
        assert_eq!(frames, vec![RelayFrame::Done]);
    }

    #[tokio::test]
    async fn test_system_prompt_matches_stage_and_language() {
        let provider = FakeProvider::new(Outcome::Body(vec!["data: [DONE]\n\n"]));
        let h = harness(provider.clone()).await;

        run(
            &h.relay,
            json!({"messages": [user("hi there")], "stage": "6", "lang": "bn"}),
        )
        .await;

        let messages = provider.last_messages();
        assert_eq!(messages[0].0, "system");
        assert!(messages[0].1.contains("STAGE: Doctoral"));
        assert!(messages[0].1.contains(PromptBuilder::language_directive(Lang::Bn)));
        assert_eq!(messages[1], ("user".to_string(), "hi there".to_string()));
    }

    // =========================================================================
    // Fallback branch
    // =========================================================================

    #[tokio::test]
    async fn test_error_status_replays_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .mount(&server)
            .await;

        let provider = GroqProvider::new(&UpstreamConfig {
            base_url: server.uri(),
            api_key: Some("test-key".to_string()),
            ..Default::default()
        })
        .unwrap();
        let h = harness(Arc::new(provider)).await;

        let frames = run(
            &h.relay,
            json!({"messages": [user("tell me about penguins")], "lang": "en", "userId": "u2"}),
        )
        .await;

        let text = streamed_text(&frames);
        assert!(h.fallback.pool(Lang::En).contains(&text), "unexpected text {text:?}");
        assert_single_terminal_done(&frames);

        let page = h.inquiries.list(&Default::default(), None, None).await;
        assert_eq!(page.total, 1);
        assert_eq!(page.inquiries[0].source, InquirySource::Fallback);

        // Apologies are not part of the conversation history.
        let session = h.sessions.get_or_create(Some("u2"));
        assert_eq!(session.messages, vec![ChatMessage::user("tell me about penguins")]);
    }

    #[tokio::test]
    async fn test_missing_key_replays_fallback_in_requested_language() {
        let provider = FakeProvider::new(Outcome::Unconfigured);
        let h = harness(provider).await;
        assert!(!h.relay.upstream_configured());

        for _ in 0..5 {
            let frames = run(&h.relay, json!({"messages": [user("hello")], "lang": "bn"})).await;
            let text = streamed_text(&frames);
            assert!(h.fallback.pool(Lang::Bn).contains(&text));
            assert_single_terminal_done(&frames);
        }
    }

    #[tokio::test]
    async fn test_body_error_before_content_replays_fallback() {
        let provider = FakeProvider::new(Outcome::BodyThenError(vec![": keep-alive\n\n"]));
        let h = harness(provider).await;

        let frames = run(&h.relay, json!({"messages": [user("hello")], "userId": "p1"})).await;
        assert!(h.fallback.pool(Lang::En).contains(&streamed_text(&frames)));
        assert_single_terminal_done(&frames);

        let page = h.inquiries.list(&Default::default(), None, None).await;
        assert_eq!(page.total, 1);
        assert_eq!(page.inquiries[0].source, InquirySource::Fallback);
    }

    #[tokio::test]
    async fn test_body_error_after_content_just_ends() {
        let provider = FakeProvider::new(Outcome::BodyThenError(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
        ]));
        let h = harness(provider).await;

        let frames = run(&h.relay, json!({"messages": [user("hello")]})).await;
        assert_eq!(frames, vec![RelayFrame::Data(HELLO.to_string()), RelayFrame::Done]);

        let page = h.inquiries.list(&Default::default(), None, None).await;
        assert_eq!(page.inquiries[0].source, InquirySource::Ai);
    }

    #[tokio::test]
    async fn test_empty_upstream_reply_is_tagged_ai() {
        let provider = FakeProvider::new(Outcome::Body(vec!["data: [DONE]\n\n"]));
        let h = harness(provider).await;

        let frames = run(&h.relay, json!({"messages": [user("hello")]})).await;
        assert_eq!(frames, vec![RelayFrame::Done]);

        let page = h.inquiries.list(&Default::default(), None, None).await;
        assert_eq!(page.total, 1);
        assert_eq!(page.inquiries[0].source, InquirySource::Ai);
    }

    #[tokio::test]
    async fn test_status_error_with_other_codes() {
        for status in [401, 429, 503] {
            let provider = FakeProvider::new(Outcome::Status(status));
            let h = harness(provider).await;
            let frames = run(&h.relay, json!({"messages": [user("hello")]})).await;
            assert!(h.fallback.pool(Lang::En).contains(&streamed_text(&frames)));
        }
    }

    // =========================================================================
    // Session merge and first-message detection
    // =========================================================================

    #[tokio::test]
    async fn test_single_message_is_merged_with_server_history() {
        let provider = FakeProvider::new(Outcome::Body(vec!["data: [DONE]\n\n"]));
        let h = harness(provider.clone()).await;
        h.sessions.append(Some("u1"), Role::User, "first question");
        h.sessions.append(Some("u1"), Role::Assistant, "first answer");

        run(&h.relay, json!({"messages": [user("follow up")], "userId": "u1"})).await;

        let sent: Vec<String> = provider.last_messages().into_iter().map(|m| m.1).collect();
        assert_eq!(sent[1..], ["first question", "first answer", "follow up"]);
        // The server already had a user turn, so this is not a new inquiry.
        assert!(h.inquiries.is_empty().await);
    }

    #[tokio::test]
    async fn test_full_history_payload_is_sent_as_is() {
        let provider = FakeProvider::new(Outcome::Body(vec!["data: [DONE]\n\n"]));
        let h = harness(provider.clone()).await;
        h.sessions.append(Some("u1"), Role::User, "stale");

        run(
            &h.relay,
            json!({
                "messages": [
                    user("q1"),
                    {"role": "assistant", "content": "a1"},
                    user("q2"),
                ],
                "userId": "u1"
            }),
        )
        .await;

        let sent: Vec<String> = provider.last_messages().into_iter().map(|m| m.1).collect();
        assert_eq!(sent[1..], ["q1", "a1", "q2"]);
    }

    #[tokio::test]
    async fn test_inquiry_logged_once_per_identified_conversation() {
        let provider = FakeProvider::new(Outcome::Body(vec!["data: [DONE]\n\n"]));
        let h = harness(provider).await;

        run(&h.relay, json!({"messages": [user("hello")], "userId": "u5"})).await;
        run(&h.relay, json!({"messages": [user("and then?")], "userId": "u5"})).await;
        run(&h.relay, json!({"messages": [user("more")], "userId": "u5"})).await;

        assert_eq!(h.inquiries.len().await, 1);
        let page = h.inquiries.list(&Default::default(), None, None).await;
        assert_eq!(page.inquiries[0].preview, "hello");
        assert_eq!(page.inquiries[0].user_id.as_deref(), Some("u5"));
    }

    #[tokio::test]
    async fn test_anonymous_inquiry_requires_exactly_one_user_message() {
        let provider = FakeProvider::new(Outcome::Body(vec!["data: [DONE]\n\n"]));
        let h = harness(provider).await;

        run(&h.relay, json!({"messages": [user("a"), user("b")]})).await;
        run(&h.relay, json!({"messages": []})).await;
        assert!(h.inquiries.is_empty().await);

        run(&h.relay, json!({"messages": [user("only one")]})).await;
        assert_eq!(h.inquiries.len().await, 1);
        assert!(h.sessions.is_empty());
    }

    // =========================================================================
    // Replay
    // =========================================================================

    #[test]
    fn test_split_words_preserves_text() {
        for text in [
            "how much does it cost",
            "  leading and trailing  ",
            "tabs\tand\nnewlines\n\nhere",
            "আমাদের অফিস খোলা থাকে",
            "single",
            "",
        ] {
            assert_eq!(split_words(text).concat(), text);
        }
    }

    #[test]
    fn test_split_words_chunks() {
        assert_eq!(split_words("a  b\nc"), vec!["a  ", "b\n", "c"]);
        assert_eq!(split_words("  hi there "), vec!["  hi ", "there "]);
        assert!(split_words("").is_empty());
        assert_eq!(split_words("   "), vec!["   "]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_waits_between_words() {
        let start = tokio::time::Instant::now();
        let frames: Vec<RelayFrame> = replay("one two three".to_string(), Duration::from_millis(35))
            .collect()
            .await;
        assert_eq!(frames.len(), 3);
        assert!(start.elapsed() >= Duration::from_millis(70));
    }

    #[tokio::test]
    async fn test_dropping_stream_midway_is_safe() {
        let provider = FakeProvider::new(Outcome::Body(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n",
        ]));
        let h = harness(provider).await;
        let chat: ChatRequest =
            serde_json::from_value(json!({"messages": [user("hi there")], "userId": "u7"})).unwrap();

        let stream = h.relay.respond(RelayRequest {
            chat,
            ip: "unknown".to_string(),
        });
        let first: Vec<RelayFrame> = stream.take(1).collect().await;
        assert_eq!(first, vec![RelayFrame::Data(HELLO.to_string())]);

        // The partial reply was never completed, so only the user turn is kept.
        let session = h.sessions.get_or_create(Some("u7"));
        assert_eq!(session.messages, vec![ChatMessage::user("hi there")]);
    }

    #[test]
    fn test_relay_frame_encoding() {
        assert_eq!(RelayFrame::Done.to_sse(), "data: [DONE]\n\n");
        assert_eq!(RelayFrame::Data("{}".to_string()).to_sse(), "data: {}\n\n");
    }
}

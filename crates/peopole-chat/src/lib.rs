//! Conversational core for Peopole AI.
//!
//! Holds the per-user session window, the FAQ short-circuit, the system
//! prompt tables, the upstream completion client and the streaming relay
//! that ties them together into one SSE response per chat request.

pub mod error;
pub mod fallback;
pub mod faq;
pub mod prompt;
pub mod relay;
pub mod session;
pub mod sse;
pub mod upstream;

pub use error::ChatError;
pub use fallback::FallbackResponder;
pub use faq::{FaqAnswers, FaqEntry, FaqMatcher};
pub use prompt::PromptBuilder;
pub use relay::{split_words, ChatRelay, RelayFrame, RelayRequest, RelaySettings};
pub use session::{Session, SessionStore};
pub use sse::{delta_payload, encode_data, SseDecoder, UpstreamFrame};
pub use upstream::{ByteStream, CompletionProvider, CompletionRequest, GroqProvider, WireMessage};

//! Peopole API crate - axum HTTP server, route handlers, SSE chat streaming.
//!
//! Serves the chat widget endpoint, analytics ingest, web-push opt-in and
//! the token-protected admin surface used by the reporting dashboard.

pub mod auth;
pub mod client_ip;
pub mod error;
pub mod handlers;
pub mod push;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use push::{PushSender, WebPushSender};
pub use routes::{create_router, start_server};
pub use state::AppState;

pub mod config;
pub mod error;
pub mod types;

pub use config::PeopoleConfig;
pub use error::{PeopoleError, Result};
pub use types::*;

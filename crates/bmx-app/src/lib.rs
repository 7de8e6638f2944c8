//! Headless live order book / trade tape viewer.
//!
//! Wires the components together:
//! - WebSocket session with bounded reconnect
//! - Feed hub (routing, decoding, diff engines)
//! - Log-printing subscriber and periodic view summaries
//! - Prometheus metrics

pub mod app;
pub mod config;
pub mod error;
pub mod printer;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use printer::ViewPrinter;

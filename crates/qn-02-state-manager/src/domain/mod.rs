//! Domain Layer
//!
//! - `message`: wire shape and validated requests
//! - `config`: server configuration

pub mod config;
pub mod message;

pub use config::{ServerConfig, DEFAULT_CLIENT_NUM, DEFAULT_TICK_MS};
pub use message::{MessageType, Request, WireMessage};

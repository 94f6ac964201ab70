//! `Syncast` Core Library
//!
//! Shared functionality for `Syncast` components:
//! - Broadcast wire protocol (encoder and reference decoder)
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod config;
pub mod error;
pub mod protocol;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use protocol::{BroadcastMessage, FrameDecoder};

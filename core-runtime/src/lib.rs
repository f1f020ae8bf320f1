//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the streaming core:
//! - Logging and tracing infrastructure
//! - Configuration management and bridge injection
//! - Stream event bus
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the playback engine depends on.
//! It establishes the logging conventions, the fail-fast configuration
//! builder, and the event broadcasting mechanism used by every stream.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
pub use events::{EventBus, EventStream, ResyncReason, StreamEvent};

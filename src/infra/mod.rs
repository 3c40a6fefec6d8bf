//! Infrastructure - configuration and the event bus
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults)
//! - `bus` - Segmented publish/subscribe bus for telemetry events

pub mod bus;
pub mod config;

// Re-export commonly used types
pub use bus::{Audience, BusStats, EventBus, Subscription};
pub use config::Config;

//! Telegram → Bale channel relay bridge.
//!
//! Forwards posts from monitored Telegram channels to Bale destinations,
//! with keyword filtering, text cleanup and exactly-once dispatch per
//! message. A single admin reconfigures the channel mapping through a
//! private-chat conversation.

pub mod admin;
pub mod channels;
pub mod config;
pub mod error;
pub mod relay;
pub mod routing;
pub mod store;
pub mod text;

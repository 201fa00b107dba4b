//! WagWalk relay server library.
//!
//! Exposes the relay server for use in tests and embedding.
//! The relay accepts JSON requests from the mobile app, keeps per-role
//! device-token registries, and forwards work to the push and video
//! providers.

pub mod config;
pub mod push;
pub mod registry;
pub mod sanitize;
pub mod server;
pub mod video;

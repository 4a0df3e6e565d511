//! matte gateway library.
//!
//! Exposes the background-removal HTTP API as an axum router so the binary,
//! the proxy's tests, and embedders can all mount the same handlers.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod remover;
pub mod server;

//! HTTP handlers for the gateway.

mod batch;
mod health;
mod images;
mod multipart;
mod router;

pub use router::{create_router, AppState};

//! matte proxy library.
//!
//! A TLS-terminating reverse proxy in front of one matte gateway. It lets
//! pages served over HTTPS call the gateway without mixed-content errors:
//! preflights are answered locally, image requests are forwarded verbatim,
//! and every response carries permissive CORS headers.

pub mod config;
pub mod error;
pub mod forward;
pub mod router;
pub mod server;
pub mod tls;

pub use config::{ListenerConfig, ProxyConfig, TlsMode, Upstream};
pub use error::ProxyError;
pub use router::{create_router, Binding, Protocol};

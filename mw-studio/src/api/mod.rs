//! HTTP API handlers for mw-studio

pub mod service;
pub mod session;

pub use service::service_routes;
pub use session::session_routes;

pub mod api;
pub mod config;
pub mod metrics;
pub mod session;
pub mod store;

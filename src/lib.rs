//! Quota Gateway Library

pub mod admin;
pub mod apps;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod proxy;
pub mod quota;
pub mod routing;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use gateway::GatewayCore;
pub use http::HttpServer;
pub use lifecycle::Shutdown;

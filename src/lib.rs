pub mod admin;
pub mod args;
pub mod config;
pub mod r#const;
pub mod doh;
pub mod error;
pub mod gateway;
pub mod http_client;
pub mod matcher;
pub mod metrics;
pub mod middleware;
pub mod proxy;
pub mod resolver;
pub mod upstream;

// 重导出常用组件
pub use admin::AdminServer;
pub use args::Args;
pub use config::Config;
pub use doh::{DnsBridgeServer, DohBridge, DohClient};
pub use error::{AppError, ConfigError};
pub use gateway::{Gateway, GatewayServer};
pub use matcher::{Matcher, MatcherChain, UpstreamMatcher};
pub use metrics::GatewayMetrics;
pub use middleware::{DecisionEngine, Handler, Middleware, Pipeline, PolicyInput, PolicyMiddleware};
pub use proxy::ProxyHandler;
pub use r#const::subsystem_names;
pub use resolver::{DnsEndpoint, FallbackResolver};
pub use upstream::{OverlayNetwork, OverlayProvider, ProxyOverlayProvider, UpstreamClient, UpstreamSpec};

use hickory_proto::error::ProtoError;
use std::io;
use std::net::AddrParseError;
use thiserror::Error;

// Unified error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("DNS protocol error: {0}")]
    DnsProto(#[from] ProtoError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    JsonError(String),

    #[error("No DNS endpoints configured")]
    NoEndpointsConfigured,

    #[error("Failed to resolve {0}: all DNS endpoints exhausted")]
    ResolutionFailed(String),

    #[error("DNS endpoint {endpoint} failed: {reason}")]
    DnsEndpoint { endpoint: String, reason: String },

    #[error("DoH endpoint {endpoint} failed: {reason}")]
    DohEndpoint { endpoint: String, reason: String },

    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("Upstream dispatch failed: {0}")]
    UpstreamDispatchFailed(String),

    #[error("Response stream failed: {0}")]
    ResponseStreamFailed(String),

    #[error("Overlay network error: {0}")]
    Overlay(String),

    #[error("Failed to get decision: {0}")]
    DecisionEngineError(String),

    #[error("not allowed")]
    DecisionDenied,

    #[error("Policy bundle unavailable: {0}")]
    BundleUnavailable(String),

    #[error("Middleware {0} returned no handler")]
    MiddlewareReturnedNoHandler(String),

    #[error("Timeout error")]
    Timeout,

    #[error("Invalid shutdown timeout: {0}s")]
    InvalidShutdownTimeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<AddrParseError> for AppError {
    fn from(err: AddrParseError) -> Self {
        Self::Config(ConfigError::InvalidListenAddress(err.to_string()))
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}

// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadError(#[from] io::Error),

    #[error("YAML parsing error: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid server listen address: {0}")]
    InvalidListenAddress(String),

    #[error("Invalid upstream URL: {0}")]
    InvalidUpstreamUrl(String),

    #[error("Invalid DNS server address: {0}")]
    InvalidDnsServer(String),

    #[error("Invalid DNS transport: {0}")]
    InvalidDnsTransport(String),

    #[error("Unknown tailnet referenced by upstream: {0}")]
    UnknownTailnet(String),

    #[error("Invalid tailnet configuration: {0}")]
    InvalidTailnet(String),

    #[error("Invalid middleware configuration: {0}")]
    InvalidMiddleware(String),

    #[error("Invalid HTTP client configuration: {0}")]
    InvalidHttpClientConfig(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

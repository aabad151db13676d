use crate::config::{HttpClientConfig, UpstreamConfig};
use crate::error::{AppError, ConfigError};
use crate::r#const::upstream_defaults;
use crate::resolver::FallbackResolver;
use crate::upstream::connector::UpstreamConnector;
use crate::upstream::overlay::OverlayNetwork;
use axum::body::Body;
use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

// 单个上游的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamSpec {
    // 原始端点
    pub endpoint: String,
    pub scheme: String,
    pub host: String,
    pub port: u16,
    // 主机名前缀（空表示任意）
    pub hosts: Vec<String>,
    // 路径前缀（空表示任意）
    pub path_prefixes: Vec<String>,
    pub tailnet: Option<String>,
    pub insecure_skip_verify: bool,
}

impl UpstreamSpec {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, ConfigError> {
        let url = Url::parse(&config.endpoint)
            .map_err(|e| ConfigError::InvalidUpstreamUrl(format!("{}: {}", config.endpoint, e)))?;

        let scheme = url.scheme().to_string();
        let port = match scheme.as_str() {
            upstream_defaults::SCHEME_HTTP => url.port().unwrap_or(upstream_defaults::HTTP_PORT),
            upstream_defaults::SCHEME_HTTPS => url.port().unwrap_or(upstream_defaults::HTTPS_PORT),
            other => {
                return Err(ConfigError::InvalidUpstreamUrl(format!(
                    "{}: unsupported scheme {}",
                    config.endpoint, other
                )))
            }
        };

        // IPv6 主机去掉方括号，以便直接作为 IP 字面量使用
        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.trim_start_matches('[').trim_end_matches(']').to_string(),
            _ => upstream_defaults::DEFAULT_HOST.to_string(),
        };

        Ok(Self {
            endpoint: config.endpoint.clone(),
            scheme,
            host,
            port,
            hosts: config.hosts.clone(),
            path_prefixes: config.path_prefixes.clone(),
            tailnet: config.tailnet.clone(),
            insecure_skip_verify: config.insecure_skip_verify,
        })
    }

    pub fn is_https(&self) -> bool {
        self.scheme == upstream_defaults::SCHEME_HTTPS
    }

    // 出站请求使用的 authority，连接器会忽略它
    pub fn authority(&self) -> String {
        let default_port = if self.is_https() {
            upstream_defaults::HTTPS_PORT
        } else {
            upstream_defaults::HTTP_PORT
        };
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == default_port {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

/// Outbound HTTP/1.1 client bound to exactly one upstream.
pub struct UpstreamClient {
    spec: UpstreamSpec,
    client: Client<UpstreamConnector, Body>,
}

impl UpstreamClient {
    // 为上游创建客户端
    pub fn build(
        spec: UpstreamSpec,
        resolver: Arc<FallbackResolver>,
        overlay: Option<Arc<dyn OverlayNetwork>>,
        config: &HttpClientConfig,
    ) -> Result<Self, AppError> {
        debug!("Creating upstream client for {}", spec.endpoint);

        let connector = UpstreamConnector::new(
            spec.clone(),
            resolver,
            overlay,
            Duration::from_secs(config.connect_timeout),
        )?;

        let mut builder = Client::builder(TokioExecutor::new());
        builder.pool_timer(TokioTimer::new());
        if let Some(idle_timeout) = config.idle_timeout {
            builder.pool_idle_timeout(Duration::from_secs(idle_timeout));
        }
        let client = builder.build(connector);

        Ok(Self { spec, client })
    }

    pub fn spec(&self) -> &UpstreamSpec {
        &self.spec
    }

    // 发送请求，返回上游响应头和未读取的响应体
    pub async fn send(&self, request: Request<Body>) -> Result<Response<Incoming>, AppError> {
        self.client
            .request(request)
            .await
            .map_err(|e| AppError::UpstreamDispatchFailed(error_chain(&e)))
    }
}

// 拼接错误链，保留底层原因
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

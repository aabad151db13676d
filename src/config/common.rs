use crate::r#const::{dns_limits, http_client_limits, server_defaults};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::validate_socket_addr;

// HTTP客户端配置
// 用于 DoH 查询、策略包拉取、决策请求以及上游连接超时
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Validate)]
pub struct HttpClientConfig {
    // 连接超时（秒）
    #[validate(range(
        min = http_client_limits::MIN_CONNECT_TIMEOUT,
        max = http_client_limits::MAX_CONNECT_TIMEOUT,
        message = "Connect timeout out of range"
    ))]
    pub connect_timeout: u64,
    // 请求超时（秒）
    #[validate(range(
        min = http_client_limits::MIN_REQUEST_TIMEOUT,
        max = http_client_limits::MAX_REQUEST_TIMEOUT,
        message = "Request timeout out of range"
    ))]
    pub request_timeout: u64,
    // 空闲连接超时（秒）（可选）
    #[validate(range(
        min = http_client_limits::MIN_IDLE_TIMEOUT,
        max = http_client_limits::MAX_IDLE_TIMEOUT,
        message = "Idle timeout out of range"
    ))]
    pub idle_timeout: Option<u64>,
    // TCP Keepalive（秒）（可选）
    #[validate(range(
        min = http_client_limits::MIN_KEEPALIVE,
        max = http_client_limits::MAX_KEEPALIVE,
        message = "Keepalive out of range"
    ))]
    pub keepalive: Option<u32>,
    // HTTP用户代理（可选）
    pub agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: http_client_limits::DEFAULT_CONNECT_TIMEOUT,
            request_timeout: http_client_limits::DEFAULT_REQUEST_TIMEOUT,
            idle_timeout: Some(http_client_limits::DEFAULT_IDLE_TIMEOUT),
            keepalive: Some(http_client_limits::DEFAULT_KEEPALIVE),
            agent: None,
        }
    }
}

// 网关服务器配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Validate)]
pub struct ServerConfig {
    // HTTP监听地址
    #[validate(custom(function = "validate_socket_addr"))]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: server_defaults::DEFAULT_LISTEN.to_string(),
        }
    }
}

// 管理服务器配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Validate)]
pub struct AdminConfig {
    // 管理服务器监听地址
    #[validate(custom(function = "validate_socket_addr"))]
    pub listen: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            listen: server_defaults::DEFAULT_ADMIN_LISTEN.to_string(),
        }
    }
}

// DNS 解析配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Validate)]
pub struct DnsConfig {
    // 单个 DNS 端点的查询超时（秒）
    #[serde(default = "default_dns_timeout")]
    #[validate(range(
        min = dns_limits::MIN_TIMEOUT,
        max = dns_limits::MAX_TIMEOUT,
        message = "DNS timeout out of range"
    ))]
    pub timeout: u64,
    // DoH 桥接的单次查询超时（秒）
    #[serde(default = "default_bridge_timeout")]
    #[validate(range(
        min = dns_limits::MIN_TIMEOUT,
        max = dns_limits::MAX_TIMEOUT,
        message = "DoH bridge timeout out of range"
    ))]
    pub bridge_timeout: u64,
}

fn default_dns_timeout() -> u64 {
    dns_limits::DEFAULT_TIMEOUT
}

fn default_bridge_timeout() -> u64 {
    dns_limits::DEFAULT_BRIDGE_TIMEOUT
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout: default_dns_timeout(),
            bridge_timeout: default_bridge_timeout(),
        }
    }
}

use crate::error::ConfigError;
use crate::r#const::dns_limits;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use url::Url;
use validator::{Validate, ValidationError};

// DNS 传输协议枚举
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DnsTransport {
    // UDP（按目标地址族选择）
    Udp,
    // 仅 IPv4 UDP
    Udp4,
    // 仅 IPv6 UDP
    Udp6,
    // TCP（按目标地址族选择）
    Tcp,
    // 仅 IPv4 TCP
    Tcp4,
    // 仅 IPv6 TCP
    Tcp6,
}

impl DnsTransport {
    // 是否为 TCP 传输
    pub fn is_tcp(&self) -> bool {
        matches!(self, Self::Tcp | Self::Tcp4 | Self::Tcp6)
    }

    // 目标地址的地址族是否与传输协议匹配
    pub fn accepts(&self, addr: &SocketAddr) -> bool {
        match self {
            Self::Udp | Self::Tcp => true,
            Self::Udp4 | Self::Tcp4 => addr.is_ipv4(),
            Self::Udp6 | Self::Tcp6 => addr.is_ipv6(),
        }
    }
}

impl Default for DnsTransport {
    fn default() -> Self {
        Self::Tcp6
    }
}

impl fmt::Display for DnsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Udp => "udp",
            Self::Udp4 => "udp4",
            Self::Udp6 => "udp6",
            Self::Tcp => "tcp",
            Self::Tcp4 => "tcp4",
            Self::Tcp6 => "tcp6",
        };
        f.write_str(name)
    }
}

impl FromStr for DnsTransport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "udp" => Ok(Self::Udp),
            "udp4" => Ok(Self::Udp4),
            "udp6" => Ok(Self::Udp6),
            "tcp" => Ok(Self::Tcp),
            "tcp4" => Ok(Self::Tcp4),
            "tcp6" => Ok(Self::Tcp6),
            other => Err(ConfigError::InvalidDnsTransport(other.to_string())),
        }
    }
}

// 自定义验证函数 - 验证DNS服务器条目
// DoH 条目必须是 URL，其余条目必须是 IP 地址（端口可选）
fn validate_dns_server(server: &DnsServerConfig) -> Result<(), ValidationError> {
    if server.doh {
        return match Url::parse(&server.addr) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
            _ => Err(ValidationError::new("invalid_doh_url")),
        };
    }
    if server.addr.is_empty() {
        return Ok(());
    }
    match parse_dns_addr(&server.addr) {
        Ok(_) => Ok(()),
        Err(_) => Err(ValidationError::new("invalid_dns_addr")),
    }
}

// DNS 服务器配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Validate)]
#[validate(schema(
    function = "validate_dns_server",
    message = "DNS server address must be an IP (optionally with port), or a URL when doh is set"
))]
pub struct DnsServerConfig {
    // 服务器地址（DoH 时为 URL）
    #[serde(default)]
    pub addr: String,
    // 传输协议（可选，缺省为 tcp6）
    #[serde(default)]
    pub net: Option<DnsTransport>,
    // 是否为 DoH 端点
    #[serde(default)]
    pub doh: bool,
}

// 解析 DNS 服务器地址，缺省端口为 53
// 支持 "ip"、"ip:port"、"[ipv6]"、"[ipv6]:port"
pub fn parse_dns_addr(addr: &str) -> Result<SocketAddr, ConfigError> {
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    let host = addr.trim_start_matches('[').trim_end_matches(']');
    IpAddr::from_str(host)
        .map(|ip| SocketAddr::new(ip, dns_limits::DEFAULT_PORT))
        .map_err(|_| ConfigError::InvalidDnsServer(addr.to_string()))
}

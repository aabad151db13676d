use crate::config::{parse_dns_addr, DnsServerConfig, DnsTransport};
use crate::error::{AppError, ConfigError};
use crate::metrics::METRICS;
use crate::r#const::{dns_limits, result_labels};
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, warn};

// DNS 端点（传输协议 + 地址）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsEndpoint {
    pub transport: DnsTransport,
    pub addr: SocketAddr,
}

impl DnsEndpoint {
    pub fn new(transport: DnsTransport, addr: SocketAddr) -> Self {
        Self { transport, addr }
    }

    // 从配置条目构建端点
    // 缺省地址为 [::1]:53，缺省传输协议为 tcp6
    pub fn from_config(server: &DnsServerConfig) -> Result<Self, ConfigError> {
        let addr = if server.addr.is_empty() {
            parse_dns_addr(dns_limits::DEFAULT_ENDPOINT)?
        } else {
            parse_dns_addr(&server.addr)?
        };
        Ok(Self::new(server.net.unwrap_or_default(), addr))
    }
}

impl Default for DnsEndpoint {
    fn default() -> Self {
        Self::new(
            DnsTransport::default(),
            SocketAddr::new(IpAddr::from(std::net::Ipv6Addr::LOCALHOST), dns_limits::DEFAULT_PORT),
        )
    }
}

impl fmt::Display for DnsEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.transport, self.addr)
    }
}

/// Resolves host names against an ordered list of classic DNS endpoints.
///
/// Endpoints are tried strictly in order. The first endpoint that yields at
/// least one A record wins; answers are never cached.
#[derive(Debug, Clone)]
pub struct FallbackResolver {
    endpoints: Vec<DnsEndpoint>,
    timeout: Duration,
}

impl FallbackResolver {
    pub fn new(endpoints: Vec<DnsEndpoint>, timeout: Duration) -> Self {
        Self { endpoints, timeout }
    }

    pub fn endpoints(&self) -> &[DnsEndpoint] {
        &self.endpoints
    }

    // 解析主机名
    pub async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, AppError> {
        // IP 字面量无需查询
        let literal = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = IpAddr::from_str(literal) {
            return Ok(vec![ip]);
        }

        if self.endpoints.is_empty() {
            return Err(AppError::NoEndpointsConfigured);
        }

        let name = to_fqdn(host)?;

        for endpoint in &self.endpoints {
            let label = endpoint.to_string();
            match tokio::time::timeout(self.timeout, query_endpoint(endpoint, &name)).await {
                Ok(Ok(ips)) => {
                    debug!("Resolved {} via {}: {:?}", host, endpoint, ips);
                    METRICS
                        .resolver_queries_total()
                        .with_label_values(&[&label, result_labels::SUCCESS])
                        .inc();
                    return Ok(ips);
                }
                Ok(Err(e)) => {
                    warn!("DNS endpoint {} failed for {}: {}", endpoint, host, e);
                    METRICS
                        .resolver_queries_total()
                        .with_label_values(&[&label, result_labels::FAILURE])
                        .inc();
                }
                Err(_) => {
                    warn!("DNS endpoint {} timed out for {}", endpoint, host);
                    METRICS
                        .resolver_queries_total()
                        .with_label_values(&[&label, result_labels::FAILURE])
                        .inc();
                }
            }
        }

        Err(AppError::ResolutionFailed(host.to_string()))
    }
}

fn to_fqdn(host: &str) -> Result<Name, AppError> {
    let fqdn = if host.ends_with('.') {
        host.to_string()
    } else {
        format!("{}.", host)
    };
    Ok(Name::from_ascii(fqdn)?)
}

// 向单个端点发出一次 A 查询
async fn query_endpoint(endpoint: &DnsEndpoint, name: &Name) -> Result<Vec<IpAddr>, AppError> {
    let fail = |reason: String| AppError::DnsEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    if !endpoint.transport.accepts(&endpoint.addr) {
        return Err(fail("address family does not match transport".to_string()));
    }

    let id: u16 = rand::random();
    let mut request = Message::new();
    request
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(name.clone(), RecordType::A));
    let payload = request.to_vec()?;

    let raw = if endpoint.transport.is_tcp() {
        exchange_tcp(endpoint.addr, &payload).await?
    } else {
        exchange_udp(endpoint.addr, &payload).await?
    };

    let response = Message::from_vec(&raw)?;
    if response.id() != id {
        return Err(fail(format!(
            "response id {} does not match query id {}",
            response.id(),
            id
        )));
    }
    if response.response_code() != ResponseCode::NoError {
        return Err(fail(format!("response code {}", response.response_code())));
    }

    // 仅提取 A 记录
    let ips: Vec<IpAddr> = response
        .answers()
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::A(a)) => Some(IpAddr::V4(a.0)),
            _ => None,
        })
        .collect();

    if ips.is_empty() {
        return Err(fail("no A records in response".to_string()));
    }
    Ok(ips)
}

async fn exchange_udp(addr: SocketAddr, payload: &[u8]) -> Result<Vec<u8>, AppError> {
    let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(addr).await?;
    socket.send(payload).await?;

    let mut buf = vec![0u8; dns_limits::UDP_BUFFER_SIZE];
    let len = socket.recv(&mut buf).await?;
    buf.truncate(len);
    Ok(buf)
}

async fn exchange_tcp(addr: SocketAddr, payload: &[u8]) -> Result<Vec<u8>, AppError> {
    let mut stream = TcpStream::connect(addr).await?;

    // 2 字节长度前缀
    let len = u16::try_from(payload.len())
        .map_err(|_| AppError::Internal("DNS query too large".to_string()))?;
    let mut framed = Vec::with_capacity(payload.len() + 2);
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(payload);
    stream.write_all(&framed).await?;

    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let mut buf = vec![0u8; u16::from_be_bytes(len_buf) as usize];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

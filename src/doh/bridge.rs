use crate::doh::client::DohClient;
use crate::error::AppError;
use crate::metrics::METRICS;
use crate::r#const::{bridge, result_labels};
use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record, RecordType};
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_graceful_shutdown::{IntoSubsystem, SubsystemHandle};
use tracing::{debug, error, info, warn};
use url::Url;

/// Answers classic DNS A queries from a list of DNS-over-HTTPS endpoints.
///
/// Every reply is authoritative. Non-A questions get an empty reply, and an
/// exhausted endpoint list or an expired deadline gets SERVFAIL.
pub struct DohBridge {
    endpoints: Vec<Url>,
    client: DohClient,
    timeout: Duration,
}

impl DohBridge {
    pub fn new(endpoints: Vec<Url>, client: DohClient, timeout: Duration) -> Self {
        Self {
            endpoints,
            client,
            timeout,
        }
    }

    // 生成应答消息
    pub async fn answer(&self, request: &Message) -> Message {
        let mut response = Message::new();
        response
            .set_id(request.id())
            .set_message_type(MessageType::Response)
            .set_op_code(request.op_code())
            .set_recursion_desired(request.recursion_desired())
            .set_authoritative(true);
        for query in request.queries() {
            response.add_query(query.clone());
        }

        // 空问题或非 A 查询：返回空的权威应答
        let query = match request.queries().first() {
            Some(q) if q.query_type() == RecordType::A => q,
            _ => {
                METRICS
                    .bridge_queries_total()
                    .with_label_values(&[result_labels::EMPTY])
                    .inc();
                return response;
            }
        };

        let name = query.name().to_string();
        match tokio::time::timeout(self.timeout, self.lookup(&name)).await {
            Ok(Some(records)) => {
                debug!("Bridge answered {} with {} record(s)", name, records.len());
                for ip in records {
                    let o = ip.octets();
                    response.add_answer(Record::from_rdata(
                        query.name().clone(),
                        bridge::RECORD_TTL,
                        RData::A(A::new(o[0], o[1], o[2], o[3])),
                    ));
                }
                METRICS
                    .bridge_queries_total()
                    .with_label_values(&[result_labels::SUCCESS])
                    .inc();
            }
            Ok(None) => {
                warn!("All DoH endpoints failed for {}", name);
                response.set_response_code(ResponseCode::ServFail);
                METRICS
                    .bridge_queries_total()
                    .with_label_values(&[result_labels::SERVFAIL])
                    .inc();
            }
            Err(_) => {
                warn!("DoH lookup for {} timed out", name);
                response.set_response_code(ResponseCode::ServFail);
                METRICS
                    .bridge_queries_total()
                    .with_label_values(&[result_labels::SERVFAIL])
                    .inc();
            }
        }

        response
    }

    // 按顺序查询 DoH 端点，首个成功者胜出
    async fn lookup(&self, name: &str) -> Option<Vec<Ipv4Addr>> {
        for endpoint in &self.endpoints {
            match self.client.query_a(endpoint, name).await {
                Ok(records) => return Some(records),
                Err(e) => debug!("DoH endpoint failed, trying next: {}", e),
            }
        }
        None
    }
}

// 非标准查询返回 NOTIMP
fn not_implemented(request: &Message) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_recursion_desired(request.recursion_desired())
        .set_response_code(ResponseCode::NotImp);
    response
}

// 读取一个带 2 字节长度前缀的 DNS 帧，对端关闭时返回 None
async fn read_frame(stream: &mut TcpStream) -> Result<Option<Vec<u8>>, AppError> {
    let mut len_buf = [0u8; 2];
    let idle = Duration::from_secs(bridge::TCP_TIMEOUT);
    match tokio::time::timeout(idle, stream.read_exact(&mut len_buf)).await? {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let mut buf = vec![0u8; u16::from_be_bytes(len_buf) as usize];
    tokio::time::timeout(idle, stream.read_exact(&mut buf)).await??;
    Ok(Some(buf))
}

async fn write_frame(stream: &mut TcpStream, payload: &[u8]) -> Result<(), AppError> {
    let len = u16::try_from(payload.len())
        .map_err(|_| AppError::Internal("DNS response too large".to_string()))?;
    let mut framed = Vec::with_capacity(payload.len() + 2);
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(payload);
    stream.write_all(&framed).await?;
    Ok(())
}

// 处理单个 TCP 连接上的全部查询
async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    bridge: Arc<DohBridge>,
) -> Result<(), AppError> {
    while let Some(frame) = read_frame(&mut stream).await? {
        let request = match Message::from_vec(&frame) {
            Ok(message) => message,
            Err(e) => {
                debug!("Dropping undecodable DNS message from {}: {}", peer, e);
                return Ok(());
            }
        };

        let response = if request.op_code() != OpCode::Query
            || request.message_type() != MessageType::Query
        {
            debug!("Unsupported operation code: {:?}", request.op_code());
            not_implemented(&request)
        } else {
            debug!(
                "Bridge received {} question(s) from {}",
                request.queries().len(),
                peer
            );
            bridge.answer(&request).await
        };

        write_frame(&mut stream, &response.to_vec()?).await?;
    }
    Ok(())
}

/// A DNS-over-TCP server bound to a loopback port, backed by a [`DohBridge`].
pub struct DnsBridgeServer {
    name: String,
    listener: TcpListener,
    local_addr: SocketAddr,
    bridge: Arc<DohBridge>,
}

impl DnsBridgeServer {
    // 绑定监听地址（端口由系统分配）
    pub async fn bind(name: impl Into<String>, bridge: DohBridge) -> Result<Self, AppError> {
        let listener = TcpListener::bind(bridge::LISTEN_ADDR).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            name: name.into(),
            listener,
            local_addr,
            bridge: Arc::new(bridge),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    // 运行服务器，直到关闭信号到来
    pub async fn serve<F>(self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()> + Send,
    {
        info!("DNS bridge {} listening on {}", self.name, self.local_addr);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let bridge = self.bridge.clone();
                        connections.spawn(async move {
                            if let Err(e) = serve_connection(stream, peer, bridge).await {
                                debug!("DNS bridge connection from {} closed: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => error!("DNS bridge {} accept error: {}", self.name, e),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = &mut shutdown => break,
            }
        }

        info!("Shutdown requested, stopping DNS bridge {}", self.name);
        drop(self.listener);

        let drain = async { while connections.join_next().await.is_some() {} };
        let drained =
            tokio::time::timeout(Duration::from_secs(bridge::SHUTDOWN_TIMEOUT), drain).await;
        match drained {
            Ok(()) => info!("DNS bridge {} shutdown completed successfully", self.name),
            Err(_) => {
                warn!("DNS bridge {} shutdown timed out", self.name);
                connections.abort_all();
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl IntoSubsystem<AppError> for DnsBridgeServer {
    async fn run(self, subsys: SubsystemHandle) -> Result<(), AppError> {
        self.serve(subsys.on_shutdown_requested()).await
    }
}

use crate::error::AppError;
use crate::metrics::METRICS;
use crate::resolver::FallbackResolver;
use crate::upstream::overlay::{BoxStream, OverlayNetwork};
use crate::upstream::UpstreamSpec;
use hyper::rt::{Read, Write};
use hyper::Uri;
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::TcpStream;
use tower_service::Service;
use tracing::{debug, warn};

// 上游连接（可能经过 TLS 包装）
pub struct UpstreamStream {
    inner: TokioIo<BoxStream>,
}

impl UpstreamStream {
    fn new(stream: BoxStream) -> Self {
        Self {
            inner: TokioIo::new(stream),
        }
    }
}

impl Connection for UpstreamStream {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

impl Read for UpstreamStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl Write for UpstreamStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

struct ConnectorInner {
    spec: UpstreamSpec,
    resolver: Arc<FallbackResolver>,
    overlay: Option<Arc<dyn OverlayNetwork>>,
    tls: Option<tokio_native_tls::TlsConnector>,
    connect_timeout: Duration,
}

/// Opens connections to one upstream.
///
/// The request URI handed in by the HTTP client is ignored: the destination
/// is always the upstream's own host and port. The host is resolved through
/// the [`FallbackResolver`] and every returned address is tried in order,
/// either directly or through the upstream's overlay network.
#[derive(Clone)]
pub struct UpstreamConnector {
    inner: Arc<ConnectorInner>,
}

impl UpstreamConnector {
    pub fn new(
        spec: UpstreamSpec,
        resolver: Arc<FallbackResolver>,
        overlay: Option<Arc<dyn OverlayNetwork>>,
        connect_timeout: Duration,
    ) -> Result<Self, AppError> {
        // 仅 https 上游需要 TLS
        let tls = if spec.is_https() {
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(spec.insecure_skip_verify)
                .danger_accept_invalid_hostnames(spec.insecure_skip_verify)
                .build()
                .map_err(|e| {
                    AppError::Internal(format!("Failed to create TLS connector: {}", e))
                })?;
            Some(tokio_native_tls::TlsConnector::from(connector))
        } else {
            None
        };

        Ok(Self {
            inner: Arc::new(ConnectorInner {
                spec,
                resolver,
                overlay,
                tls,
                connect_timeout,
            }),
        })
    }
}

impl ConnectorInner {
    async fn connect(&self) -> Result<UpstreamStream, AppError> {
        let host = &self.spec.host;
        let ips = self.resolver.resolve(host).await.map_err(|e| {
            warn!("Failed to resolve upstream host {}: {}", host, e);
            AppError::UpstreamUnreachable(format!("failed to resolve {}: {}", host, e))
        })?;

        let mut stream = None;
        let mut last_error = None;
        for ip in ips {
            let addr = SocketAddr::new(ip, self.spec.port);
            match self.dial(addr).await {
                Ok(s) => {
                    debug!("Connected to upstream {} at {}", self.spec.endpoint, addr);
                    stream = Some(s);
                    break;
                }
                Err(e) => {
                    warn!("Failed to dial upstream {} at {}: {}", self.spec.endpoint, addr, e);
                    METRICS
                        .upstream_dial_errors_total()
                        .with_label_values(&[self.spec.endpoint.as_str()])
                        .inc();
                    last_error = Some(e);
                }
            }
        }

        let stream = stream.ok_or_else(|| {
            AppError::UpstreamUnreachable(match last_error {
                Some(e) => format!("failed to dial {}: {}", host, e),
                None => format!("no addresses for {}", host),
            })
        })?;

        let stream = match &self.tls {
            Some(tls) => {
                let tls_stream = tls.connect(host, stream).await.map_err(|e| {
                    AppError::UpstreamUnreachable(format!("TLS handshake with {} failed: {}", host, e))
                })?;
                Box::new(tls_stream) as BoxStream
            }
            None => stream,
        };

        Ok(UpstreamStream::new(stream))
    }

    // 直连或经覆盖网络拨号
    async fn dial(&self, addr: SocketAddr) -> Result<BoxStream, AppError> {
        let dial = async {
            match &self.overlay {
                Some(overlay) => overlay.dial("tcp", &addr.to_string()).await,
                None => {
                    let stream = TcpStream::connect(addr).await?;
                    let _ = stream.set_nodelay(true);
                    Ok(Box::new(stream) as BoxStream)
                }
            }
        };
        tokio::time::timeout(self.connect_timeout, dial).await?
    }
}

impl Service<Uri> for UpstreamConnector {
    type Response = UpstreamStream;
    type Error = AppError;
    type Future = Pin<Box<dyn Future<Output = Result<UpstreamStream, AppError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _dst: Uri) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(async move { inner.connect().await })
    }
}

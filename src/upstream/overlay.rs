use crate::config::TailnetConfig;
use crate::error::AppError;
use crate::r#const::http_headers;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use http_body_util::Empty;
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, warn};

// 双向字节流
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxStream = Box<dyn AsyncStream>;

/// Dial capability of an overlay (mesh/tunnel) network.
///
/// The gateway only ever asks for a stream to `address`; how the overlay
/// carries it is up to the implementation.
#[async_trait]
pub trait OverlayNetwork: Send + Sync {
    async fn dial(&self, network: &str, address: &str) -> Result<BoxStream, AppError>;
}

// 将 tailnet 配置转换为覆盖网络句柄
pub trait OverlayProvider: Send + Sync {
    fn attach(
        &self,
        name: &str,
        config: &TailnetConfig,
    ) -> Result<Arc<dyn OverlayNetwork>, AppError>;
}

// 通过覆盖网络节点本地的 HTTP CONNECT 代理接入
#[derive(Debug, Default, Clone, Copy)]
pub struct ProxyOverlayProvider;

impl OverlayProvider for ProxyOverlayProvider {
    fn attach(
        &self,
        name: &str,
        config: &TailnetConfig,
    ) -> Result<Arc<dyn OverlayNetwork>, AppError> {
        debug!("Attaching tailnet {} through proxy {}", name, config.proxy);
        Ok(Arc::new(ConnectProxyOverlay::new(
            name,
            &config.proxy,
            &config.id,
            &config.auth_key,
        )))
    }
}

pub struct ConnectProxyOverlay {
    name: String,
    proxy: String,
    authorization: String,
}

impl ConnectProxyOverlay {
    pub fn new(name: &str, proxy: &str, id: &str, auth_key: &str) -> Self {
        let credentials = STANDARD.encode(format!("{}:{}", id, auth_key));
        Self {
            name: name.to_string(),
            proxy: proxy.to_string(),
            authorization: format!("{}{}", http_headers::auth::BASIC_PREFIX, credentials),
        }
    }
}

#[async_trait]
impl OverlayNetwork for ConnectProxyOverlay {
    async fn dial(&self, network: &str, address: &str) -> Result<BoxStream, AppError> {
        if network != "tcp" {
            return Err(AppError::Overlay(format!(
                "tailnet {} does not support network {}",
                self.name, network
            )));
        }

        let stream = TcpStream::connect(&self.proxy).await.map_err(|e| {
            AppError::Overlay(format!(
                "failed to reach tailnet {} proxy {}: {}",
                self.name, self.proxy, e
            ))
        })?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| AppError::Overlay(e.to_string()))?;

        // 连接需要保持运行，直到升级完成
        tokio::spawn(async move {
            if let Err(e) = conn.with_upgrades().await {
                warn!("Tailnet proxy connection error: {}", e);
            }
        });

        let request = Request::builder()
            .method(Method::CONNECT)
            .uri(address)
            .header(hyper::header::HOST, address)
            .header(http_headers::PROXY_AUTHORIZATION, &self.authorization)
            .body(Empty::<Bytes>::new())
            .map_err(|e| AppError::Overlay(e.to_string()))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| AppError::Overlay(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(AppError::Overlay(format!(
                "tailnet {} refused {}: {}",
                self.name,
                address,
                response.status()
            )));
        }

        let upgraded = hyper::upgrade::on(response)
            .await
            .map_err(|e| AppError::Overlay(e.to_string()))?;

        debug!("Tailnet {} tunnel established to {}", self.name, address);
        Ok(Box::new(TokioIo::new(upgraded)))
    }
}

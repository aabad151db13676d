use crate::config::{Config, DnsTransport};
use crate::doh::{DnsBridgeServer, DohBridge, DohClient};
use crate::error::{AppError, ConfigError};
use crate::http_client::HttpClient;
use crate::matcher::{MatcherChain, UpstreamMatcher};
use crate::metrics::METRICS;
use crate::middleware::{self, BoxHandler, Middleware, Pipeline};
use crate::proxy::ProxyHandler;
use crate::r#const::subsystem_names;
use crate::resolver::{DnsEndpoint, FallbackResolver};
use crate::upstream::{OverlayNetwork, OverlayProvider, UpstreamClient, UpstreamSpec};
use axum::body::Body;
use axum::http::Request;
use axum::Router;
use std::collections::BTreeMap;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_graceful_shutdown::{IntoSubsystem, SubsystemHandle};
use tracing::{debug, error, info, warn};
use url::Url;

// 解析上游配置并检查 tailnet 引用
// 不涉及网络操作，可用于配置测试
pub fn check_upstreams(config: &Config) -> Result<Vec<UpstreamSpec>, ConfigError> {
    let mut specs = Vec::with_capacity(config.upstreams.len());
    for upstream in &config.upstreams {
        let spec = UpstreamSpec::from_config(upstream)?;
        if let Some(tailnet) = &spec.tailnet {
            if !config.tailnets.contains_key(tailnet) {
                return Err(ConfigError::UnknownTailnet(tailnet.clone()));
            }
        }
        specs.push(spec);
    }
    Ok(specs)
}

/// The assembled gateway: request pipeline, DNS bridges and overlay handles.
///
/// Assembly fails before any listener is bound when the configuration is
/// invalid or an upstream references an unknown tailnet.
pub struct Gateway {
    listen: SocketAddr,
    handler: BoxHandler,
    resolver: Arc<FallbackResolver>,
    bridges: Vec<DnsBridgeServer>,
    overlays: BTreeMap<String, Arc<dyn OverlayNetwork>>,
}

impl Gateway {
    pub async fn assemble(config: &Config, provider: &dyn OverlayProvider) -> Result<Self, AppError> {
        config.validate()?;
        let listen: SocketAddr = config.server.listen.parse()?;
        let http_config = config.http_client_config();

        // 1. 覆盖网络句柄
        let mut overlays = BTreeMap::new();
        for (name, tailnet) in &config.tailnets {
            overlays.insert(name.clone(), provider.attach(name, tailnet)?);
        }

        // 2. 上游配置（在任何监听之前失败）
        let specs = check_upstreams(config)?;

        // 3. 中间件（会拉取策略包）
        let mut middlewares: Vec<Arc<dyn Middleware>> = Vec::with_capacity(config.middlewares.len());
        for middleware_config in &config.middlewares {
            info!("Creating middleware {}", middleware_config.kind());
            middlewares.push(middleware::from_config(middleware_config, &http_config).await?);
        }

        // 4. DNS 端点，DoH 条目替换为本地桥接服务器
        let mut endpoints = Vec::with_capacity(config.dns_servers.len());
        let mut bridges = Vec::new();
        let doh_client = if config.dns_servers.iter().any(|s| s.doh) {
            Some(DohClient::new(HttpClient::create(&http_config)?))
        } else {
            None
        };
        for (index, server) in config.dns_servers.iter().enumerate() {
            let client = match (&doh_client, server.doh) {
                (Some(client), true) => client,
                _ => {
                    endpoints.push(DnsEndpoint::from_config(server)?);
                    continue;
                }
            };

            let url = Url::parse(&server.addr)
                .map_err(|e| ConfigError::InvalidDnsServer(format!("{}: {}", server.addr, e)))?;
            let bridge = DohBridge::new(
                vec![url],
                client.clone(),
                Duration::from_secs(config.dns.bridge_timeout),
            );
            let bridge_server =
                DnsBridgeServer::bind(format!("{}_{}", subsystem_names::DNS_BRIDGE, index), bridge)
                    .await?;
            info!(
                "DoH endpoint {} bridged at {}",
                server.addr,
                bridge_server.local_addr()
            );
            endpoints.push(DnsEndpoint::new(DnsTransport::Tcp, bridge_server.local_addr()));
            bridges.push(bridge_server);
        }

        if endpoints.is_empty()
            && specs.iter().any(|s| s.host.parse::<IpAddr>().is_err())
        {
            warn!("No DNS servers configured, upstream host names cannot be resolved");
        }
        let resolver = Arc::new(FallbackResolver::new(
            endpoints,
            Duration::from_secs(config.dns.timeout),
        ));

        // 5. 上游客户端与匹配器（顺序即优先级）
        let mut matchers = MatcherChain::default();
        for spec in specs {
            let overlay = spec
                .tailnet
                .as_ref()
                .and_then(|name| overlays.get(name).cloned());
            debug!("Registering upstream {}", spec.endpoint);
            let client = UpstreamClient::build(spec, resolver.clone(), overlay, &http_config)?;
            matchers.push(Box::new(UpstreamMatcher::new(Arc::new(client))));
        }

        // 6. 中间件管道
        let handler = Pipeline::build(Arc::new(ProxyHandler::new(matchers)), &middlewares)?;

        Ok(Self {
            listen,
            handler,
            resolver,
            bridges,
            overlays,
        })
    }

    pub fn handler(&self) -> BoxHandler {
        self.handler.clone()
    }

    pub fn resolver(&self) -> &FallbackResolver {
        &self.resolver
    }

    pub fn bridge_addrs(&self) -> Vec<SocketAddr> {
        self.bridges.iter().map(|b| b.local_addr()).collect()
    }

    // 拆分为网关服务器和 DNS 桥接服务器
    pub fn into_parts(self) -> (GatewayServer, Vec<DnsBridgeServer>) {
        (
            GatewayServer {
                listen: self.listen,
                handler: self.handler,
                _overlays: self.overlays,
            },
            self.bridges,
        )
    }
}

// 网关 HTTP 服务器
pub struct GatewayServer {
    listen: SocketAddr,
    handler: BoxHandler,
    // 覆盖网络句柄与网关同生命周期
    _overlays: BTreeMap<String, Arc<dyn OverlayNetwork>>,
}

impl GatewayServer {
    // 所有请求都交给处理管道
    pub fn router(handler: BoxHandler) -> Router {
        Router::new().fallback(move |request: Request<Body>| {
            let handler = handler.clone();
            async move {
                let response = handler.handle(request).await;
                METRICS
                    .http_requests_total()
                    .with_label_values(&[response.status().as_str()])
                    .inc();
                response
            }
        })
    }

    // 在给定监听器上提供服务，直到关闭信号到来
    pub async fn serve_on<F>(
        listener: TcpListener,
        handler: BoxHandler,
        shutdown: F,
    ) -> Result<(), AppError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(
            listener,
            Self::router(handler).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;
        Ok(())
    }

    pub async fn serve<F>(self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = match TcpListener::bind(self.listen).await {
            Ok(listener) => {
                info!("Gateway server listening on {}", self.listen);
                listener
            }
            Err(e) => {
                error!("Failed to bind gateway server: {}", e);
                return Err(AppError::Io(e));
            }
        };
        Self::serve_on(listener, self.handler, shutdown).await
    }
}

#[async_trait::async_trait]
impl IntoSubsystem<AppError> for GatewayServer {
    async fn run(self, subsys: SubsystemHandle) -> Result<(), AppError> {
        let shutdown = async move {
            subsys.on_shutdown_requested().await;
            info!("Shutdown requested, stopping gateway server");
        };

        match self.serve(shutdown).await {
            Ok(()) => {
                info!("Gateway server stopped");
                Ok(())
            }
            Err(e) => {
                error!("Gateway server error: {}", e);
                Err(e)
            }
        }
    }
}

use axum::http::{header, StatusCode};
use axum::{routing::get, Router};
use once_cell::sync::Lazy;
use prometheus::{opts, HistogramVec, IntCounter, IntCounterVec, Registry};

// 全局静态指标实例
pub static METRICS: Lazy<GatewayMetrics> = Lazy::new(GatewayMetrics::new);

// 网关性能指标
pub struct GatewayMetrics {
    registry: Registry,

    // 1. 请求处理和性能指标
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,

    // 2. 路由与策略指标
    route_misses_total: IntCounter,
    policy_decisions_total: IntCounterVec,

    // 3. 解析与连接指标
    resolver_queries_total: IntCounterVec,
    upstream_dial_errors_total: IntCounterVec,
    bridge_queries_total: IntCounterVec,
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayMetrics {
    // 创建新的指标收集器
    pub fn new() -> Self {
        let registry = Registry::new();

        // 1. 请求处理和性能指标
        let http_requests_total = IntCounterVec::new(
            opts!(
                "tsgate_http_requests_total",
                "Total HTTP requests handled by the gateway, classified by response status"
            ),
            &["status"],
        )
        .unwrap();

        let http_request_duration_seconds = HistogramVec::new(
            prometheus::histogram_opts!(
                "tsgate_http_request_duration_seconds",
                "Time until upstream response headers arrive in seconds, classified by upstream",
                vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
            ),
            &["upstream"],
        )
        .unwrap();

        // 2. 路由与策略指标
        let route_misses_total = IntCounter::new(
            "tsgate_route_misses_total",
            "Total requests that matched no upstream",
        )
        .unwrap();

        let policy_decisions_total = IntCounterVec::new(
            opts!(
                "tsgate_policy_decisions_total",
                "Total policy decisions, classified by outcome (allow, deny, error)"
            ),
            &["decision"],
        )
        .unwrap();

        // 3. 解析与连接指标
        let resolver_queries_total = IntCounterVec::new(
            opts!(
                "tsgate_resolver_queries_total",
                "Total DNS queries issued by the resolver, classified by endpoint and result"
            ),
            &["endpoint", "result"],
        )
        .unwrap();

        let upstream_dial_errors_total = IntCounterVec::new(
            opts!(
                "tsgate_upstream_dial_errors_total",
                "Total failed dials to upstream addresses, classified by upstream"
            ),
            &["upstream"],
        )
        .unwrap();

        let bridge_queries_total = IntCounterVec::new(
            opts!(
                "tsgate_bridge_queries_total",
                "Total queries answered by DNS bridge servers, classified by result"
            ),
            &["result"],
        )
        .unwrap();

        // 创建指标实例
        let metrics = GatewayMetrics {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            route_misses_total,
            policy_decisions_total,
            resolver_queries_total,
            upstream_dial_errors_total,
            bridge_queries_total,
        };

        // 注册所有指标
        metrics.register_all_metrics();

        metrics
    }

    // 注册所有指标
    fn register_all_metrics(&self) {
        self.registry
            .register(Box::new(self.http_requests_total.clone()))
            .unwrap();
        self.registry
            .register(Box::new(self.http_request_duration_seconds.clone()))
            .unwrap();
        self.registry
            .register(Box::new(self.route_misses_total.clone()))
            .unwrap();
        self.registry
            .register(Box::new(self.policy_decisions_total.clone()))
            .unwrap();
        self.registry
            .register(Box::new(self.resolver_queries_total.clone()))
            .unwrap();
        self.registry
            .register(Box::new(self.upstream_dial_errors_total.clone()))
            .unwrap();
        self.registry
            .register(Box::new(self.bridge_queries_total.clone()))
            .unwrap();
    }

    // 获取 Prometheus 注册表
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // 下面是各个指标的getter方法，用于其他模块增加计数

    pub fn http_requests_total(&self) -> &IntCounterVec {
        &self.http_requests_total
    }

    pub fn http_request_duration_seconds(&self) -> &HistogramVec {
        &self.http_request_duration_seconds
    }

    pub fn route_misses_total(&self) -> &IntCounter {
        &self.route_misses_total
    }

    pub fn policy_decisions_total(&self) -> &IntCounterVec {
        &self.policy_decisions_total
    }

    pub fn resolver_queries_total(&self) -> &IntCounterVec {
        &self.resolver_queries_total
    }

    pub fn upstream_dial_errors_total(&self) -> &IntCounterVec {
        &self.upstream_dial_errors_total
    }

    pub fn bridge_queries_total(&self) -> &IntCounterVec {
        &self.bridge_queries_total
    }
}

// 提供指标导出路由
pub fn metrics_routes() -> Router {
    Router::new().route(
        "/metrics",
        get(|| async {
            let encoder = prometheus::TextEncoder::new();

            // 直接从全局METRICS获取所有注册的指标
            let metric_families = METRICS.registry().gather();

            // 编码为文本格式
            let mut buffer = String::new();
            if let Err(e) = encoder.encode_utf8(&metric_families, &mut buffer) {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
                    e.to_string(),
                );
            }

            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
                buffer,
            )
        }),
    )
}

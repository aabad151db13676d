use crate::error::AppError;
use crate::matcher::request_host;
use crate::metrics::METRICS;
use crate::middleware::{BoxHandler, DecisionEngine, Handler, Middleware};
use crate::proxy::error_response;
use crate::r#const::{decision_labels, policy};
use async_trait::async_trait;
use axum::body::{Body, HttpBody};
use axum::extract::ConnectInfo;
use axum::http::{header, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error};

/// Snapshot of an inbound request submitted to the decision engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyInput {
    pub method: String,
    pub host: String,
    pub proto: String,
    pub url: String,
    pub request_uri: String,
    pub remote_addr: String,
    // 无请求体时为 0，分块或长度未知时为 -1
    pub content_length: i64,
    // 规范化头名称（如 Content-Type）-> 按出现顺序排列的值
    pub headers: BTreeMap<String, Vec<String>>,
}

impl PolicyInput {
    pub fn from_request(request: &Request<Body>) -> Self {
        let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in request.headers() {
            headers
                .entry(canonical_header_name(name.as_str()))
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }

        let content_length = content_length(request);

        let remote_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();

        let request_uri = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        Self {
            method: request.method().to_string(),
            host: request_host(request).to_string(),
            proto: format!("{:?}", request.version()),
            url: request.uri().to_string(),
            request_uri,
            remote_addr,
            content_length,
            headers,
        }
    }
}

// 每个以 '-' 分隔的片段首字母大写，其余小写
fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first
                    .to_ascii_uppercase()
                    .to_string()
                    + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn content_length(request: &Request<Body>) -> i64 {
    let headers = request.headers();
    if let Some(value) = headers.get(header::CONTENT_LENGTH) {
        return value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(policy::UNKNOWN_CONTENT_LENGTH);
    }

    let chunked = headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("chunked"));
    if chunked {
        return policy::UNKNOWN_CONTENT_LENGTH;
    }

    // 没有长度头时按请求体实际大小判断，空请求体为 0
    request
        .body()
        .size_hint()
        .exact()
        .and_then(|n| i64::try_from(n).ok())
        .unwrap_or(policy::UNKNOWN_CONTENT_LENGTH)
}

// 策略决策中间件
pub struct PolicyMiddleware {
    engine: Arc<dyn DecisionEngine>,
}

impl PolicyMiddleware {
    pub fn new(engine: Arc<dyn DecisionEngine>) -> Self {
        Self { engine }
    }
}

impl Middleware for PolicyMiddleware {
    fn name(&self) -> &str {
        "opa"
    }

    fn wrap(&self, next: BoxHandler) -> Option<BoxHandler> {
        Some(Arc::new(PolicyHandler {
            engine: self.engine.clone(),
            next,
        }))
    }
}

struct PolicyHandler {
    engine: Arc<dyn DecisionEngine>,
    next: BoxHandler,
}

#[async_trait]
impl Handler for PolicyHandler {
    async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let input = PolicyInput::from_request(&request);

        match self.engine.decide(policy::DECISION_PATH, &input).await {
            // 只有布尔值 true 才放行
            Ok(Some(Value::Bool(true))) => {
                debug!("Policy allowed {} {}", input.method, input.url);
                METRICS
                    .policy_decisions_total()
                    .with_label_values(&[decision_labels::ALLOW])
                    .inc();
                self.next.handle(request).await
            }
            Ok(result) => {
                debug!(
                    "Policy denied {} {}, result: {:?}",
                    input.method, input.url, result
                );
                METRICS
                    .policy_decisions_total()
                    .with_label_values(&[decision_labels::DENY])
                    .inc();
                error_response(StatusCode::FORBIDDEN, &AppError::DecisionDenied.to_string())
            }
            Err(e) => {
                let e = match e {
                    AppError::DecisionEngineError(_) => e,
                    other => AppError::DecisionEngineError(other.to_string()),
                };
                error!("Policy evaluation failed for {} {}: {}", input.method, input.url, e);
                METRICS
                    .policy_decisions_total()
                    .with_label_values(&[decision_labels::ERROR])
                    .inc();
                error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[test]
    fn test_input_snapshot() {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/foo/bar?x=1")
            .header(header::HOST, "foo.example.com")
            .header("X-Trace", "a")
            .header("x-trace", "b")
            .header(header::CONTENT_LENGTH, "12")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo("10.1.2.3:4567".parse::<SocketAddr>().unwrap()));

        let input = PolicyInput::from_request(&request);
        assert_eq!(input.method, "POST");
        assert_eq!(input.host, "foo.example.com");
        assert_eq!(input.proto, "HTTP/1.1");
        assert_eq!(input.url, "/foo/bar?x=1");
        assert_eq!(input.request_uri, "/foo/bar?x=1");
        assert_eq!(input.remote_addr, "10.1.2.3:4567");
        assert_eq!(input.content_length, 12);
        assert_eq!(input.headers["X-Trace"], vec!["a", "b"]);
        assert_eq!(input.headers["Content-Length"], vec!["12"]);
        assert!(!input.headers.contains_key("x-trace"));
    }

    #[test]
    fn test_canonical_header_names() {
        assert_eq!(canonical_header_name("authorization"), "Authorization");
        assert_eq!(canonical_header_name("content-type"), "Content-Type");
        assert_eq!(canonical_header_name("x-FORWARDED-for"), "X-Forwarded-For");
        assert_eq!(canonical_header_name("www-authenticate"), "Www-Authenticate");

        let request = Request::builder()
            .uri("/")
            .header("AUTHORIZATION", "Bearer t")
            .header("content-TYPE", "application/json")
            .body(Body::empty())
            .unwrap();
        let input = PolicyInput::from_request(&request);
        assert_eq!(input.headers["Authorization"], vec!["Bearer t"]);
        assert_eq!(input.headers["Content-Type"], vec!["application/json"]);
    }

    #[test]
    fn test_content_length_without_framing() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let input = PolicyInput::from_request(&request);
        assert_eq!(input.content_length, 0);
        assert_eq!(input.remote_addr, "");

        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["content_length"], 0);
        assert!(json["headers"].is_object());
    }

    #[test]
    fn test_unknown_content_length() {
        let chunked = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(header::TRANSFER_ENCODING, "chunked")
            .body(Body::empty())
            .unwrap();
        assert_eq!(PolicyInput::from_request(&chunked).content_length, -1);

        let streamed = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .body(Body::from_stream(futures_util::stream::iter(vec![
                Ok::<_, std::io::Error>("part"),
            ])))
            .unwrap();
        assert_eq!(PolicyInput::from_request(&streamed).content_length, -1);
    }
}

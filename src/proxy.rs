use crate::error::AppError;
use crate::matcher::MatcherChain;
use crate::metrics::METRICS;
use crate::middleware::Handler;
use crate::upstream::UpstreamSpec;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, StatusCode, Uri, Version};
use futures_util::{stream, StreamExt};
use http_body_util::{BodyExt, BodyStream, StreamBody};
use std::time::Instant;
use tracing::{debug, warn};

// 纯文本错误响应
pub fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(message.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

// 重写入站请求，交给匹配到的上游客户端发送
// 目标地址由客户端决定，URI 中的 authority 只是占位
fn build_outbound(request: Request<Body>, spec: &UpstreamSpec) -> Result<Request<Body>, AppError> {
    let (parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri = Uri::builder()
        .scheme(spec.scheme.as_str())
        .authority(spec.authority())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| AppError::UpstreamDispatchFailed(e.to_string()))?;

    let mut outbound = Request::new(body);
    *outbound.method_mut() = parts.method;
    *outbound.uri_mut() = uri;
    *outbound.version_mut() = Version::HTTP_11;
    *outbound.headers_mut() = parts.headers;

    // HTTP/2 请求没有 Host 头，使用入站 authority
    if !outbound.headers().contains_key(header::HOST) {
        if let Some(authority) = parts.uri.authority() {
            if let Ok(value) = HeaderValue::from_str(authority.as_str()) {
                outbound.headers_mut().insert(header::HOST, value);
            }
        }
    }

    Ok(outbound)
}

/// Terminal handler: routes a request to its upstream and streams the reply back.
pub struct ProxyHandler {
    matchers: MatcherChain,
}

impl ProxyHandler {
    pub fn new(matchers: MatcherChain) -> Self {
        Self { matchers }
    }
}

#[async_trait]
impl Handler for ProxyHandler {
    async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let matched = match self.matchers.find(&request) {
            Some(m) => m,
            None => {
                METRICS.route_misses_total().inc();
                return error_response(StatusCode::NOT_FOUND, "not found");
            }
        };
        let client = matched.client.clone();
        let endpoint = matched.endpoint.to_string();

        let outbound = match build_outbound(request, client.spec()) {
            Ok(r) => r,
            Err(e) => {
                warn!("Failed to build request for {}: {}", endpoint, e);
                return error_response(StatusCode::BAD_GATEWAY, &e.to_string());
            }
        };

        let start_time = Instant::now();
        let response = match client.send(outbound).await {
            Ok(r) => r,
            Err(e) => {
                warn!("Failed to send request to {}: {}", endpoint, e);
                return error_response(StatusCode::BAD_GATEWAY, &e.to_string());
            }
        };
        METRICS
            .http_request_duration_seconds()
            .with_label_values(&[endpoint.as_str()])
            .observe(start_time.elapsed().as_secs_f64());

        let (parts, mut body) = response.into_parts();

        // 提交响应前先读取第一帧，此前的错误仍可返回 502
        let first = match body.frame().await {
            None => None,
            Some(Ok(frame)) => Some(frame),
            Some(Err(e)) => {
                let e = AppError::ResponseStreamFailed(e.to_string());
                warn!("Upstream {} response failed: {}", endpoint, e);
                return error_response(StatusCode::BAD_GATEWAY, &e.to_string());
            }
        };
        debug!("Upstream {} responded {}", endpoint, parts.status);

        // 之后的错误只能中断流
        let frames = stream::iter(first.map(Ok)).chain(BodyStream::new(body));
        Response::from_parts(parts, Body::new(StreamBody::new(frames)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use axum::http::Method;

    fn spec(endpoint: &str) -> UpstreamSpec {
        UpstreamSpec::from_config(&UpstreamConfig {
            endpoint: endpoint.to_string(),
            hosts: Vec::new(),
            path_prefixes: Vec::new(),
            tailnet: None,
            insecure_skip_verify: false,
        })
        .unwrap()
    }

    #[test]
    fn test_outbound_rewrite() {
        let request = Request::builder()
            .method(Method::PUT)
            .version(Version::HTTP_10)
            .uri("/foo/x?y=1")
            .header(header::HOST, "foo.example.com")
            .header("x-multi", "1")
            .header("x-multi", "2")
            .body(Body::empty())
            .unwrap();

        let outbound = build_outbound(request, &spec("https://internal.example.com:8443")).unwrap();
        assert_eq!(outbound.method(), Method::PUT);
        assert_eq!(outbound.version(), Version::HTTP_11);
        assert_eq!(
            outbound.uri().to_string(),
            "https://internal.example.com:8443/foo/x?y=1"
        );
        assert_eq!(outbound.headers()[header::HOST], "foo.example.com");
        let values: Vec<_> = outbound.headers().get_all("x-multi").iter().collect();
        assert_eq!(values, vec!["1", "2"]);
    }

    #[test]
    fn test_outbound_host_from_authority() {
        let request = Request::builder()
            .version(Version::HTTP_2)
            .uri("https://foo.example.com/bar")
            .body(Body::empty())
            .unwrap();

        let outbound = build_outbound(request, &spec("http://10.0.0.5")).unwrap();
        assert_eq!(outbound.uri().to_string(), "http://10.0.0.5/bar");
        assert_eq!(outbound.headers()[header::HOST], "foo.example.com");
    }

    #[tokio::test]
    async fn test_no_match_is_not_found() {
        let handler = ProxyHandler::new(MatcherChain::default());
        let response = handler
            .handle(Request::builder().uri("/bar").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"not found");
    }
}

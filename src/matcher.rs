use crate::upstream::UpstreamClient;
use axum::body::Body;
use axum::http::{header, Request};
use std::sync::Arc;
use tracing::debug;

// 匹配结果：上游客户端及其端点
pub struct Matched<'a> {
    pub client: &'a Arc<UpstreamClient>,
    pub endpoint: &'a str,
}

/// A predicate that claims a request for one upstream.
pub trait Matcher: Send + Sync {
    fn try_match(&self, request: &Request<Body>) -> Option<Matched<'_>>;
}

// 请求的主机名（Host 头优先，其次为 URI authority）
pub fn request_host(request: &Request<Body>) -> &str {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
        .unwrap_or_default()
}

// 前缀匹配，空列表视为匹配任意值
fn matches_prefix(value: &str, prefixes: &[String]) -> bool {
    prefixes.is_empty() || prefixes.iter().any(|p| value.starts_with(p.as_str()))
}

// 按主机名前缀和路径前缀匹配的上游
pub struct UpstreamMatcher {
    hosts: Vec<String>,
    path_prefixes: Vec<String>,
    client: Arc<UpstreamClient>,
}

impl UpstreamMatcher {
    pub fn new(client: Arc<UpstreamClient>) -> Self {
        let spec = client.spec();
        Self {
            hosts: spec.hosts.clone(),
            path_prefixes: spec.path_prefixes.clone(),
            client,
        }
    }

    // 只做精确的前缀比较，不做大小写或百分号解码处理
    pub fn matches(&self, host: &str, path: &str) -> bool {
        matches_prefix(host, &self.hosts) && matches_prefix(path, &self.path_prefixes)
    }
}

impl Matcher for UpstreamMatcher {
    fn try_match(&self, request: &Request<Body>) -> Option<Matched<'_>> {
        if !self.matches(request_host(request), request.uri().path()) {
            return None;
        }
        Some(Matched {
            client: &self.client,
            endpoint: &self.client.spec().endpoint,
        })
    }
}

/// Ordered matchers; the first one that matches wins.
#[derive(Default)]
pub struct MatcherChain {
    matchers: Vec<Box<dyn Matcher>>,
}

impl MatcherChain {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    pub fn push(&mut self, matcher: Box<dyn Matcher>) {
        self.matchers.push(matcher);
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    // 按注册顺序查找
    pub fn find(&self, request: &Request<Body>) -> Option<Matched<'_>> {
        let found = self.matchers.iter().find_map(|m| m.try_match(request));
        match &found {
            Some(m) => debug!(
                "Request {}{} matched upstream {}",
                request_host(request),
                request.uri().path(),
                m.endpoint
            ),
            None => debug!(
                "Request {}{} matched no upstream",
                request_host(request),
                request.uri().path()
            ),
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_rules() {
        assert!(matches_prefix("anything", &[]));
        assert!(matches_prefix(
            "foo.example.com:8080",
            &["foo.example.com".to_string()]
        ));
        assert!(!matches_prefix("Foo.example.com", &["foo.".to_string()]));
        assert!(!matches_prefix(
            "/%66oo",
            &["/bar".to_string(), "/foo".to_string()]
        ));
        assert!(matches_prefix("/foo/x", &["/bar".to_string(), "/foo".to_string()]));
    }

    #[test]
    fn test_request_host_falls_back_to_authority() {
        let request = Request::builder()
            .uri("http://svc.example.com/x")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_host(&request), "svc.example.com");

        let request = Request::builder()
            .uri("/x")
            .header(header::HOST, "foo.example.com")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_host(&request), "foo.example.com");
    }
}

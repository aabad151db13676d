mod common;

use axum::http::{Method, StatusCode};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tsgate::middleware::Handler;
use tsgate::{Config, Gateway, ProxyOverlayProvider};

const CERT: &[u8] = include_bytes!("fixtures/loopback.crt");
const KEY: &[u8] = include_bytes!("fixtures/loopback.key");

struct TlsUpstream {
    addr: SocketAddr,
    served: Arc<AtomicUsize>,
}

// 使用自签名证书的最小 HTTPS 上游
async fn spawn_tls_upstream() -> TlsUpstream {
    let identity = native_tls::Identity::from_pkcs8(CERT, KEY).unwrap();
    let acceptor = tokio_native_tls::TlsAcceptor::from(
        native_tls::TlsAcceptor::new(identity).unwrap(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let served = Arc::new(AtomicUsize::new(0));
    let counter = served.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                // 握手失败说明客户端拒绝了证书
                let mut tls = match acceptor.accept(stream).await {
                    Ok(tls) => tls,
                    Err(_) => return,
                };
                if common::read_request_head(&mut tls).await.is_none() {
                    return;
                }
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = tls
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 6\r\nconnection: close\r\n\r\nsecure")
                    .await;
                let _ = tls.shutdown().await;
            });
        }
    });

    TlsUpstream { addr, served }
}

#[tokio::test]
async fn test_insecure_skip_verify_applies_per_upstream() {
    let upstream = spawn_tls_upstream().await;
    let config = Config::from_yaml(&format!(
        r#"
server:
  listen: "127.0.0.1:0"
upstreams:
  - endpoint: "https://{addr}"
    path_prefixes: ["/trusting"]
    insecure_skip_verify: true
  - endpoint: "https://{addr}"
    path_prefixes: ["/strict"]
"#,
        addr = upstream.addr,
    ))
    .unwrap();
    let gateway = Gateway::assemble(&config, &ProxyOverlayProvider).await.unwrap();
    let handler = gateway.handler();

    let response = handler
        .handle(common::inbound(Method::GET, "svc.local", "/trusting/a"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(common::body_string(response).await, "secure");
    assert_eq!(upstream.served.load(Ordering::SeqCst), 1);

    // 同一服务器，未开启跳过校验的上游必须拒绝证书
    let response = handler
        .handle(common::inbound(Method::GET, "svc.local", "/strict/a"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(upstream.served.load(Ordering::SeqCst), 1);

    // 顺序无关：再次访问放行的上游仍然成功
    let response = handler
        .handle(common::inbound(Method::GET, "svc.local", "/trusting/b"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(upstream.served.load(Ordering::SeqCst), 2);
}

mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tsgate::error::AppError;
use tsgate::middleware::Handler;
use tsgate::upstream::overlay::ConnectProxyOverlay;
use tsgate::{Config, Gateway, OverlayNetwork, ProxyOverlayProvider};

struct TestProxy {
    addr: SocketAddr,
    tunnels: Arc<AtomicUsize>,
}

// 读取 CONNECT 请求头
async fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if stream.read_exact(&mut byte).await.is_err() {
            return None;
        }
        head.push(byte[0]);
    }
    String::from_utf8(head).ok()
}

// 校验认证信息的最小 HTTP CONNECT 代理
async fn spawn_proxy(id: &str, auth_key: &str) -> TestProxy {
    let expected = format!("Basic {}", STANDARD.encode(format!("{}:{}", id, auth_key)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let tunnels = Arc::new(AtomicUsize::new(0));
    let counter = tunnels.clone();

    tokio::spawn(async move {
        while let Ok((mut client, _)) = listener.accept().await {
            let expected = expected.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                let head = match read_head(&mut client).await {
                    Some(head) => head,
                    None => return,
                };
                let mut lines = head.split("\r\n");
                let target = match lines.next().map(|l| l.split(' ').collect::<Vec<_>>()) {
                    Some(parts) if parts.len() == 3 && parts[0] == "CONNECT" => parts[1].to_string(),
                    _ => return,
                };
                let authorized = lines.any(|line| {
                    line.split_once(':')
                        .map(|(name, value)| {
                            name.eq_ignore_ascii_case("proxy-authorization")
                                && value.trim() == expected
                        })
                        .unwrap_or(false)
                });
                if !authorized {
                    let _ = client
                        .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\ncontent-length: 0\r\n\r\n")
                        .await;
                    return;
                }

                let mut server = match TcpStream::connect(&target).await {
                    Ok(server) => server,
                    Err(_) => {
                        let _ = client
                            .write_all(b"HTTP/1.1 502 Bad Gateway\r\ncontent-length: 0\r\n\r\n")
                            .await;
                        return;
                    }
                };
                counter.fetch_add(1, Ordering::SeqCst);
                if client.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await.is_err() {
                    return;
                }
                let _ = tokio::io::copy_bidirectional(&mut client, &mut server).await;
            });
        }
    });

    TestProxy { addr, tunnels }
}

#[tokio::test]
async fn test_dial_through_connect_proxy() {
    let upstream = common::spawn_upstream("mesh").await;
    let proxy = spawn_proxy("node-1", "tskey-abc").await;
    let overlay = ConnectProxyOverlay::new("corp", &proxy.addr.to_string(), "node-1", "tskey-abc");

    let mut stream = overlay
        .dial("tcp", &upstream.addr.to_string())
        .await
        .unwrap();
    stream
        .write_all(b"GET /ping HTTP/1.1\r\nhost: mesh\r\nconnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();

    assert!(reply.starts_with("HTTP/1.1 200 OK"));
    assert!(reply.ends_with("GET /ping"));
    assert_eq!(proxy.tunnels.load(Ordering::SeqCst), 1);
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn test_proxy_refusal_is_overlay_error() {
    let upstream = common::spawn_upstream("mesh").await;
    let proxy = spawn_proxy("node-1", "tskey-abc").await;
    let overlay = ConnectProxyOverlay::new("corp", &proxy.addr.to_string(), "node-1", "wrong");

    let result = overlay.dial("tcp", &upstream.addr.to_string()).await;
    assert_matches!(result.err(), Some(AppError::Overlay(_)));
    assert_eq!(upstream.hits(), 0);
}

#[tokio::test]
async fn test_unsupported_network_is_overlay_error() {
    let proxy = spawn_proxy("node-1", "tskey-abc").await;
    let overlay = ConnectProxyOverlay::new("corp", &proxy.addr.to_string(), "node-1", "tskey-abc");

    let result = overlay.dial("udp", "127.0.0.1:53").await;
    assert_matches!(result.err(), Some(AppError::Overlay(_)));
    assert_eq!(proxy.tunnels.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unreachable_proxy_is_overlay_error() {
    let down = common::closed_addr().await;
    let overlay = ConnectProxyOverlay::new("corp", &down.to_string(), "node-1", "tskey-abc");

    let result = overlay.dial("tcp", "127.0.0.1:80").await;
    assert_matches!(result.err(), Some(AppError::Overlay(_)));
}

#[tokio::test]
async fn test_gateway_routes_through_tailnet_proxy() {
    let upstream = common::spawn_upstream("mesh").await;
    let proxy = spawn_proxy("gw", "tskey-gw").await;
    let config = Config::from_yaml(&format!(
        r#"
server:
  listen: "127.0.0.1:0"
tailnets:
  corp:
    id: "gw"
    auth_key: "tskey-gw"
    proxy: "{proxy}"
upstreams:
  - endpoint: "http://{upstream}"
    tailnet: "corp"
"#,
        proxy = proxy.addr,
        upstream = upstream.addr,
    ))
    .unwrap();
    let gateway = Gateway::assemble(&config, &ProxyOverlayProvider).await.unwrap();

    let response = gateway
        .handler()
        .handle(common::inbound(Method::GET, "mesh.local", "/hello"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(common::body_string(response).await, "GET /hello");
    assert_eq!(proxy.tunnels.load(Ordering::SeqCst), 1);
}

#![allow(dead_code)]

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, Method, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record};
use http_body_util::BodyExt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

// 构造测试 DNS 应答，answer 为 None 时返回 NXDOMAIN
fn build_reply(query: &[u8], answer: Option<Ipv4Addr>) -> Vec<u8> {
    let request = Message::from_vec(query).unwrap();
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(true);
    for query in request.queries() {
        response.add_query(query.clone());
    }

    match answer {
        Some(ip) => {
            let name = request.queries()[0].name().clone();
            response.add_answer(Record::from_rdata(name, 60, RData::A(A(ip))));
        }
        None => {
            response.set_response_code(ResponseCode::NXDomain);
        }
    }

    response.to_vec().unwrap()
}

// 启动 TCP 测试 DNS 服务器
pub async fn spawn_tcp_dns(answer: Option<Ipv4Addr>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut len = [0u8; 2];
                if stream.read_exact(&mut len).await.is_err() {
                    return;
                }
                let mut buf = vec![0u8; u16::from_be_bytes(len) as usize];
                if stream.read_exact(&mut buf).await.is_err() {
                    return;
                }

                let reply = build_reply(&buf, answer);
                let mut framed = (reply.len() as u16).to_be_bytes().to_vec();
                framed.extend_from_slice(&reply);
                let _ = stream.write_all(&framed).await;
            });
        }
    });

    addr
}

// 启动 UDP 测试 DNS 服务器
pub async fn spawn_udp_dns(answer: Option<Ipv4Addr>) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
            let reply = build_reply(&buf[..len], answer);
            let _ = socket.send_to(&reply, peer).await;
        }
    });

    addr
}

// 获取一个当前没有监听者的本地地址
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

// 测试上游：记录请求次数，回显方法和路径，并返回重复的响应头
pub struct TestUpstream {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

impl TestUpstream {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub async fn spawn_upstream(name: &'static str) -> TestUpstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    let app = Router::new().fallback(move |request: Request| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);

            let mut headers = HeaderMap::new();
            headers.append("x-upstream", name.parse().unwrap());
            headers.append("set-cookie", "a=1".parse().unwrap());
            headers.append("set-cookie", "b=2".parse().unwrap());
            headers.append("set-cookie", "c=3".parse().unwrap());
            if let Some(host) = request.headers().get("host") {
                headers.append("x-seen-host", host.clone());
            }

            let body = format!("{} {}", request.method(), request.uri());
            (StatusCode::OK, headers, body).into_response()
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestUpstream { addr, hits }
}

// 构造入站请求
// 读取 HTTP 请求头直到空行
pub async fn read_request_head<S: AsyncRead + Unpin>(stream: &mut S) -> Option<Vec<u8>> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if stream.read_exact(&mut byte).await.is_err() {
            return None;
        }
        head.push(byte[0]);
    }
    Some(head)
}

// 原样写出 reply 后关闭连接的上游
pub async fn spawn_raw_upstream(reply: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                if read_request_head(&mut stream).await.is_none() {
                    return;
                }
                let _ = stream.write_all(reply).await;
                let _ = stream.flush().await;
                tokio::time::sleep(Duration::from_millis(100)).await;
            });
        }
    });
    addr
}

pub fn inbound(method: Method, host: &str, uri: &str) -> Request<Body> {
    axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header("host", host)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

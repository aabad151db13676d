// 上游客户端工厂:
// - overlay: 覆盖网络拨号能力
// - connector: 解析 + 拨号 + TLS 的连接器
// - client: 每个上游一个 HTTP 客户端

pub mod client;
pub mod connector;
pub mod overlay;

pub use client::{UpstreamClient, UpstreamSpec};
pub use connector::{UpstreamConnector, UpstreamStream};
pub use overlay::{BoxStream, OverlayNetwork, OverlayProvider, ProxyOverlayProvider};

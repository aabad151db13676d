// DoH（DNS over HTTPS）相关实现:
// - client: DNS JSON 格式的 DoH 查询客户端
// - bridge: 以 DoH 为后端的经典 DNS 服务器

pub mod bridge;
pub mod client;

pub use bridge::{DnsBridgeServer, DohBridge};
pub use client::DohClient;

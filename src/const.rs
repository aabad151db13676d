// 应用常量定义

//
// 配置参数限制常量
//

// 应用关闭等待时间限制
pub mod shutdown_timeout {
    // 默认值
    pub const DEFAULT: u64 = 30;
    // 最小值
    pub const MIN: u64 = 1;
    // 最大值
    pub const MAX: u64 = 120;
}

// HTTP客户端配置限制
pub mod http_client_limits {
    // 默认连接超时（秒）
    pub const DEFAULT_CONNECT_TIMEOUT: u64 = 3;
    // 最小连接超时（秒）
    pub const MIN_CONNECT_TIMEOUT: u64 = 1;
    // 最大连接超时（秒）
    pub const MAX_CONNECT_TIMEOUT: u64 = 120;
    // 默认请求超时（秒）
    pub const DEFAULT_REQUEST_TIMEOUT: u64 = 5;
    // 最小请求超时（秒）
    pub const MIN_REQUEST_TIMEOUT: u64 = 1;
    // 最大请求超时（秒）
    pub const MAX_REQUEST_TIMEOUT: u64 = 1200;
    // 默认空闲超时（秒）
    pub const DEFAULT_IDLE_TIMEOUT: u64 = 10;
    // 最小空闲超时（秒）
    pub const MIN_IDLE_TIMEOUT: u64 = 5;
    // 最大空闲超时（秒）
    pub const MAX_IDLE_TIMEOUT: u64 = 1800;
    // 默认keepalive时间（秒）
    pub const DEFAULT_KEEPALIVE: u32 = 30;
    // 最小keepalive时间（秒）
    pub const MIN_KEEPALIVE: u32 = 5;
    // 最大keepalive时间（秒）
    pub const MAX_KEEPALIVE: u32 = 600;
}

// DNS 解析配置限制
pub mod dns_limits {
    // 单个 DNS 端点的默认查询超时（秒）
    pub const DEFAULT_TIMEOUT: u64 = 1;
    // DoH 桥接的默认查询超时（秒）
    pub const DEFAULT_BRIDGE_TIMEOUT: u64 = 1;
    // 最小超时（秒）
    pub const MIN_TIMEOUT: u64 = 1;
    // 最大超时（秒）
    pub const MAX_TIMEOUT: u64 = 30;
    // 默认 DNS 端口
    pub const DEFAULT_PORT: u16 = 53;
    // 默认 DNS 端点地址（保持与系统解析器相近的行为）
    pub const DEFAULT_ENDPOINT: &str = "[::1]:53";
    // UDP 响应缓冲区大小
    pub const UDP_BUFFER_SIZE: usize = 4096;
}

// DoH 桥接服务器常量
pub mod bridge {
    // 合成 A 记录的 TTL（秒）
    pub const RECORD_TTL: u32 = 3600;
    // 桥接服务器监听的回环地址（端口由系统分配）
    pub const LISTEN_ADDR: &str = "127.0.0.1:0";
    // TCP 连接空闲超时（秒）
    pub const TCP_TIMEOUT: u64 = 10;
    // 关闭时等待在途查询的最长时间（秒）
    pub const SHUTDOWN_TIMEOUT: u64 = 2;
}

// 策略决策常量
pub mod policy {
    // 决策路径
    pub const DECISION_PATH: &str = "authz/allow";
    // 决策 API 前缀
    pub const DATA_API_PREFIX: &str = "v1/data";
    // 未知请求体长度
    pub const UNKNOWN_CONTENT_LENGTH: i64 = -1;
}

// 上游默认值
pub mod upstream_defaults {
    // HTTP 默认端口
    pub const HTTP_PORT: u16 = 80;
    // HTTPS 默认端口
    pub const HTTPS_PORT: u16 = 443;
    // 空主机名时使用的主机
    pub const DEFAULT_HOST: &str = "localhost";
    // HTTP 协议方案
    pub const SCHEME_HTTP: &str = "http";
    // HTTPS 协议方案
    pub const SCHEME_HTTPS: &str = "https";
}

//
// 指标标签常量
//

// 结果标签
pub mod result_labels {
    // 成功
    pub const SUCCESS: &str = "success";
    // 失败
    pub const FAILURE: &str = "failure";
    // 无记录
    pub const EMPTY: &str = "empty";
    // 服务器失败
    pub const SERVFAIL: &str = "servfail";
}

// 策略决策标签
pub mod decision_labels {
    // 允许
    pub const ALLOW: &str = "allow";
    // 拒绝
    pub const DENY: &str = "deny";
    // 决策引擎错误
    pub const ERROR: &str = "error";
}

// 子系统名称
pub mod subsystem_names {
    // 网关 HTTP 服务器子系统
    pub const GATEWAY_SERVER: &str = "gateway_server";
    // 管理服务器子系统
    pub const ADMIN_SERVER: &str = "admin_server";
    // DNS 桥接服务器子系统前缀
    pub const DNS_BRIDGE: &str = "dns_bridge";
}

// 服务器默认值
pub mod server_defaults {
    // 默认网关监听地址
    pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
    // 默认管理服务器监听地址
    pub const DEFAULT_ADMIN_LISTEN: &str = "127.0.0.1:9000";
}

// HTTP头常量
pub mod http_headers {
    // Accept 头
    pub const ACCEPT: &str = "Accept";
    // Proxy-Authorization 头
    pub const PROXY_AUTHORIZATION: &str = "Proxy-Authorization";

    // 内容类型常量
    pub mod content_types {
        // DNS JSON内容类型
        pub const DNS_JSON: &str = "application/dns-json";
    }

    // 认证常量
    pub mod auth {
        // Basic前缀
        pub const BASIC_PREFIX: &str = "Basic ";
    }
}

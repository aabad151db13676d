use crate::r#const::upstream_defaults;
use serde::{Deserialize, Serialize};
use url::Url;
use validator::{Validate, ValidationError};

// 自定义验证函数 - 验证上游端点URL
// 只接受带主机名的 http/https URL
pub fn validate_upstream_endpoint(endpoint: &str) -> Result<(), ValidationError> {
    let url = Url::parse(endpoint).map_err(|_| ValidationError::new("invalid_url"))?;
    if url.scheme() != upstream_defaults::SCHEME_HTTP
        && url.scheme() != upstream_defaults::SCHEME_HTTPS
    {
        return Err(ValidationError::new("unsupported_scheme"));
    }
    if url.host_str().is_none() {
        return Err(ValidationError::new("missing_host"));
    }
    Ok(())
}

// 上游配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Validate)]
pub struct UpstreamConfig {
    // 上游端点URL
    #[validate(custom(
        function = "validate_upstream_endpoint",
        message = "Upstream endpoint must be an http(s) URL with a host"
    ))]
    pub endpoint: String,
    // 主机名前缀列表（空表示匹配任意主机）
    #[serde(default)]
    pub hosts: Vec<String>,
    // 路径前缀列表（空表示匹配任意路径）
    #[serde(default)]
    pub path_prefixes: Vec<String>,
    // 覆盖网络名称（可选）
    #[serde(default)]
    pub tailnet: Option<String>,
    // 是否跳过证书校验（仅对该上游生效）
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

// 覆盖网络（tailnet）配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Validate)]
pub struct TailnetConfig {
    // 节点标识
    #[validate(length(min = 1, message = "Tailnet id must not be empty"))]
    pub id: String,
    // 认证密钥
    #[serde(default)]
    pub auth_key: String,
    // 覆盖网络节点本地转发代理地址（HTTP CONNECT）
    #[validate(length(min = 1, message = "Tailnet proxy address must not be empty"))]
    pub proxy: String,
}

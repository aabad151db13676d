use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, net::SocketAddr, path::Path, str::FromStr};
use tracing::debug;
use url::Url;
use validator::{Validate, ValidationError, ValidationErrors};

pub mod common;
pub mod dns;
pub mod middleware;
pub mod upstream;

pub use common::*;
pub use dns::*;
pub use middleware::*;
pub use upstream::*;

// 配置结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;

// 自定义验证函数 - 验证Socket地址格式
pub fn validate_socket_addr(addr: &str) -> Result<(), ValidationError> {
    match SocketAddr::from_str(addr) {
        Ok(_) => Ok(()),
        Err(_) => Err(ValidationError::new("invalid_socket_addr")),
    }
}

// 自定义验证函数 - 验证URL格式
pub fn validate_url(url_str: &str) -> Result<(), ValidationError> {
    match Url::parse(url_str) {
        Ok(_) => Ok(()),
        Err(_) => Err(ValidationError::new("invalid_url")),
    }
}

// 自定义验证函数 - 验证 tailnet 配置
pub fn validate_tailnets(config: &Config) -> Result<(), ValidationError> {
    for tailnet in config.tailnets.values() {
        if tailnet.validate().is_err() {
            return Err(ValidationError::new("invalid_tailnet"));
        }
    }
    Ok(())
}

// 自定义验证函数 - 验证中间件配置
pub fn validate_middlewares(config: &Config) -> Result<(), ValidationError> {
    for middleware in &config.middlewares {
        if middleware.validate_properties().is_err() {
            return Err(ValidationError::new("invalid_middleware"));
        }
    }
    Ok(())
}

// 应用配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Validate)]
#[validate(schema(
    function = "validate_tailnets",
    message = "Tailnets require an id and a proxy address"
))]
#[validate(schema(
    function = "validate_middlewares",
    message = "Middleware properties are invalid"
))]
pub struct Config {
    // 网关服务器配置
    #[validate(nested)]
    pub server: ServerConfig,
    // 管理服务器配置（可选）
    #[serde(default)]
    #[validate(nested)]
    pub admin: Option<AdminConfig>,
    // HTTP客户端配置（可选）
    #[serde(default)]
    #[validate(nested)]
    pub http_client: Option<HttpClientConfig>,
    // DNS 解析配置
    #[serde(default)]
    #[validate(nested)]
    pub dns: DnsConfig,
    // DNS 服务器列表（按顺序回退）
    #[serde(default)]
    #[validate(nested)]
    pub dns_servers: Vec<DnsServerConfig>,
    // 中间件列表（按配置顺序执行）
    #[serde(default)]
    pub middlewares: Vec<MiddlewareConfig>,
    // 上游列表（先匹配者优先）
    #[serde(default)]
    #[validate(nested)]
    pub upstreams: Vec<UpstreamConfig>,
    // 覆盖网络列表
    #[serde(default)]
    pub tailnets: BTreeMap<String, TailnetConfig>,
}

impl Config {
    // 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        debug!("Loading configuration file: {:?}", path.as_ref());
        let content = fs::read_to_string(path).map_err(ConfigError::LoadError)?;
        Self::from_yaml(&content)
    }

    // 从 YAML 文本加载配置
    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        let config: Config = serde_yaml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    // 验证配置有效性
    pub fn validate(&self) -> ConfigResult<()> {
        // 使用 validator 库进行验证
        if let Err(errors) = Validate::validate(self) {
            return Err(ConfigError::ValidationError(format_validation_errors(
                &errors,
            )));
        }
        Ok(())
    }

    // HTTP客户端配置（缺省时使用默认值）
    pub fn http_client_config(&self) -> HttpClientConfig {
        self.http_client.clone().unwrap_or_default()
    }
}

// 将 ValidationErrors 转换为友好的错误信息
fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages = Vec::new();

    // 格式化字段错误
    for (field, error_kind) in errors.errors() {
        match error_kind {
            validator::ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| error.code.to_string());
                    messages.push(format!("Field '{}': {}", field, message));
                }
            }
            validator::ValidationErrorsKind::Struct(struct_errors) => {
                messages.push(format!(
                    "Struct '{}' validation failed: {}",
                    field,
                    format_validation_errors(struct_errors)
                ));
            }
            validator::ValidationErrorsKind::List(list_errors) => {
                for (index, err) in list_errors {
                    messages.push(format!(
                        "List '{}' at index {}: {}",
                        field,
                        index,
                        format_validation_errors(err)
                    ));
                }
            }
        }
    }

    if messages.is_empty() {
        "Unknown validation error".to_string()
    } else {
        messages.join("\n")
    }
}

// 默认配置实现
impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            admin: Some(AdminConfig::default()),
            http_client: Some(HttpClientConfig::default()),
            dns: DnsConfig::default(),
            dns_servers: Vec::new(),
            middlewares: Vec::new(),
            upstreams: Vec::new(),
            tailnets: BTreeMap::new(),
        }
    }
}

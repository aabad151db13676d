use serde::{Deserialize, Serialize};
use url::Url;
use validator::{Validate, ValidationError};

use super::validate_url;

// 策略包来源配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Validate)]
pub struct BundleConfig {
    // 策略包服务器地址
    #[validate(custom(function = "validate_url", message = "Invalid bundle server endpoint"))]
    pub server_endpoint: String,
    // 策略包路径
    pub path: String,
}

impl BundleConfig {
    // 拼接策略包的完整地址
    pub fn bundle_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.server_endpoint)?;
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/{}", base, self.path.trim_start_matches('/')));
        Ok(url)
    }
}

// 自定义验证函数 - 决策端点（如果提供）必须是URL
fn validate_decision_endpoint(props: &PolicyProperties) -> Result<(), ValidationError> {
    match &props.decision_endpoint {
        Some(endpoint) => validate_url(endpoint),
        None => Ok(()),
    }
}

// 策略中间件属性
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Validate)]
#[validate(schema(
    function = "validate_decision_endpoint",
    message = "Invalid decision endpoint"
))]
pub struct PolicyProperties {
    // 策略包来源
    #[validate(nested)]
    pub bundle: BundleConfig,
    // 决策引擎地址（可选，缺省为策略包服务器）
    #[serde(default)]
    pub decision_endpoint: Option<String>,
}

impl PolicyProperties {
    // 决策引擎地址
    pub fn decision_base(&self) -> &str {
        self.decision_endpoint
            .as_deref()
            .unwrap_or(&self.bundle.server_endpoint)
    }
}

// 中间件配置（按 kind 区分）
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MiddlewareConfig {
    // 外部策略决策中间件
    #[serde(rename = "opa", alias = "policy")]
    Policy { properties: PolicyProperties },
}

impl MiddlewareConfig {
    // 中间件名称
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Policy { .. } => "opa",
        }
    }

    // 验证中间件属性
    pub fn validate_properties(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            Self::Policy { properties } => properties.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_url_joins_path() {
        let bundle = BundleConfig {
            server_endpoint: "https://example.com".to_string(),
            path: "/bundles/policy.tar.gz".to_string(),
        };
        assert_eq!(
            bundle.bundle_url().unwrap().as_str(),
            "https://example.com/bundles/policy.tar.gz"
        );

        let bundle = BundleConfig {
            server_endpoint: "http://127.0.0.1:8181/base/".to_string(),
            path: "bundle.tar.gz".to_string(),
        };
        assert_eq!(
            bundle.bundle_url().unwrap().as_str(),
            "http://127.0.0.1:8181/base/bundle.tar.gz"
        );
    }
}

use crate::config::{HttpClientConfig, PolicyProperties};
use crate::error::AppError;
use crate::http_client::HttpClient;
use crate::middleware::policy::PolicyInput;
use crate::r#const::policy;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// External policy evaluator.
///
/// `Ok(None)` means the engine evaluated the path but produced no result.
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    async fn decide(&self, path: &str, input: &PolicyInput) -> Result<Option<Value>, AppError>;
}

#[derive(Serialize)]
struct DecisionRequest<'a> {
    input: &'a PolicyInput,
}

#[derive(Deserialize)]
struct DecisionResponse {
    #[serde(default)]
    result: Option<Value>,
}

// OPA REST API 客户端
pub struct OpaClient {
    client: Client,
    decision_base: String,
}

impl OpaClient {
    // 创建客户端，并确认策略包可以获取
    pub async fn connect(
        props: &PolicyProperties,
        http_config: &HttpClientConfig,
    ) -> Result<Self, AppError> {
        let client = HttpClient::create(http_config)?;

        let bundle_url = props
            .bundle
            .bundle_url()
            .map_err(|e| AppError::BundleUnavailable(e.to_string()))?;

        debug!("Fetching policy bundle from {}", bundle_url);
        let response = client
            .get(bundle_url.clone())
            .send()
            .await
            .map_err(|e| AppError::BundleUnavailable(format!("{}: {}", bundle_url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::BundleUnavailable(format!(
                "{}: unexpected status {}",
                bundle_url,
                response.status()
            )));
        }
        info!("Policy bundle available at {}", bundle_url);

        Ok(Self::new(client, props.decision_base()))
    }

    pub fn new(client: Client, decision_base: &str) -> Self {
        Self {
            client,
            decision_base: decision_base.trim_end_matches('/').to_string(),
        }
    }

    fn decision_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.decision_base,
            policy::DATA_API_PREFIX,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl DecisionEngine for OpaClient {
    async fn decide(&self, path: &str, input: &PolicyInput) -> Result<Option<Value>, AppError> {
        let url = self.decision_url(path);
        let request = self.client.post(&url).json(&DecisionRequest { input });

        let body = HttpClient::send_request(request)
            .await
            .map_err(|e| AppError::DecisionEngineError(e.to_string()))?;
        let response: DecisionResponse = serde_json::from_slice(&body)
            .map_err(|e| AppError::DecisionEngineError(e.to_string()))?;

        Ok(response.result)
    }
}

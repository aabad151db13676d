use crate::config::HttpClientConfig;
use crate::error::AppError;
use reqwest::{Client, ClientBuilder, RequestBuilder};
use std::time::Duration;
use tracing::debug;

pub struct HttpClient;

impl HttpClient {
    // 创建HTTP客户端
    // 用于 DoH 查询和策略引擎访问，不用于上游转发
    pub fn create(config: &HttpClientConfig) -> Result<Client, AppError> {
        debug!("Creating HTTP client, config: {:?}", config);

        // 创建客户端构建器
        let mut client_builder = ClientBuilder::new()
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .timeout(Duration::from_secs(config.request_timeout));

        // 配置TCP keepalive
        if let Some(ref keepalive) = config.keepalive {
            client_builder = client_builder.tcp_keepalive(Duration::from_secs(*keepalive as u64));
        }

        // 配置空闲连接超时
        if let Some(idle_timeout) = config.idle_timeout {
            client_builder = client_builder.pool_idle_timeout(Duration::from_secs(idle_timeout));
        }

        // 配置用户代理
        if let Some(ref agent) = config.agent {
            client_builder = client_builder.user_agent(agent);
        }

        // 创建基础HTTP客户端
        client_builder
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))
    }

    // 发送请求并读取响应体
    // 只有 200 状态码被视为成功
    pub async fn send_request(request: RequestBuilder) -> Result<bytes::Bytes, AppError> {
        // 发送请求
        let response = request.send().await?;

        // 检查状态码
        if response.status() != reqwest::StatusCode::OK {
            return Err(AppError::Internal(format!(
                "Server returned unexpected status: {}",
                response.status()
            )));
        }

        // 读取响应体
        let response_data = response.bytes().await?;

        Ok(response_data)
    }
}

use crate::{error::AppError, http_client::HttpClient, r#const::http_headers};
use reqwest::Client;
use serde::Deserialize;
use std::net::Ipv4Addr;
use tracing::warn;
use url::Url;

// A 记录类型编号
const RECORD_TYPE_A: u16 = 1;

// DNS JSON 响应
// https://developers.google.com/speed/public-dns/docs/doh/json
#[derive(Debug, Deserialize)]
struct DnsJsonResponse {
    #[serde(rename = "Status")]
    status: i32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DnsJsonAnswer>,
}

#[derive(Debug, Deserialize)]
struct DnsJsonAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

// DNS JSON 格式的 DoH 客户端
#[derive(Clone)]
pub struct DohClient {
    client: Client,
}

impl DohClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    // 查询名称的 A 记录
    pub async fn query_a(&self, endpoint: &Url, name: &str) -> Result<Vec<Ipv4Addr>, AppError> {
        let fail = |reason: String| AppError::DohEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };

        let mut url = endpoint.clone();
        url.query_pairs_mut().append_pair("name", name);

        let request = self
            .client
            .get(url)
            .header(http_headers::ACCEPT, http_headers::content_types::DNS_JSON);

        // 非 200 状态码视为失败
        let body = HttpClient::send_request(request)
            .await
            .map_err(|e| fail(e.to_string()))?;

        let response: DnsJsonResponse = serde_json::from_slice(&body)
            .map_err(|e| fail(format!("failed to decode response: {}", e)))?;

        if response.status != 0 {
            return Err(fail(format!("non-zero status code: {}", response.status)));
        }

        let mut records = Vec::new();
        for answer in response
            .answer
            .iter()
            .filter(|a| a.record_type == RECORD_TYPE_A)
        {
            match answer.data.parse::<Ipv4Addr>() {
                Ok(ip) => records.push(ip),
                Err(_) => warn!("Skipping invalid A record data from {}: {}", endpoint, answer.data),
            }
        }

        if records.is_empty() {
            return Err(fail("no A records found".to_string()));
        }

        Ok(records)
    }
}

//! HTTP 客户端工厂

use async_trait::async_trait;
use std::time::Duration;

use super::{Built, ClientFactory};
use crate::error::BoxError;

/// 一个 HTTP 实例：共享的连接池 + 该实例的基础 URL
#[derive(Debug, Clone)]
pub struct HttpTarget {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTarget {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// 拼接路径得到完整 URL
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path))
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path))
    }
}

/// 所有实例共享一个 reqwest 连接池
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    client: reqwest::Client,
}

impl HttpClientFactory {
    pub fn new(timeout: Duration) -> Result<Self, BoxError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClientFactory<HttpTarget> for HttpClientFactory {
    async fn build(&self, address: &str) -> Result<Built<HttpTarget>, BoxError> {
        let base_url = if address.contains("://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", address.trim_end_matches('/'))
        };
        reqwest::Url::parse(&base_url).map_err(|e| format!("Invalid address {}: {}", address, e))?;

        Ok((
            HttpTarget {
                client: self.client.clone(),
                base_url,
            },
            None,
        ))
    }
}

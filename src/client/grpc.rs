//! gRPC Channel 工厂

use async_trait::async_trait;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

use super::{Built, ClientFactory};
use crate::error::BoxError;

/// 为每个实例地址构建一个 tonic Channel
///
/// Channel 以 lazy 方式创建，构建过程不做网络 I/O，首次调用时才建立连接；
/// drop 最后一个克隆即释放连接，因此不需要额外的释放函数。
#[derive(Debug, Clone)]
pub struct GrpcChannelFactory {
    connect_timeout: Duration,
    timeout: Option<Duration>,
    tls: bool,
}

impl Default for GrpcChannelFactory {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            timeout: Some(Duration::from_secs(30)),
            tls: false,
        }
    }
}

impl GrpcChannelFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// 使用 https scheme（证书配置由调用方在 tonic 层完成）
    pub fn https(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn endpoint(&self, address: &str) -> Result<Endpoint, BoxError> {
        let uri = if address.contains("://") {
            address.to_string()
        } else if self.tls {
            format!("https://{}", address)
        } else {
            format!("http://{}", address)
        };

        let mut endpoint = Endpoint::from_shared(uri)
            .map_err(|e| format!("Invalid address {}: {}", address, e))?
            .connect_timeout(self.connect_timeout);
        if let Some(timeout) = self.timeout {
            endpoint = endpoint.timeout(timeout);
        }
        Ok(endpoint)
    }
}

#[async_trait]
impl ClientFactory<Channel> for GrpcChannelFactory {
    async fn build(&self, address: &str) -> Result<Built<Channel>, BoxError> {
        let channel = self.endpoint(address)?.connect_lazy();
        Ok((channel, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_addresses_get_http_scheme() {
        let factory = GrpcChannelFactory::new();
        let endpoint = factory.endpoint("10.0.0.1:9000").unwrap();
        assert_eq!(endpoint.uri().to_string(), "http://10.0.0.1:9000/");
    }

    #[test]
    fn invalid_addresses_are_rejected() {
        let factory = GrpcChannelFactory::new();
        assert!(factory.endpoint("not a uri").is_err());
    }

    #[tokio::test]
    async fn builds_lazy_channel_without_closer() {
        let factory = GrpcChannelFactory::new();
        let (_channel, closer) = factory.build("127.0.0.1:1").await.unwrap();
        assert!(closer.is_none());
    }
}

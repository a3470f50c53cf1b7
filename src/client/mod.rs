//! 客户端工厂模块
//!
//! 把一个可达地址转换为具体传输的客户端句柄（以及可选的释放函数）。
//! ClientInstancer 只把句柄当作不透明值缓存和分发。

#[cfg(feature = "grpc")]
pub mod grpc;
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "grpc")]
pub use grpc::GrpcChannelFactory;
#[cfg(feature = "http")]
pub use http::{HttpClientFactory, HttpTarget};

use async_trait::async_trait;
use std::future::Future;

use crate::error::BoxError;

/// 句柄的释放函数，在实例离开集合时最多调用一次
pub type Closer = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

/// 工厂产出：句柄 + 可选的释放函数
pub type Built<H> = (H, Option<Closer>);

/// 客户端工厂 trait
///
/// 闭包 `Fn(String) -> impl Future<Output = Result<(H, Option<Closer>), BoxError>>` 自动实现此 trait
#[async_trait]
pub trait ClientFactory<H>: Send + Sync + 'static {
    async fn build(&self, address: &str) -> Result<Built<H>, BoxError>;
}

#[async_trait]
impl<H, F, Fut> ClientFactory<H> for F
where
    H: Send + 'static,
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Built<H>, BoxError>> + Send + 'static,
{
    async fn build(&self, address: &str) -> Result<Built<H>, BoxError> {
        (self)(address.to_string()).await
    }
}

//! 服务注册模块
//!
//! 提供注册中心能力抽象、etcd 与内存两种实现，以及服务端使用的注册器

pub mod client;
#[cfg(feature = "etcd")]
pub mod etcd;
pub mod memory;
pub mod registrar;

pub use client::{LeaseId, Listing, RegistryClient, WatchEvent, WatchStream};
#[cfg(feature = "etcd")]
pub use etcd::EtcdRegistry;
pub use memory::MemoryRegistry;
pub use registrar::{Registrar, RegistrarOptions};

use std::sync::Arc;

use crate::config::{RegistryBackend, RegistryConfig};
#[cfg(not(feature = "etcd"))]
use crate::error::CoreError;
use crate::error::Result;

/// 根据配置创建注册中心客户端
pub async fn connect(config: &RegistryConfig) -> Result<Arc<dyn RegistryClient>> {
    match config.backend {
        RegistryBackend::Memory => Ok(Arc::new(MemoryRegistry::new())),
        #[cfg(feature = "etcd")]
        RegistryBackend::Etcd => {
            let registry = EtcdRegistry::connect(&config.endpoints, Some(config.connect_timeout())).await?;
            Ok(Arc::new(registry))
        }
        #[cfg(not(feature = "etcd"))]
        RegistryBackend::Etcd => Err(CoreError::Config(
            "etcd backend requires the `etcd` feature".to_string(),
        )),
    }
}

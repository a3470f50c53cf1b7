//! Flare Service Discovery Core Library
//!
//! 注册中心之上的服务发现与生命周期层：
//! - 服务端：在随机端口监听，把实际地址注册到注册中心（可选 TTL + 心跳），退出时注销
//! - 客户端：跟随实例集合变化、为每个实例缓存客户端句柄、轮询/随机负载均衡
//! - 运行时：把多个监听和信号监听作为一个整体运行，任何一个结束即整体关闭

pub mod balancer;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod registry;
pub mod retry;
pub mod runtime;
pub mod server;
pub mod telemetry;
pub mod utils;

// Re-exports
pub use balancer::{Balancer, ClientSource, Random, RoundRobin, StaticClients, retry};
pub use client::{ClientFactory, Closer};
pub use config::{Config, DiscoveryConfig, LogConfig, RegistryBackend, RegistryConfig, ServiceConfig};
pub use discovery::{ClientInstancer, InstanceSet, InstanceStream, Instancer, KeyLayout, ServiceInstance};
pub use error::{BoxError, CoreError, ErrorCategory, ErrorCode, Result};
pub use registry::{
    Listing, MemoryRegistry, Registrar, RegistrarOptions, RegistryClient, WatchEvent, WatchStream,
};
pub use retry::{ExponentialBackoffPolicy, FixedRetryPolicy, RetryPolicy};
pub use runtime::{LifecycleGroup, RuntimeConfig, SignalWatcher, SpawnTask, Task, TaskResult};
pub use server::{ServerTask, bind};

#[cfg(feature = "etcd")]
pub use registry::EtcdRegistry;
#[cfg(feature = "grpc")]
pub use client::GrpcChannelFactory;
#[cfg(feature = "http")]
pub use client::{HttpClientFactory, HttpTarget};

//! 服务端传输模块
//!
//! 在本机出口 IP 的随机端口上监听，服务前把实际监听地址注册到注册中心，
//! 退出时（正常返回、出错、被中断或 panic）注销。

#[cfg(feature = "grpc")]
pub mod grpc;
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "grpc")]
pub use grpc::grpc_task;
#[cfg(feature = "http")]
pub use http::http_task;

use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::discovery::{KeyLayout, ServiceInstance};
use crate::error::{CoreError, Result};
use crate::registry::{Registrar, RegistrarOptions, RegistryClient};
use crate::runtime::{Task, TaskResult};
use crate::utils::host_ip;

type ServeFn = Box<dyn FnOnce(TcpListener, CancellationToken) -> BoxFuture<'static, Result<()>> + Send>;

/// 在 `host` 的随机端口上监听；`host` 为 None 时使用本机出口 IP
pub async fn bind(host: Option<&str>) -> Result<(TcpListener, SocketAddr)> {
    let listener = match host {
        Some(host) => TcpListener::bind((host, 0)).await?,
        None => TcpListener::bind((host_ip(), 0)).await?,
    };
    let addr = listener.local_addr()?;
    info!(address = %addr, "Listener bound");
    Ok((listener, addr))
}

/// 一个传输监听任务
///
/// 作为 [`Task`] 运行：注册（如果配置了）→ 服务直到收到关闭信号 → 注销
pub struct ServerTask {
    transport: String,
    listener: TcpListener,
    registrar: Option<Registrar>,
    serve: ServeFn,
}

impl ServerTask {
    pub fn new<F, Fut>(transport: impl Into<String>, listener: TcpListener, serve: F) -> Self
    where
        F: FnOnce(TcpListener, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            transport: transport.into(),
            listener,
            registrar: None,
            serve: Box::new(move |listener: TcpListener, shutdown: CancellationToken| -> BoxFuture<'static, Result<()>> {
                Box::pin(serve(listener, shutdown))
            }),
        }
    }

    pub fn transport(&self) -> &str {
        &self.transport
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// 使用给定的注册器
    pub fn with_registrar(mut self, registrar: Registrar) -> Self {
        self.registrar = Some(registrar);
        self
    }

    /// 以 `<root>/<service>/<transport>/<监听地址>` 注册监听地址
    pub fn register_as(
        self,
        client: Arc<dyn RegistryClient>,
        layout: &KeyLayout,
        service: &str,
        options: RegistrarOptions,
    ) -> Result<Self> {
        let addr = self.local_addr()?;
        let instance = ServiceInstance::new(
            layout.instance_key(service, &self.transport, addr),
            addr.to_string(),
        );
        Ok(self.with_registrar(Registrar::with_options(client, instance, options)))
    }

    /// 当前注册的实例（未配置注册器时为 None）
    pub fn instance(&self) -> Option<&ServiceInstance> {
        self.registrar.as_ref().map(|r| r.instance())
    }
}

impl Task for ServerTask {
    fn name(&self) -> &str {
        &self.transport
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> BoxFuture<'static, TaskResult> {
        let ServerTask {
            transport,
            listener,
            registrar,
            serve,
        } = *self;

        Box::pin(async move {
            if let Some(registrar) = &registrar {
                registrar.register().await?;
            }

            let address = listener.local_addr().ok();
            info!(transport = %transport, address = ?address, "🚀 Transport serving");
            let served = AssertUnwindSafe(serve(listener, shutdown)).catch_unwind().await;

            if let Some(registrar) = &registrar {
                if let Err(e) = registrar.deregister().await {
                    warn!(transport = %transport, error = %e, "⚠️ Failed to deregister transport");
                }
            }

            match served {
                Ok(Ok(())) => {
                    info!(transport = %transport, "Transport stopped");
                    Ok(())
                }
                Ok(Err(e)) => Err(e),
                Err(_) => Err(CoreError::TaskPanicked { name: transport }),
            }
        })
    }
}

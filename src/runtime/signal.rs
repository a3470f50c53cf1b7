//! 进程信号监听

use tracing::info;

use crate::error::Result;

/// SIGINT / SIGTERM 监听器（非 unix 平台为 Ctrl-C）
///
/// 信号处理在创建时注册，因此在 `recv` 之前到达的信号不会丢失
pub struct SignalWatcher {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl SignalWatcher {
    /// 注册信号处理；必须在 tokio 运行时内调用
    #[cfg(unix)]
    pub fn new() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn new() -> Result<Self> {
        Ok(Self {})
    }

    /// 等待下一个信号，返回信号名称
    #[cfg(unix)]
    pub async fn recv(&mut self) -> Result<&'static str> {
        let name = tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        };
        info!(signal = name, "Shutdown signal received");
        Ok(name)
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> Result<&'static str> {
        tokio::signal::ctrl_c().await?;
        info!(signal = "Ctrl-C", "Shutdown signal received");
        Ok("Ctrl-C")
    }
}

//! 服务发现核心统一错误类型

use super::code::ErrorCode;
use thiserror::Error;

/// 工厂、关闭函数等边界处使用的通用错误类型
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 统一结果类型
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    /// 当前没有任何可用实例（可重试，不是负载均衡层本身的故障）
    #[error("no clients available")]
    NoClients,

    /// 为某个实例构建客户端失败
    #[error("failed to build client for {address}: {source}")]
    Factory {
        address: String,
        #[source]
        source: BoxError,
    },

    /// 注册中心访问失败（连接、读取、写入、监听）
    #[error("registry error: {0}")]
    Registry(String),

    /// Instancer 已停止
    #[error("instancer stopped")]
    InstancerStopped,

    /// 传输层（gRPC/HTTP 服务端）错误
    #[error("transport error: {0}")]
    Transport(String),

    /// 通过负载均衡选出的实例调用失败
    #[error("call failed: {0}")]
    Call(#[source] BoxError),

    /// 收到终止信号
    #[error("received signal {0}")]
    Signal(String),

    /// 生命周期任务失败
    #[error("task '{name}' failed: {source}")]
    Task {
        name: String,
        #[source]
        source: BoxError,
    },

    /// 生命周期任务 panic
    #[error("task '{name}' panicked")]
    TaskPanicked { name: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] BoxError),
}

impl CoreError {
    /// 创建注册中心错误
    pub fn registry(msg: impl std::fmt::Display) -> Self {
        CoreError::Registry(msg.to_string())
    }

    /// 创建传输层错误
    pub fn transport(msg: impl std::fmt::Display) -> Self {
        CoreError::Transport(msg.to_string())
    }

    /// 将任意错误包装为某个任务的失败
    pub fn task(name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        CoreError::Task {
            name: name.into(),
            source: source.into(),
        }
    }

    /// 对应的错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::NoClients => ErrorCode::NoClients,
            CoreError::Factory { .. } => ErrorCode::ClientFactoryFailed,
            CoreError::Registry(_) => ErrorCode::RegistryUnavailable,
            CoreError::InstancerStopped => ErrorCode::InstancerStopped,
            CoreError::Transport(_) => ErrorCode::TransportError,
            CoreError::Call(_) => ErrorCode::CallFailed,
            CoreError::Signal(_) => ErrorCode::SignalReceived,
            CoreError::Task { .. } => ErrorCode::TaskFailed,
            CoreError::TaskPanicked { .. } => ErrorCode::TaskPanicked,
            CoreError::Config(_) => ErrorCode::ConfigurationError,
            CoreError::Io(_) => ErrorCode::IoError,
            CoreError::Other(_) => ErrorCode::UnknownError,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    pub fn is_no_clients(&self) -> bool {
        matches!(self, CoreError::NoClients)
    }
}

#[cfg(feature = "etcd")]
impl From<etcd_client::Error> for CoreError {
    fn from(err: etcd_client::Error) -> Self {
        CoreError::Registry(err.to_string())
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        CoreError::Config(err.to_string())
    }
}

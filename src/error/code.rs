//! 错误代码和错误类别定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 错误代码
///
/// 错误代码按类别分组，每个类别占用1000个代码范围：
/// - 1000-1999: 服务发现相关错误
/// - 2000-2999: 注册中心相关错误
/// - 3000-3999: 传输层相关错误
/// - 4000-4999: 生命周期相关错误
/// - 9000-9999: 通用错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    // ============================================================
    // 服务发现相关错误 (1000-1999)
    // ============================================================
    NoClients = 1000,
    ClientFactoryFailed = 1001,
    InstancerStopped = 1002,

    // ============================================================
    // 注册中心相关错误 (2000-2999)
    // ============================================================
    RegistryUnavailable = 2000,
    RegistryWatchFailed = 2001,

    // ============================================================
    // 传输层相关错误 (3000-3999)
    // ============================================================
    TransportError = 3000,
    CallFailed = 3001,

    // ============================================================
    // 生命周期相关错误 (4000-4999)
    // ============================================================
    SignalReceived = 4000,
    TaskFailed = 4001,
    TaskPanicked = 4002,

    // ============================================================
    // 通用错误 (9000-9999)
    // ============================================================
    ConfigurationError = 9000,
    IoError = 9001,
    UnknownError = 9999,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Discovery,
    Registry,
    Transport,
    Lifecycle,
    General,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ErrorCode {
    /// 获取错误代码的数字值
    #[inline]
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// 稳定的字符串表示（用于日志字段和跨进程传递）
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoClients => "NO_CLIENTS",
            ErrorCode::ClientFactoryFailed => "CLIENT_FACTORY_FAILED",
            ErrorCode::InstancerStopped => "INSTANCER_STOPPED",
            ErrorCode::RegistryUnavailable => "REGISTRY_UNAVAILABLE",
            ErrorCode::RegistryWatchFailed => "REGISTRY_WATCH_FAILED",
            ErrorCode::TransportError => "TRANSPORT_ERROR",
            ErrorCode::CallFailed => "CALL_FAILED",
            ErrorCode::SignalReceived => "SIGNAL_RECEIVED",
            ErrorCode::TaskFailed => "TASK_FAILED",
            ErrorCode::TaskPanicked => "TASK_PANICKED",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::IoError => "IO_ERROR",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self.as_u32() {
            1000..=1999 => ErrorCategory::Discovery,
            2000..=2999 => ErrorCategory::Registry,
            3000..=3999 => ErrorCategory::Transport,
            4000..=4999 => ErrorCategory::Lifecycle,
            _ => ErrorCategory::General,
        }
    }

    /// 是否为可重试的错误（暂时不可用，而非逻辑错误）
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::NoClients
                | ErrorCode::RegistryUnavailable
                | ErrorCode::RegistryWatchFailed
                | ErrorCode::TransportError
                | ErrorCode::CallFailed
        )
    }
}

//! 重试策略模块
//!
//! Instancer 用它在注册中心暂时不可用时退避重连，负载均衡重试执行器用它决定是否重新选择实例

pub mod exponential;
pub mod fixed;

pub use exponential::ExponentialBackoffPolicy;
pub use fixed::FixedRetryPolicy;

use crate::error::CoreError;
use std::time::Duration;

/// 重试策略 trait
pub trait RetryPolicy: Send + Sync {
    /// `attempt` 从 1 开始计数，表示已经失败的次数
    fn should_retry(&self, attempt: usize, error: &CoreError) -> bool;
    fn backoff_duration(&self, attempt: usize) -> Duration;
    fn max_attempts(&self) -> usize;
}

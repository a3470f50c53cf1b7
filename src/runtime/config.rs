//! 运行时配置模块

use std::time::Duration;

use crate::config::RuntimeSection;

/// 运行时配置
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// 第一个任务结束后等待其余任务退出的时间（默认 5 秒）；为 None 时一直等待
    ///
    /// 超时后剩余任务被强制终止，正在进行的注销也会被打断，
    /// 因此该值应大于注册中心删除 key 的耗时
    pub shutdown_timeout: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl RuntimeConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置关闭超时时间
    pub fn with_shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl From<&RuntimeSection> for RuntimeConfig {
    fn from(section: &RuntimeSection) -> Self {
        Self {
            shutdown_timeout: (section.shutdown_timeout_ms > 0)
                .then(|| Duration::from_millis(section.shutdown_timeout_ms)),
        }
    }
}

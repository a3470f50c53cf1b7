//! 日志初始化

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LogConfig;
use crate::error::{CoreError, Result};

/// 安装全局 tracing subscriber
///
/// `RUST_LOG` 存在时优先使用，否则使用配置中的过滤规则。重复调用返回错误而不是 panic。
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| CoreError::Config(format!("invalid log filter '{}': {}", config.filter, e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    installed.map_err(|e| CoreError::Config(format!("tracing already initialized: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_second_initialization() {
        let config = LogConfig::default();
        // 同一进程内其他测试可能已经安装过 subscriber，这里只关心第二次调用
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}

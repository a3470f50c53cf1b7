use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CoreError, Result};

/// 顶层配置（TOML）
///
/// 所有段落都有默认值，空文件即为一个可用的本地（内存注册中心）配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub registry: RegistryConfig,
    pub discovery: DiscoveryConfig,
    pub runtime: RuntimeSection,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    /// 监听绑定的主机地址；为空时自动探测本机出口 IP
    pub bind_host: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "flare-service".to_string(),
            bind_host: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    Etcd,
    Memory,
}

impl std::str::FromStr for RegistryBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "etcd" => Ok(RegistryBackend::Etcd),
            "memory" | "mem" | "in-memory" => Ok(RegistryBackend::Memory),
            _ => Err(format!("Unknown registry backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub backend: RegistryBackend,
    pub endpoints: Vec<String>,
    /// key 布局根路径
    pub root: String,
    /// 实例 TTL（秒）；为 0 时不使用 TTL
    pub ttl_secs: u64,
    /// 续期间隔（秒）
    pub heartbeat_secs: u64,
    /// 连接注册中心超时（毫秒）
    pub connect_timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: RegistryBackend::Memory,
            endpoints: vec!["http://localhost:2379".to_string()],
            root: "/services".to_string(),
            ttl_secs: 0,
            heartbeat_secs: 10,
            connect_timeout_ms: 5000,
        }
    }
}

impl RegistryConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// 注册中心重连初始退避（毫秒）
    pub backoff_base_ms: u64,
    /// 注册中心重连最大退避（毫秒）
    pub backoff_max_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: 100,
            backoff_max_ms: 10_000,
        }
    }
}

impl DiscoveryConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// 中断后等待剩余任务退出的时间（毫秒）；为 0 时一直等待
    pub shutdown_timeout_ms: u64,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// 默认过滤规则，`RUST_LOG` 存在时以环境变量为准
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("failed to read {}: {}", path, e)))?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// 环境变量覆盖：
    /// - `FLARE_SD_ETCD_ENDPOINTS`：逗号分隔的 etcd 地址，设置后后端切换为 etcd
    /// - `FLARE_SD_HEARTBEAT_SECS`：续期间隔
    /// - `FLARE_SD_TTL_SECS`：实例 TTL
    pub fn apply_env(&mut self) {
        if let Ok(endpoints) = std::env::var("FLARE_SD_ETCD_ENDPOINTS") {
            let endpoints: Vec<String> = endpoints
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !endpoints.is_empty() {
                self.registry.backend = RegistryBackend::Etcd;
                self.registry.endpoints = endpoints;
            }
        }
        if let Some(secs) = env_u64("FLARE_SD_HEARTBEAT_SECS") {
            self.registry.heartbeat_secs = secs;
        }
        if let Some(secs) = env_u64("FLARE_SD_TTL_SECS") {
            self.registry.ttl_secs = secs;
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}

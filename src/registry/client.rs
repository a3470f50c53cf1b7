//! 注册中心能力抽象
//!
//! Instancer 和 Registrar 只依赖这里定义的能力集合，不依赖具体的注册中心产品：
//! - 设置/删除一个 key（可选 TTL，TTL 通过租约实现）
//! - 续约与撤销租约
//! - 按前缀列出所有 key 及其值（附带读取时的 revision）
//! - 从某个 revision 开始长期监听前缀下的增删改事件

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::Result;

/// 前缀下的一次全量读取结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub entries: BTreeMap<String, String>,
    /// 读取时注册中心的 revision，监听应从 `revision + 1` 开始
    pub revision: i64,
}

/// 监听事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Put { key: String, value: String },
    Delete { key: String },
}

impl WatchEvent {
    pub fn key(&self) -> &str {
        match self {
            WatchEvent::Put { key, .. } | WatchEvent::Delete { key } => key,
        }
    }
}

/// 租约 id
///
/// 带 TTL 的写入会创建一个租约，key 的存活期与租约绑定；续约不会修改 key，也不会产生监听事件
pub type LeaseId = i64;

/// 监听事件流；流以错误结束或直接结束都表示需要重新建立监听
pub type WatchStream = BoxStream<'static, Result<WatchEvent>>;

/// 注册中心客户端 trait
///
/// 由于需要动态分发（dyn），使用 async-trait
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// 写入 key
    ///
    /// `ttl` 不为空时为 key 创建新租约并返回其 id，需要通过 `keep_alive` 定期续约，
    /// 否则 key 在 TTL 过期后自动删除
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<Option<LeaseId>>;

    /// 续约一次；租约已过期或不存在时返回错误，调用方应重新 `put`
    async fn keep_alive(&self, lease: LeaseId) -> Result<()>;

    /// 撤销租约，绑定在租约上的 key 随之删除；租约不存在时不报错
    async fn revoke(&self, lease: LeaseId) -> Result<()>;

    /// 删除 key；key 不存在时不报错
    async fn delete(&self, key: &str) -> Result<()>;

    /// 列出前缀下的所有 key
    async fn list(&self, prefix: &str) -> Result<Listing>;

    /// 从 `from_revision` 开始监听前缀下的变化
    async fn watch(&self, prefix: &str, from_revision: i64) -> Result<WatchStream>;
}

//! 客户端缓存
//!
//! 订阅 Instancer 的实例集合，为每个实例通过工厂构建并缓存一个客户端句柄，
//! 实例消失（或地址变化）时释放对应句柄。负载均衡器只读取这里发布的快照。

use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ClientFactory, Closer};
use crate::discovery::instance::InstanceSet;
use crate::discovery::instancer::Instancer;
use crate::error::CoreError;

struct ClientEntry<H> {
    address: String,
    handle: H,
    closer: Option<Closer>,
}

struct Inner<H> {
    factory: Box<dyn ClientFactory<H>>,
    // 串行化 update；工厂调用期间持有的是这把异步锁而不是快照锁
    entries: Mutex<BTreeMap<String, ClientEntry<H>>>,
    snapshot: RwLock<Arc<[H]>>,
    keys: RwLock<Arc<[String]>>,
    token: CancellationToken,
}

/// 客户端缓存
///
/// `H` 对本模块是不透明的，只要求能廉价克隆（通常内部是 Arc 或连接池句柄）
pub struct ClientInstancer<H> {
    inner: Arc<Inner<H>>,
}

impl<H> ClientInstancer<H>
where
    H: Clone + Send + Sync + 'static,
{
    /// 创建并开始跟随 `instancer` 的实例集合
    ///
    /// 后台任务持有 instancer 的一个克隆，直到 `stop()` 或者 ClientInstancer 被 drop
    pub fn new(instancer: &Instancer, factory: impl ClientFactory<H>) -> Self {
        let this = Self::detached(factory);

        let inner = this.inner.clone();
        let instancer = instancer.clone();
        tokio::spawn(async move {
            let mut updates = instancer.subscribe();
            loop {
                let set = tokio::select! {
                    _ = inner.token.cancelled() => break,
                    set = updates.next() => set,
                };
                match set {
                    Some(set) => apply(&inner, &set).await,
                    None => {
                        debug!(prefix = %instancer.prefix(), "Instance stream ended");
                        break;
                    }
                }
            }
        });

        this
    }

    /// 不绑定 Instancer，实例集合完全通过 `update` 提供
    pub fn detached(factory: impl ClientFactory<H>) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory: Box::new(factory),
                entries: Mutex::new(BTreeMap::new()),
                snapshot: RwLock::new(Arc::from(Vec::new())),
                keys: RwLock::new(Arc::from(Vec::new())),
                token: CancellationToken::new(),
            }),
        }
    }

    /// 以给定实例集合为准更新缓存
    pub async fn update(&self, set: &InstanceSet) {
        apply(&self.inner, set).await;
    }

    /// 当前句柄快照，按实例 key 排序
    pub fn current(&self) -> Arc<[H]> {
        self.inner
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 与 `current()` 顺序一致的实例 key
    pub fn keys(&self) -> Arc<[String]> {
        self.inner
            .keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 停止跟随实例变化并释放所有缓存的句柄
    pub async fn stop(&self) {
        self.inner.token.cancel();

        let mut entries = self.inner.entries.lock().await;
        let retired: Vec<(String, ClientEntry<H>)> = std::mem::take(&mut *entries).into_iter().collect();
        publish(&self.inner, &entries);
        drop(entries);

        let count = retired.len();
        for (key, entry) in retired {
            close(&key, entry);
        }
        info!(closed = count, "ClientInstancer stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.token.is_cancelled()
    }
}

impl<H> Drop for ClientInstancer<H> {
    fn drop(&mut self) {
        self.inner.token.cancel();
    }
}

async fn apply<H>(inner: &Inner<H>, set: &InstanceSet)
where
    H: Clone + Send + Sync + 'static,
{
    let mut entries = inner.entries.lock().await;
    if inner.token.is_cancelled() {
        return;
    }

    // 消失的实例以及地址变化的实例都要退役
    let stale: Vec<String> = entries
        .iter()
        .filter(|(key, entry)| set.get(key) != Some(entry.address.as_str()))
        .map(|(key, _)| key.clone())
        .collect();
    let mut retired = Vec::with_capacity(stale.len());
    for key in stale {
        if let Some(entry) = entries.remove(&key) {
            retired.push((key, entry));
        }
    }

    for (key, address) in set.iter() {
        if entries.contains_key(key) {
            continue;
        }
        match inner.factory.build(address).await {
            Ok((handle, closer)) => {
                debug!(key = %key, address = %address, "Client created");
                entries.insert(
                    key.to_string(),
                    ClientEntry {
                        address: address.to_string(),
                        handle,
                        closer,
                    },
                );
            }
            Err(source) => {
                // 下一次集合更新时会再次尝试
                let err = CoreError::Factory {
                    address: address.to_string(),
                    source,
                };
                warn!(key = %key, error = %err, "⚠️ Client factory failed, instance skipped");
            }
        }
    }

    publish(inner, &entries);
    drop(entries);

    for (key, entry) in retired {
        close(&key, entry);
    }
}

fn publish<H: Clone>(inner: &Inner<H>, entries: &BTreeMap<String, ClientEntry<H>>) {
    let handles: Arc<[H]> = entries.values().map(|e| e.handle.clone()).collect();
    let keys: Arc<[String]> = entries.keys().cloned().collect();
    *inner.snapshot.write().unwrap_or_else(PoisonError::into_inner) = handles;
    *inner.keys.write().unwrap_or_else(PoisonError::into_inner) = keys;
}

fn close<H>(key: &str, entry: ClientEntry<H>) {
    let ClientEntry {
        address,
        handle,
        closer,
    } = entry;
    drop(handle);
    if let Some(closer) = closer {
        if let Err(e) = closer() {
            warn!(key = %key, address = %address, error = %e, "Failed to close client");
        }
    }
    debug!(key = %key, address = %address, "Client retired");
}

//! 实例监听器
//!
//! 监听注册中心中某个前缀下的实例集合，每当成员发生变化就发布新的 `InstanceSet`。
//!
//! - 构造时先做一次全量读取，作为第一个快照
//! - 之后从读取时的 revision 开始长期监听，增量应用 Put/Delete 事件
//! - 监听中断或读取失败时按指数退避重试，重连后重新全量读取，订阅者只会感知到数据暂时陈旧
//! - 连续的变更可能被合并为一次通知

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::discovery::instance::InstanceSet;
use crate::error::{CoreError, Result};
use crate::registry::{Listing, RegistryClient, WatchEvent};
use crate::retry::{ExponentialBackoffPolicy, RetryPolicy};

/// 订阅流：先产出当前集合，之后每次变化产出一次，`stop()` 后结束
pub type InstanceStream = WatchStream<InstanceSet>;

struct Shared {
    prefix: String,
    rx: watch::Receiver<InstanceSet>,
    token: CancellationToken,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// 实例监听器（克隆后共享同一个后台监听任务，最后一个克隆被 drop 时停止）
#[derive(Clone)]
pub struct Instancer {
    shared: Arc<Shared>,
}

impl Instancer {
    /// 使用默认退避参数创建
    pub async fn new(client: Arc<dyn RegistryClient>, prefix: impl Into<String>) -> Self {
        Self::with_config(client, prefix, &DiscoveryConfig::default()).await
    }

    pub async fn with_config(
        client: Arc<dyn RegistryClient>,
        prefix: impl Into<String>,
        config: &DiscoveryConfig,
    ) -> Self {
        let prefix = prefix.into();
        let (tx, rx) = watch::channel(InstanceSet::new());
        let token = CancellationToken::new();

        // 初始读取失败不是致命错误，后台任务会继续重试
        let revision = match client.list(&prefix).await {
            Ok(listing) => {
                info!(prefix = %prefix, instances = listing.entries.len(), "Instancer initialized");
                Some(publish_listing(&tx, listing))
            }
            Err(e) => {
                warn!(prefix = %prefix, error = %e, "Initial instance listing failed, will retry");
                None
            }
        };

        let backoff = ExponentialBackoffPolicy::unbounded(config.backoff_base(), config.backoff_max())
            .with_jitter(true);
        tokio::spawn(watch_loop(
            client,
            prefix.clone(),
            tx,
            token.clone(),
            backoff,
            revision,
        ));

        Self {
            shared: Arc::new(Shared { prefix, rx, token }),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.shared.prefix
    }

    /// 订阅实例集合变化
    pub fn subscribe(&self) -> InstanceStream {
        WatchStream::new(self.shared.rx.clone())
    }

    /// 当前实例集合
    pub fn current(&self) -> InstanceSet {
        self.shared.rx.borrow().clone()
    }

    /// 等待直到实例集合满足条件
    pub async fn wait_for(&self, predicate: impl FnMut(&InstanceSet) -> bool) -> Result<InstanceSet> {
        let mut rx = self.shared.rx.clone();
        let set = rx
            .wait_for(predicate)
            .await
            .map_err(|_| CoreError::InstancerStopped)?;
        Ok(set.clone())
    }

    /// 停止监听；所有订阅流随之结束
    pub fn stop(&self) {
        self.shared.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.token.is_cancelled()
    }
}

fn publish_listing(tx: &watch::Sender<InstanceSet>, listing: Listing) -> i64 {
    let next: InstanceSet = listing.entries.into_iter().collect();
    tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
    listing.revision
}

fn apply_event(tx: &watch::Sender<InstanceSet>, event: WatchEvent) {
    tx.send_if_modified(|current| match event {
        WatchEvent::Put { key, value } => current.upsert(key, value),
        WatchEvent::Delete { key } => current.remove(&key),
    });
}

/// 等待退避时间；返回 false 表示期间收到了停止信号
async fn backoff_or_stop(token: &CancellationToken, backoff: &ExponentialBackoffPolicy, attempt: usize) -> bool {
    let delay = backoff.backoff_duration(attempt);
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

async fn watch_loop(
    client: Arc<dyn RegistryClient>,
    prefix: String,
    tx: watch::Sender<InstanceSet>,
    token: CancellationToken,
    backoff: ExponentialBackoffPolicy,
    mut revision: Option<i64>,
) {
    let mut attempt = 0usize;

    loop {
        let listed = match revision.take() {
            Some(rev) => rev,
            None => {
                let listing = tokio::select! {
                    _ = token.cancelled() => break,
                    listing = client.list(&prefix) => listing,
                };
                match listing {
                    Ok(listing) => publish_listing(&tx, listing),
                    Err(e) => {
                        attempt += 1;
                        warn!(prefix = %prefix, attempt, error = %e, "Failed to list instances, backing off");
                        if !backoff_or_stop(&token, &backoff, attempt).await {
                            break;
                        }
                        continue;
                    }
                }
            }
        };

        let watched = tokio::select! {
            _ = token.cancelled() => break,
            stream = client.watch(&prefix, listed + 1) => stream,
        };
        let mut stream = match watched {
            Ok(stream) => stream,
            Err(e) => {
                attempt += 1;
                warn!(prefix = %prefix, attempt, error = %e, "Failed to watch instances, backing off");
                if !backoff_or_stop(&token, &backoff, attempt).await {
                    break;
                }
                continue;
            }
        };
        debug!(prefix = %prefix, revision = listed, "Watching instances");

        loop {
            let item = tokio::select! {
                _ = token.cancelled() => None,
                item = stream.next() => Some(item),
            };
            match item {
                None => {
                    info!(prefix = %prefix, "Instancer stopped");
                    return;
                }
                Some(Some(Ok(event))) => {
                    attempt = 0;
                    apply_event(&tx, event);
                }
                Some(Some(Err(e))) => {
                    warn!(prefix = %prefix, error = %e, "Instance watch interrupted");
                    break;
                }
                Some(None) => {
                    warn!(prefix = %prefix, "Instance watch ended");
                    break;
                }
            }
        }

        attempt += 1;
        if !backoff_or_stop(&token, &backoff, attempt).await {
            break;
        }
    }

    info!(prefix = %prefix, "Instancer stopped");
}

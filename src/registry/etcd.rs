//! etcd 注册中心客户端

use async_trait::async_trait;
use etcd_client::{
    Client, ConnectOptions, EventType, GetOptions, LeaseKeepAliveStream, LeaseKeeper, PutOptions, WatchOptions,
    WatchStream as EtcdWatchStream, Watcher,
};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::client::{LeaseId, Listing, RegistryClient, WatchEvent, WatchStream};
use crate::error::{CoreError, Result};

/// etcd 注册中心客户端
///
/// `etcd_client::Client` 内部基于 tonic Channel，克隆开销很小，每次调用克隆一份即可。
/// 每个租约的 keep-alive 流建立后被缓存，之后的续约复用同一条流。
#[derive(Clone)]
pub struct EtcdRegistry {
    client: Client,
    keepers: Arc<Mutex<HashMap<LeaseId, (LeaseKeeper, LeaseKeepAliveStream)>>>,
}

impl EtcdRegistry {
    /// 连接 etcd 集群
    pub async fn connect(endpoints: &[String], connect_timeout: Option<Duration>) -> Result<Self> {
        let options = connect_timeout.map(|t| ConnectOptions::new().with_connect_timeout(t));
        let client = Client::connect(endpoints, options)
            .await
            .map_err(|e| CoreError::registry(format!("failed to connect to etcd: {}", e)))?;

        info!(endpoints = ?endpoints, "Connected to etcd");
        Ok(Self::from_client(client))
    }

    /// 使用已有的 etcd 客户端
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            keepers: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// etcd 租约以秒为单位，不足一秒的部分向上取整
fn lease_seconds(ttl: Duration) -> i64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1) as i64
}

struct EtcdWatch {
    // 持有 watcher，drop 时 etcd 端的监听随之取消
    _watcher: Watcher,
    stream: EtcdWatchStream,
    pending: VecDeque<WatchEvent>,
    done: bool,
}

#[async_trait]
impl RegistryClient for EtcdRegistry {
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<Option<LeaseId>> {
        let mut client = self.client.clone();

        let lease = match ttl {
            Some(ttl) => {
                let lease = client
                    .lease_grant(lease_seconds(ttl), None)
                    .await
                    .map_err(|e| CoreError::registry(format!("failed to grant lease: {}", e)))?;
                Some(lease.id())
            }
            None => None,
        };
        let options = lease.map(|id| PutOptions::new().with_lease(id));

        if let Err(e) = client.put(key, value, options).await {
            if let Some(id) = lease {
                // 写入失败时租约没有任何用处
                let _ = client.lease_revoke(id).await;
            }
            return Err(CoreError::registry(format!("failed to put {}: {}", key, e)));
        }
        Ok(lease)
    }

    async fn keep_alive(&self, lease: LeaseId) -> Result<()> {
        let mut keepers = self.keepers.lock().await;

        if let Some((keeper, stream)) = keepers.get_mut(&lease) {
            let renewed = match keeper.keep_alive().await {
                Ok(()) => stream.message().await,
                Err(e) => Err(e),
            };
            match renewed {
                Ok(Some(resp)) if resp.ttl() > 0 => return Ok(()),
                Ok(Some(_)) => {
                    keepers.remove(&lease);
                    return Err(CoreError::registry(format!("lease {} expired", lease)));
                }
                Ok(None) => {
                    // 流已关闭，下面重新建立
                    debug!(lease, "Lease keep-alive stream closed, reopening");
                }
                Err(e) => {
                    warn!(lease, error = %e, "Lease keep-alive stream failed, reopening");
                }
            }
            keepers.remove(&lease);
        }

        // 建立流时会发送一次续约请求，并在租约不存在时返回错误
        let mut client = self.client.clone();
        let (keeper, stream) = client
            .lease_keep_alive(lease)
            .await
            .map_err(|e| CoreError::registry(format!("failed to keep lease {} alive: {}", lease, e)))?;
        keepers.insert(lease, (keeper, stream));
        Ok(())
    }

    async fn revoke(&self, lease: LeaseId) -> Result<()> {
        self.keepers.lock().await.remove(&lease);

        let mut client = self.client.clone();
        match client.lease_revoke(lease).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("lease not found") => Ok(()),
            Err(e) => Err(CoreError::registry(format!("failed to revoke lease {}: {}", lease, e))),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut client = self.client.clone();
        client
            .delete(key, None)
            .await
            .map_err(|e| CoreError::registry(format!("failed to delete {}: {}", key, e)))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Listing> {
        let mut client = self.client.clone();
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| CoreError::registry(format!("failed to list {}: {}", prefix, e)))?;

        let mut entries = BTreeMap::new();
        for kv in resp.kvs() {
            match (kv.key_str(), kv.value_str()) {
                (Ok(key), Ok(value)) => {
                    entries.insert(key.to_string(), value.to_string());
                }
                _ => {
                    warn!(prefix = %prefix, "Skipping non UTF-8 registry entry");
                }
            }
        }
        let revision = resp.header().map(|h| h.revision()).unwrap_or_default();

        Ok(Listing { entries, revision })
    }

    async fn watch(&self, prefix: &str, from_revision: i64) -> Result<WatchStream> {
        let mut client = self.client.clone();
        let options = WatchOptions::new()
            .with_prefix()
            .with_start_revision(from_revision);
        let (watcher, stream) = client
            .watch(prefix, Some(options))
            .await
            .map_err(|e| CoreError::registry(format!("failed to watch {}: {}", prefix, e)))?;

        debug!(prefix = %prefix, from_revision, "etcd watch established");

        let state = EtcdWatch {
            _watcher: watcher,
            stream,
            pending: VecDeque::new(),
            done: false,
        };

        let events = stream::unfold(state, |mut w| async move {
            loop {
                if let Some(event) = w.pending.pop_front() {
                    return Some((Ok(event), w));
                }
                if w.done {
                    return None;
                }
                match w.stream.message().await {
                    Ok(Some(resp)) => {
                        if resp.canceled() {
                            w.done = true;
                            let reason = if resp.compact_revision() > 0 {
                                format!("watch canceled, compacted at revision {}", resp.compact_revision())
                            } else {
                                "watch canceled by server".to_string()
                            };
                            return Some((Err(CoreError::registry(reason)), w));
                        }
                        for event in resp.events() {
                            let Some(kv) = event.kv() else { continue };
                            let Ok(key) = kv.key_str() else { continue };
                            let event = match event.event_type() {
                                EventType::Put => WatchEvent::Put {
                                    key: key.to_string(),
                                    value: kv.value_str().unwrap_or_default().to_string(),
                                },
                                EventType::Delete => WatchEvent::Delete {
                                    key: key.to_string(),
                                },
                            };
                            w.pending.push_back(event);
                        }
                    }
                    Ok(None) => {
                        w.done = true;
                        return Some((Err(CoreError::registry("watch stream closed")), w));
                    }
                    Err(e) => {
                        w.done = true;
                        return Some((Err(CoreError::registry(format!("watch error: {}", e))), w));
                    }
                }
            }
        });

        Ok(events.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_seconds_round_up() {
        assert_eq!(lease_seconds(Duration::from_millis(200)), 1);
        assert_eq!(lease_seconds(Duration::from_secs(2)), 2);
        assert_eq!(lease_seconds(Duration::from_millis(2500)), 3);
        assert_eq!(lease_seconds(Duration::ZERO), 1);
    }
}

//! 内存注册中心
//!
//! 与 etcd 后端具有相同的能力集合（revision、前缀监听、租约与 TTL 过期），
//! 用于单进程部署、本地开发和测试。支持注入故障以模拟注册中心暂时不可用。

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::client::{LeaseId, Listing, RegistryClient, WatchEvent, WatchStream};
use crate::error::{CoreError, Result};

const HISTORY_CAPACITY: usize = 1024;
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    lease: Option<LeaseId>,
}

#[derive(Debug, Clone, Copy)]
struct Lease {
    ttl: Duration,
    /// 每次续约加一，过期定时器只对创建它时的代数生效
    generation: u64,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, Entry>,
    revision: i64,
    history: VecDeque<(i64, WatchEvent)>,
    /// 已经从历史中淘汰的最大 revision
    compacted: i64,
    leases: HashMap<LeaseId, Lease>,
    next_lease: LeaseId,
}

struct Inner {
    state: Mutex<State>,
    events: broadcast::Sender<(i64, WatchEvent)>,
    disconnect: Mutex<CancellationToken>,
    injected_failures: AtomicUsize,
}

/// 内存注册中心（克隆后共享同一份数据）
#[derive(Clone)]
pub struct MemoryRegistry {
    inner: Arc<Inner>,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                events,
                disconnect: Mutex::new(CancellationToken::new()),
                injected_failures: AtomicUsize::new(0),
            }),
        }
    }

    /// 读取单个 key 的当前值
    pub fn get(&self, key: &str) -> Option<String> {
        self.state().entries.get(key).map(|e| e.value.clone())
    }

    /// 当前 key 总数
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 当前 revision
    pub fn revision(&self) -> i64 {
        self.state().revision
    }

    /// 让接下来的 `n` 次 list/watch/put/delete 调用失败
    pub fn inject_failures(&self, n: usize) {
        self.inner.injected_failures.store(n, Ordering::SeqCst);
    }

    /// 断开所有正在进行的监听（监听流以错误结束），模拟网络闪断
    pub fn disconnect_watchers(&self) {
        let mut token = self
            .inner
            .disconnect
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        token.cancel();
        *token = CancellationToken::new();
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_failure(&self) -> Result<()> {
        let injected = self
            .inner
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(CoreError::registry("injected registry failure")),
            Err(_) => Ok(()),
        }
    }

    /// 记录事件并广播；调用方必须持有 state 锁，保证监听者订阅时不会漏掉事件
    fn record(&self, state: &mut State, event: WatchEvent) {
        state.revision += 1;
        let revision = state.revision;
        state.history.push_back((revision, event.clone()));
        while state.history.len() > HISTORY_CAPACITY {
            if let Some((rev, _)) = state.history.pop_front() {
                state.compacted = rev;
            }
        }
        // 没有监听者时发送失败是正常的
        let _ = self.inner.events.send((revision, event));
    }

    /// 当前存活的租约数
    pub fn lease_count(&self) -> usize {
        self.state().leases.len()
    }

    fn schedule_expiry(&self, lease: LeaseId, ttl: Duration, generation: u64) {
        let registry = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut state = registry.state();
            let current = matches!(state.leases.get(&lease), Some(l) if l.generation == generation);
            if current {
                registry.drop_lease(&mut state, lease);
                debug!(lease, "Registry lease expired");
            }
        });
    }

    /// 移除租约并删除仍绑定在它上面的 key
    fn drop_lease(&self, state: &mut State, lease: LeaseId) {
        state.leases.remove(&lease);
        let bound: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| e.lease == Some(lease))
            .map(|(k, _)| k.clone())
            .collect();
        for key in bound {
            state.entries.remove(&key);
            self.record(state, WatchEvent::Delete { key });
        }
    }
}

struct LiveWatch {
    rx: broadcast::Receiver<(i64, WatchEvent)>,
    disconnect: CancellationToken,
    prefix: String,
    from_revision: i64,
    done: bool,
}

#[async_trait]
impl RegistryClient for MemoryRegistry {
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<Option<LeaseId>> {
        self.take_failure()?;

        let lease = {
            let mut state = self.state();
            let lease = ttl.map(|ttl| {
                state.next_lease += 1;
                let id = state.next_lease;
                state.leases.insert(id, Lease { ttl, generation: 0 });
                id
            });
            self.record(
                &mut state,
                WatchEvent::Put {
                    key: key.to_string(),
                    value: value.to_string(),
                },
            );
            state.entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    lease,
                },
            );
            lease
        };

        if let (Some(id), Some(ttl)) = (lease, ttl) {
            self.schedule_expiry(id, ttl, 0);
        }
        Ok(lease)
    }

    async fn keep_alive(&self, lease: LeaseId) -> Result<()> {
        self.take_failure()?;

        let (ttl, generation) = {
            let mut state = self.state();
            let Some(entry) = state.leases.get_mut(&lease) else {
                return Err(CoreError::registry(format!("lease {} not found", lease)));
            };
            entry.generation += 1;
            (entry.ttl, entry.generation)
        };
        self.schedule_expiry(lease, ttl, generation);
        Ok(())
    }

    async fn revoke(&self, lease: LeaseId) -> Result<()> {
        self.take_failure()?;

        let mut state = self.state();
        if state.leases.contains_key(&lease) {
            self.drop_lease(&mut state, lease);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.take_failure()?;

        let mut state = self.state();
        if state.entries.remove(key).is_some() {
            self.record(&mut state, WatchEvent::Delete { key: key.to_string() });
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Listing> {
        self.take_failure()?;

        let state = self.state();
        let entries = state
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect();
        Ok(Listing {
            entries,
            revision: state.revision,
        })
    }

    async fn watch(&self, prefix: &str, from_revision: i64) -> Result<WatchStream> {
        self.take_failure()?;

        let (backlog, rx) = {
            let state = self.state();
            if from_revision <= state.compacted {
                return Err(CoreError::registry(format!(
                    "revision {} has been compacted (oldest available {})",
                    from_revision,
                    state.compacted + 1
                )));
            }
            let backlog: Vec<Result<WatchEvent>> = state
                .history
                .iter()
                .filter(|(rev, event)| *rev >= from_revision && event.key().starts_with(prefix))
                .map(|(_, event)| Ok(event.clone()))
                .collect();
            (backlog, self.inner.events.subscribe())
        };
        let disconnect = self
            .inner
            .disconnect
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let live = LiveWatch {
            rx,
            disconnect,
            prefix: prefix.to_string(),
            from_revision,
            done: false,
        };

        let live = stream::unfold(live, |mut w| async move {
            if w.done {
                return None;
            }
            loop {
                let next = tokio::select! {
                    _ = w.disconnect.cancelled() => None,
                    msg = w.rx.recv() => Some(msg),
                };
                match next {
                    None => {
                        w.done = true;
                        return Some((Err(CoreError::registry("watch disconnected")), w));
                    }
                    Some(Ok((revision, event))) => {
                        if revision < w.from_revision || !event.key().starts_with(&w.prefix) {
                            continue;
                        }
                        return Some((Ok(event), w));
                    }
                    Some(Err(RecvError::Lagged(skipped))) => {
                        w.done = true;
                        return Some((
                            Err(CoreError::registry(format!("watch lagged by {} events", skipped))),
                            w,
                        ));
                    }
                    Some(Err(RecvError::Closed)) => return None,
                }
            }
        });

        Ok(stream::iter(backlog).chain(live).boxed())
    }
}

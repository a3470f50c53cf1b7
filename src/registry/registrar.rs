//! 服务注册器
//!
//! 负责把一个服务实例（key, address）发布到注册中心，并在关闭时移除。
//! 配置了 TTL 时 key 绑定在租约上，由后台心跳周期性续约；进程异常退出后实例会在 TTL 过期后自动消失。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::{LeaseId, RegistryClient};
use crate::discovery::ServiceInstance;
use crate::error::{CoreError, Result};

/// 注册器选项
#[derive(Debug, Clone)]
pub struct RegistrarOptions {
    /// key 的存活时间；为 None 时 key 永久存在直到显式注销
    pub ttl: Option<Duration>,
    /// 续约间隔，应明显小于 TTL（建议 TTL 的 1/3）
    pub heartbeat: Duration,
}

impl Default for RegistrarOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            heartbeat: Duration::from_secs(10),
        }
    }
}

impl RegistrarOptions {
    pub fn with_ttl(ttl: Duration, heartbeat: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            heartbeat,
        }
    }
}

/// 心跳任务结束时返回它最后持有的租约
type Heartbeat = (CancellationToken, JoinHandle<Option<LeaseId>>);

struct Registration {
    lease: Option<LeaseId>,
    heartbeat: Option<Heartbeat>,
}

impl Registration {
    /// 停止心跳并取回最新的租约
    async fn stop_heartbeat(&mut self) {
        if let Some((token, handle)) = self.heartbeat.take() {
            token.cancel();
            // 等待心跳任务退出，避免注销之后又被续约或重新写回
            self.lease = handle.await.unwrap_or(self.lease);
        }
    }
}

/// 服务注册器
///
/// `register` 与 `deregister` 都是幂等的：重复注册只会留下一条记录，
/// 未注册时注销不会产生任何效果。注销失败时仍视为已注册，可以重试，drop 时也会再次尝试。
pub struct Registrar {
    client: Arc<dyn RegistryClient>,
    instance: ServiceInstance,
    options: RegistrarOptions,
    state: Mutex<Option<Registration>>,
}

impl Registrar {
    pub fn new(client: Arc<dyn RegistryClient>, instance: ServiceInstance) -> Self {
        Self::with_options(client, instance, RegistrarOptions::default())
    }

    pub fn with_options(
        client: Arc<dyn RegistryClient>,
        instance: ServiceInstance,
        options: RegistrarOptions,
    ) -> Self {
        Self {
            client,
            instance,
            options,
            state: Mutex::new(None),
        }
    }

    pub fn instance(&self) -> &ServiceInstance {
        &self.instance
    }

    pub async fn is_registered(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// 发布实例
    pub async fn register(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        let lease = self
            .client
            .put(&self.instance.key, &self.instance.address, self.options.ttl)
            .await?;
        let heartbeat = self.options.ttl.map(|ttl| self.spawn_heartbeat(ttl, lease));

        match state.as_mut() {
            None => {
                *state = Some(Registration { lease, heartbeat });
                info!(
                    key = %self.instance.key,
                    address = %self.instance.address,
                    "✅ Service instance registered"
                );
            }
            Some(registration) => {
                registration.stop_heartbeat().await;
                // key 已经绑定到新租约上，撤销旧租约不会影响它
                if let Some(old) = registration.lease.filter(|old| Some(*old) != lease) {
                    if let Err(e) = self.client.revoke(old).await {
                        debug!(key = %self.instance.key, lease = old, error = %e, "Failed to revoke previous lease");
                    }
                }
                registration.lease = lease;
                registration.heartbeat = heartbeat;
                debug!(key = %self.instance.key, "Service instance re-registered");
            }
        }
        Ok(())
    }

    /// 移除实例；未注册时为空操作
    ///
    /// 失败时注册状态保留，之后的 `deregister` 或 drop 会再次尝试移除
    pub async fn deregister(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(registration) = state.as_mut() else {
            return Ok(());
        };

        registration.stop_heartbeat().await;

        if let Some(lease) = registration.lease {
            if let Err(e) = self.client.revoke(lease).await {
                warn!(key = %self.instance.key, lease, error = %e, "⚠️ Failed to revoke lease");
                return Err(e);
            }
            registration.lease = None;
        }

        match self.client.delete(&self.instance.key).await {
            Ok(()) => {
                *state = None;
                info!(key = %self.instance.key, "Service instance deregistered");
                Ok(())
            }
            Err(e) => {
                warn!(key = %self.instance.key, error = %e, "⚠️ Failed to deregister service instance");
                Err(e)
            }
        }
    }

    fn spawn_heartbeat(&self, ttl: Duration, lease: Option<LeaseId>) -> Heartbeat {
        let token = CancellationToken::new();
        let client = self.client.clone();
        let instance = self.instance.clone();
        let period = self.options.heartbeat;
        let stop = token.clone();

        let handle = tokio::spawn(async move {
            let mut lease = lease;
            let mut ticker = tokio::time::interval(period);
            // 第一次 tick 立即返回，注册时已经写入过
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let renewed = match lease {
                    Some(id) => client.keep_alive(id).await,
                    None => Err(CoreError::registry("no lease to renew")),
                };
                match renewed {
                    Ok(()) => debug!(key = %instance.key, "💓 Lease renewed"),
                    Err(e) => {
                        // 租约可能已经过期，重新写入以恢复注册
                        warn!(key = %instance.key, error = %e, "⚠️ Lease keep-alive failed, re-registering");
                        match client.put(&instance.key, &instance.address, Some(ttl)).await {
                            Ok(new_lease) => {
                                lease = new_lease;
                                info!(key = %instance.key, "Service instance re-registered with new lease");
                            }
                            Err(e) => error!(key = %instance.key, error = %e, "❌ Failed to re-register service instance"),
                        }
                    }
                }
            }
            lease
        });

        (token, handle)
    }
}

impl Drop for Registrar {
    fn drop(&mut self) {
        // 没有显式注销（或注销失败）时尽力在后台注销
        let Some(Registration { lease, heartbeat }) = self.state.get_mut().take() else {
            return;
        };
        if let Some((token, _)) = &heartbeat {
            token.cancel();
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let client = self.client.clone();
                let key = self.instance.key.clone();
                runtime.spawn(async move {
                    let lease = match heartbeat {
                        Some((_, handle)) => handle.await.unwrap_or(lease),
                        None => lease,
                    };
                    if let Some(lease) = lease {
                        if let Err(e) = client.revoke(lease).await {
                            warn!(key = %key, lease, error = %e, "⚠️ Failed to revoke lease (from Drop)");
                        }
                    }
                    if let Err(e) = client.delete(&key).await {
                        warn!(key = %key, error = %e, "⚠️ Failed to deregister service instance (from Drop)");
                    }
                });
            }
            Err(_) => {
                warn!(
                    key = %self.instance.key,
                    "⚠️ Cannot deregister service instance: tokio runtime not available"
                );
            }
        }
    }
}

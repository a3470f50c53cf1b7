//! 负载均衡模块
//!
//! 均衡器只读取 [`ClientSource`] 发布的句柄快照，每次调用选出一个句柄；
//! 快照为空时返回 `CoreError::NoClients`。

pub mod random;
pub mod round_robin;

pub use random::Random;
pub use round_robin::RoundRobin;

use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::discovery::ClientInstancer;
use crate::error::{BoxError, CoreError, Result};
use crate::retry::RetryPolicy;

/// 句柄快照来源
pub trait ClientSource: Send + Sync {
    type Handle: Clone + Send + Sync + 'static;

    fn current(&self) -> Arc<[Self::Handle]>;
}

impl<H> ClientSource for ClientInstancer<H>
where
    H: Clone + Send + Sync + 'static,
{
    type Handle = H;

    fn current(&self) -> Arc<[H]> {
        ClientInstancer::current(self)
    }
}

impl<S: ClientSource + ?Sized> ClientSource for Arc<S> {
    type Handle = S::Handle;

    fn current(&self) -> Arc<[S::Handle]> {
        (**self).current()
    }
}

/// 固定的句柄集合
#[derive(Debug, Clone)]
pub struct StaticClients<H> {
    handles: Arc<[H]>,
}

impl<H> StaticClients<H> {
    pub fn new(handles: impl IntoIterator<Item = H>) -> Self {
        Self {
            handles: handles.into_iter().collect(),
        }
    }
}

impl<H> ClientSource for StaticClients<H>
where
    H: Clone + Send + Sync + 'static,
{
    type Handle = H;

    fn current(&self) -> Arc<[H]> {
        self.handles.clone()
    }
}

/// 负载均衡器
pub trait Balancer: Send + Sync {
    type Handle;

    /// 选出一个句柄；没有可用实例时返回 `CoreError::NoClients`
    fn pick(&self) -> Result<Self::Handle>;
}

/// 带重试的调用
///
/// 每次尝试都重新 `pick()`，调用失败或没有可用实例时按策略决定是否再试。
/// 调用方返回的错误被包装为 `CoreError::Call`。
pub async fn retry<B, F, Fut, T>(balancer: &B, policy: &dyn RetryPolicy, mut call: F) -> Result<T>
where
    B: Balancer + ?Sized,
    F: FnMut(B::Handle) -> Fut,
    Fut: Future<Output = std::result::Result<T, BoxError>>,
{
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        let err = match balancer.pick() {
            Ok(handle) => match call(handle).await {
                Ok(value) => return Ok(value),
                Err(e) => CoreError::Call(e),
            },
            Err(e) => e,
        };

        if !policy.should_retry(attempt, &err) {
            return Err(err);
        }
        let delay = policy.backoff_duration(attempt);
        debug!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "Retrying call");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::FixedRetryPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn retry_moves_to_next_instance_after_failure() {
        let balancer = RoundRobin::new(StaticClients::new(["down", "up"]));
        let policy = FixedRetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicUsize::new(0);

        let result = retry(&balancer, &policy, |handle: &'static str| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if handle == "down" {
                    Err::<&str, BoxError>("connection refused".into())
                } else {
                    Ok(handle)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "up");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_gives_up_after_policy_limit() {
        let balancer = RoundRobin::new(StaticClients::new(["down"]));
        let policy = FixedRetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicUsize::new(0);

        let err = retry(&balancer, &policy, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), BoxError>("boom".into()) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, CoreError::Call(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_reports_no_clients_on_empty_set() {
        let balancer = RoundRobin::new(StaticClients::<&str>::new([]));
        let policy = FixedRetryPolicy::new(2, Duration::from_millis(1));

        let err = retry(&balancer, &policy, |_| async { Ok::<_, BoxError>(()) })
            .await
            .unwrap_err();
        assert!(err.is_no_clients());
    }
}

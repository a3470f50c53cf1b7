//! 任务定义模块
//!
//! 可以交给 LifecycleGroup 管理的长期任务抽象

use futures::future::BoxFuture;
use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;

/// 任务执行结果
pub type TaskResult = Result<(), CoreError>;

/// 任务 trait
///
/// 任务在 `shutdown` 被取消后应尽快返回
pub trait Task: Send {
    /// 获取任务名称
    fn name(&self) -> &str;

    /// 运行任务
    fn run(self: Box<Self>, shutdown: CancellationToken) -> BoxFuture<'static, TaskResult>;
}

/// Spawn 任务
///
/// 把一个接收关闭信号的闭包包装成 `Task`
pub struct SpawnTask {
    name: String,
    future_fn: Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, TaskResult> + Send>,
}

impl SpawnTask {
    /// 创建不关心关闭信号的任务
    pub fn new<Fut>(name: impl Into<String>, future: Fut) -> Self
    where
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            future_fn: Box::new(move |_shutdown: CancellationToken| -> BoxFuture<'static, TaskResult> { Box::pin(future) }),
        }
    }

    /// 创建需要关闭信号的任务
    ///
    /// ```rust,no_run
    /// use flare_sd_core::runtime::SpawnTask;
    ///
    /// let task = SpawnTask::with_shutdown("ticker", |shutdown| async move {
    ///     shutdown.cancelled().await;
    ///     Ok(())
    /// });
    /// ```
    pub fn with_shutdown<F, Fut>(name: impl Into<String>, future_fn: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            future_fn: Box::new(move |shutdown: CancellationToken| -> BoxFuture<'static, TaskResult> {
                Box::pin(future_fn(shutdown))
            }),
        }
    }
}

impl Task for SpawnTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> BoxFuture<'static, TaskResult> {
        (self.future_fn)(shutdown)
    }
}

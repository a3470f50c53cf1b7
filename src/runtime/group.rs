//! 生命周期组
//!
//! 把若干 (start, interrupt) 任务对作为一个整体运行：
//! - `run()` 之前什么都不会执行
//! - 第一个结束的任务（成功、失败或 panic）决定整个组的结果
//! - 其余每个任务的 interrupt 恰好被调用一次，参数为第一个结果中的错误
//! - 等待其余任务全部返回（或超时后强制终止）再返回第一个结果

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{CoreError, Result};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::signal::SignalWatcher;
use crate::runtime::task::{Task, TaskResult};

type StartFn = Box<dyn FnOnce() -> BoxFuture<'static, TaskResult> + Send>;
type InterruptFn = Box<dyn FnOnce(Option<&CoreError>) + Send>;

struct Actor {
    name: String,
    start: StartFn,
    interrupt: InterruptFn,
}

/// 生命周期组
///
/// ```rust,no_run
/// use flare_sd_core::runtime::LifecycleGroup;
///
/// # async fn demo() -> flare_sd_core::Result<()> {
/// LifecycleGroup::new()
///     .add_with_shutdown("ticker", |shutdown| async move {
///         shutdown.cancelled().await;
///         Ok(())
///     })
///     .add_signal_watcher()?
///     .run()
///     .await
/// # }
/// ```
pub struct LifecycleGroup {
    actors: Vec<Actor>,
    config: RuntimeConfig,
}

impl Default for LifecycleGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleGroup {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            actors: Vec::new(),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// 添加任务对
    ///
    /// `interrupt` 必须让 `start` 返回的 future 尽快结束，且不能阻塞。
    /// `run()` 按添加顺序依次同步调用各个 interrupt，由于都不阻塞，效果上所有任务是同时收到中断的
    pub fn add<S, Fut, I>(mut self, name: impl Into<String>, start: S, interrupt: I) -> Self
    where
        S: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
        I: FnOnce(Option<&CoreError>) + Send + 'static,
    {
        let name = name.into();
        debug!(task_name = %name, "Adding task to lifecycle group");
        self.actors.push(Actor {
            name,
            start: Box::new(move || -> BoxFuture<'static, TaskResult> { Box::pin(start()) }),
            interrupt: Box::new(interrupt),
        });
        self
    }

    /// 添加通过 `CancellationToken` 响应中断的任务
    pub fn add_with_shutdown<F, Fut>(self, name: impl Into<String>, start: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let token = CancellationToken::new();
        let shutdown = token.clone();
        self.add(name, move || start(shutdown), move |_| token.cancel())
    }

    /// 添加实现了 `Task` trait 的任务
    pub fn add_task(self, task: Box<dyn Task>) -> Self {
        let name = task.name().to_string();
        self.add_with_shutdown(name, move |shutdown| task.run(shutdown))
    }

    /// 添加 SIGINT/SIGTERM 监听任务
    ///
    /// 收到信号时以 `CoreError::Signal` 结束，从而中断整个组
    pub fn add_signal_watcher(self) -> Result<Self> {
        let mut watcher = SignalWatcher::new()?;
        Ok(self.add_with_shutdown("signal", move |shutdown| async move {
            tokio::select! {
                _ = shutdown.cancelled() => Ok(()),
                received = watcher.recv() => Err(CoreError::Signal(received?.to_string())),
            }
        }))
    }

    /// 运行所有任务，返回第一个结束的任务的结果
    pub async fn run(self) -> TaskResult {
        let Self { actors, config } = self;
        if actors.is_empty() {
            return Ok(());
        }

        info!(task_count = actors.len(), "🚀 Starting lifecycle group");

        let mut join_set = JoinSet::new();
        let mut index_of: HashMap<Id, usize> = HashMap::with_capacity(actors.len());
        let mut names = Vec::with_capacity(actors.len());
        let mut interrupts = Vec::with_capacity(actors.len());

        for (index, actor) in actors.into_iter().enumerate() {
            let Actor {
                name,
                start,
                interrupt,
            } = actor;
            // start 在任务内部调用，构造 future 时的 panic 同样被 JoinSet 捕获
            let handle = join_set.spawn(async move { start().await });
            index_of.insert(handle.id(), index);
            names.push(name);
            interrupts.push(Some(interrupt));
        }

        let (first, result) = match join_set.join_next_with_id().await {
            Some(Ok((id, result))) => (index_of.get(&id).copied(), result),
            Some(Err(e)) => {
                let index = index_of.get(&e.id()).copied();
                let name = index.map(|i| names[i].clone()).unwrap_or_default();
                (index, Err(join_failure(name, e)))
            }
            None => return Ok(()),
        };

        let first_name = first.map(|i| names[i].as_str()).unwrap_or("unknown");
        match &result {
            Ok(()) => info!(task_name = %first_name, "Task returned, interrupting lifecycle group"),
            Err(CoreError::Signal(signal)) => {
                info!(task_name = %first_name, signal = %signal, "Signal received, interrupting lifecycle group")
            }
            Err(e) => error!(task_name = %first_name, error = %e, "❌ Task failed, interrupting lifecycle group"),
        }

        let mut finished = vec![false; names.len()];
        if let Some(index) = first {
            finished[index] = true;
        }

        let cause = result.as_ref().err();
        for (index, slot) in interrupts.iter_mut().enumerate() {
            if Some(index) == first {
                continue;
            }
            if let Some(interrupt) = slot.take() {
                debug!(task_name = %names[index], "Interrupting task");
                interrupt(cause);
            }
        }

        let drain = async {
            while let Some(joined) = join_set.join_next_with_id().await {
                let id = match &joined {
                    Ok((id, _)) => *id,
                    Err(e) => e.id(),
                };
                if let Some(index) = index_of.get(&id) {
                    finished[*index] = true;
                }
                match joined {
                    Ok((id, Ok(()))) => {
                        let name = task_name(&names, &index_of, id);
                        info!(task_name = %name, "✅ Task stopped");
                    }
                    Ok((id, Err(e))) => {
                        let name = task_name(&names, &index_of, id);
                        warn!(task_name = %name, error = %e, "Task stopped with error");
                    }
                    Err(e) => {
                        let name = task_name(&names, &index_of, e.id());
                        warn!(task_name = %name, error = %e, "Task join error");
                    }
                }
            }
        };

        match config.shutdown_timeout {
            Some(timeout) => {
                if tokio::time::timeout(timeout, drain).await.is_err() {
                    let remaining = remaining_tasks(&names, &finished);
                    warn!(
                        timeout_ms = timeout.as_millis() as u64,
                        tasks = ?remaining,
                        "⚠️ Tasks shutdown timeout, aborting remaining tasks"
                    );
                    join_set.abort_all();
                }
            }
            None => drain.await,
        }

        info!("Lifecycle group stopped");
        result
    }
}

fn task_name<'a>(names: &'a [String], index_of: &HashMap<Id, usize>, id: Id) -> &'a str {
    index_of
        .get(&id)
        .map(|i| names[*i].as_str())
        .unwrap_or("unknown")
}

/// 仍未结束的任务名，按添加顺序排列
fn remaining_tasks<'a>(names: &'a [String], finished: &[bool]) -> Vec<&'a str> {
    names
        .iter()
        .zip(finished)
        .filter(|(_, done)| !**done)
        .map(|(name, _)| name.as_str())
        .collect()
}

fn join_failure(name: String, err: JoinError) -> CoreError {
    if err.is_panic() {
        CoreError::TaskPanicked { name }
    } else {
        CoreError::task(name, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn empty_group_returns_ok() {
        assert!(LifecycleGroup::new().run().await.is_ok());
    }

    #[tokio::test]
    async fn nothing_runs_before_run() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        let group = LifecycleGroup::new().add(
            "counter",
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            |_| {},
        );

        sleep(Duration::from_millis(20)).await;
        assert_eq!(started.load(Ordering::SeqCst), 0);

        group.run().await.unwrap();
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    /// 两个等待中断的任务 + 一个 10ms 后失败的任务
    #[tokio::test]
    async fn first_error_interrupts_everyone_else_once() {
        let interrupted = Arc::new(AtomicUsize::new(0));
        let causes = Arc::new(Mutex::new(Vec::new()));
        let mut group = LifecycleGroup::new();

        for name in ["a", "b"] {
            let (tx, rx) = oneshot::channel::<()>();
            let interrupted = interrupted.clone();
            let causes = causes.clone();
            group = group.add(
                name,
                move || async move {
                    let _ = rx.await;
                    Ok(())
                },
                move |cause: Option<&CoreError>| {
                    interrupted.fetch_add(1, Ordering::SeqCst);
                    causes.lock().unwrap().push(cause.map(|e| e.to_string()));
                    let _ = tx.send(());
                },
            );
        }

        let failing_interrupted = Arc::new(AtomicUsize::new(0));
        let counter = failing_interrupted.clone();
        group = group.add(
            "c",
            || async {
                sleep(Duration::from_millis(10)).await;
                Err(CoreError::transport("E"))
            },
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        let result = timeout(Duration::from_secs(1), group.run()).await.unwrap();
        assert!(matches!(result, Err(CoreError::Transport(ref m)) if m == "E"));
        assert_eq!(interrupted.load(Ordering::SeqCst), 2);
        assert_eq!(failing_interrupted.load(Ordering::SeqCst), 0);
        assert!(causes
            .lock()
            .unwrap()
            .iter()
            .all(|c| c.as_deref() == Some(CoreError::transport("E").to_string().as_str())));
    }

    #[tokio::test]
    async fn successful_first_finisher_passes_no_error() {
        let cause = Arc::new(Mutex::new(Some("unset".to_string())));
        let seen = cause.clone();

        let result = LifecycleGroup::with_config(
            RuntimeConfig::new().with_shutdown_timeout(Some(Duration::from_millis(100))),
        )
        .add("done", || async { Ok(()) }, |_| {})
            .add_with_shutdown("waiter", |shutdown| async move {
                shutdown.cancelled().await;
                Ok(())
            })
            .add(
                "observer",
                || std::future::pending::<TaskResult>(),
                move |c: Option<&CoreError>| {
                    *seen.lock().unwrap() = c.map(|e| e.to_string());
                },
            )
            .run()
            .await;

        assert!(result.is_ok());
        assert_eq!(*cause.lock().unwrap(), None);
    }

    async fn explode() -> TaskResult {
        panic!("kaboom")
    }

    #[tokio::test]
    async fn panicking_task_ends_group() {
        let result = LifecycleGroup::new()
            .add("boom", explode, |_| {})
            .add_with_shutdown("waiter", |shutdown| async move {
                shutdown.cancelled().await;
                Ok(())
            })
            .run()
            .await;

        match result {
            Err(CoreError::TaskPanicked { name }) => assert_eq!(name, "boom"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn stragglers_are_aborted_after_timeout() {
        let group = LifecycleGroup::with_config(
            RuntimeConfig::new().with_shutdown_timeout(Some(Duration::from_millis(50))),
        )
        .add("quick", || async { Err(CoreError::Config("bad".into())) }, |_| {})
        .add("stubborn", || std::future::pending::<TaskResult>(), |_| {});

        let result = timeout(Duration::from_secs(1), group.run()).await.unwrap();
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn remaining_tasks_follow_insertion_order() {
        let names = vec!["first".to_string(), "second".to_string(), "third".to_string()];
        assert_eq!(remaining_tasks(&names, &[false, true, false]), ["first", "third"]);
        assert!(remaining_tasks(&names, &[true, true, true]).is_empty());
    }

    #[tokio::test]
    async fn boxed_tasks_receive_shutdown() {
        use crate::runtime::task::SpawnTask;

        let stopped = Arc::new(AtomicUsize::new(0));
        let counter = stopped.clone();

        let result = LifecycleGroup::new()
            .add_task(Box::new(SpawnTask::with_shutdown("worker", move |shutdown| async move {
                shutdown.cancelled().await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })))
            .add_task(Box::new(SpawnTask::new("oneshot", async {
                Err(CoreError::transport("listener closed"))
            })))
            .run()
            .await;

        assert!(matches!(result, Err(CoreError::Transport(_))));
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }
}

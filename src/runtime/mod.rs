//! 生命周期运行时
//!
//! 把多个网络监听、后台任务和信号监听作为一个整体运行：任何一个任务结束，
//! 其余任务都会被中断，整个组在所有任务返回后才结束。
//!
//! # 使用示例
//!
//! ```rust,no_run
//! use flare_sd_core::runtime::{LifecycleGroup, RuntimeConfig};
//! use std::time::Duration;
//!
//! # async fn demo() -> flare_sd_core::Result<()> {
//! let (tx, rx) = tokio::sync::oneshot::channel::<()>();
//!
//! LifecycleGroup::with_config(RuntimeConfig::new().with_shutdown_timeout(Some(Duration::from_secs(10))))
//!     .add(
//!         "worker",
//!         move || async move {
//!             let _ = rx.await;
//!             Ok(())
//!         },
//!         move |_| {
//!             let _ = tx.send(());
//!         },
//!     )
//!     .add_signal_watcher()?
//!     .run()
//!     .await
//! # }
//! ```

pub mod config;
pub mod group;
pub mod signal;
pub mod task;

pub use config::RuntimeConfig;
pub use group::LifecycleGroup;
pub use signal::SignalWatcher;
pub use task::{SpawnTask, Task, TaskResult};

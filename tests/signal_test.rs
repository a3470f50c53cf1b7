//! 信号监听测试
//!
//! 在独立的测试二进制中运行，避免向其他测试所在的进程发送信号

#![cfg(unix)]

use flare_sd_core::{CoreError, LifecycleGroup};
use nix::sys::signal::{Signal, raise};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[tokio::test]
async fn sigterm_interrupts_the_group() {
    let stopped = Arc::new(AtomicBool::new(false));
    let flag = stopped.clone();

    let group = LifecycleGroup::new()
        .add_with_shutdown("worker", move |shutdown| async move {
            shutdown.cancelled().await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .add_signal_watcher()
        .unwrap();
    let running = tokio::spawn(group.run());

    tokio::time::sleep(Duration::from_millis(20)).await;
    raise(Signal::SIGTERM).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .unwrap()
        .unwrap();
    match result {
        Err(CoreError::Signal(name)) => assert_eq!(name, "SIGTERM"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(stopped.load(Ordering::SeqCst));
}

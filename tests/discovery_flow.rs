//! 端到端：两个注册到内存注册中心的 HTTP 实例 + 客户端发现与轮询

use axum::Router;
use axum::routing::get;
use flare_sd_core::{
    Balancer, ClientInstancer, CoreError, HttpClientFactory, Instancer, KeyLayout, LifecycleGroup,
    MemoryRegistry, RegistrarOptions, RegistryClient, RoundRobin, server,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};
use tokio_test::{assert_err, assert_ok};

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(3), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn discovers_balances_and_cleans_up() {
    let registry = MemoryRegistry::new();
    let client: Arc<dyn RegistryClient> = Arc::new(registry.clone());
    let layout = KeyLayout::default();

    // 服务端：两个 HTTP 监听 + 一个由测试控制的停止任务
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut group = LifecycleGroup::new().add(
        "stopper",
        move || async move {
            let _ = stop_rx.await;
            Ok(())
        },
        |_| {},
    );
    for n in 0..2 {
        let (listener, addr) = assert_ok!(server::bind(Some("127.0.0.1")).await);
        let reply = format!("echo-{}@{}", n, addr);
        let router = Router::new().route("/whoami", get(move || async move { reply }));
        let task = assert_ok!(server::http_task(listener, router).register_as(
            client.clone(),
            &layout,
            "Echo",
            RegistrarOptions::default(),
        ));
        group = group.add_task(Box::new(task));
    }
    let running = tokio::spawn(group.run());

    // 客户端
    let instancer = Instancer::new(client.clone(), layout.transport_prefix("Echo", "http")).await;
    let factory = assert_ok!(HttpClientFactory::new(Duration::from_secs(2)));
    let clients = Arc::new(ClientInstancer::new(&instancer, factory));
    let balancer = RoundRobin::new(clients.clone());

    wait_until(|| clients.len() == 2).await;

    let mut replies: HashMap<String, usize> = HashMap::new();
    for _ in 0..4 {
        let target = assert_ok!(balancer.pick());
        let body = assert_ok!(assert_ok!(target.get("/whoami").send().await).text().await);
        *replies.entry(body).or_default() += 1;
    }
    assert_eq!(replies.len(), 2);
    assert!(replies.values().all(|count| *count == 2));

    // 关闭服务端：所有实例注销，客户端随之清空
    stop_tx.send(()).unwrap();
    let result = assert_ok!(timeout(Duration::from_secs(5), running).await);
    assert_ok!(assert_ok!(result));
    assert!(registry.is_empty());

    wait_until(|| clients.is_empty()).await;
    let err = assert_err!(balancer.pick());
    assert!(matches!(err, CoreError::NoClients));

    clients.stop().await;
    instancer.stop();
}

#[tokio::test]
async fn late_registration_is_picked_up() {
    let registry = MemoryRegistry::new();
    let client: Arc<dyn RegistryClient> = Arc::new(registry.clone());
    let layout = KeyLayout::default();

    let instancer = Instancer::new(client.clone(), layout.transport_prefix("Late", "grpc")).await;
    let clients = Arc::new(ClientInstancer::new(&instancer, |address: String| async move {
        Ok::<_, flare_sd_core::BoxError>((address, None))
    }));
    let balancer = RoundRobin::new(clients.clone());
    assert!(balancer.pick().unwrap_err().is_no_clients());

    let key = layout.instance_key("Late", "grpc", "10.1.2.3:7000");
    assert_ok!(client.put(&key, "10.1.2.3:7000", None).await);

    wait_until(|| !clients.is_empty()).await;
    assert_eq!(assert_ok!(balancer.pick()), "10.1.2.3:7000");
}

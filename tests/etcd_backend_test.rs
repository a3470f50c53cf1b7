//! etcd 后端集成测试
//!
//! 这些测试需要运行中的 etcd 服务器实例。
//! 默认情况下，测试会被忽略，需要使用 `cargo test --test etcd_backend_test -- --ignored` 运行。
//!
//! 启动 etcd 服务器：
//! ```bash
//! docker run -d --name etcd-test -p 2379:2379 -p 2380:2380 \
//!   quay.io/coreos/etcd:v3.5.9 \
//!   etcd --advertise-client-urls=http://127.0.0.1:2379 \
//!        --listen-client-urls=http://0.0.0.0:2379
//! ```

#![cfg(feature = "etcd")]

use flare_sd_core::{
    ClientInstancer, EtcdRegistry, Instancer, KeyLayout, Registrar, RegistrarOptions, RegistryClient,
    ServiceInstance,
};
use std::sync::Arc;
use tokio::time::{Duration, sleep, timeout};

/// etcd 服务器地址
/// 可以通过环境变量 ETCD_ENDPOINTS 覆盖，默认为 http://127.0.0.1:2379
fn etcd_endpoints() -> Vec<String> {
    std::env::var("ETCD_ENDPOINTS")
        .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["http://127.0.0.1:2379".to_string()])
}

/// 每个测试使用独立的根路径，避免互相干扰
fn test_layout(name: &str) -> KeyLayout {
    KeyLayout::new(format!("/flare-test/{}/{}", name, uuid::Uuid::new_v4()))
}

async fn connect() -> Arc<dyn RegistryClient> {
    let registry = EtcdRegistry::connect(&etcd_endpoints(), Some(Duration::from_secs(3)))
        .await
        .expect("Failed to connect to etcd");
    Arc::new(registry)
}

#[tokio::test]
#[ignore]
async fn test_etcd_register_and_deregister() {
    let client = connect().await;
    let layout = test_layout("register");
    let key = layout.instance_key("Event", "grpc", "10.0.0.1:9000");
    let registrar = Registrar::new(client.clone(), ServiceInstance::new(key.clone(), "10.0.0.1:9000"));

    registrar.register().await.unwrap();
    registrar.register().await.unwrap();
    let listing = client.list(&layout.service_prefix("Event")).await.unwrap();
    assert_eq!(listing.entries.len(), 1);
    assert_eq!(listing.entries.get(&key).map(String::as_str), Some("10.0.0.1:9000"));

    registrar.deregister().await.unwrap();
    let listing = client.list(&layout.service_prefix("Event")).await.unwrap();
    assert!(listing.entries.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_etcd_instancer_follows_changes() {
    let client = connect().await;
    let layout = test_layout("instancer");
    let prefix = layout.transport_prefix("Event", "twirp");

    client
        .put(&layout.instance_key("Event", "twirp", "a"), "10.0.0.1:9000", None)
        .await
        .unwrap();
    let instancer = Instancer::new(client.clone(), prefix).await;
    assert_eq!(instancer.current().len(), 1);

    client
        .put(&layout.instance_key("Event", "twirp", "b"), "10.0.0.2:9000", None)
        .await
        .unwrap();
    timeout(Duration::from_secs(3), instancer.wait_for(|s| s.len() == 2))
        .await
        .unwrap()
        .unwrap();

    client.delete(&layout.instance_key("Event", "twirp", "a")).await.unwrap();
    let set = timeout(Duration::from_secs(3), instancer.wait_for(|s| s.len() == 1))
        .await
        .unwrap()
        .unwrap();
    assert!(set.contains_key(&layout.instance_key("Event", "twirp", "b")));

    client.delete(&layout.instance_key("Event", "twirp", "b")).await.unwrap();
    instancer.stop();
}

#[tokio::test]
#[ignore]
async fn test_etcd_ttl_heartbeat() {
    let client = connect().await;
    let layout = test_layout("ttl");
    let key = layout.instance_key("Event", "http", "10.0.0.3:80");
    let registrar = Registrar::with_options(
        client.clone(),
        ServiceInstance::new(key.clone(), "10.0.0.3:80"),
        RegistrarOptions::with_ttl(Duration::from_secs(2), Duration::from_millis(500)),
    );

    registrar.register().await.unwrap();
    sleep(Duration::from_secs(4)).await;
    let listing = client.list(&key).await.unwrap();
    assert_eq!(listing.entries.len(), 1, "heartbeat should keep the key alive");

    registrar.deregister().await.unwrap();
    let listing = client.list(&key).await.unwrap();
    assert!(listing.entries.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_etcd_client_instancer() {
    let client = connect().await;
    let layout = test_layout("clients");
    let instancer = Instancer::new(client.clone(), layout.transport_prefix("Event", "http")).await;
    let clients = ClientInstancer::new(&instancer, |address: String| async move {
        Ok::<_, flare_sd_core::BoxError>((address, None))
    });

    let key = layout.instance_key("Event", "http", "10.0.0.4:80");
    client.put(&key, "10.0.0.4:80", None).await.unwrap();
    timeout(Duration::from_secs(3), async {
        while clients.is_empty() {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(&*clients.current(), &["10.0.0.4:80".to_string()]);

    client.delete(&key).await.unwrap();
    clients.stop().await;
    instancer.stop();
}

//! HTTP 传输

use axum::Router;

use super::ServerTask;
use crate::error::CoreError;

/// 在已绑定的监听上提供 axum HTTP 服务，收到关闭信号后优雅停止
pub fn http_task(listener: tokio::net::TcpListener, router: Router) -> ServerTask {
    ServerTask::new("http", listener, move |listener, shutdown| async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(|e| CoreError::transport(format!("HTTP server error: {}", e)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use crate::runtime::Task;
    use axum::routing::get;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn serves_until_shutdown_and_deregisters() {
        let registry = MemoryRegistry::new();
        let (listener, addr) = crate::server::bind(Some("127.0.0.1")).await.unwrap();
        let task = http_task(listener, Router::new().route("/ping", get(|| async { "pong" })))
            .register_as(
                Arc::new(registry.clone()),
                &crate::discovery::KeyLayout::default(),
                "Echo",
                Default::default(),
            )
            .unwrap();

        let token = CancellationToken::new();
        let handle = tokio::spawn(Box::new(task).run(token.clone()));
        crate::utils::wait_for_server_ready(addr, Duration::from_secs(1))
            .await
            .unwrap();

        let body = reqwest::get(format!("http://{}/ping", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "pong");
        assert_eq!(
            registry.get(&format!("/services/Echo/http/{}", addr)).as_deref(),
            Some(addr.to_string().as_str())
        );

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(registry.is_empty());
    }
}

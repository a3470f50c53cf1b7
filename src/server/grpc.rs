//! gRPC 传输

use tokio_stream::wrappers::TcpListenerStream;
use tonic::service::Routes;
use tonic::transport::Server;

use super::ServerTask;
use crate::error::CoreError;

/// 在已绑定的监听上提供 gRPC 服务，收到关闭信号后优雅停止
pub fn grpc_task(listener: tokio::net::TcpListener, routes: Routes) -> ServerTask {
    ServerTask::new("grpc", listener, move |listener, shutdown| async move {
        Server::builder()
            .add_routes(routes)
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown.cancelled_owned())
            .await
            .map_err(|e| CoreError::transport(format!("gRPC server error: {}", e)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Task;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn stops_on_shutdown() {
        let (listener, addr) = crate::server::bind(Some("127.0.0.1")).await.unwrap();
        let task = grpc_task(listener, Routes::default());
        assert_eq!(task.local_addr().unwrap(), addr);

        let token = CancellationToken::new();
        let handle = tokio::spawn(Box::new(task).run(token.clone()));
        crate::utils::wait_for_server_ready(addr, std::time::Duration::from_secs(1))
            .await
            .unwrap();

        token.cancel();
        handle.await.unwrap().unwrap();
    }
}

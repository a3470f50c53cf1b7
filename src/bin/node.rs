//! flare-sd-node
//!
//! - `serve`：在随机端口提供 HTTP 服务并注册到注册中心，收到 SIGINT/SIGTERM 后注销退出
//! - `watch`：发现某个服务的所有实例，轮询调用 `/whoami`

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use flare_sd_core::{
    ClientInstancer, Config, CoreError, ExponentialBackoffPolicy, HttpClientFactory, Instancer,
    KeyLayout, LifecycleGroup, RegistrarOptions, RegistryBackend, RoundRobin, RuntimeConfig, registry, retry,
    server, telemetry,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML 配置文件
    #[arg(short, long, value_name = "FILE", env = "FLARE_SD_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 提供 HTTP 服务并注册
    Serve(ServeArgs),
    /// 发现服务并轮询调用
    Watch(WatchArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// 服务名，默认取配置中的 service.name
    #[arg(long)]
    service: Option<String>,

    /// 监听主机，默认取配置或本机出口 IP
    #[arg(long)]
    host: Option<String>,
}

#[derive(Args)]
struct WatchArgs {
    #[arg(long)]
    service: Option<String>,

    /// 两次调用之间的间隔（毫秒）
    #[arg(long, default_value = "1000")]
    interval_ms: u64,

    /// 调用次数，0 表示一直运行
    #[arg(long, default_value = "0")]
    requests: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path).with_context(|| format!("failed to load config {}", path))?,
        None => {
            let mut config = Config::default();
            config.apply_env();
            config
        }
    };
    telemetry::init_tracing(&config.log)?;

    let result = match cli.command {
        Command::Serve(args) => serve(config, args).await,
        Command::Watch(args) => watch(config, args).await,
    };

    match result {
        // 收到信号是正常的关闭方式
        Err(CoreError::Signal(signal)) => {
            info!(signal = %signal, "Shutdown complete");
            Ok(())
        }
        other => other.context("node exited with error"),
    }
}

async fn serve(config: Config, args: ServeArgs) -> flare_sd_core::Result<()> {
    let service = args.service.unwrap_or(config.service.name.clone());
    let host = args.host.or(config.service.bind_host.clone());
    let client = registry::connect(&config.registry).await?;
    let layout = KeyLayout::new(config.registry.root.clone());
    let options = match config.registry.ttl() {
        Some(ttl) => RegistrarOptions::with_ttl(ttl, config.registry.heartbeat()),
        None => RegistrarOptions::default(),
    };

    let (listener, addr) = server::bind(host.as_deref()).await?;
    let identity = format!("{}@{}", uuid::Uuid::new_v4(), addr);
    let router = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/whoami", get(move || async move { identity }));

    let task = server::http_task(listener, router).register_as(client, &layout, &service, options)?;
    info!(service = %service, address = %addr, "Serving");

    LifecycleGroup::with_config(RuntimeConfig::from(&config.runtime))
        .add_task(Box::new(task))
        .add_signal_watcher()?
        .run()
        .await
}

async fn watch(config: Config, args: WatchArgs) -> flare_sd_core::Result<()> {
    if config.registry.backend == RegistryBackend::Memory {
        warn!("Memory registry only sees instances registered by this process");
    }

    let service = args.service.unwrap_or(config.service.name.clone());
    let client = registry::connect(&config.registry).await?;
    let layout = KeyLayout::new(config.registry.root.clone());
    let prefix = layout.transport_prefix(&service, "http");

    let instancer = Instancer::with_config(client, prefix, &config.discovery).await;
    let factory = HttpClientFactory::new(Duration::from_secs(5)).map_err(CoreError::Other)?;
    let clients = Arc::new(ClientInstancer::new(&instancer, factory));
    let balancer = RoundRobin::new(clients.clone());
    let policy = ExponentialBackoffPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1));
    let interval = Duration::from_millis(args.interval_ms.max(1));
    let requests = args.requests;

    let result = LifecycleGroup::with_config(RuntimeConfig::from(&config.runtime))
        .add_with_shutdown("watch", move |shutdown| async move {
            let mut ticker = tokio::time::interval(interval);
            let mut sent = 0u64;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = ticker.tick() => {}
                }

                let reply = retry(&balancer, &policy, |target| async move {
                    let body = target.get("/whoami").send().await?.error_for_status()?.text().await?;
                    Ok::<_, flare_sd_core::BoxError>(body)
                })
                .await;
                match reply {
                    Ok(body) => info!(service = %service, reply = %body, "Call succeeded"),
                    Err(e) if e.is_no_clients() => warn!(service = %service, "No instances available"),
                    Err(e) => warn!(service = %service, error = %e, "Call failed"),
                }

                sent += 1;
                if requests > 0 && sent >= requests {
                    return Ok(());
                }
            }
        })
        .add_signal_watcher()?
        .run()
        .await;

    clients.stop().await;
    instancer.stop();
    result
}

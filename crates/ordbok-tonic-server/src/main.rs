#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use futures::Stream;
use ordbok_tonic_core::ordbok::{
    EventBus, GenerationBackend, GenerationWorker, ItemStore, JsonFileStore, MemoryStore,
};
use ordbok_tonic_core::proto::{FILE_DESCRIPTOR_SET, ordbok_server::OrdbokServer};
use server::backend::OllamaBackend;
use server::config::{CliArgs, ServerConfig};
use server::service::handler::OrdbokService;
use server::telemetry::{TelemetryProviders, init_telemetry};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Connected;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;
    let service = build_service(&config).await?;

    if config.uds {
        #[cfg(unix)]
        {
            use tokio::net::UnixListener;
            use tokio_stream::wrappers::UnixListenerStream;
            let uds_path = config.server_addr.clone();
            let uds = UnixListener::bind(&uds_path)?;
            let incoming = UnixListenerStream::new(uds);
            log_startup_info(&uds_path, &config);
            let res = run_server_with_incoming(service, providers, incoming).await;
            // A panic might still leave the socket file behind.
            let _ = std::fs::remove_file(&uds_path);
            res
        }
        #[cfg(not(unix))]
        {
            anyhow::bail!("Unix domain sockets are not supported on this platform");
        }
    } else {
        let tcp_path = config.server_addr.clone();
        let tcp = TcpListener::bind(&tcp_path).await?;
        let incoming = TcpListenerStream::new(tcp);
        log_startup_info(&tcp_path, &config);
        run_server_with_incoming(service, providers, incoming).await
    }
}

/// Opens the store, connects the backend and starts the generation worker.
async fn build_service(config: &ServerConfig) -> anyhow::Result<OrdbokService> {
    let store: Arc<dyn ItemStore> = match &config.store_path {
        Some(path) => {
            let store = JsonFileStore::open(path).await?;
            tracing::info!("Loaded item store from {}", store.path().display());
            Arc::new(store)
        }
        None => {
            tracing::warn!("STORE_PATH not set, items are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let backend: Arc<dyn GenerationBackend> = Arc::new(OllamaBackend::new(&config.ollama)?);
    let worker = GenerationWorker::start(
        config.worker.clone(),
        store,
        backend,
        Arc::new(EventBus::new()),
    );

    Ok(OrdbokService::new(Arc::new(worker)))
}

async fn run_server_with_incoming<I, IO, IE>(
    service: OrdbokService,
    providers: TelemetryProviders,
    incoming: I,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<OrdbokServer<OrdbokService>>()
        .await;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(build_ordbok_service(service.clone()))
        .serve_with_incoming_shutdown(
            incoming,
            shutdown_signal(service, health_reporter, providers),
        )
        .await?;

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(addr: &str, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting ordbok on {addr} with full config: {config:#?}");
    } else {
        tracing::info!(
            "Starting ordbok on {addr} with {} workers, model {}",
            config.worker.num_dispatchers,
            config.ollama.model
        );
    }
}

fn build_ordbok_service(service: OrdbokService) -> OrdbokServer<OrdbokService> {
    OrdbokServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

/// Resolves on Ctrl+C or SIGTERM. A handler that fails to install never
/// fires, leaving the other one in charge.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}

async fn shutdown_signal(
    service: OrdbokService,
    health_reporter: HealthReporter,
    providers: TelemetryProviders,
) {
    wait_for_signal().await;
    tracing::info!("Shutdown signal received, terminating gracefully...");

    // 1. Publish the status
    health_reporter
        .set_not_serving::<OrdbokServer<OrdbokService>>()
        .await;

    // 2. Stop the worker; this also ends every Subscribe stream so the
    //    server can finish draining connections.
    service.shutdown().await;

    // 3. Flush exporters
    providers.shutdown();
}

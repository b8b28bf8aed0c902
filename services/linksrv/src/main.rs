//! Connection Health Orchestration Service (linksrv)

use clap::Parser;
use tracing::{error, info, info_span, warn, Instrument};

use errors::LinkResult;
use linksrv::api::{create_api_routes, AppState};
use linksrv::bootstrap::{self, Args};
use linksrv::config::AppConfig;

#[tokio::main]
async fn main() -> LinkResult<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    // Validation mode: validate and exit
    if args.validate {
        println!(
            "Configuration OK: {} connections",
            config.connections.len()
        );
        return Ok(());
    }

    bootstrap::initialize_logging(&config)?;

    let device_id = common::device_id::load_or_create(&config.device.id_file).await?;
    let span = info_span!("linksrv", device_id = %device_id);

    run(config, device_id).instrument(span).await
}

async fn run(config: AppConfig, device_id: String) -> LinkResult<()> {
    info!(
        "Starting {} v{}",
        config.service.name,
        env!("CARGO_PKG_VERSION")
    );

    let manager = bootstrap::build_manager(&config)?;
    manager.start_all().await;

    let shutdown = common::shutdown::shutdown_token();

    let server = if config.service.api.enabled {
        let bind_address = config.service.api.bind_address.clone();
        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!("API server listening on {}", bind_address);

        let app = create_api_routes(AppState::new(
            manager.clone(),
            config.service.name.clone(),
            device_id,
        ));
        let token = shutdown.clone();
        Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        }))
    } else {
        warn!("API server disabled");
        None
    };

    shutdown.cancelled().await;
    info!("Shutting down");

    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => error!("API server error: {}", e),
            Err(e) => error!("API server task failed: {}", e),
        }
    }

    manager.stop_all().await;
    info!("{} stopped", config.service.name);
    Ok(())
}

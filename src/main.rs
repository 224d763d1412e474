use actix_rt::signal;
use actix_web::{web, App, HttpServer};
use realtime_push_service::{config, error, logging, metrics, routes, state::AppState};

#[actix_web::main]
async fn main() -> Result<(), error::PushError> {
    logging::init_tracing();
    let cfg = config::Config::from_env()?;

    let state = AppState::build(cfg)
        .await
        .map_err(|e| error::PushError::StartServer(format!("broadcast channel: {e}")))?;

    // Cross-instance fan-out into local sockets
    let listener = state
        .subscriber()
        .spawn(state.channel.clone())
        .await
        .map_err(|e| error::PushError::StartServer(format!("subscribe: {e}")))?;

    let bind_addr = format!("0.0.0.0:{}", state.config.port);
    let ws_path = state.config.websocket.path.clone();
    tracing::info!(
        %bind_addr,
        ws_path = %ws_path,
        instance_id = %state.instance_id,
        "starting realtime-push-service"
    );

    let app_state = state.clone();
    let server = HttpServer::new(move || {
        let ws_path = ws_path.clone();
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(routes::push::register_routes)
            .configure(move |cfg| routes::wsroute::register_routes(cfg, &ws_path))
    })
    .bind(&bind_addr)
    .map_err(|e| error::PushError::StartServer(format!("bind: {e}")))?
    // Signals are handled below so sockets are closed before the workers stop.
    .disable_signals()
    .run();

    let server_handle = server.handle();
    let mut server_task = actix_rt::spawn(server);

    let early_exit = tokio::select! {
        _ = shutdown_signal() => None,
        result = &mut server_task => Some(result),
    };

    listener.abort();
    state.shutdown();

    let result = match early_exit {
        Some(result) => result,
        None => {
            server_handle.stop(true).await;
            server_task.await
        }
    };

    tracing::info!("realtime-push-service stopped");

    result
        .map_err(|e| error::PushError::StartServer(format!("HTTP server task: {e}")))?
        .map_err(|e| error::PushError::StartServer(format!("HTTP server: {e}")))
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        _ = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Closing WebSocket connections before stopping the server");
}

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use mboga_fresh_api::{
    app_router,
    clients::MpesaClient,
    config::{init_tracing, load_config},
    db,
    events::{process_events, EventSender},
    handlers::AppServices,
    services::{
        delivery::DeliveryService, notifications::NotificationService, orders::OrderService,
        payments::PaymentCallbackService,
    },
    AppState,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(config.log_level(), config.log_json);

    info!(
        environment = %config.environment,
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let db_pool = Arc::new(
        db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?,
    );

    if config.auto_migrate {
        db::run_migrations(&db_pool)
            .await
            .context("failed to run migrations")?;
    }

    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = Arc::new(EventSender::new(event_tx));
    tokio::spawn(process_events(event_rx));

    let gateway = Arc::new(MpesaClient::new(config.mpesa.clone()));
    let notifications = NotificationService::new(db_pool.clone());
    let services = AppServices {
        orders: Arc::new(OrderService::new(
            db_pool.clone(),
            gateway,
            notifications.clone(),
            Some(event_sender.clone()),
        )),
        payments: Arc::new(PaymentCallbackService::new(
            db_pool.clone(),
            notifications.clone(),
            Some(event_sender.clone()),
        )),
        delivery: Arc::new(DeliveryService::new(
            db_pool.clone(),
            notifications.clone(),
            Some(event_sender.clone()),
            Decimal::from(config.delivery_fee_kes),
        )),
        notifications,
    };

    let state = AppState {
        db: db_pool,
        config: Arc::new(config.clone()),
        event_sender: Some(event_sender),
        services,
    };

    let app = app_router(state).layer(build_cors_layer(
        config.cors_allowed_origins.as_deref(),
        config.is_development(),
    ));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shut down cleanly");
    Ok(())
}

fn build_cors_layer(allowed_origins: Option<&str>, is_development: bool) -> CorsLayer {
    let methods = [Method::GET, Method::POST];
    let headers = [header::AUTHORIZATION, header::CONTENT_TYPE];

    match allowed_origins {
        Some(origins) => {
            let parsed: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(v) => Some(v),
                    Err(_) => {
                        warn!(origin, "ignoring unparseable CORS origin");
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(parsed))
                .allow_methods(methods)
                .allow_headers(headers)
        }
        None if is_development => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers),
        None => CorsLayer::new().allow_methods(methods).allow_headers(headers),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

mod config;
mod dto;
mod handler;
mod mailer;
mod service;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Arc;

use service::EmailService;

#[tokio::main]
async fn main() {
    // Log setup
    tracing_subscriber::fmt().init();

    // Load config
    let cfg = config::load_config().expect("failed to load mail relay config");
    tracing::info!("Successfully loaded mail relay config");

    // Missing credentials only surface once a send is attempted
    if let (Some(sender), Some(_)) = (cfg.sender(), cfg.auth_code()) {
        tracing::info!("SMTP account configured for {}", sender);
    } else {
        tracing::warn!(
            "QQ Mail account is not configured, set QQ_EMAIL and QQ_AUTH_CODE. \
             Send requests will fail until both are provided"
        );
    }

    let port = cfg.server_port;
    let verify_on_startup = cfg.verify_on_startup;

    // Setup service
    let service = Arc::new(EmailService::new(Arc::new(cfg)));

    if verify_on_startup {
        let service = service.clone();
        tokio::spawn(async move {
            service.verify_connection().await;
        });
    }

    // Setup router
    let router = router(service);

    // Start server
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("Failed to bind to address");
    let addr = listener
        .local_addr()
        .expect("Failed to read listener address");

    tracing::info!("Mail relay starting, listening on {}", addr);
    tracing::info!("  GET  http://localhost:{}/api/health", port);
    tracing::info!("  POST http://localhost:{}/api/send-email", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    tracing::info!("Mail relay stopped");
}

fn router(service: Arc<EmailService>) -> Router {
    let expose_errors = service.config().is_development();

    Router::new()
        .route("/", get(handler::root))
        .route("/api/health", get(handler::health_check))
        .route("/api/send-email", post(handler::send_email))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", handler::ApiDoc::openapi()))
        .fallback(handler::not_found)
        .method_not_allowed_fallback(handler::not_found)
        .with_state(service)
        .layer(CatchPanicLayer::custom(handler::panic_response(expose_errors)))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

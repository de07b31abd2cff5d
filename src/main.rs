use std::net::SocketAddr;

use axum::http::{header, HeaderValue};
use scimemo_backend::config::Config;
use scimemo_backend::logging::init_tracing;
use scimemo_backend::routes::build_router;
use scimemo_backend::services::transfer;
use scimemo_backend::state::AppState;
use scimemo_backend::store::{open_backend, open_repository, BackendKind};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    init_tracing(&config.log_config());

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("migrate") {
        run_migrate(&config, &args[1..]);
        return;
    }

    tracing::info!(backend = %config.storage.backend, "Starting scimemo-backend");

    let repo = open_repository(&config).expect("Failed to open storage backend");
    let state = AppState::new(repo.clone(), &config);

    let app = build_router(state)
        .layer(build_cors_layer(&config))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ));

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!(%addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "HTTP server crashed");
    }

    tracing::info!("Flushing store before exit");
    if let Err(e) = repo.flush() {
        tracing::error!(error = %e, "Failed to flush store before exit");
    }
    tracing::info!("Shutdown complete");
}

/// `scimemo-backend migrate <from> <to>`：把一个后端的数据追加到另一个后端
fn run_migrate(config: &Config, args: &[String]) {
    let [from, to] = args else {
        eprintln!("usage: scimemo-backend migrate <file|sql|embedded> <file|sql|embedded>");
        std::process::exit(2);
    };
    let parse = |raw: &str| -> BackendKind {
        raw.parse().unwrap_or_else(|e: String| {
            eprintln!("{e}");
            std::process::exit(2);
        })
    };
    let (from, to) = (parse(from.as_str()), parse(to.as_str()));
    if from == to {
        eprintln!("source and target backend must differ");
        std::process::exit(2);
    }

    let source = open_backend(from, config).expect("Failed to open source backend");
    let target = open_backend(to, config).expect("Failed to open target backend");
    match transfer::migrate(source.as_ref(), target.as_ref()) {
        Ok(report) => tracing::info!(
            %from,
            %to,
            flashcards = report.flashcards,
            preset_domains = report.preset_domains,
            "Migration complete"
        ),
        Err(e) => {
            tracing::error!(error = %e, "Migration failed");
            std::process::exit(1);
        }
    }
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.cors_origin.trim() == "*" {
        // 通配符模式仅用于开发环境
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_credentials(false)
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .allow_methods(Any)
            .expose_headers([header::CONTENT_DISPOSITION]);
    }

    match config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .allow_methods(Any)
            .expose_headers([header::CONTENT_DISPOSITION]),
        Err(e) => {
            panic!(
                "FATAL: Invalid CORS_ORIGIN '{}': {}. \
                 Fix the CORS_ORIGIN environment variable.",
                config.cors_origin, e
            );
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
}

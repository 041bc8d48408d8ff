//! updrop 服务器入口。
//!
//! 一个小型文件分享服务器：沙箱化上传、原始下载、短 custom path、
//! 文件内搜索与共享剪贴板。入口负责构建 axum 路由、把共享存储注入
//! 请求扩展、配置 TLS 并启动 HTTP/HTTPS 双监听。

mod alias;
mod auth;
mod background;
mod clipboard;
mod config;
mod error;
mod etag;
mod files;
mod http;
mod logging;
mod prefs;
mod ratelimit;
mod search;
mod staged;
mod storage;
mod tls;
mod upload;
mod version;

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{delete, get, post};
use axum::{Router, middleware};
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::alias::AliasStore;
use crate::auth::AuthConfig;
use crate::background::spawn_background_tasks;
use crate::clipboard::ClipboardStore;
use crate::config::{Args, CLIPBOARD_RATE_LIMIT, CLIPBOARD_RATE_WINDOW_SECS, ServerMode};
use crate::http::build_cors_layer;
use crate::prefs::FlagStore;
use crate::ratelimit::RateLimiter;
use crate::storage::Storage;
use crate::upload::UploadConfig;

shadow!(build);

/// 启动 updrop 服务器并阻塞直至关闭。
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let storage = Arc::new(Storage::new(PathBuf::from(args.storage_dir.clone())));
    storage.ensure_root().await?;
    let aliases = Arc::new(AliasStore::load(PathBuf::from(args.alias_file.clone())).await?);
    let clipboard = Arc::new(ClipboardStore::new());
    let flags = Arc::new(FlagStore::new(args.disable_hidden_files));
    let limiter = Arc::new(RateLimiter::new(
        CLIPBOARD_RATE_LIMIT,
        Duration::from_secs(CLIPBOARD_RATE_WINDOW_SECS),
    ));
    let auth_config = Arc::new(
        AuthConfig::new(args.auth_user.clone(), args.auth_pass.clone())
            .map_err(|err| std::io::Error::new(ErrorKind::InvalidInput, err))?,
    );
    let upload_config = Arc::new(UploadConfig {
        max_size: args.upload_max_size,
    });
    let mode = Arc::new(ServerMode {
        read_only: args.read_only,
    });
    if auth_config.enabled() {
        info!("basic authentication enabled");
    }
    if mode.read_only {
        info!("read-only mode enabled");
    }

    let mut app = Router::new()
        .route(
            "/",
            post(upload::upload_file).layer(DefaultBodyLimit::disable()),
        )
        .route("/raw/{*path}", get(files::raw_file))
        .route("/download", get(files::download_file))
        .route("/delete", delete(files::delete_entry))
        .route("/list", get(files::list_files))
        .route("/search-file", get(search::search_handler))
        .route(
            "/clipboard",
            get(clipboard::get_clipboard).post(clipboard::set_clipboard),
        )
        .route(
            "/showhiddenfiles",
            get(prefs::get_hidden_files).post(prefs::toggle_hidden_files),
        )
        .route(
            "/custom-path",
            get(files::list_custom_paths)
                .post(files::create_custom_path)
                .delete(files::delete_custom_path),
        )
        .route("/version", get(version::get_version_info))
        .layer(middleware::from_fn(auth::auth_middleware))
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let forwarded_ip = request
                        .headers()
                        .get("x-forwarded-for")
                        .and_then(|v| v.to_str().ok())
                        .map(|s| s.split(',').next().unwrap_or("").trim().to_string());
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.to_string());
                    let client_ip = forwarded_ip
                        .or(connect_ip)
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage.clone()))
        .layer(Extension(aliases))
        .layer(Extension(clipboard))
        .layer(Extension(flags))
        .layer(Extension(limiter.clone()))
        .layer(Extension(auth_config))
        .layer(Extension(upload_config))
        .layer(Extension(mode));

    if let Some(cors_layer) = build_cors_layer(args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(ErrorKind::InvalidInput, err.to_string()))?;
    let http_addr = SocketAddr::new(host, args.http_port);
    let https_addr = SocketAddr::new(host, args.https_port);
    let tls_config = tls::build_rustls_config(&args, host).await?;
    let handle = Handle::new();

    info!("🚀 Starting HTTP server at {}", http_addr);
    info!("🔒 Starting HTTPS server at {}", https_addr);

    let http_server = axum_server::bind(http_addr)
        .handle(handle.clone())
        .serve(app.clone().into_make_service_with_connect_info::<SocketAddr>());
    let https_server = axum_server::bind_rustls(https_addr, tls_config)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    spawn_background_tasks(
        storage,
        limiter,
        Duration::from_secs(args.temp_ttl_secs),
    );
    tokio::select! {
        result = http_server => result?,
        result = https_server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("received termination signal, shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}

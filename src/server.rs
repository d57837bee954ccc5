//! Web server

use crate::cli;

use std::{net::SocketAddr, path::PathBuf, process::exit, str::FromStr, time::Duration};

use axum::Router;
use axum_server::{tls_rustls::RustlsConfig, Handle};
use expanduser::expanduser;
use tokio::signal;
use tracing::{event, Level};

/// Serve the datacube assembly service
///
/// Binds to the configured host and port, optionally with TLS, and serves the application
/// until a shutdown signal is received.
///
/// # Arguments
///
/// * `args`: Command line arguments
/// * `app`: The [axum::Router] to serve
pub async fn serve(args: &cli::CommandLineArgs, app: Router) {
    let addr = SocketAddr::from_str(&format!("{}:{}", args.host, args.port))
        .expect("invalid host name, IP address or port number");

    // Catch ctrl+c and try to shutdown gracefully
    let handle = Handle::new();
    tokio::spawn(shutdown_signal(
        handle.clone(),
        args.graceful_shutdown_timeout,
    ));

    event!(Level::INFO, "listening on {}", addr);
    if args.https {
        let tls_config = tls_config(&args.cert_file, &args.key_file).await;
        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .unwrap();
    } else {
        axum_server::bind(addr)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .unwrap();
    }
}

/// Expand and canonicalise a TLS file path, exiting with a message when the file is absent.
fn tls_file(path: &str, description: &str) -> PathBuf {
    expanduser(path)
        .expect("Failed to expand ~ to user name. Please provide an absolute path instead.")
        .canonicalize()
        .unwrap_or_else(|_| {
            println!("TLS {} expected at '{}' but not found.", description, path);
            exit(1)
        })
}

/// Load the TLS certificate and key files into a [RustlsConfig].
async fn tls_config(cert_file: &str, key_file: &str) -> RustlsConfig {
    let cert_file = tls_file(cert_file, "certificate file");
    let key_file = tls_file(key_file, "key file");
    RustlsConfig::from_pem_file(cert_file, key_file)
        .await
        .expect("Failed to load TLS certificate files")
}

/// Graceful shutdown handler
///
/// Installs signal handlers to catch Ctrl-C or SIGTERM and trigger a graceful shutdown.
async fn shutdown_signal(handle: Handle, timeout: u64) {
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

    event!(Level::INFO, "signal received, starting graceful shutdown");
    // Force shutdown if graceful shutdown takes longer than the timeout
    handle.graceful_shutdown(Some(Duration::from_secs(timeout)));
}

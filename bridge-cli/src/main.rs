mod cli;
mod validate;

use std::process;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use bridge_core::client_pool::{ClientPool, Credentials};
use bridge_core::descriptor::DescriptorRegistry;
use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(msg) = validate::validate(&cli) {
        eprintln!("{msg}");
        eprintln!("Try 'grpc-ws-bridge --help' for more details.");
        process::exit(2);
    }

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    let registry = match DescriptorRegistry::load(&cli.protos, &cli.includes) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            eprintln!("Failed to load proto descriptors: {e}");
            process::exit(1);
        }
    };
    tracing::info!(
        files = registry.file_count(),
        services = registry.service_count(),
        "descriptors loaded"
    );

    let credentials = if cli.secure {
        let ca_pem = match cli.tls_ca.as_deref().map(std::fs::read) {
            Some(Ok(bytes)) => Some(bytes),
            Some(Err(e)) => {
                eprintln!("Failed to read --tls-ca file: {e}");
                process::exit(1);
            }
            None => None,
        };
        Credentials::Tls { ca_pem }
    } else {
        Credentials::Plaintext
    };
    let pool = ClientPool::new(credentials);

    let listener = match TcpListener::bind(("0.0.0.0", cli.ws_port)).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind WebSocket port {}: {e}", cli.ws_port);
            process::exit(1);
        }
    };

    tracing::info!(port = cli.ws_port, target = %cli.default_target, "bridge listening");
    bridge_core::server::serve(listener, registry, pool, Some(cli.default_target)).await;
}

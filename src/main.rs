//! Chat relay server binary
//!
//! Usage:
//!   relais                          # defaults (port 8080, 4 rooms)
//!   relais --port 9000              # listen on a specific port
//!   relais --config relais.json     # load settings from a file
//!
//! With a config file, SIGHUP re-reads it and applies the reloadable limits
//! to newly accepted sessions.

use std::env;
use std::sync::Arc;

use tracing::{error, info};

use relais::{RelayConfig, RelayServer};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "help" || a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let server = match build_server(&args) {
        Ok(server) => Arc::new(server),
        Err(e) => {
            error!("startup failed: {}", e);
            std::process::exit(1);
        }
    };

    #[cfg(unix)]
    spawn_reload_handler(Arc::clone(&server));

    if let Err(e) = server.serve().await {
        error!("server error: {}", e);
        std::process::exit(1);
    }
}

fn build_server(args: &[String]) -> relais::Result<RelayServer> {
    if let Some(path) = parse_flag(args, "--config") {
        info!("loading configuration from {}", path);
        return RelayServer::from_file(path);
    }

    let mut config = RelayConfig::default();
    if let Some(port) = parse_flag(args, "--port") {
        config.port = port
            .parse()
            .map_err(|_| relais::RelayError::config(format!("invalid port: {}", port)))?;
    }
    RelayServer::new(config)
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

#[cfg(unix)]
fn spawn_reload_handler(server: Arc<RelayServer>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hup = match signal(SignalKind::hangup()) {
            Ok(hup) => hup,
            Err(e) => {
                error!("failed to install SIGHUP handler: {}", e);
                return;
            }
        };
        while hup.recv().await.is_some() {
            if let Err(e) = server.reload() {
                error!("config reload failed: {}", e);
            }
        }
    });
}

fn print_usage() {
    println!("Relais - Multi-Room TCP Chat Relay");
    println!();
    println!("USAGE:");
    println!("    relais [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>       Port to listen on (default: 8080)");
    println!("    --config <PATH>     Load configuration from a JSON file");
    println!("    --help              Show this help message");
    println!();
    println!("EXAMPLES:");
    println!("    relais");
    println!("    relais --port 9000");
    println!("    RUST_LOG=debug relais --config relais.json");
}

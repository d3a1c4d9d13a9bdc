//! Bayanat control-plane agent
//!
//! Usage:
//! - Normal mode: `bayanat-agent`
//! - With custom port: `bayanat-agent --port 9200`
//!
//! Configuration comes from the environment; see `config::env`.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use bayanat_agent::config::{constants::VERSION, EnvConfig};
use bayanat_agent::infra::{AuditLog, SystemExecutor};
use bayanat_agent::server;
use bayanat_agent::state::AppState;

fn parse_args(config: &mut EnvConfig) {
    let args: Vec<String> = std::env::args().collect();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                if let Ok(port) = args[i + 1].parse() {
                    config.port = port;
                }
                i += 2;
            }
            "--version" | "-V" => {
                println!("bayanat-agent {VERSION}");
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }
}

fn print_help() {
    println!("Bayanat control-plane agent");
    println!();
    println!("USAGE:");
    println!("    bayanat-agent [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>    Override the listening port");
    println!("    -V, --version    Print version information");
    println!("    -h, --help       Print help information");
    println!();
    println!("ENVIRONMENT:");
    println!("    BAYANAT_AGENT_PORT, BAYANAT_APP_DIR, BAYANAT_SERVICE,");
    println!("    BAYANAT_PROXY_SERVICE, BAYANAT_USER, BAYANAT_AUDIT_LOG,");
    println!("    BAYANAT_SETTLE_DELAY_SECS, RUST_LOG");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut config = EnvConfig::from_env();
    parse_args(&mut config);

    let audit = match AuditLog::open(&config.audit_log) {
        Ok(audit) => audit,
        Err(e) => {
            eprintln!(
                "Failed to open audit log {}: {e}",
                config.audit_log.display()
            );
            std::process::exit(1);
        }
    };

    tracing::info!(
        version = VERSION,
        port = config.port,
        app_dir = %config.app_dir.display(),
        services = ?config.managed_services(),
        audit_log = %config.audit_log.display(),
        "Starting bayanat-agent"
    );

    let state = Arc::new(AppState::new(config, Arc::new(SystemExecutor), audit));

    if let Err(e) = server::run(state).await {
        tracing::error!(error = %e, "Server exited with error");
        std::process::exit(1);
    }
}

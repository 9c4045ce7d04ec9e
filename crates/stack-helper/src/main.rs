//! Stack Helper
//!
//! Brings the Docker Compose stack up the same way the end-to-end fixture
//! does, prints a JSON descriptor of the running stack on stdout, and keeps
//! it up until SIGINT/SIGTERM. The stack is torn down before exit.
//!
//! The project root is found by walking up from the current directory to the
//! base compose file. Configuration comes from the environment and the
//! project's `.env` file, which overrides the environment.

use stack_fixture::compose::ProcessRunner;
use stack_fixture::config::{EnvMode, StackConfig};
use stack_fixture::stack::{locate_project_root, ComposeStack, StackHandle};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so stdout carries only the descriptor
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stack_helper=info,stack_fixture=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cwd = std::env::current_dir()?;
    let defaults = StackConfig::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    let root = locate_project_root(&defaults, &cwd)?;

    let config = StackConfig::load(&StackConfig::dotenv_path(&root), EnvMode::Override).map_err(
        |e| {
            error!("Failed to load configuration: {}", e);
            e
        },
    )?;

    info!(
        root = %root.display(),
        port = config.port,
        compose_bin = %config.compose_bin,
        timeout_secs = config.readiness.timeout.as_secs(),
        "Configuration loaded successfully"
    );

    let stack = ComposeStack::start(&config, &root, Arc::new(ProcessRunner))
        .await
        .map_err(|e| {
            error!("Failed to start stack: {}", e);
            e
        })?;

    println!("{}", descriptor(&stack.handle()));
    info!("Stack is up; press Ctrl-C to tear it down");

    shutdown_signal().await;

    stack.shutdown().await.map_err(|e| {
        error!("Failed to tear down stack: {}", e);
        e
    })?;

    info!("Stack torn down");
    Ok(())
}

/// One-line JSON description of a running stack.
fn descriptor(handle: &StackHandle) -> serde_json::Value {
    serde_json::json!({
        "port": handle.port(),
        "base_url": handle.base_url(),
        "health_url": handle.health_url(),
    })
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, tearing down..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, tearing down...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_fields() {
        let value = descriptor(&StackHandle::new(8002));

        assert_eq!(value["port"], 8002);
        assert_eq!(value["base_url"], "http://localhost:8002/");
        assert_eq!(value["health_url"], "http://localhost:8002/health/");
    }
}

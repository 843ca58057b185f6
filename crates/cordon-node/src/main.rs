//! Entry point: run one fabric role.
//!
//! Usage: `cordon-node <role> <config.toml>` where role is one of
//! `access_proxy`, `decision`, `policy_engine`, `web_front`,
//! `data_center`. The process runs until `exit` is typed on stdin.

use cordon_core::NodeRole;
use cordon_node::{start_node, AppConfig, CordonFront};
use cordon_quorum::LoggingNotifier;
use std::path::Path;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn parse_role(s: &str) -> Option<NodeRole> {
    match s {
        "access_proxy" => Some(NodeRole::AccessProxy),
        "decision" => Some(NodeRole::Decision),
        "policy_engine" => Some(NodeRole::PolicyEngine),
        "web_front" => Some(NodeRole::WebFront),
        "data_center" => Some(NodeRole::DataCenter),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (role, config_path) = match (args.get(1), args.get(2)) {
        (Some(role), Some(path)) => match parse_role(role) {
            Some(role) => (role, path),
            None => {
                error!(role, "unknown role");
                return ExitCode::FAILURE;
            }
        },
        _ => {
            eprintln!("usage: cordon-node <role> <config.toml>");
            return ExitCode::FAILURE;
        }
    };

    let config = match AppConfig::load(Path::new(config_path)) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, path = %config_path, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let node = match start_node(&config, role).await {
        Ok(node) => node,
        Err(e) => {
            error!(error = %e, "failed to start node");
            return ExitCode::FAILURE;
        }
    };

    let _front = if role == NodeRole::WebFront {
        Some(CordonFront::attach(node.clone(), Box::new(LoggingNotifier)).await)
    } else {
        None
    };

    // Runs until 'exit' on stdin, like the historical node scripts.
    let stdin_task = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        loop {
            line.clear();
            match std::io::stdin().read_line(&mut line) {
                Ok(0) => break,
                Ok(_) if line.trim() == "exit" => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });
    let _ = stdin_task.await;

    node.shutdown().await;
    ExitCode::SUCCESS
}

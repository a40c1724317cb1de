//! Deskline: directory assistant answering under a per-request deadline.

use std::path::PathBuf;
use std::sync::Arc;

use deskline_server::{build_router, import, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn resolve_data_dir() -> PathBuf {
    std::env::var("DESKLINE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

fn print_help() {
    println!("Deskline: directory assistant with a per-request deadline");
    println!();
    println!("Usage: deskline [command]");
    println!();
    println!("Commands:");
    println!("  (none)                          Start the server");
    println!("  import <records.json> [dir]     Import records into the store");
    println!("  validate [data-dir]             Validate the record store");
    println!("  help                            Show this help message");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--validate" | "validate" => {
                let data_dir = args.get(2).map(PathBuf::from).unwrap_or_else(resolve_data_dir);
                let report = import::validate(&data_dir);
                import::print_report(&report);
                std::process::exit(if report.db_valid { 0 } else { 1 });
            }
            "--import" | "import" => {
                let Some(source) = args.get(2).map(PathBuf::from) else {
                    eprintln!("Usage: deskline import <records.json> [data-dir]");
                    std::process::exit(1);
                };
                let data_dir = args.get(3).map(PathBuf::from).unwrap_or_else(resolve_data_dir);
                let report = import::import_records(&source, &data_dir);
                import::print_report(&report);
                std::process::exit(if report.errors.is_empty() { 0 } else { 1 });
            }
            "--help" | "-h" | "help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'deskline help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = deskline_core::DeskConfig::from_env(&data_dir)?;
    let port = config.port;

    let state = Arc::new(AppState::new(config));
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Deskline server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

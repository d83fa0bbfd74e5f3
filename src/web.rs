#![cfg(not(tarpaulin_include))]

use clap::{Parser, Subcommand};
use excel_analytics::app;
use excel_analytics::config::ServerConfig;
use excel_analytics::store::{DocumentStore, Role};
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "website")]
#[command(about = "Excel Analytics REST backend", long_about = None)]
struct Cli {
    #[arg(long, env = "HOST")]
    host: Option<String>,

    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Directory for users.json and uploads.json
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Grant the admin role to a registered user, directly in the store
    PromoteAdmin { email: String },
}

/// Main entry point for the REST backend
///
/// Reads configuration from the environment (`HOST`, `PORT`, `DATA_DIR`,
/// `JWT_SECRET`, `TOKEN_TTL_HOURS`), lets flags override it, then either
/// serves or runs the one-off admin bootstrap.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = ServerConfig::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    match cli.command {
        Some(Command::PromoteAdmin { email }) => {
            let store = DocumentStore::open(&config.data_dir)?;
            let user = store
                .find_user_by_email(&email)?
                .ok_or_else(|| format!("No user registered with {}", email))?;
            store.set_role(user.id, Role::Admin)?;
            info!("{} is now an admin", email);
            Ok(())
        }
        None => app::run(config).await,
    }
}

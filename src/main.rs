//! `weederd`: the proxy's command-line entry point.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use weeder::config::Config;
use weeder::{logging, metrics, server};

#[derive(Parser, Debug)]
#[command(name = "weederd", about = "Stateful HTTP reverse proxy fronting a distributed blob-storage cluster")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Starts the proxy.
    Start {
        /// Path to the JSON config file.
        #[arg(short = 'c', long = "config")]
        config: PathBuf,
    },
    /// Prints the build version and exits.
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Version => {
            println!("weederd {}", env!("CARGO_PKG_VERSION"));
        }
        Command::Start { config } => {
            logging::init();
            metrics::register();

            let config = match Config::load_or_default(&config) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(error = %e, "failed to load config");
                    std::process::exit(1);
                }
            };

            let directory = match build_directory_adapter(&config).await {
                Ok(d) => d,
                Err(e) => {
                    tracing::error!(error = %e, "failed to initialize directory adapter");
                    std::process::exit(1);
                }
            };

            let addr = config.listen_addr();
            let state = Arc::new(server::AppState::new(config, directory));

            if let Err(e) = server::serve(state, addr).await {
                tracing::error!(error = %e, "server exited with error");
                std::process::exit(1);
            }
        }
    }
}

async fn build_directory_adapter(
    config: &Config,
) -> Result<Arc<dyn weeder_core::DirectoryAdapter>, weeder::BoxError> {
    match config.directory_adapter.as_str() {
        "redis" => {
            let password = (!config.redis.password.is_empty()).then_some(config.redis.password.as_str());
            let adapter = weeder_dir_kv::KvDirectoryAdapter::connect(
                &config.redis.addr,
                password,
                config.redis.database,
            )
            .await?;
            Ok(Arc::new(adapter))
        }
        _ => {
            let sql_config = weeder_dir_sql::SqlConfig {
                dsn: config.mysql.dsn(),
                max_idle_connections: config.mysql.max_idle_connections,
                max_open_connections: config.mysql.max_open_connections,
            };
            Ok(Arc::new(weeder_dir_sql::SqlDirectoryAdapter::new(sql_config)))
        }
    }
}

use std::process;

use clap::Parser;
use log::{error, info};

use flomokit::{App, Cli, Config};

pub fn initialize_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();

    info!("Logger initialized");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    initialize_logger(cli.verbose);

    info!("Application starting up");

    let result = async {
        let mut config = Config::load(cli.config.as_deref())?;
        if let Some(token) = cli.token {
            config.token = Some(token);
        }
        App::new(config, cli.verbose)?.run(cli.command).await
    }
    .await;

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    info!("Application shutting down");
}

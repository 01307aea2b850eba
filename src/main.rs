// src/main.rs

use clap::Parser;

use preheat::cli::CliArgs;
use preheat::logging::init_logging;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    if let Err(err) = init_logging(args.log_level) {
        eprintln!("preheat: failed to initialise logging: {err}");
    }

    match preheat::run(args).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::error!(error = %err, "preheat failed");
            std::process::exit(1);
        }
    }
}

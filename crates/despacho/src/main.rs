// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! despacho - contested delivery-route dispatch over Telegram.
//!
//! This is the binary entry point for the dispatcher.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;

use clap::{Parser, Subcommand};
use despacho_config::load_config;

/// despacho - contested delivery-route dispatch over Telegram.
#[derive(Parser, Debug)]
#[command(name = "despacho", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the dispatcher: webhook server, sweepers, and timers.
    Serve,
    /// Print the resolved configuration (secrets redacted).
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve => match load_config() {
            Ok(config) => serve::run_serve(config).await,
            Err(e) => {
                eprintln!("error: failed to load configuration: {e}");
                std::process::exit(1);
            }
        },
        Commands::Config => match load_config() {
            Ok(config) => {
                print_config(config);
                Ok(())
            }
            Err(e) => {
                eprintln!("error: failed to load configuration: {e}");
                std::process::exit(1);
            }
        },
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Dump the merged configuration with secrets masked.
fn print_config(mut config: despacho_config::DespachoConfig) {
    if config.telegram.bot_token.is_some() {
        config.telegram.bot_token = Some("***".into());
    }
    if config.sync.password.is_some() {
        config.sync.password = Some("***".into());
    }
    if let Some(url) = &config.database.url
        && url.contains('@')
    {
        config.database.url = Some("***".into());
    }

    match toml::to_string_pretty(&config) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => eprintln!("error: failed to render configuration: {e}"),
    }
}

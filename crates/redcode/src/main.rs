mod audio;
mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::path::Path;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use redcode_core::RemoteStore;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Keep the guard alive so buffered file logs flush on exit.
    let log_dir = match &cli.command {
        Command::Watch(args) => args.log_dir.as_deref(),
        _ => None,
    };
    let _guard = init_tracing(cli.global.verbose, log_dir);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        );

    let Some(dir) = log_dir else {
        tracing_subscriber::registry().with(stderr).init();
        return None;
    };

    // A station log keeps info-level history even when the terminal is quiet.
    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbosity == 0 { "info" } else { level }));
    let appender = tracing_appender::rolling::daily(dir, "redcode.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(stderr)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(file_filter),
        )
        .init();

    Some(guard)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands never touch the store
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "redcode", &mut std::io::stdout());
            Ok(())
        }

        Command::Sounds => {
            let cfg = config::load_config_or_default();
            commands::sounds::handle(&cfg, &cli.global);
            Ok(())
        }

        // Drills run against an in-memory store
        Command::Drill(args) => {
            let cfg = config::load_config_or_default();
            commands::drill::handle(args, &cfg, &cli.global).await
        }

        // Everything else talks to the shared store
        cmd => {
            let cfg = config::load_config_or_default();
            let store_config = config::resolve_store(&cli.global, &cfg)?;

            let cancel = CancellationToken::new();
            let store = RemoteStore::connect(&store_config, cancel.child_token())?;

            tracing::debug!(command = ?cmd, url = %store_config.url, "dispatching command");
            let result = commands::dispatch(cmd, &store, &cfg, &cli.global).await;

            store.shutdown();
            cancel.cancel();
            result
        }
    }
}

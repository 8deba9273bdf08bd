//! trackside: operator console client for the railway simulation server.
//!
//! `console` (the default) runs the live session; the other subcommands
//! are one-shot requests against the same server.

use clap::Parser;

mod cli;
mod cmd_fetch;
mod cmd_rpc;
mod cmd_tail;
mod config;
mod console;
mod input;
mod render;
mod shutdown;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Logs go to stderr; stdout carries command output.
    let filter = std::env::var("TRACKSIDE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let conn = &args.conn;
    let command = args
        .command
        .unwrap_or_else(|| cli::Command::Console(cli::ConsoleOpts::default()));

    match command {
        cli::Command::Console(opts) => {
            console::run_console(config::ConsoleConfig::new(conn, &opts)).await?;
        }
        cli::Command::Tail(opts) => cmd_tail::cmd_tail(conn, &opts).await?,
        cli::Command::Hints(opts) => cmd_fetch::cmd_hints(conn, &opts).await?,
        cli::Command::Respond(opts) => cmd_fetch::cmd_respond(conn, &opts).await?,
        cli::Command::Kpis(opts) => cmd_fetch::cmd_kpis(conn, &opts).await?,
        cli::Command::History(opts) => cmd_fetch::cmd_history(conn, &opts).await?,
        cli::Command::Signal(opts) => cmd_fetch::cmd_signal(conn, &opts).await?,
        cli::Command::Route(opts) => {
            let command = trackside_core::command::ConsoleCommand::Route {
                id: opts.id,
                action: opts.action.into(),
            };
            cmd_rpc::cmd_rpc(conn, command).await?;
        }
        cli::Command::Train(opts) => {
            cmd_rpc::cmd_rpc(conn, cmd_rpc::train_command(&opts.id, &opts.action)).await?;
        }
        cli::Command::Suggestion(opts) => {
            cmd_rpc::cmd_rpc(conn, cmd_rpc::suggestion_command(&opts.action)).await?;
        }
    }

    Ok(())
}

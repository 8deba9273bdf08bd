//! One-shot RPC subcommands: `route`, `train`, `suggestion`.
//!
//! Each opens its own channel, waits for the login, sends a single
//! command and prints the server's response.

use std::time::Duration;

use anyhow::bail;
use trackside_core::command::{ConsoleCommand, SuggestionCommand, TrainAction};
use trackside_core::rpc::{is_status_ok, status_message};
use trackside_sync::{RpcChannel, SyncEvent, event_channel};

use crate::cli::{ConnectionOpts, SuggestionAction, TrainCommand};

const READY_TIMEOUT: Duration = Duration::from_secs(10);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

pub fn train_command(id: &str, action: &TrainCommand) -> ConsoleCommand {
    let action = match action {
        TrainCommand::Proceed => TrainAction::Proceed,
        TrainCommand::Reverse => TrainAction::Reverse,
        TrainCommand::SetService { code } => TrainAction::SetService {
            service_code: code.clone(),
        },
    };
    ConsoleCommand::Train {
        id: id.to_string(),
        action,
    }
}

pub fn suggestion_command(action: &SuggestionAction) -> ConsoleCommand {
    ConsoleCommand::Suggestion(match action {
        SuggestionAction::List => SuggestionCommand::List,
        SuggestionAction::Accept { id } => SuggestionCommand::Accept { id: id.clone() },
        SuggestionAction::Reject { id, minutes } => SuggestionCommand::Reject {
            id: id.clone(),
            minutes: *minutes,
        },
        SuggestionAction::Recompute => SuggestionCommand::Recompute,
    })
}

/// Connect, log in, send `command`, print the reply.
pub async fn cmd_rpc(conn: &ConnectionOpts, command: ConsoleCommand) -> anyhow::Result<()> {
    let (events, mut rx) = event_channel(8);
    let rpc = RpcChannel::connect(conn.rpc_config(), events).await?;

    let ready = tokio::time::timeout(READY_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Some(SyncEvent::RpcReady) => return Ok(()),
                Some(SyncEvent::RpcClosed { reason }) => {
                    return Err(reason.unwrap_or_else(|| "connection closed".to_string()));
                }
                Some(_) => {}
                None => return Err("event channel closed".to_string()),
            }
        }
    })
    .await;
    match ready {
        Ok(Ok(())) => {}
        Ok(Err(reason)) => bail!("rpc login failed: {reason}"),
        Err(_) => {
            rpc.close();
            bail!("rpc login timed out");
        }
    }

    let reply = rpc.request(command.to_call(), RESPONSE_TIMEOUT).await;
    rpc.close();
    let reply = reply?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    if reply.get("status").is_some() && !is_status_ok(&reply) {
        bail!("server rejected command: {}", status_message(&reply));
    }
    Ok(())
}

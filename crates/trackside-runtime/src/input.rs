//! Operator input typed into the live console.

use trackside_core::analytics::{Period, TimeRange};
use trackside_core::command::{ConsoleCommand, RouteAction, SuggestionCommand, TrainAction};

pub const DEFAULT_REJECT_MINUTES: u32 = 15;

pub const HELP: &str = "\
commands:
  route <id> activate|deactivate
  train <id> proceed|reverse|service <code>
  suggestions                 list dispatcher suggestions
  accept <id>                 accept a suggestion
  reject <id> [minutes]       reject a suggestion (default 15 min)
  hints | recompute           refresh hints
  kpis [1h|6h|1d|1w|1m]
  history <metric> [hourly|daily|weekly]
  overview
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    /// Sent as-is over the RPC channel.
    Rpc(ConsoleCommand),
    Accept(String),
    Reject { id: String, minutes: u32 },
    Hints { recompute: bool },
    Kpis(Option<TimeRange>),
    History { metric: String, period: Period },
    Overview,
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_input(line: &str) -> Result<Option<ConsoleInput>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let input = match words.as_slice() {
        [] => return Ok(None),
        ["route", id, action] => {
            let action = match *action {
                "activate" => RouteAction::Activate,
                "deactivate" => RouteAction::Deactivate,
                other => return Err(format!("unknown route action: {other}")),
            };
            ConsoleInput::Rpc(ConsoleCommand::Route {
                id: id.to_string(),
                action,
            })
        }
        ["train", id, "proceed"] => train(id, TrainAction::Proceed),
        ["train", id, "reverse"] => train(id, TrainAction::Reverse),
        ["train", id, "service", code] => train(
            id,
            TrainAction::SetService {
                service_code: code.to_string(),
            },
        ),
        ["suggestions"] => ConsoleInput::Rpc(ConsoleCommand::Suggestion(SuggestionCommand::List)),
        ["accept", id] => ConsoleInput::Accept(id.to_string()),
        ["reject", id] => ConsoleInput::Reject {
            id: id.to_string(),
            minutes: DEFAULT_REJECT_MINUTES,
        },
        ["reject", id, minutes] => ConsoleInput::Reject {
            id: id.to_string(),
            minutes: minutes
                .parse()
                .map_err(|_| format!("invalid minutes: {minutes}"))?,
        },
        ["hints"] => ConsoleInput::Hints { recompute: false },
        ["recompute"] => ConsoleInput::Hints { recompute: true },
        ["kpis"] => ConsoleInput::Kpis(None),
        ["kpis", range] => ConsoleInput::Kpis(Some(range.parse().map_err(|e| format!("{e}"))?)),
        ["history", metric] => ConsoleInput::History {
            metric: metric.to_string(),
            period: Period::default(),
        },
        ["history", metric, period] => ConsoleInput::History {
            metric: metric.to_string(),
            period: period.parse().map_err(|e| format!("{e}"))?,
        },
        ["overview"] => ConsoleInput::Overview,
        ["help" | "?"] => ConsoleInput::Help,
        ["quit" | "exit"] => ConsoleInput::Quit,
        _ => return Err(format!("unrecognized input: {} (try `help`)", line.trim())),
    };
    Ok(Some(input))
}

fn train(id: &str, action: TrainAction) -> ConsoleInput {
    ConsoleInput::Rpc(ConsoleCommand::Train {
        id: id.to_string(),
        action,
    })
}

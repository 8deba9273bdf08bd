//! CLI definition using clap derive.

use clap::{Args, Parser, Subcommand, ValueEnum};
use trackside_core::analytics::{Period, TimeRange};
use trackside_core::command::{HintVerdict, RouteAction, SignalStatus};

#[derive(Parser)]
#[command(name = "trackside", about = "Railway simulation operator console")]
pub struct Cli {
    #[command(flatten)]
    pub conn: ConnectionOpts,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionOpts {
    /// Simulation server host
    #[arg(long, env = "TRACKSIDE_HOST", default_value = "localhost", global = true)]
    pub host: String,

    /// Simulation server port (RPC socket and HTTP API)
    #[arg(long, env = "TRACKSIDE_PORT", default_value_t = 22222, global = true)]
    pub port: u16,

    /// Client token for the RPC login
    #[arg(long, env = "TRACKSIDE_TOKEN", default_value = "client-secret", global = true)]
    pub token: String,

    /// Sent as X-API-Key on HTTP requests
    #[arg(long, env = "TRACKSIDE_API_KEY", global = true)]
    pub api_key: Option<String>,

    /// HTTP API base URL (default: http://<host>:<port>)
    #[arg(long, env = "TRACKSIDE_API_BASE", global = true)]
    pub api_base: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Live console: RPC session, audit tail, hints and KPIs (default)
    Console(ConsoleOpts),
    /// Follow the audit log
    Tail(TailOpts),
    /// Fetch operator hints once (JSON)
    Hints(HintsOpts),
    /// Answer a hint over HTTP
    Respond(RespondOpts),
    /// Fetch a KPI snapshot (JSON)
    Kpis(KpisOpts),
    /// Fetch a historical metric series (JSON)
    History(HistoryOpts),
    /// Activate or deactivate a route
    Route(RouteOpts),
    /// Send a train command
    Train(TrainOpts),
    /// Work with dispatcher suggestions over RPC
    Suggestion(SuggestionOpts),
    /// Override a signal's status
    Signal(SignalOpts),
}

#[derive(Args, Debug, Clone)]
pub struct ConsoleOpts {
    /// Minimum spacing between hints fetches, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub hints_cooldown_ms: u64,

    /// Automatic hints refresh interval, in seconds
    #[arg(long, default_value_t = 180)]
    pub hints_interval_secs: u64,

    /// KPI refresh interval, in seconds
    #[arg(long, default_value_t = 30)]
    pub kpi_interval_secs: u64,

    /// KPI window (1h, 6h, 1d, 1w, 1m)
    #[arg(long, default_value = "1d")]
    pub time_range: TimeRange,

    /// Start the audit tail after this id
    #[arg(long, default_value_t = 0)]
    pub since: u64,

    /// Audit backfill page size (1-1000)
    #[arg(long, default_value_t = 500)]
    pub audit_limit: u32,
}

impl Default for ConsoleOpts {
    fn default() -> Self {
        Self {
            hints_cooldown_ms: 1000,
            hints_interval_secs: 180,
            kpi_interval_secs: 30,
            time_range: TimeRange::Day,
            since: 0,
            audit_limit: 500,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct TailOpts {
    /// Only show entries after this id
    #[arg(long, default_value_t = 0)]
    pub since: u64,

    /// Backfill page size (1-1000)
    #[arg(long, default_value_t = 500)]
    pub limit: u32,
}

#[derive(Args, Debug, Clone)]
pub struct HintsOpts {
    /// Ask the server to recompute before answering
    #[arg(long)]
    pub recompute: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum VerdictArg {
    Accept,
    Dismiss,
    Override,
}

impl From<VerdictArg> for HintVerdict {
    fn from(arg: VerdictArg) -> Self {
        match arg {
            VerdictArg::Accept => Self::Accept,
            VerdictArg::Dismiss => Self::Dismiss,
            VerdictArg::Override => Self::Override,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RespondOpts {
    pub hint_id: String,

    pub verdict: VerdictArg,

    /// Dismissal window in minutes
    #[arg(long)]
    pub minutes: Option<u32>,

    /// Replacement action (JSON) for `override`
    #[arg(long)]
    pub action: Option<String>,

    #[arg(long, default_value = "operator")]
    pub user: String,
}

#[derive(Args, Debug, Clone)]
pub struct KpisOpts {
    #[arg(long, default_value = "1d")]
    pub range: TimeRange,
}

#[derive(Args, Debug, Clone)]
pub struct HistoryOpts {
    /// Metric name, e.g. punctuality or rtp
    pub metric: String,

    #[arg(long, default_value = "hourly")]
    pub period: Period,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum RouteArg {
    Activate,
    Deactivate,
}

impl From<RouteArg> for RouteAction {
    fn from(arg: RouteArg) -> Self {
        match arg {
            RouteArg::Activate => Self::Activate,
            RouteArg::Deactivate => Self::Deactivate,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RouteOpts {
    pub id: String,
    pub action: RouteArg,
}

#[derive(Args, Debug, Clone)]
pub struct TrainOpts {
    pub id: String,

    #[command(subcommand)]
    pub action: TrainCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TrainCommand {
    Proceed,
    Reverse,
    /// Assign a service code
    SetService { code: String },
}

#[derive(Args, Debug, Clone)]
pub struct SuggestionOpts {
    #[command(subcommand)]
    pub action: SuggestionAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SuggestionAction {
    List,
    Accept {
        id: String,
    },
    Reject {
        id: String,
        /// Snooze window in minutes
        #[arg(long, default_value_t = 15)]
        minutes: u32,
    },
    Recompute,
}

#[derive(Args, Debug, Clone)]
pub struct SignalOpts {
    pub id: String,

    /// RED, YELLOW or GREEN
    pub status: SignalStatus,

    #[arg(long, default_value = "operator override")]
    pub reason: String,

    #[arg(long, default_value = "operator")]
    pub user: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("trackside").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_subcommand_means_console() {
        let cli = parse(&[]);
        assert!(cli.command.is_none());
        assert_eq!(cli.conn.port, 22222);
    }

    #[test]
    fn global_options_after_subcommand() {
        let cli = parse(&["kpis", "--range", "1w", "--host", "sim.local", "--port", "9000"]);
        assert_eq!(cli.conn.host, "sim.local");
        assert_eq!(cli.conn.port, 9000);
        match cli.command {
            Some(Command::Kpis(opts)) => assert_eq!(opts.range, TimeRange::Week),
            _ => panic!("expected kpis"),
        }
    }

    #[test]
    fn unknown_time_range_is_rejected() {
        let result = Cli::try_parse_from(["trackside", "kpis", "--range", "2d"]);
        assert!(result.is_err());
    }

    #[test]
    fn signal_status_is_case_insensitive() {
        match parse(&["signal", "S4", "green"]).command {
            Some(Command::Signal(opts)) => {
                assert_eq!(opts.status, SignalStatus::Green);
                assert_eq!(opts.user, "operator");
            }
            _ => panic!("expected signal"),
        }
    }

    #[test]
    fn nested_train_and_suggestion_commands() {
        match parse(&["train", "T7", "set-service", "S12"]).command {
            Some(Command::Train(opts)) => {
                assert_eq!(opts.id, "T7");
                assert!(matches!(opts.action, TrainCommand::SetService { ref code } if code == "S12"));
            }
            _ => panic!("expected train"),
        }
        match parse(&["suggestion", "reject", "sg-2"]).command {
            Some(Command::Suggestion(opts)) => {
                assert!(matches!(opts.action, SuggestionAction::Reject { minutes: 15, .. }));
            }
            _ => panic!("expected suggestion"),
        }
    }
}

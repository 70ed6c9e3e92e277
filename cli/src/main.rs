use clap::{Args, Parser, Subcommand};
use planrelay::{
    ConnectionManager, ListenerKey, PlanningApi, Protocol, RelayConfig, RelayError, RelayEvent,
    TransportMode, listener,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{Level, debug, info};

/// The only outbound type the polling backend understands.
const USER_MESSAGE: &str = "user-message";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("invalid JSON argument: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("--{0} expects a JSON object")]
    NotAnObject(&'static str),
    #[error("missing plan id; pass --plan-id or set RELAY_PLAN_ID")]
    MissingPlanId,
    #[error("message `{0}` was not accepted by the transport")]
    NotSent(String),
    #[error("event stream ended before a terminal event")]
    StreamEnded,
    #[error("failed to listen for ctrl-c: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "planrelay", about = "Travel planner realtime relay CLI")]
struct Cli {
    /// `legacy`, `strands`, or `polling`.
    #[arg(long, alias = "mode", global = true, env = "RELAY_PROTOCOL")]
    protocol: Option<Protocol>,

    #[arg(long, global = true, env = "RELAY_WS_URL")]
    ws_url: Option<String>,

    #[arg(long, global = true, env = "RELAY_API_BASE_URL")]
    api_base_url: Option<String>,

    #[arg(long, global = true, env = "RELAY_USER_ID")]
    user_id: Option<String>,

    #[arg(long, global = true, env = "RELAY_PLAN_ID")]
    plan_id: Option<String>,

    /// Log at debug level to stderr.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream relay events as JSON lines until planning finishes.
    Watch,
    Plan(PlanCommand),
    /// Connect, send one message, and disconnect.
    Send {
        #[arg(long = "type", default_value = USER_MESSAGE)]
        kind: String,
        #[arg(long, default_value = "{}")]
        payload: String,
    },
}

#[derive(Args, Debug)]
struct PlanCommand {
    #[command(subcommand)]
    command: PlanSubcommand,
}

#[derive(Subcommand, Debug)]
enum PlanSubcommand {
    Start {
        #[arg(long)]
        goal: String,
        #[arg(long, default_value = "{}")]
        preferences: String,
        /// Keep watching the new plan's events after it starts.
        #[arg(long, default_value_t = false)]
        watch: bool,
    },
    Continue {
        plan_id: String,
        #[arg(long)]
        input: String,
    },
    Status {
        plan_id: String,
    },
    Finalize {
        plan_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    let config = build_config(&cli)?;
    match cli.command {
        Command::Watch => run_watch(&config).await,
        Command::Plan(plan) => run_plan(config, plan).await,
        Command::Send { kind, payload } => run_send(&config, &kind, parse_object("payload", &payload)?).await,
    }
}

/// Environment defaults, overridden by whichever flags were given.
fn build_config(cli: &Cli) -> Result<RelayConfig, CliError> {
    let mut config = RelayConfig::from_env()?;
    if let Some(protocol) = cli.protocol {
        config.protocol = protocol;
    }
    if let Some(ws_url) = &cli.ws_url {
        config = config.with_ws_url(ws_url.as_str());
    }
    if let Some(api_base_url) = &cli.api_base_url {
        config = config.with_api_base_url(api_base_url.as_str());
    }
    if let Some(user_id) = &cli.user_id {
        config = config.with_user_id(user_id.as_str());
    }
    if let Some(plan_id) = &cli.plan_id {
        config = config.with_plan_id(plan_id.as_str());
    }
    Ok(config)
}

// =============================================================================
// WATCH
// =============================================================================

async fn run_watch(config: &RelayConfig) -> Result<(), CliError> {
    let manager = ConnectionManager::new(config)?;
    let (tx, mut rx) = mpsc::unbounded_channel::<RelayEvent>();
    manager.add_event_listener(
        ListenerKey::All,
        listener(move |event| {
            if tx.send(event.clone()).is_err() {
                debug!("watch: receiver dropped");
            }
        }),
    );

    manager.connect().await?;
    info!(mode = ?manager.mode(), "watch: connected");

    let outcome = loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break Err(CliError::StreamEnded) };
                println!("{}", serde_json::to_string(&event)?);
                if event.kind.is_terminal() {
                    break Ok(());
                }
            }
            signal = tokio::signal::ctrl_c() => {
                break signal.map_err(CliError::from);
            }
        }
    };

    manager.disconnect().await;
    outcome
}

// =============================================================================
// PLAN
// =============================================================================

async fn run_plan(config: RelayConfig, plan: PlanCommand) -> Result<(), CliError> {
    let api = PlanningApi::from_config(&config)?;
    match plan.command {
        PlanSubcommand::Start { goal, preferences, watch } => {
            let preferences = parse_object("preferences", &preferences)?;
            let response = api.start_planning(&goal, &preferences, &config.user_id).await?;
            print_json(&serde_json::to_value(&response)?)?;
            if watch {
                return run_watch(&config.with_plan_id(response.plan_id)).await;
            }
            Ok(())
        }
        PlanSubcommand::Continue { plan_id, input } => {
            let response = api.continue_planning(&plan_id, &input).await?;
            print_json(&serde_json::to_value(&response)?)
        }
        PlanSubcommand::Status { plan_id } => {
            let status = api.plan_status(&plan_id).await?;
            print_json(&serde_json::to_value(&status)?)
        }
        PlanSubcommand::Finalize { plan_id } => {
            let response = api.finalize_plan(&plan_id).await?;
            print_json(&serde_json::to_value(&response)?)
        }
    }
}

// =============================================================================
// SEND
// =============================================================================

async fn run_send(config: &RelayConfig, kind: &str, payload: Value) -> Result<(), CliError> {
    let manager = ConnectionManager::new(config)?;

    // The polling transport's send is fire-and-forget; await the request here.
    if manager.mode() == TransportMode::Polling {
        let plan_id = config.plan_id.as_deref().ok_or(CliError::MissingPlanId)?;
        let content = payload.get("content").and_then(Value::as_str);
        let Some(content) = content.filter(|_| kind == USER_MESSAGE) else {
            return Err(CliError::NotSent(kind.to_owned()));
        };
        let response = manager.api().continue_planning(plan_id, content).await?;
        return print_json(&serde_json::to_value(&response)?);
    }

    manager.connect().await?;
    let sent = manager.send_message(kind, payload);
    manager.disconnect().await;
    if !sent {
        return Err(CliError::NotSent(kind.to_owned()));
    }
    eprintln!("sent {kind}");
    Ok(())
}

// =============================================================================
// HELPERS
// =============================================================================

fn parse_object(flag: &'static str, raw: &str) -> Result<Value, CliError> {
    let value = serde_json::from_str::<Value>(raw)?;
    if !value.is_object() {
        return Err(CliError::NotAnObject(flag));
    }
    Ok(value)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use toggle_light::*;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Line-oriented light daemon. Reads one command per line on stdin and
/// replies `OK` or `ERR <reason>`.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the saved preferences
    #[arg(long, env = "TOGGLE_LIGHT_DIR", default_value = ".toggle-light")]
    data_dir: PathBuf,

    /// Storage key for the preferences record
    #[arg(long, default_value = STORAGE_KEY)]
    key: String,

    /// Seconds between auto schedule checks
    #[arg(long, default_value_t = 60)]
    interval_secs: u64,
}

/// What a single input line asks for
#[derive(Debug, PartialEq, Eq)]
enum Request {
    Action(LightAction),
    Status,
    Quit,
}

fn parse_request(line: &str) -> std::result::Result<Request, String> {
    let mut parts = line.trim().splitn(2, ':');
    let command = parts.next().unwrap_or_default().trim();
    let arg = parts.next().map(str::trim);

    let number = |max: u8| -> std::result::Result<u8, String> {
        let raw = arg.ok_or_else(|| format!("{command} needs a value"))?;
        match raw.parse::<u8>() {
            Ok(value) if value <= max => Ok(value),
            _ => Err(format!("{command} must be between 0 and {max}")),
        }
    };

    let action = match command {
        "toggle" => LightAction::Toggle,
        "on" | "power_on" => LightAction::TurnOn,
        "off" | "power_off" => LightAction::TurnOff,
        "brightness" | "set_brightness" => LightAction::SetBrightness(number(100)?),
        "color" | "set_color" => match arg {
            Some(value) if !value.is_empty() => LightAction::SetColor(value.to_string()),
            _ => return Err("color needs a value".into()),
        },
        "auto" => LightAction::ToggleAutoMode,
        "start" => LightAction::SetAutoStartHour(number(23)?),
        "end" => LightAction::SetAutoEndHour(number(23)?),
        "check" => LightAction::CheckAutoSchedule,
        "status" => return Ok(Request::Status),
        "quit" | "exit" => return Ok(Request::Quit),
        "" => return Err("No command given".into()),
        other => return Err(format!("Unknown command: {other}")),
    };
    Ok(Request::Action(action))
}

/// Applies an action and builds the reply line. Manual power is refused
/// while auto mode is on.
fn respond(controller: &LightController, action: LightAction) -> String {
    if action.is_manual_power() && controller.state().auto_mode {
        return "ERR Manual power control is disabled in auto mode".to_string();
    }
    controller.dispatch(action);
    "OK".to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("toggle_light=info")),
        )
        .compact()
        .with_writer(std::io::stderr)
        .init();

    color_eyre::install()?;

    let args = Args::parse();
    let config = ControllerConfig::default()
        .with_storage_key(args.key)
        .with_check_interval(Duration::from_secs(args.interval_secs));
    let controller = LightController::start(Arc::new(FileStore::new(&args.data_dir)), config).await;

    println!("OK");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };
        debug!("Received {:?}", line);

        match parse_request(&line) {
            Ok(Request::Action(action)) => println!("{}", respond(&controller, action)),
            Ok(Request::Status) => println!("{}", controller.state()),
            Ok(Request::Quit) => break,
            Err(reason) => println!("ERR {reason}"),
        }
    }

    controller.shutdown().await;
    info!("Stopped");
    Ok(())
}

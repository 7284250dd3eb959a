use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, Result};
use toggle_light::*;
use tracing::{debug, instrument, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Control the simulated light", long_about = None)]
struct Cli {
    /// Directory holding the saved preferences
    #[arg(long, env = "TOGGLE_LIGHT_DIR", default_value = ".toggle-light")]
    data_dir: PathBuf,

    /// Storage key for the preferences record
    #[arg(long, default_value = STORAGE_KEY)]
    key: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the light
    Status,
    /// Turn the light on
    On,
    /// Turn the light off
    Off,
    /// Flip the light
    Toggle,
    /// Set brightness
    Brightness {
        /// Brightness level (0-100)
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=100))]
        level: u8,
    },
    /// Set color
    Color {
        /// Hex color (#RRGGBB) or a palette name
        #[arg(short, long)]
        value: String,
    },
    /// Flip auto mode
    Auto,
    /// Set the auto-on window
    Schedule {
        /// Hour to turn on (0-23)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..24))]
        start: Option<u8>,
        /// Hour to turn off (0-23)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..24))]
        end: Option<u8>,
    },
    /// Evaluate the auto schedule now
    Check,
    /// List palette colors
    Palette,
}

/// Named palette entries, in palette order
const PALETTE_NAMES: [&str; 6] = ["white", "gold", "coral", "turquoise", "mint", "salmon"];

/// Resolve a palette name to its hex value, or pass the input through
fn resolve_color(value: &str) -> String {
    PALETTE_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(value))
        .map(|idx| PALETTE[idx].to_string())
        .unwrap_or_else(|| value.to_string())
}

#[tokio::main]
#[instrument]
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

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    let command = cli.command.unwrap_or(Commands::Status);
    if let Commands::Palette = command {
        for (name, hex) in PALETTE_NAMES.iter().zip(PALETTE) {
            println!("{name:<10} {hex}");
        }
        return Ok(());
    }

    let store = Arc::new(FileStore::new(&cli.data_dir));
    let config = ControllerConfig::default().with_storage_key(cli.key);
    let controller = LightController::start(store, config).await;

    let actions = match command {
        Commands::Status | Commands::Palette => vec![],
        Commands::On => vec![LightAction::TurnOn],
        Commands::Off => vec![LightAction::TurnOff],
        Commands::Toggle => vec![LightAction::Toggle],
        Commands::Brightness { level } => vec![LightAction::SetBrightness(level)],
        Commands::Color { value } => vec![LightAction::SetColor(resolve_color(&value))],
        Commands::Auto => vec![LightAction::ToggleAutoMode],
        Commands::Schedule { start, end } => {
            if start.is_none() && end.is_none() {
                warn!("Neither --start nor --end given");
            }
            start
                .map(LightAction::SetAutoStartHour)
                .into_iter()
                .chain(end.map(LightAction::SetAutoEndHour))
                .collect()
        }
        Commands::Check => vec![LightAction::CheckAutoSchedule],
    };

    let result = apply(&controller, actions);
    controller.shutdown().await;
    result?;

    println!("{}", controller.state());
    Ok(())
}

/// Apply actions in order, refusing manual power while auto mode is on
fn apply(controller: &LightController, actions: Vec<LightAction>) -> Result<()> {
    for action in actions {
        if action.is_manual_power() && controller.state().auto_mode {
            bail!("Manual power control is disabled in auto mode");
        }
        controller.dispatch(action);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_names_resolve() {
        assert_eq!(resolve_color("gold"), "#FFD700");
        assert_eq!(resolve_color("Coral"), "#FF6B6B");
        assert_eq!(resolve_color("#123456"), "#123456");
    }

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();

        let cli = Cli::try_parse_from(["lightc", "schedule", "--start", "20", "--end", "6"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Schedule {
                start: Some(20),
                end: Some(6)
            })
        ));
        assert!(Cli::try_parse_from(["lightc", "brightness", "--level", "101"]).is_err());
        assert!(Cli::try_parse_from(["lightc", "schedule", "--start", "24"]).is_err());
    }

    async fn controller_at(hour: u8) -> LightController {
        LightController::start_with_clock(
            Arc::new(MemoryStore::new()),
            ControllerConfig::default(),
            Arc::new(FixedClock::new(hour)),
        )
        .await
    }

    #[tokio::test]
    async fn manual_power_refused_in_auto_mode() {
        let controller = controller_at(10).await;
        apply(&controller, vec![LightAction::ToggleAutoMode]).unwrap();
        let before = controller.state();

        for action in [LightAction::TurnOn, LightAction::TurnOff, LightAction::Toggle] {
            assert!(apply(&controller, vec![action]).is_err());
        }
        assert_eq!(controller.state(), before);

        apply(&controller, vec![LightAction::SetBrightness(30)]).unwrap();
        assert_eq!(controller.state().brightness, 30);
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn auto_command_shows_scheduled_power() {
        // 18h -> 7h window
        let controller = controller_at(3).await;
        apply(&controller, vec![LightAction::ToggleAutoMode]).unwrap();
        controller.shutdown().await;
        assert!(controller.state().is_on);
        assert!(controller.state().to_string().starts_with("light ON"));
    }
}

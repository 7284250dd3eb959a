/*!
 # Toggle Light

 A simulated smart light: power, brightness, color and a time-of-day
 auto schedule, with the configuration persisted to a local key-value store.

 ## Features

 * Power on/off/toggle
 * Brightness and color selection
 * Auto mode with an hour window that may wrap past midnight
 * Preferences loaded once at startup and saved on every change

 ## Example

 ```rust,no_run
 use std::sync::Arc;
 use toggle_light::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     tracing_subscriber::fmt::init();

     let store = Arc::new(FileStore::new(".toggle-light"));
     let controller = LightController::start(store, ControllerConfig::default()).await;

     controller.dispatch(LightAction::TurnOn);
     controller.dispatch(LightAction::SetBrightness(80));
     controller.dispatch(LightAction::SetColor("#FF6B6B".into()));

     println!("{}", controller.state());
     controller.shutdown().await;
     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Error types for the toggle light library
#[derive(Error, Debug)]
pub enum Error {
    /// The preference store could not be read or written
    #[error("Storage access failed: {0}")]
    Storage(String),

    /// Filesystem error from a file-backed store
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Persisted record could not be encoded or decoded
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod config;
pub mod controller;
pub mod preferences;
pub mod schedule;
pub mod state;

pub use config::{ControllerConfig, DEFAULT_CHECK_INTERVAL, STORAGE_KEY};
pub use controller::LightController;
pub use preferences::{FileStore, MemoryStore, PreferenceStore, Preferences};
pub use schedule::{AutoSchedule, Clock, FixedClock, ScheduleTicker, SystemClock};
pub use state::{LightAction, LightState, PALETTE};

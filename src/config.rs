/*!
 # Controller configuration

 Storage key and schedule check interval used by [`crate::LightController`].
*/

use std::time::Duration;

/// Key under which the persisted preferences are stored
pub const STORAGE_KEY: &str = "@toggle_light_preferences";

/// How often the auto schedule is re-evaluated while auto mode is on
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Runtime settings for a light controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Key used for every read and write against the preference store
    pub storage_key: String,
    /// Period of the auto schedule ticker
    pub check_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            storage_key: STORAGE_KEY.to_string(),
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

impl ControllerConfig {
    /// Replace the storage key
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Replace the check interval. Anything under one second is raised to one second.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval.max(Duration::from_secs(1));
        self
    }
}

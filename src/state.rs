/*!
 # Light state

 The light's configuration and the transitions that produce new states.
 Transitions take the state by value and return the next one; nothing here
 touches storage or timers.
*/

use std::fmt;

use crate::preferences::Preferences;
use crate::schedule::{AutoSchedule, Clock, SystemClock};

/// Colors offered by the front ends
pub const PALETTE: [&str; 6] = [
    "#FFFFFF", "#FFD700", "#FF6B6B", "#4ECDC4", "#95E1D3", "#FFA07A",
];

/// Opacity used to draw the bulb while it is off
pub const OFF_OPACITY: f32 = 0.1;

/// Current configuration of the simulated light
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightState {
    /// Current power state
    pub is_on: bool,
    /// Brightness percentage (0-100)
    pub brightness: u8,
    /// Hex RGB color, e.g. `#FFD700`
    pub color: String,
    /// Whether the auto schedule governs `is_on`
    pub auto_mode: bool,
    /// Hour at which auto-on begins (0-23)
    pub auto_start_hour: u8,
    /// Hour at which auto-on ends (0-23)
    pub auto_end_hour: u8,
    /// Whether the saved preferences have been loaded
    pub is_loaded: bool,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            is_on: false,
            brightness: 50,
            color: PALETTE[0].to_string(),
            auto_mode: false,
            auto_start_hour: 18,
            auto_end_hour: 7,
            is_loaded: false,
        }
    }
}

impl LightState {
    pub fn toggle_light(mut self) -> Self {
        self.is_on = !self.is_on;
        self
    }

    pub fn turn_on(mut self) -> Self {
        self.is_on = true;
        self
    }

    pub fn turn_off(mut self) -> Self {
        self.is_on = false;
        self
    }

    /// Sets the brightness as given. Range checks belong to the caller.
    pub fn set_brightness(mut self, value: u8) -> Self {
        self.brightness = value;
        self
    }

    /// Sets the color verbatim
    pub fn set_color(mut self, value: impl Into<String>) -> Self {
        self.color = value.into();
        self
    }

    pub fn toggle_auto_mode(mut self) -> Self {
        self.auto_mode = !self.auto_mode;
        self
    }

    pub fn set_auto_start_hour(mut self, value: u8) -> Self {
        self.auto_start_hour = value;
        self
    }

    pub fn set_auto_end_hour(mut self, value: u8) -> Self {
        self.auto_end_hour = value;
        self
    }

    /// The configured auto window
    pub fn schedule(&self) -> AutoSchedule {
        AutoSchedule::new(self.auto_start_hour, self.auto_end_hour)
    }

    /// Re-evaluates power against the auto window using the local wall clock
    pub fn check_auto_schedule(self) -> Self {
        self.check_auto_schedule_with(&SystemClock)
    }

    /// Re-evaluates power against the auto window using `clock`
    ///
    /// The clock is only read when auto mode is on.
    pub fn check_auto_schedule_with(self, clock: &dyn Clock) -> Self {
        if !self.auto_mode {
            return self;
        }
        let hour = clock.current_hour();
        self.check_auto_schedule_at(hour)
    }

    /// Re-evaluates power against the auto window at `hour`
    pub fn check_auto_schedule_at(mut self, hour: u8) -> Self {
        if self.auto_mode {
            self.is_on = self.schedule().is_active_at(hour);
        }
        self
    }

    /// Merges a saved record into the state and marks it loaded
    ///
    /// Each persisted field is taken from `saved` only when present there.
    /// `is_loaded` is set regardless of what was passed.
    pub fn load_preferences(mut self, saved: Option<Preferences>) -> Self {
        if let Some(saved) = saved {
            self.brightness = saved.brightness.unwrap_or(self.brightness);
            self.color = saved.color.unwrap_or(self.color);
            self.auto_mode = saved.auto_mode.unwrap_or(self.auto_mode);
            self.auto_start_hour = saved.auto_start_hour.unwrap_or(self.auto_start_hour);
            self.auto_end_hour = saved.auto_end_hour.unwrap_or(self.auto_end_hour);
        }
        self.is_loaded = true;
        self
    }

    /// Applies a named action. `clock` is consulted for schedule checks.
    pub fn apply(self, action: LightAction, clock: &dyn Clock) -> Self {
        match action {
            LightAction::Toggle => self.toggle_light(),
            LightAction::TurnOn => self.turn_on(),
            LightAction::TurnOff => self.turn_off(),
            LightAction::SetBrightness(value) => self.set_brightness(value),
            LightAction::SetColor(value) => self.set_color(value),
            LightAction::ToggleAutoMode => self.toggle_auto_mode(),
            LightAction::SetAutoStartHour(value) => self.set_auto_start_hour(value),
            LightAction::SetAutoEndHour(value) => self.set_auto_end_hour(value),
            LightAction::CheckAutoSchedule => self.check_auto_schedule_with(clock),
            LightAction::LoadPreferences(saved) => self.load_preferences(saved),
        }
    }

    /// Bulb opacity for display: brightness fraction when on, dim when off
    pub fn opacity(&self) -> f32 {
        if self.is_on {
            f32::from(self.brightness) / 100.0
        } else {
            OFF_OPACITY
        }
    }
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "light {} | brightness {}% | color {} | opacity {:.2}",
            if self.is_on { "ON" } else { "OFF" },
            self.brightness,
            self.color,
            self.opacity()
        )?;
        if self.auto_mode {
            write!(f, " | auto {}", self.schedule())
        } else {
            write!(f, " | manual")
        }
    }
}

/// Every transition the light state accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LightAction {
    Toggle,
    TurnOn,
    TurnOff,
    SetBrightness(u8),
    SetColor(String),
    ToggleAutoMode,
    SetAutoStartHour(u8),
    SetAutoEndHour(u8),
    CheckAutoSchedule,
    LoadPreferences(Option<Preferences>),
}

impl LightAction {
    /// Whether this is a manual power control. Front ends disable these
    /// while auto mode is on; the state itself accepts them.
    pub fn is_manual_power(&self) -> bool {
        matches!(self, Self::Toggle | Self::TurnOn | Self::TurnOff)
    }
}

/*!
 # Light controller

 Owns a [`LightState`], applies actions to it one at a time, publishes every
 new state, saves the persisted subset after each change, and keeps the
 auto-schedule ticker running exactly while auto mode is on.

 Must be used from within a tokio runtime: saves and the ticker are spawned
 tasks.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ControllerConfig;
use crate::preferences::{PreferenceStore, Preferences};
use crate::schedule::{Clock, ScheduleTicker, SystemClock};
use crate::state::{LightAction, LightState};

/// Shared handle to a running light
#[derive(Clone)]
pub struct LightController {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<LightState>,
    updates: watch::Sender<LightState>,
    store: Arc<dyn PreferenceStore>,
    clock: Arc<dyn Clock>,
    config: ControllerConfig,
    ticker: Mutex<Option<ScheduleTicker>>,
    pending_saves: Mutex<Vec<JoinHandle<()>>>,
    load_started: AtomicBool,
}

impl LightController {
    /// Creates a controller with default state and loads saved preferences
    pub async fn start(store: Arc<dyn PreferenceStore>, config: ControllerConfig) -> Self {
        Self::start_with_clock(store, config, Arc::new(SystemClock)).await
    }

    /// Like [`LightController::start`] with an explicit clock
    pub async fn start_with_clock(
        store: Arc<dyn PreferenceStore>,
        config: ControllerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let controller = Self::new(store, config, clock);
        controller.load_saved_preferences().await;
        controller
    }

    /// Creates a controller with default state without touching storage
    ///
    /// Nothing is saved until [`LightController::load_saved_preferences`] ran.
    pub fn new(
        store: Arc<dyn PreferenceStore>,
        config: ControllerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let initial = LightState::default();
        let (updates, _) = watch::channel(initial.clone());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(initial),
                updates,
                store,
                clock,
                config,
                ticker: Mutex::new(None),
                pending_saves: Mutex::new(Vec::new()),
                load_started: AtomicBool::new(false),
            }),
        }
    }

    /// Reads the saved record once and merges it into the state
    ///
    /// Read errors and unparseable records are logged and treated as no
    /// saved data. Later calls do nothing.
    #[instrument(skip(self), fields(key = %self.inner.config.storage_key))]
    pub async fn load_saved_preferences(&self) {
        if self.inner.load_started.swap(true, Ordering::SeqCst) {
            warn!("Preferences already loaded, ignoring");
            return;
        }

        let key = &self.inner.config.storage_key;
        let saved = match self.inner.store.read(key).await {
            Ok(Some(raw)) => match Preferences::parse(&raw) {
                Ok(prefs) => {
                    info!("Preferences loaded: {:?}", prefs);
                    Some(prefs)
                }
                Err(e) => {
                    error!("Saved preferences are unreadable: {}", e);
                    None
                }
            },
            Ok(None) => {
                info!("No saved preferences");
                None
            }
            Err(e) => {
                error!("Failed to load preferences: {}", e);
                None
            }
        };

        self.inner.dispatch(LightAction::LoadPreferences(saved));
    }

    /// Applies `action` and returns the resulting state
    pub fn dispatch(&self, action: LightAction) -> LightState {
        self.inner.dispatch(action)
    }

    /// Snapshot of the current state
    pub fn state(&self) -> LightState {
        self.inner.state.lock().clone()
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<LightState> {
        self.inner.updates.subscribe()
    }

    /// Whether the auto-schedule ticker is currently running
    pub fn is_ticker_running(&self) -> bool {
        self.inner
            .ticker
            .lock()
            .as_ref()
            .is_some_and(|ticker| !ticker.is_finished())
    }

    /// Stops the ticker and waits for saves already in flight
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        if let Some(ticker) = self.inner.ticker.lock().take() {
            ticker.stop();
        }
        self.flush().await;
    }

    /// Waits for saves already in flight
    pub async fn flush(&self) {
        let pending: Vec<_> = std::mem::take(&mut *self.inner.pending_saves.lock());
        debug!("Waiting for {} pending saves", pending.len());
        for result in futures::future::join_all(pending).await {
            if let Err(e) = result {
                warn!("Save task did not complete: {}", e);
            }
        }
    }
}

impl Inner {
    fn dispatch(self: &Arc<Self>, action: LightAction) -> LightState {
        let mut state = self.state.lock();
        let previous = state.clone();
        debug!("Dispatching {:?}", action);
        let mut next = previous.clone().apply(action, self.clock.as_ref());
        if next.auto_mode && !previous.auto_mode {
            // Auto mode takes effect at once; the ticker only repeats the check
            next = next.check_auto_schedule_with(self.clock.as_ref());
        }

        if next == previous {
            return next;
        }
        *state = next.clone();
        self.updates.send_replace(next.clone());

        if next.auto_mode != previous.auto_mode {
            self.on_auto_mode_changed(next.auto_mode);
        }
        if previous.is_on != next.is_on {
            info!("Light turned {}", if next.is_on { "on" } else { "off" });
        }

        let saved = Preferences::from_state(&next);
        if next.is_loaded && (!previous.is_loaded || Preferences::from_state(&previous) != saved) {
            self.save(saved);
        }

        next
    }

    fn on_auto_mode_changed(self: &Arc<Self>, enabled: bool) {
        let mut ticker = self.ticker.lock();
        if enabled {
            info!(
                "Auto mode on, checking schedule every {:?}",
                self.config.check_interval
            );
            let weak: Weak<Inner> = Arc::downgrade(self);
            *ticker = Some(ScheduleTicker::start(self.config.check_interval, move || {
                match weak.upgrade() {
                    Some(inner) => {
                        inner.dispatch(LightAction::CheckAutoSchedule);
                        true
                    }
                    None => false,
                }
            }));
        } else if let Some(running) = ticker.take() {
            info!("Auto mode off");
            running.stop();
        }
    }

    fn save(&self, prefs: Preferences) {
        let store = self.store.clone();
        let key = self.config.storage_key.clone();

        let handle = tokio::spawn(async move {
            let payload = match prefs.to_json() {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to encode preferences: {}", e);
                    return;
                }
            };
            match store.write(&key, &payload).await {
                Ok(()) => debug!("Preferences saved: {}", payload),
                Err(e) => error!("Failed to save preferences: {}", e),
            }
        });

        let mut pending = self.pending_saves.lock();
        pending.retain(|save| !save.is_finished());
        pending.push(handle);
    }
}

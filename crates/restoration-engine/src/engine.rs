//! Occupancy-driven restoration engine

use crate::error::RestorationError;
use crate::evaluator::{is_dark_enough, is_motion_on, is_within_any_slot, parse_illuminance};
use crate::executor::ActionExecutor;
use crate::host::LightHost;
use crate::model::{RuleConfig, RuleStatus, StateChanged, TimeSlot};
use crate::occupancy::OccupancyTracker;
use crate::scheduler::{spawn_periodic, DelayScheduler};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Events emitted by restoration rules
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type")]
pub enum RestorationEvent {
    /// Saved light states were restored
    #[serde(rename = "light_restoration_triggered")]
    RestorationTriggered { area: String },
    /// Lights were turned off after the area went quiet
    #[serde(rename = "light_restoration_cancelled")]
    RestorationCancelled { area: String },
    /// A time slot was appended to a rule
    #[serde(rename = "time_slot_added")]
    TimeSlotAdded { area: String, slot: TimeSlot },
    /// Matching time slots were removed from a rule
    #[serde(rename = "time_slot_removed")]
    TimeSlotRemoved { area: String, slot: TimeSlot },
}

/// Decision engine for one configured rule.
///
/// Motion changes and periodic ticks feed the occupancy tracker; the engine
/// then either restores the saved light states, arms a per-sensor off
/// timer, or does nothing.
pub struct RestorationEngine<H> {
    entry_id: String,
    /// Current configuration revision
    config: RwLock<Arc<RuleConfig>>,
    enabled: AtomicBool,
    occupancy: OccupancyTracker,
    timers: DelayScheduler,
    executor: ActionExecutor<H>,
    host: Arc<H>,
    event_tx: broadcast::Sender<RestorationEvent>,
}

impl<H: LightHost> RestorationEngine<H> {
    /// Create an engine for a rule; it starts enabled and unoccupied
    pub fn new(
        entry_id: impl Into<String>,
        config: RuleConfig,
        host: Arc<H>,
        event_tx: broadcast::Sender<RestorationEvent>,
    ) -> Self {
        let occupancy = OccupancyTracker::new(config.motion_sensors.iter().cloned());
        Self {
            entry_id: entry_id.into(),
            config: RwLock::new(Arc::new(config)),
            enabled: AtomicBool::new(true),
            occupancy,
            timers: DelayScheduler::new(),
            executor: ActionExecutor::new(Arc::clone(&host)),
            host,
            event_tx,
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    /// Snapshot of the current configuration revision
    pub fn config(&self) -> Arc<RuleConfig> {
        Arc::clone(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn area(&self) -> String {
        self.config().area.clone()
    }

    /// Swap in the revision built by `update` from the current one
    pub(crate) fn update_config<F>(&self, update: F) -> Arc<RuleConfig>
    where
        F: FnOnce(&RuleConfig) -> RuleConfig,
    {
        let mut current = self.config.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(update(&current));
        *current = Arc::clone(&next);
        next
    }

    /// Put back a revision taken earlier with `config`
    pub(crate) fn restore_config(&self, config: Arc<RuleConfig>) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    pub(crate) fn emit(&self, event: RestorationEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_occupied(&self) -> bool {
        self.occupancy.any_active()
    }

    pub fn pending_timers(&self) -> Vec<String> {
        self.timers.pending_sensors()
    }

    /// Enable or disable the rule.
    ///
    /// Disabling cancels every pending off timer. Occupancy keeps being
    /// tracked either way; enabling does not restore by itself.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if enabled {
            tracing::info!("Enabled light restoration for {}", self.area());
        } else {
            let cancelled = self.timers.cancel_all();
            tracing::info!(
                "Disabled light restoration for {} ({} timers cancelled)",
                self.area(),
                cancelled
            );
        }
    }

    /// Seed motion states from the host's current sensor states
    pub async fn seed_occupancy(&self) {
        let config = self.config();
        for sensor_id in &config.motion_sensors {
            if let Some(state) = self.host.read_sensor_state(sensor_id).await {
                self.occupancy.set_active(sensor_id, is_motion_on(&state));
            }
        }
        tracing::debug!(
            "Seeded occupancy for {}: occupied={}",
            config.area,
            self.occupancy.any_active()
        );
    }

    /// Spawn the state-change listener and the periodic tick
    pub fn start(
        self: &Arc<Self>,
        state_rx: broadcast::Receiver<StateChanged>,
        scan_interval: Duration,
    ) -> Vec<JoinHandle<()>> {
        let listener = self.start_state_listener(state_rx);

        let engine = Arc::clone(self);
        let ticker = spawn_periodic(scan_interval, move || {
            let engine = Arc::clone(&engine);
            async move {
                if let Err(e) = engine.handle_tick().await {
                    tracing::error!("Periodic restoration for {} failed: {}", engine.area(), e);
                }
            }
        });

        vec![listener, ticker]
    }

    fn start_state_listener(
        self: &Arc<Self>,
        mut state_rx: broadcast::Receiver<StateChanged>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match state_rx.recv().await {
                    Ok(change) => {
                        if let Err(e) = engine.handle_state_change(&change).await {
                            tracing::error!(
                                "Failed to handle {} for {}: {}",
                                change.entity_id,
                                engine.area(),
                                e
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Restoration engine lagged by {} state changes", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("State change channel closed");
                        break;
                    }
                }
            }
        })
    }

    /// Handle an entity state change.
    ///
    /// Changes for entities other than the configured motion sensors, and
    /// changes without a new state, are ignored.
    pub async fn handle_state_change(
        self: &Arc<Self>,
        change: &StateChanged,
    ) -> Result<(), RestorationError> {
        if !self.occupancy.is_tracked(&change.entity_id) {
            return Ok(());
        }
        let Some(state) = change.new_state.as_deref() else {
            return Ok(());
        };

        let active = is_motion_on(state);
        self.occupancy.set_active(&change.entity_id, active);
        self.handle_motion_change(&change.entity_id, active).await
    }

    async fn handle_motion_change(
        self: &Arc<Self>,
        sensor_id: &str,
        active: bool,
    ) -> Result<(), RestorationError> {
        if !self.is_enabled() {
            return Ok(());
        }

        if active {
            // Cancel before restoring so the sensor is never both pending off and restored
            self.timers.cancel(sensor_id);
            self.try_restore().await?;
            return Ok(());
        }

        let delay = self.config().delay;
        let engine = Arc::clone(self);
        self.timers
            .arm(sensor_id, delay, move || async move { engine.on_delay_elapsed().await });
        Ok(())
    }

    /// Turn the lights off unless another sensor still reports motion
    async fn on_delay_elapsed(&self) {
        // A timer armed concurrently with a disable can outlive cancel_all
        if !self.is_enabled() {
            tracing::debug!("Off delay elapsed but {} is disabled", self.area());
            return;
        }
        if self.occupancy.any_active() {
            tracing::debug!("Off delay elapsed but {} is still occupied", self.area());
            return;
        }

        let config = self.config();
        match self
            .executor
            .turn_off_all(&config.area, &config.lights, config.transition)
            .await
        {
            Ok(()) => {
                tracing::info!("Turned off lights in {} after {}s", config.area, config.delay);
                self.emit(RestorationEvent::RestorationCancelled {
                    area: config.area.clone(),
                });
            }
            Err(e) => {
                tracing::error!("Failed to turn off lights in {}: {}", config.area, e);
            }
        }
    }

    /// Periodic re-assertion of restoration while the area is occupied
    pub async fn handle_tick(&self) -> Result<bool, RestorationError> {
        if !self.is_enabled() || !self.occupancy.any_active() {
            return Ok(false);
        }
        self.try_restore().await
    }

    /// Restore the saved light states if enabled, inside a time slot and
    /// dark enough.
    ///
    /// Returns whether the restore action ran. Repeated calls are not
    /// debounced; the host action is expected to be idempotent.
    pub async fn try_restore(&self) -> Result<bool, RestorationError> {
        if !self.is_enabled() {
            return Ok(false);
        }

        let config = self.config();
        let now = self.host.now();
        if !is_within_any_slot(now, &config.time_slots) {
            tracing::debug!("{} is outside every time slot for {}", now, config.area);
            return Ok(false);
        }

        let readings = self.read_illuminance(&config).await;
        if !is_dark_enough(&readings, config.illuminance_threshold) {
            tracing::debug!("Too bright to restore lights in {}", config.area);
            return Ok(false);
        }

        self.executor.restore(&config.area, &config.lights).await?;

        tracing::info!("Restored light states in {}", config.area);
        self.emit(RestorationEvent::RestorationTriggered {
            area: config.area.clone(),
        });
        Ok(true)
    }

    async fn read_illuminance(&self, config: &RuleConfig) -> HashMap<String, Option<f64>> {
        let mut readings = HashMap::with_capacity(config.illuminance_sensors.len());
        for sensor_id in &config.illuminance_sensors {
            let lux = self
                .host
                .read_sensor_state(sensor_id)
                .await
                .and_then(|state| parse_illuminance(&state));
            readings.insert(sensor_id.clone(), lux);
        }
        readings
    }

    /// Snapshot of configuration and runtime state
    pub fn status(&self) -> RuleStatus {
        RuleStatus {
            entry_id: self.entry_id.clone(),
            enabled: self.is_enabled(),
            occupied: self.occupancy.any_active(),
            motion: self.occupancy.snapshot(),
            pending_timers: self.timers.pending_sensors(),
            config: (*self.config()).clone(),
        }
    }

    /// Cancel every pending timer ahead of unload
    pub fn shutdown(&self) {
        let cancelled = self.timers.cancel_all();
        tracing::debug!(
            "Shut down restoration engine {} ({} timers cancelled)",
            self.entry_id,
            cancelled
        );
    }
}

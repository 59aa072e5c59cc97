//! Registry of running restoration rules

use crate::engine::{RestorationEngine, RestorationEvent};
use crate::error::RestorationError;
use crate::host::LightHost;
use crate::model::{
    AreaFilter, CreateRuleRequest, RuleConfig, RuleStatus, StateChanged, TimeSlot,
    TimeSlotRequest,
};
use crate::persistence::{self, StoredRule};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// An engine together with the tasks driving it
struct RunningRule<H> {
    engine: Arc<RestorationEngine<H>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Owns every configured rule, keyed by entry id.
///
/// Administration calls and entity state changes are broadcast to all
/// rules; each rule decides for itself whether the call concerns it.
pub struct RestorationController<H> {
    rules: DashMap<String, RunningRule<H>>,
    host: Arc<H>,
    /// Restoration event broadcaster shared by all engines
    event_tx: broadcast::Sender<RestorationEvent>,
    /// Entity state changes fanned out to all engines
    state_tx: broadcast::Sender<StateChanged>,
    scan_interval: Duration,
    /// Path for persistence
    data_path: PathBuf,
    save_lock: Mutex<()>,
}

impl<H: LightHost> RestorationController<H> {
    /// Create a controller and start every persisted rule
    pub async fn new(
        host: Arc<H>,
        data_dir: &Path,
        scan_interval: Duration,
    ) -> Result<Self, RestorationError> {
        let (event_tx, _) = broadcast::channel(64);
        let (state_tx, _) = broadcast::channel(256);

        let controller = Self {
            rules: DashMap::new(),
            host,
            event_tx,
            state_tx,
            scan_interval,
            data_path: data_dir.join("rules.json"),
            save_lock: Mutex::new(()),
        };

        controller.load().await?;
        Ok(controller)
    }

    /// Start rules from disk, skipping any that no longer validate
    async fn load(&self) -> Result<(), RestorationError> {
        for stored in persistence::load_rules(&self.data_path).await {
            if let Err(e) = stored.config.validate() {
                tracing::warn!("Skipping stored rule {}: {}", stored.entry_id, e);
                continue;
            }
            self.setup_rule(stored.entry_id, stored.config).await;
        }
        Ok(())
    }

    /// Save all rule configurations to disk
    async fn save(&self) -> Result<(), RestorationError> {
        let _guard = self.save_lock.lock().await;
        let mut rules: Vec<StoredRule> = self
            .rules
            .iter()
            .map(|r| StoredRule {
                entry_id: r.key().clone(),
                config: (*r.value().engine.config()).clone(),
            })
            .collect();
        rules.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));
        persistence::save_rules(&self.data_path, &rules).await?;
        Ok(())
    }

    /// Subscribe to restoration events
    pub fn subscribe(&self) -> broadcast::Receiver<RestorationEvent> {
        self.event_tx.subscribe()
    }

    /// Deliver an entity state change to every rule.
    ///
    /// Returns the number of rules listening.
    pub fn publish_state_change(&self, change: StateChanged) -> usize {
        self.state_tx.send(change).unwrap_or(0)
    }

    /// Set up and start a rule under the given entry id.
    ///
    /// A rule already running under that id is unloaded first.
    pub async fn setup_rule(
        &self,
        entry_id: String,
        config: RuleConfig,
    ) -> Arc<RestorationEngine<H>> {
        self.unload(&entry_id);

        let engine = Arc::new(RestorationEngine::new(
            entry_id.clone(),
            config,
            Arc::clone(&self.host),
            self.event_tx.clone(),
        ));
        // Subscribe before seeding so no change is lost in between
        let state_rx = self.state_tx.subscribe();
        engine.seed_occupancy().await;
        let tasks = engine.start(state_rx, self.scan_interval);

        tracing::info!(
            "Set up light restoration for {} ({})",
            engine.area(),
            entry_id
        );
        self.rules.insert(
            entry_id,
            RunningRule {
                engine: Arc::clone(&engine),
                tasks,
            },
        );
        engine
    }

    /// Stop a rule: abort its tasks and cancel its pending timers
    pub fn unload(&self, entry_id: &str) -> Option<Arc<RestorationEngine<H>>> {
        let (_, rule) = self.rules.remove(entry_id)?;
        for task in &rule.tasks {
            task.abort();
        }
        rule.engine.shutdown();
        tracing::info!("Unloaded light restoration for {}", entry_id);
        Some(rule.engine)
    }

    /// Create, start and persist a new rule
    pub async fn create(
        &self,
        request: CreateRuleRequest,
    ) -> Result<RuleStatus, RestorationError> {
        let config = RuleConfig::from_request(request)?;
        let entry_id = uuid::Uuid::new_v4().to_string();

        let engine = self.setup_rule(entry_id, config).await;
        self.save().await?;
        Ok(engine.status())
    }

    /// Unload and forget a rule
    pub async fn delete(&self, entry_id: &str) -> Result<RuleStatus, RestorationError> {
        let engine = self
            .unload(entry_id)
            .ok_or_else(|| RestorationError::RuleNotFound(entry_id.to_string()))?;
        self.save().await?;
        Ok(engine.status())
    }

    /// Get all rules
    pub fn list(&self) -> Vec<RuleStatus> {
        let mut rules: Vec<RuleStatus> = self.engines().iter().map(|e| e.status()).collect();
        rules.sort_by(|a, b| a.config.area.cmp(&b.config.area));
        rules
    }

    /// Get rule by entry ID
    pub fn get(&self, entry_id: &str) -> Option<RuleStatus> {
        self.engine(entry_id).map(|e| e.status())
    }

    pub fn engine(&self, entry_id: &str) -> Option<Arc<RestorationEngine<H>>> {
        self.rules.get(entry_id).map(|r| Arc::clone(&r.engine))
    }

    fn engines(&self) -> Vec<Arc<RestorationEngine<H>>> {
        self.rules.iter().map(|r| Arc::clone(&r.engine)).collect()
    }

    fn matching_engines(&self, filter: &AreaFilter) -> Vec<Arc<RestorationEngine<H>>> {
        self.engines()
            .into_iter()
            .filter(|e| filter.matches(&e.area()))
            .collect()
    }

    /// Add a time slot to every matching rule and persist.
    ///
    /// Returns the number of rules changed.
    pub async fn add_time_slot(
        &self,
        request: &TimeSlotRequest,
    ) -> Result<usize, RestorationError> {
        // Validate once so a bad slot is rejected even when no rule matches
        TimeSlot::parse(&request.start_time, &request.end_time)?;

        self.edit_and_save(&request.filter(), |engine| {
            engine.add_time_slot(&request.start_time, &request.end_time)
        })
        .await
    }

    /// Remove a time slot from every matching rule and persist.
    ///
    /// Only malformed times are rejected; a window that matches no stored
    /// slot is still processed. Returns the number of rules that processed
    /// the removal.
    pub async fn remove_time_slot(
        &self,
        request: &TimeSlotRequest,
    ) -> Result<usize, RestorationError> {
        TimeSlot::parse_unchecked(&request.start_time, &request.end_time)?;

        self.edit_and_save(&request.filter(), |engine| {
            engine.remove_time_slot(&request.start_time, &request.end_time)
        })
        .await
    }

    /// Apply `edit` to every rule selected by `filter`, then persist.
    ///
    /// If an edit or the save fails, every selected rule goes back to the
    /// revision it had before. Events already emitted are not retracted.
    async fn edit_and_save<F>(
        &self,
        filter: &AreaFilter,
        edit: F,
    ) -> Result<usize, RestorationError>
    where
        F: Fn(&RestorationEngine<H>) -> Result<TimeSlot, RestorationError>,
    {
        let engines = self.matching_engines(filter);
        if engines.is_empty() {
            return Ok(0);
        }

        let previous: Vec<Arc<RuleConfig>> = engines.iter().map(|e| e.config()).collect();
        let mut result = engines.iter().try_for_each(|engine| edit(engine).map(|_| ()));
        if result.is_ok() {
            result = self.save().await;
        }

        if let Err(e) = result {
            for (engine, config) in engines.iter().zip(previous) {
                engine.restore_config(config);
            }
            tracing::error!(
                "Reverted time slot edit on {} rules: {}",
                engines.len(),
                e
            );
            return Err(e);
        }
        Ok(engines.len())
    }

    /// Enable or disable every rule selected by the filter.
    ///
    /// Returns the number of rules changed.
    pub fn set_enabled(&self, filter: &AreaFilter, enabled: bool) -> usize {
        self.engines()
            .iter()
            .filter(|e| e.apply_enabled(filter, enabled))
            .count()
    }

    /// Unload every rule
    pub fn shutdown(&self) {
        let ids: Vec<String> = self.rules.iter().map(|r| r.key().clone()).collect();
        for id in ids {
            self.unload(&id);
        }
    }
}

//! Recording host used by unit tests

use crate::error::RestorationError;
use crate::host::LightHost;
use crate::model::{CreateRuleRequest, RuleConfig};
use chrono::NaiveTime;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub(crate) struct MockHost {
    states: Mutex<HashMap<String, String>>,
    now: Mutex<Option<NaiveTime>>,
    restores: Mutex<Vec<Vec<String>>>,
    turned_off: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl MockHost {
    pub(crate) fn at(hour: u32, minute: u32) -> Self {
        let host = Self::default();
        host.set_now(hour, minute);
        host
    }

    pub(crate) fn set_now(&self, hour: u32, minute: u32) {
        *self.now.lock().unwrap() = NaiveTime::from_hms_opt(hour, minute, 0);
    }

    pub(crate) fn set_state(&self, entity_id: &str, state: &str) {
        self.states
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), state.to_string());
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn restore_calls(&self) -> Vec<Vec<String>> {
        self.restores.lock().unwrap().clone()
    }

    pub(crate) fn turned_off(&self) -> Vec<String> {
        self.turned_off.lock().unwrap().clone()
    }

    fn check_failing(&self) -> Result<(), RestorationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RestorationError::ActionFailed("host unavailable".to_string()));
        }
        Ok(())
    }
}

impl LightHost for MockHost {
    async fn restore_light_states(&self, light_ids: &[String]) -> Result<(), RestorationError> {
        self.check_failing()?;
        self.restores.lock().unwrap().push(light_ids.to_vec());
        Ok(())
    }

    async fn turn_off(&self, light_id: &str, _transition: f64) -> Result<(), RestorationError> {
        self.check_failing()?;
        self.turned_off.lock().unwrap().push(light_id.to_string());
        Ok(())
    }

    async fn read_sensor_state(&self, sensor_id: &str) -> Option<String> {
        self.states.lock().unwrap().get(sensor_id).cloned()
    }

    fn now(&self) -> NaiveTime {
        self.now
            .lock()
            .unwrap()
            .unwrap_or_else(|| chrono::Local::now().time())
    }
}

/// Hallway rule: 08:00-22:00, 10 lux, 5 s delay, two lights, two sensors
pub(crate) fn hallway_config() -> RuleConfig {
    let request: CreateRuleRequest = serde_json::from_value(serde_json::json!({
        "area": "hallway",
        "lights": ["light.hall_ceiling", "light.hall_lamp"],
        "motion_sensors": ["binary_sensor.hall_motion", "binary_sensor.stairs_motion"],
        "illuminance_sensors": ["sensor.hall_lux"],
        "illuminance_threshold": 10,
        "delay": 5,
        "time_slots": [{"start_time": "08:00", "end_time": "22:00"}],
    }))
    .unwrap();
    RuleConfig::from_request(request).unwrap()
}

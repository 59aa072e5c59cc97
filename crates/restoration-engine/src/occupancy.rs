//! Per-sensor motion tracking

use dashmap::DashMap;
use std::collections::BTreeMap;

/// Motion state of every configured sensor.
///
/// The key set is fixed at construction; updates for any other entity are
/// dropped so unrelated state changes never influence the rule.
#[derive(Debug, Default)]
pub struct OccupancyTracker {
    motion: DashMap<String, bool>,
}

impl OccupancyTracker {
    /// Track the given sensors, all initially inactive
    pub fn new<I, S>(sensor_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let motion = sensor_ids.into_iter().map(|id| (id.into(), false)).collect();
        Self { motion }
    }

    /// Record a sensor's motion state.
    ///
    /// Returns `false` when the sensor is not tracked.
    pub fn set_active(&self, sensor_id: &str, active: bool) -> bool {
        match self.motion.get_mut(sensor_id) {
            Some(mut state) => {
                *state = active;
                true
            }
            None => false,
        }
    }

    pub fn is_tracked(&self, sensor_id: &str) -> bool {
        self.motion.contains_key(sensor_id)
    }

    pub fn is_active(&self, sensor_id: &str) -> bool {
        self.motion.get(sensor_id).is_some_and(|state| *state)
    }

    /// Whether anyone is present according to any tracked sensor
    pub fn any_active(&self) -> bool {
        self.motion.iter().any(|entry| *entry.value())
    }

    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.motion
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unoccupied() {
        let tracker = OccupancyTracker::new(["binary_sensor.a", "binary_sensor.b"]);
        assert!(!tracker.any_active());
        assert_eq!(tracker.snapshot().len(), 2);
    }

    #[test]
    fn test_unknown_sensor_ignored() {
        let tracker = OccupancyTracker::new(["binary_sensor.a"]);
        assert!(!tracker.set_active("binary_sensor.other", true));
        assert!(!tracker.any_active());
        assert!(!tracker.is_tracked("binary_sensor.other"));
        assert!(!tracker.snapshot().contains_key("binary_sensor.other"));
    }

    #[test]
    fn test_any_active_across_sensors() {
        let tracker = OccupancyTracker::new(["binary_sensor.a", "binary_sensor.b"]);
        assert!(tracker.set_active("binary_sensor.a", true));
        tracker.set_active("binary_sensor.b", true);
        tracker.set_active("binary_sensor.a", false);
        assert!(tracker.any_active());
        assert!(tracker.is_active("binary_sensor.b"));

        tracker.set_active("binary_sensor.b", false);
        assert!(!tracker.any_active());
    }
}

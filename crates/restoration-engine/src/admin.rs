//! Rule administration: time slot edits and enable/disable

use crate::engine::{RestorationEngine, RestorationEvent};
use crate::error::RestorationError;
use crate::host::LightHost;
use crate::model::{AreaFilter, RuleConfig, TimeSlot};

impl RuleConfig {
    /// Next revision with `slot` appended
    #[must_use]
    pub fn with_time_slot(&self, slot: TimeSlot) -> Self {
        let mut next = self.clone();
        next.time_slots.push(slot);
        next.revision += 1;
        next
    }

    /// Next revision with every slot equal to `slot` removed
    #[must_use]
    pub fn without_time_slot(&self, slot: TimeSlot) -> Self {
        let mut next = self.clone();
        next.time_slots.retain(|existing| *existing != slot);
        next.revision += 1;
        next
    }
}

impl<H: LightHost> RestorationEngine<H> {
    /// Append a time slot and publish the new revision.
    ///
    /// Malformed times and inverted windows are rejected before anything
    /// changes.
    pub fn add_time_slot(&self, start: &str, end: &str) -> Result<TimeSlot, RestorationError> {
        let slot = TimeSlot::parse(start, end)?;
        let config = self.update_config(|current| current.with_time_slot(slot));

        tracing::info!(
            "Added time slot {} to {} (revision {})",
            slot,
            config.area,
            config.revision
        );
        self.emit(RestorationEvent::TimeSlotAdded {
            area: config.area.clone(),
            slot,
        });
        Ok(slot)
    }

    /// Remove every slot matching the given window.
    ///
    /// Only malformed times are rejected. A new revision is published and
    /// the removal event fires even when nothing matched, including for an
    /// inverted pair that no stored slot can equal.
    pub fn remove_time_slot(&self, start: &str, end: &str) -> Result<TimeSlot, RestorationError> {
        let slot = TimeSlot::parse_unchecked(start, end)?;
        let mut removed = 0;
        let config = self.update_config(|current| {
            let next = current.without_time_slot(slot);
            removed = current.time_slots.len() - next.time_slots.len();
            next
        });

        if removed == 0 {
            tracing::debug!("No time slot {} to remove from {}", slot, config.area);
        } else {
            tracing::info!(
                "Removed {} time slot(s) {} from {} (revision {})",
                removed,
                slot,
                config.area,
                config.revision
            );
        }
        self.emit(RestorationEvent::TimeSlotRemoved {
            area: config.area.clone(),
            slot,
        });
        Ok(slot)
    }

    /// Enable or disable the rule if `filter` selects its area.
    ///
    /// Returns whether the call applied to this rule.
    pub fn apply_enabled(&self, filter: &AreaFilter, enabled: bool) -> bool {
        if !filter.matches(&self.area()) {
            return false;
        }
        self.set_enabled(enabled);
        true
    }
}

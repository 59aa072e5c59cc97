//! Time window and illuminance gate evaluation

use crate::error::RestorationError;
use crate::model::TimeSlot;
use chrono::NaiveTime;
use std::collections::HashMap;

/// State string a motion sensor reports while it detects presence
pub const STATE_ON: &str = "on";

/// Accepted time-of-day layouts, tried in order
const TIME_FORMATS: [&str; 3] = ["%H:%M:%S", "%H:%M:%S%.f", "%H:%M"];

/// Whether `now` falls inside any slot, inclusive on both ends.
///
/// Slots never wrap past midnight: a slot whose start is after its end
/// matches nothing. An empty slot list matches nothing either, so a rule
/// without slots never restores.
#[must_use]
pub fn is_within_any_slot(now: NaiveTime, slots: &[TimeSlot]) -> bool {
    slots.iter().any(|slot| slot.contains(now))
}

/// Whether ambient light is low enough to justify restoration.
///
/// `readings` holds one entry per configured illuminance sensor; an empty
/// map means the gate is disabled. Missing readings are skipped, and any
/// reading strictly above `threshold` closes the gate.
#[must_use]
pub fn is_dark_enough(readings: &HashMap<String, Option<f64>>, threshold: f64) -> bool {
    for (sensor_id, reading) in readings {
        let Some(lux) = reading else {
            continue;
        };
        if *lux > threshold {
            tracing::debug!(
                "Illuminance {} lux on {} is above threshold {}",
                lux,
                sensor_id,
                threshold
            );
            return false;
        }
    }
    true
}

/// Parse a time-of-day string in `HH:MM` or `HH:MM:SS` format
pub fn parse_time(s: &str) -> Result<NaiveTime, RestorationError> {
    let trimmed = s.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| RestorationError::InvalidTimeFormat(s.to_string()))
}

/// Interpret a raw sensor state as an illuminance reading in lux
#[must_use]
pub fn parse_illuminance(state: &str) -> Option<f64> {
    state.trim().parse::<f64>().ok().filter(|lux| lux.is_finite())
}

/// Interpret a raw sensor state as motion detected
#[must_use]
pub fn is_motion_on(state: &str) -> bool {
    state == STATE_ON
}

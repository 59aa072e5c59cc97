//! Data models for the restoration engine

use crate::error::RestorationError;
use crate::evaluator::parse_time;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

/// Seconds lights stay on after the last motion sensor goes quiet
pub const DEFAULT_DELAY: u64 = 180;
/// Transition handed to the host when lights are turned off
pub const DEFAULT_TRANSITION: f64 = 1.0;
/// Lux above which restoration is suppressed
pub const DEFAULT_ILLUMINANCE_THRESHOLD: f64 = 10.0;
/// Interval of the periodic safety-net check
pub const SCAN_INTERVAL: Duration = Duration::from_secs(30);

const MAX_ILLUMINANCE_THRESHOLD: f64 = 1000.0;
const MAX_DELAY: u64 = 3600;
const MAX_TRANSITION: f64 = 10.0;

/// A window of the day during which restoration may happen.
///
/// Windows do not wrap past midnight; construction rejects `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeSlot", into = "RawTimeSlot")]
pub struct TimeSlot {
    start: NaiveTime,
    end: NaiveTime,
}

/// Wire form of a time slot
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawTimeSlot {
    start_time: String,
    end_time: String,
}

impl TimeSlot {
    /// Create a slot, rejecting windows that end before they start
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, RestorationError> {
        if start > end {
            return Err(RestorationError::InvalidTimeSlot {
                start: start.format("%H:%M:%S").to_string(),
                end: end.format("%H:%M:%S").to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse a slot from two time-of-day strings
    pub fn parse(start: &str, end: &str) -> Result<Self, RestorationError> {
        Self::new(parse_time(start)?, parse_time(end)?)
    }

    /// Parse a window for matching against stored slots.
    ///
    /// The order of the bounds is not checked, so an inverted pair parses
    /// and simply matches nothing.
    pub fn parse_unchecked(start: &str, end: &str) -> Result<Self, RestorationError> {
        Ok(Self {
            start: parse_time(start)?,
            end: parse_time(end)?,
        })
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// Whether `now` lies inside the slot, bounds included
    pub fn contains(&self, now: NaiveTime) -> bool {
        self.start <= now && now <= self.end
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M:%S"),
            self.end.format("%H:%M:%S")
        )
    }
}

impl TryFrom<RawTimeSlot> for TimeSlot {
    type Error = RestorationError;

    fn try_from(raw: RawTimeSlot) -> Result<Self, Self::Error> {
        Self::parse(&raw.start_time, &raw.end_time)
    }
}

impl From<TimeSlot> for RawTimeSlot {
    fn from(slot: TimeSlot) -> Self {
        Self {
            start_time: slot.start.format("%H:%M:%S").to_string(),
            end_time: slot.end.format("%H:%M:%S").to_string(),
        }
    }
}

/// One revision of a rule's configuration.
///
/// Never mutated while an engine reads it: administration operations
/// build the next revision and swap it in wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Monotonic revision counter, bumped by every administration edit
    #[serde(default)]
    pub revision: u64,
    /// Area this rule controls
    pub area: String,
    /// Lights restored and extinguished by this rule
    pub lights: BTreeSet<String>,
    /// Motion sensors that define occupancy
    pub motion_sensors: BTreeSet<String>,
    /// Optional illuminance sensors gating restoration
    #[serde(default)]
    pub illuminance_sensors: BTreeSet<String>,
    /// Lux above which restoration is suppressed
    #[serde(default = "default_illuminance_threshold")]
    pub illuminance_threshold: f64,
    /// Off delay in seconds; zero disables the off timer
    #[serde(default = "default_delay")]
    pub delay: u64,
    /// Transition in seconds used when turning lights off
    #[serde(default = "default_transition")]
    pub transition: f64,
    /// Windows during which restoration may happen
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
}

fn default_illuminance_threshold() -> f64 {
    DEFAULT_ILLUMINANCE_THRESHOLD
}

fn default_delay() -> u64 {
    DEFAULT_DELAY
}

fn default_transition() -> f64 {
    DEFAULT_TRANSITION
}

/// Request to create a new rule
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRuleRequest {
    pub area: String,
    pub lights: BTreeSet<String>,
    pub motion_sensors: BTreeSet<String>,
    #[serde(default)]
    pub illuminance_sensors: BTreeSet<String>,
    #[serde(default = "default_illuminance_threshold")]
    pub illuminance_threshold: f64,
    #[serde(default = "default_delay")]
    pub delay: u64,
    #[serde(default = "default_transition")]
    pub transition: f64,
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
}

impl RuleConfig {
    /// Build and validate the first revision from a create request
    pub fn from_request(request: CreateRuleRequest) -> Result<Self, RestorationError> {
        let config = Self {
            revision: 0,
            area: request.area,
            lights: request.lights,
            motion_sensors: request.motion_sensors,
            illuminance_sensors: request.illuminance_sensors,
            illuminance_threshold: request.illuminance_threshold,
            delay: request.delay,
            transition: request.transition,
            time_slots: request.time_slots,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the ranges accepted at rule setup
    pub fn validate(&self) -> Result<(), RestorationError> {
        if self.area.trim().is_empty() {
            return Err(RestorationError::InvalidConfig(
                "area must not be empty".to_string(),
            ));
        }
        if self.lights.is_empty() {
            return Err(RestorationError::InvalidConfig(
                "at least one light is required".to_string(),
            ));
        }
        if self.motion_sensors.is_empty() {
            return Err(RestorationError::InvalidConfig(
                "at least one motion sensor is required".to_string(),
            ));
        }
        if !(0.0..=MAX_ILLUMINANCE_THRESHOLD).contains(&self.illuminance_threshold) {
            return Err(RestorationError::InvalidConfig(format!(
                "illuminance threshold must be between 0 and {MAX_ILLUMINANCE_THRESHOLD} lux, got {}",
                self.illuminance_threshold
            )));
        }
        if self.delay > MAX_DELAY {
            return Err(RestorationError::InvalidConfig(format!(
                "delay must be at most {MAX_DELAY} seconds, got {}",
                self.delay
            )));
        }
        if !(0.0..=MAX_TRANSITION).contains(&self.transition) {
            return Err(RestorationError::InvalidConfig(format!(
                "transition must be between 0 and {MAX_TRANSITION} seconds, got {}",
                self.transition
            )));
        }
        Ok(())
    }
}

/// Add or remove a time slot, optionally restricted to one area
#[derive(Debug, Clone, Deserialize)]
pub struct TimeSlotRequest {
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub area: Option<String>,
}

impl TimeSlotRequest {
    pub fn filter(&self) -> AreaFilter {
        AreaFilter {
            area: self.area.clone(),
        }
    }
}

/// Optional area restriction for broadcast administration calls
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AreaFilter {
    #[serde(default)]
    pub area: Option<String>,
}

impl AreaFilter {
    /// Whether a rule for `area` should act on the call.
    ///
    /// A missing or blank filter matches every area.
    pub fn matches(&self, area: &str) -> bool {
        match self.area.as_deref() {
            Some(filter) if !filter.is_empty() => filter == area,
            _ => true,
        }
    }
}

/// An entity state change delivered by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChanged {
    pub entity_id: String,
    /// New raw state; absent when the entity was removed
    #[serde(default)]
    pub new_state: Option<String>,
}

/// Snapshot of a running rule
#[derive(Debug, Clone, Serialize)]
pub struct RuleStatus {
    pub entry_id: String,
    pub enabled: bool,
    pub occupied: bool,
    pub motion: BTreeMap<String, bool>,
    pub pending_timers: Vec<String>,
    pub config: RuleConfig,
}

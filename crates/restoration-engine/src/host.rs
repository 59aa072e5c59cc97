//! Interfaces consumed from the host automation platform

use crate::error::RestorationError;
use chrono::{Local, NaiveTime};
use std::future::Future;

/// The platform a rule runs against.
///
/// Restoring and turning off lights are opaque side effects; the engine
/// neither retries them nor inspects their outcome beyond success.
pub trait LightHost: Send + Sync + 'static {
    /// Re-apply the saved states of the given lights
    fn restore_light_states(
        &self,
        light_ids: &[String],
    ) -> impl Future<Output = Result<(), RestorationError>> + Send;

    /// Turn a single light off
    fn turn_off(
        &self,
        light_id: &str,
        transition: f64,
    ) -> impl Future<Output = Result<(), RestorationError>> + Send;

    /// Current raw state of a sensor, if the host knows it
    fn read_sensor_state(&self, sensor_id: &str) -> impl Future<Output = Option<String>> + Send;

    /// Local time of day on the host clock
    fn now(&self) -> NaiveTime {
        Local::now().time()
    }
}

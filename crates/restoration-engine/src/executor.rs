//! Light action executor

use crate::error::RestorationError;
use crate::host::LightHost;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Issues restore and turn-off calls through the host
pub struct ActionExecutor<H> {
    host: Arc<H>,
}

impl<H: LightHost> ActionExecutor<H> {
    /// Create a new action executor
    pub fn new(host: Arc<H>) -> Self {
        Self { host }
    }

    /// Restore the saved state of every configured light in one call
    pub async fn restore(
        &self,
        area: &str,
        lights: &BTreeSet<String>,
    ) -> Result<(), RestorationError> {
        let light_ids: Vec<String> = lights.iter().cloned().collect();
        tracing::debug!("Restoring {} lights in {}", light_ids.len(), area);
        self.host.restore_light_states(&light_ids).await
    }

    /// Turn every configured light off, one call per light.
    ///
    /// Stops at the first failure; lights already turned off stay off.
    pub async fn turn_off_all(
        &self,
        area: &str,
        lights: &BTreeSet<String>,
        transition: f64,
    ) -> Result<(), RestorationError> {
        for light_id in lights {
            tracing::debug!("Turning off {} in {}", light_id, area);
            self.host.turn_off(light_id, transition).await?;
        }
        Ok(())
    }
}

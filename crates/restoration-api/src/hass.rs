//! Light host backed by a Home Assistant style REST API

use restoration_engine::{LightHost, RestorationError};
use serde::Deserialize;

/// Service that re-applies saved light states
const RESTORE_DOMAIN: &str = "light_state_management";
const RESTORE_SERVICE: &str = "restore_state";

/// State object returned by `GET /api/states/<entity_id>`
#[derive(Deserialize)]
struct EntityState {
    state: String,
}

/// Calls services and reads states over HTTP
pub struct HassHost {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HassHost {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Call a service and wait for it to complete
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: serde_json::Value,
    ) -> Result<(), RestorationError> {
        let url = format!("{}/api/services/{}/{}", self.base_url, domain, service);
        let response = self
            .authorized(self.client.post(&url))
            .json(&data)
            .send()
            .await
            .map_err(|e| RestorationError::ActionFailed(format!("{domain}.{service}: {e}")))?;

        if !response.status().is_success() {
            return Err(RestorationError::ActionFailed(format!(
                "{domain}.{service} returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

impl LightHost for HassHost {
    async fn restore_light_states(&self, light_ids: &[String]) -> Result<(), RestorationError> {
        self.call_service(
            RESTORE_DOMAIN,
            RESTORE_SERVICE,
            serde_json::json!({ "entity_id": light_ids }),
        )
        .await
    }

    async fn turn_off(&self, light_id: &str, transition: f64) -> Result<(), RestorationError> {
        self.call_service(
            "light",
            "turn_off",
            serde_json::json!({ "entity_id": light_id, "transition": transition }),
        )
        .await
    }

    async fn read_sensor_state(&self, sensor_id: &str) -> Option<String> {
        let url = format!("{}/api/states/{}", self.base_url, sensor_id);
        let response = match self.authorized(self.client.get(&url)).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Failed to read state of {}: {}", sensor_id, e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!("No state for {} ({})", sensor_id, response.status());
            return None;
        }

        match response.json::<EntityState>().await {
            Ok(entity) => Some(entity.state),
            Err(e) => {
                tracing::warn!("Malformed state for {}: {}", sensor_id, e);
                None
            }
        }
    }
}

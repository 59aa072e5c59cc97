//! Server settings read from the environment

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use restoration_engine::SCAN_INTERVAL;

/// Runtime settings for the API server
#[derive(Debug, Clone)]
pub struct Settings {
    /// Address the HTTP server listens on
    pub bind: SocketAddr,
    /// Directory holding `rules.json`
    pub data_dir: PathBuf,
    /// Interval of the periodic restoration check
    pub scan_interval: Duration,
    /// Base URL of the host automation platform
    pub hass_url: String,
    /// Long-lived access token for the host, if it requires one
    pub hass_token: Option<String>,
}

impl Settings {
    /// Read settings from `RESTORATION_*` and `HASS_*` variables
    pub fn from_env() -> anyhow::Result<Self> {
        let bind = std::env::var("RESTORATION_BIND")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()?;
        let data_dir = std::env::var("RESTORATION_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        let scan_interval = match std::env::var("RESTORATION_SCAN_INTERVAL") {
            Ok(secs) => Duration::from_secs(secs.parse()?),
            Err(_) => SCAN_INTERVAL,
        };
        if scan_interval.is_zero() {
            anyhow::bail!("RESTORATION_SCAN_INTERVAL must be at least one second");
        }
        let hass_url = std::env::var("HASS_URL")
            .unwrap_or_else(|_| "http://localhost:8123".to_string())
            .trim_end_matches('/')
            .to_string();
        let hass_token = std::env::var("HASS_TOKEN").ok().filter(|t| !t.is_empty());

        Ok(Self {
            bind,
            data_dir,
            scan_interval,
            hass_url,
            hass_token,
        })
    }
}

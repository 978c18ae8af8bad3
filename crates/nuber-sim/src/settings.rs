use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use eyre::{eyre, Result};
use serde::Deserialize;

/// Contents of `nuber.toml`
#[derive(Clone, Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct SimSettings {
    #[serde(skip)]
    pub path: Option<PathBuf>,

    /// Region names and how many bookings each may run at once
    pub regions: HashMap<String, u32>,

    #[serde(default)]
    pub log_events: bool,
    #[serde(default = "default_drivers")]
    pub drivers: u32,
    #[serde(default = "default_passengers")]
    pub passengers: u32,
    #[serde(default = "default_max_sleep")]
    pub max_pickup_ms: u64,
    #[serde(default = "default_max_sleep")]
    pub max_travel_ms: u64,
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

fn default_drivers() -> u32 {
    4
}

fn default_passengers() -> u32 {
    20
}

fn default_max_sleep() -> u64 {
    100
}

fn default_drain_timeout() -> u64 {
    10
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            path: None,
            regions: ["North", "South", "East", "West"]
                .into_iter()
                .map(|name| (name.to_owned(), 2))
                .collect(),
            log_events: false,
            drivers: default_drivers(),
            passengers: default_passengers(),
            max_pickup_ms: default_max_sleep(),
            max_travel_ms: default_max_sleep(),
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

impl SimSettings {
    /// Load settings from an explicit file
    pub fn from_file(path: PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| eyre!("could not read {}: {e}", path.display()))?;
        let mut settings: SimSettings = toml::from_str(&contents)?;
        settings.path = Some(path);
        Ok(settings.with_env_overrides())
    }

    /// Look for `nuber.toml` in the working directory and its parents
    ///
    /// Falls back to built-in defaults if there is none.
    pub fn discover() -> Result<Self> {
        let mut path = std::env::current_dir()?;
        loop {
            path.push("nuber.toml");

            match std::fs::read_to_string(&path) {
                Ok(contents) => {
                    let mut settings: SimSettings = toml::from_str(&contents)?;
                    settings.path = Some(path);
                    return Ok(settings.with_env_overrides());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }

            path.pop();
            if !path.pop() {
                return Ok(Self::default().with_env_overrides());
            }
        }
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(v) = std::env::var_os("NUBER_LOG_EVENTS") {
            self.log_events = v != "0"
                && !v.eq_ignore_ascii_case("false")
                && !v.eq_ignore_ascii_case("no")
                && !v.eq_ignore_ascii_case("off");
        }
        if let Some(secs) = std::env::var("NUBER_DRAIN_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.drain_timeout_secs = secs;
        }
        self
    }
}

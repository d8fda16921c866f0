//! CLI configuration read from the process environment.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Settings for one scripted encounter run.
#[derive(Clone, Debug)]
pub struct CliConfig {
    /// TOML tuning file; the embedded table is used when unset.
    pub combat_config: Option<PathBuf>,
    pub seed: Option<u64>,
    /// How long the encounter runs before shutting down.
    pub duration: Duration,
    pub event_buffer: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            combat_config: None,
            seed: None,
            duration: Duration::from_secs(10),
            event_buffer: 1024,
        }
    }
}

impl CliConfig {
    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `COMBAT_CONFIG` - Path to a combat tuning TOML file (default: embedded)
    /// - `COMBAT_SEED` - Critical strike seed (default: random)
    /// - `COMBAT_DURATION_MS` - Encounter length in milliseconds (default: 10000)
    /// - `COMBAT_EVENT_BUFFER` - Per-topic event channel capacity (default: 1024)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.combat_config = env::var("COMBAT_CONFIG").ok().map(PathBuf::from);
        config.seed = read_env::<u64>("COMBAT_SEED");

        if let Some(ms) = read_env::<u64>("COMBAT_DURATION_MS") {
            config.duration = Duration::from_millis(ms);
        }
        if let Some(capacity) = read_env::<usize>("COMBAT_EVENT_BUFFER") {
            config.event_buffer = capacity.max(1);
        }

        config
    }
}

fn read_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env::var(key).ok()?.parse().ok()
}

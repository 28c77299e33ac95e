use log::warn;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::blockchain::{DEFAULT_DIFFICULTY, DIFF_MAX, MAX_ATTEMPTS};

/// Knobs for one nonce search started by the API.
#[derive(Debug, Clone, Copy)]
pub struct MiningSettings {
    pub max_attempts: u64,
    pub workers: usize,
    pub timeout: Duration,
}

impl Default for MiningSettings {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            workers: rayon::current_num_threads(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub difficulty: u32,
    pub mining: MiningSettings,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Read settings from the environment (after `.env` has been loaded).
    pub fn from_env() -> Self {
        let defaults = MiningSettings::default();

        let mut difficulty = env_or("DIFFICULTY", DEFAULT_DIFFICULTY);
        if difficulty > DIFF_MAX {
            warn!("DIFFICULTY={difficulty} too high for dev mode, clamping to {DIFF_MAX}");
            difficulty = DIFF_MAX;
        }

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_or("PORT", 8080),
            difficulty,
            mining: MiningSettings {
                max_attempts: env_or("MAX_ATTEMPTS", defaults.max_attempts).max(1),
                workers: env_or("MINING_WORKERS", defaults.workers).max(1),
                timeout: Duration::from_secs(env_or(
                    "MINING_TIMEOUT_SECS",
                    defaults.timeout.as_secs(),
                )),
            },
        }
    }
}

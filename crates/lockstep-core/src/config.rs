//! Testing configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// Configuration shared by the scheduler, strategies and iteration engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Number of iterations the engine runs at most.
    pub scheduling_iterations: usize,
    /// Step bound for unfair strategies (0 = unbounded).
    pub max_unfair_scheduling_steps: usize,
    /// Step bound for fair strategies (0 = unbounded).
    pub max_fair_scheduling_steps: usize,
    /// Report hitting the step bound as a bug instead of truncating.
    pub consider_depth_bound_hit_as_bug: bool,
    /// Fair steps a monitor may stay hot before it is a liveness bug.
    pub liveness_temperature_threshold: usize,
    /// Recorded in trace headers; cycle detection itself is not performed.
    pub enable_cycle_detection: bool,
    /// Name of the test entry point, recorded in trace headers.
    pub test_method_name: Option<String>,
    /// Seed for randomized strategies.
    pub random_seed: u64,
    /// Stop iterating once a bug is found.
    pub stop_after_first_bug: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            scheduling_iterations: 1,
            max_unfair_scheduling_steps: 10_000,
            max_fair_scheduling_steps: 100_000,
            consider_depth_bound_hit_as_bug: false,
            liveness_temperature_threshold: 50_000,
            enable_cycle_detection: false,
            test_method_name: None,
            random_seed: 0,
            stop_after_first_bug: true,
        }
    }
}

impl Configuration {
    /// Step bound for a fair or unfair strategy.
    pub fn step_bound(&self, fair: bool) -> usize {
        if fair {
            self.max_fair_scheduling_steps
        } else {
            self.max_unfair_scheduling_steps
        }
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.scheduling_iterations = iterations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }
}

/// Load a configuration from a JSON file. Missing fields take defaults.
pub fn load_config(path: &Path) -> Result<Configuration, ConfigError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

/// Save a configuration as pretty JSON.
pub fn save_config(config: &Configuration, path: &Path) -> Result<(), ConfigError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_bounds() {
        let config = Configuration::default();
        assert_eq!(config.step_bound(true), 100_000);
        assert_eq!(config.step_bound(false), 10_000);
        assert!(!config.consider_depth_bound_hit_as_bug);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: Configuration =
            serde_json::from_str(r#"{"random_seed": 7, "scheduling_iterations": 20}"#).unwrap();
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.scheduling_iterations, 20);
        assert_eq!(config.max_fair_scheduling_steps, 100_000);
    }

    #[test]
    fn file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lockstep.json");
        let config = Configuration {
            test_method_name: Some("Election".into()),
            ..Default::default()
        }
        .with_seed(99)
        .with_iterations(3);
        save_config(&config, &path).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load_config(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

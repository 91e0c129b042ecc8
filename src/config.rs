use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::engine::{ClassifyPolicy, PitchPolicy};

pub const CONFIG_FILE_NAME: &str = "beatgrid.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub classify: ClassifyConfig,
    #[serde(default)]
    pub pitch: PitchConfig,
}

#[derive(Debug, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_tempo")]
    pub tempo: f64,
    #[serde(default = "default_bars")]
    pub bars: u32,
}

#[derive(Debug, Deserialize)]
pub struct ClassifyConfig {
    /// Dense-network weights (JSON)
    #[serde(default)]
    pub model: Option<PathBuf>,
    #[serde(default = "default_audit_log")]
    pub audit_log: PathBuf,
    #[serde(flatten)]
    pub policy: ClassifyPolicy,
}

#[derive(Debug, Deserialize)]
pub struct PitchConfig {
    #[serde(default = "default_smoothing")]
    pub smoothing: bool,
    #[serde(flatten)]
    pub policy: PitchPolicy,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            tempo: default_tempo(),
            bars: default_bars(),
        }
    }
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            model: None,
            audit_log: default_audit_log(),
            policy: ClassifyPolicy::default(),
        }
    }
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            smoothing: default_smoothing(),
            policy: PitchPolicy::default(),
        }
    }
}

fn default_tempo() -> f64 { 120.0 }
fn default_bars() -> u32 { 1 }
fn default_audit_log() -> PathBuf { "prediction_log.csv".into() }
fn default_smoothing() -> bool { true }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid config: {}", path.display()))
}

/// First existing config file: explicit path, `./beatgrid.toml`,
/// `~/.config/beatgrid/config.toml`, then the platform config dir.
pub fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("beatgrid").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("beatgrid").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SilencePolicy;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.grid.tempo, 120.0);
        assert_eq!(cfg.grid.bars, 1);
        assert_eq!(cfg.classify.model, None);
        assert_eq!(cfg.classify.audit_log, PathBuf::from("prediction_log.csv"));
        assert_eq!(cfg.classify.policy, ClassifyPolicy::default());
        assert!(cfg.pitch.smoothing);
        assert_eq!(cfg.pitch.policy, PitchPolicy::default());
    }

    #[test]
    fn sections_override_fields() {
        let cfg: Config = toml::from_str(
            r#"
            [grid]
            tempo = 90.5
            bars = 4

            [classify]
            model = "models/drums.json"
            silence_policy = "short_circuit"
            trim_fraction = 0.2

            [pitch]
            smoothing = false
            rest_threshold = 0.05
            "#,
        )
        .unwrap();
        assert_eq!(cfg.grid.tempo, 90.5);
        assert_eq!(cfg.grid.bars, 4);
        assert_eq!(cfg.classify.model, Some(PathBuf::from("models/drums.json")));
        assert_eq!(cfg.classify.policy.silence_policy, SilencePolicy::ShortCircuit);
        assert_eq!(cfg.classify.policy.trim_fraction, 0.2);
        assert_eq!(cfg.classify.policy.silence_rms, 0.05);
        assert!(!cfg.pitch.smoothing);
        assert_eq!(cfg.pitch.policy.rest_threshold, 0.05);
        assert_eq!(cfg.pitch.policy.min_confidence, 0.5);
    }

    #[test]
    fn load_reports_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[grid]\ntempo = \"fast\"\n").unwrap();
        assert!(load_config(&path).is_err());
        assert!(load_config(&dir.path().join("missing.toml")).is_err());

        std::fs::write(&path, "[grid]\nbars = 2\n").unwrap();
        assert_eq!(load_config(&path).unwrap().grid.bars, 2);
    }

    #[test]
    fn explicit_path_wins() {
        let path = Path::new("/nowhere/custom.toml");
        assert_eq!(discover(Some(path)), Some(path.to_path_buf()));
    }
}

//! Loading game configuration (pipeline defaults + optional question bank) from TOML.
//!
//! See `GameConfig` for the expected schema.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::ErrorSpec;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct GameConfig {
  #[serde(default)]
  pub pipeline: PipelineCfg,
  #[serde(default)]
  pub questions: Vec<QuestionCfg>,
}

/// Defaults for talking to the external generation pipeline.
/// Environment variables override these at client construction.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct PipelineCfg {
  #[serde(default)] pub default_topic: Option<String>,
  #[serde(default)] pub max_retries: Option<u32>,
}

/// Question entry accepted in TOML configuration. `code` lines may carry
/// `<<…>>` annotation markers; entries that fail annotation parsing (or name
/// an unknown difficulty) are skipped at startup, not fatal.
#[derive(Clone, Debug, Deserialize)]
pub struct QuestionCfg {
  pub title: String,
  pub difficulty: String,
  pub code: Vec<String>,
  #[serde(default)] pub errors: Vec<ErrorSpec>,
}

/// Attempt to load `GameConfig` from GAME_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_game_config_from_env() -> Option<GameConfig> {
  let path = std::env::var("GAME_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<GameConfig>(&s) {
      Ok(cfg) => {
        info!(target: "bughunt_backend", %path, "Loaded game config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "bughunt_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "bughunt_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

//! Model directory loading.
//!
//! Layout:
//!
//! ```text
//! model_dir/
//! ├── serving.json          (optional EngineConfig overrides)
//! ├── tiny/
//! │   └── config.json       (ModelSpec fields + backend section)
//! └── echo/
//!     └── config.json
//! ```
//!
//! The subdirectory name is the model name unless `config.json` sets `name`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serving_engine::{ModelBackend, ModelSpec, Result, ServingError, TokenId};

use crate::backends::{ScriptedModel, SyntheticModel};
use crate::config::EngineConfig;

/// File holding engine-wide overrides.
pub const ENGINE_CONFIG_FILE: &str = "serving.json";

/// Per-model configuration file.
pub const MODEL_CONFIG_FILE: &str = "config.json";

/// Which built-in backend serves a model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    Scripted {
        tokens: Vec<TokenId>,
        #[serde(default)]
        fail_at: Option<usize>,
    },
    Synthetic,
}

/// Contents of a model's `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfigFile {
    #[serde(flatten)]
    pub spec: ModelSpec,
    pub backend: BackendConfig,
}

/// Instantiate the backend described by `config`.
pub fn build_backend(spec: ModelSpec, config: BackendConfig) -> Result<Arc<dyn ModelBackend>> {
    spec.validate()?;
    let backend: Arc<dyn ModelBackend> = match config {
        BackendConfig::Scripted { tokens, fail_at } => {
            let mut model = ScriptedModel::new(spec, tokens)?;
            if let Some(step) = fail_at {
                model = model.with_fail_at(step);
            }
            Arc::new(model)
        }
        BackendConfig::Synthetic => Arc::new(SyntheticModel::new(spec)),
    };
    Ok(backend)
}

/// Load one model from its directory.
pub fn load_model(model_path: &Path) -> Result<Arc<dyn ModelBackend>> {
    let config_path = model_path.join(MODEL_CONFIG_FILE);
    let data = std::fs::read_to_string(&config_path).map_err(|e| {
        ServingError::ModelLoad(format!("cannot read {}: {e}", config_path.display()))
    })?;
    let mut file: ModelConfigFile = serde_json::from_str(&data).map_err(|e| {
        ServingError::ModelLoad(format!("malformed {}: {e}", config_path.display()))
    })?;

    if file.spec.name.is_empty() {
        file.spec.name = model_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    build_backend(file.spec, file.backend)
}

/// Find every subdirectory of `model_dir` that holds a `config.json`.
pub fn discover_model_dirs(model_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(model_dir).map_err(|e| {
        ServingError::ModelLoad(format!(
            "cannot read model directory {}: {e}",
            model_dir.display()
        ))
    })?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && path.join(MODEL_CONFIG_FILE).is_file())
        .collect();

    if dirs.is_empty() {
        return Err(ServingError::ModelLoad(format!(
            "no models found in {}",
            model_dir.display()
        )));
    }

    dirs.sort();
    Ok(dirs)
}

/// Load every model under `model_dir`.
pub fn load_models(model_dir: &Path) -> Result<Vec<Arc<dyn ModelBackend>>> {
    discover_model_dirs(model_dir)?
        .iter()
        .map(|path| load_model(path))
        .collect()
}

/// Read `serving.json`, falling back to defaults when it is absent.
pub fn load_engine_config(model_dir: &Path) -> Result<EngineConfig> {
    let path = model_dir.join(ENGINE_CONFIG_FILE);
    if !path.is_file() {
        return Ok(EngineConfig::default());
    }
    let data = std::fs::read_to_string(&path)?;
    serde_json::from_str(&data)
        .map_err(|e| ServingError::ModelLoad(format!("malformed {}: {e}", path.display())))
}

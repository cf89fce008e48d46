//! JSON-directory configuration loader
//!
//! Layout under the configuration root:
//!
//! ```text
//! Users/<user>.json
//! Endpoints/<name>.json
//! ApiTypes/<name>.json
//! Presets/<presetType>/<name>.json
//! Workflows/<user>/<name>.json
//! Workflows/_shared/<name>.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::{
    ApiTypeConfig, ConfigError, EndpointConfig, Preset, UserConfig, WorkflowConfig,
};

/// Folder that holds workflows selectable by any client via the model field.
pub const SHARED_WORKFLOW_FOLDER: &str = "_shared";

/// Read-only view over the configuration directory for one user.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
    username: String,
}

impl ConfigStore {
    pub fn new(root: impl Into<PathBuf>, username: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            username: username.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<T, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load_user(&self) -> Result<UserConfig, ConfigError> {
        let path = self
            .root
            .join("Users")
            .join(format!("{}.json", self.username.to_lowercase()));
        self.read(&path)
    }

    pub fn load_endpoint(&self, name: &str) -> Result<EndpointConfig, ConfigError> {
        let path = self.root.join("Endpoints").join(format!("{name}.json"));
        self.read(&path)
    }

    pub fn load_api_type(&self, name: &str) -> Result<ApiTypeConfig, ConfigError> {
        let path = self.root.join("ApiTypes").join(format!("{name}.json"));
        self.read(&path)
    }

    pub fn load_preset(&self, preset_type: &str, name: &str) -> Result<Preset, ConfigError> {
        let path = self
            .root
            .join("Presets")
            .join(preset_type)
            .join(format!("{name}.json"));
        self.read(&path)
    }

    /// Load a workflow by name, preferring the user's own folder and falling
    /// back to `_shared`.
    pub fn load_workflow(&self, name: &str) -> Result<WorkflowConfig, ConfigError> {
        let user_path = self
            .root
            .join("Workflows")
            .join(&self.username)
            .join(format!("{name}.json"));
        if user_path.exists() {
            return self.read(&user_path);
        }

        let shared_path = self
            .root
            .join("Workflows")
            .join(SHARED_WORKFLOW_FOLDER)
            .join(format!("{name}.json"));
        if shared_path.exists() {
            return self.read(&shared_path);
        }

        Err(ConfigError::UnknownWorkflow(name.to_string()))
    }

    /// Workflow names available in the shared folder, sorted for stable
    /// model listings.
    pub fn available_shared_workflows(&self) -> Vec<String> {
        let dir = self.root.join("Workflows").join(SHARED_WORKFLOW_FOLDER);
        let Ok(entries) = fs::read_dir(&dir) else {
            tracing::debug!(dir = %dir.display(), "No shared workflow folder");
            return Vec::new();
        };

        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                    path.file_stem()
                        .and_then(|stem| stem.to_str())
                        .map(str::to_string)
                } else {
                    None
                }
            })
            .collect();
        names.sort();
        names
    }

    /// Whether a workflow of this name exists in the shared folder. Drives
    /// model-field override validation.
    pub fn workflow_exists_in_shared_folder(&self, name: &str) -> bool {
        self.root
            .join("Workflows")
            .join(SHARED_WORKFLOW_FOLDER)
            .join(format!("{name}.json"))
            .is_file()
    }
}

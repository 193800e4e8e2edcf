//! YAML configuration for the console and the model workflow.

use std::fs;
use std::path::Path;

use chain_core::{ConsoleError, ErrorInfo};
use serde::{Deserialize, Serialize};

/// Library and workflow settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Modules loaded when the library initialises.
    #[serde(default = "default_modules")]
    pub default_modules: Vec<String>,
    /// Adaptation iterations run by a new [`crate::Model`].
    #[serde(default = "default_tune")]
    pub tune: u64,
    /// Forward-sample the model's `data` block during compilation.
    #[serde(default = "default_generate_data")]
    pub generate_data: bool,
    /// Monitor type used by [`crate::Model::sample`].
    #[serde(default = "default_monitor_type")]
    pub monitor_type: String,
    /// Thinning factor used by [`crate::Model::sample`].
    #[serde(default = "default_thin")]
    pub thin: u32,
    /// Target wall-clock length of one update chunk, in seconds. Unset means
    /// updates run in one piece.
    #[serde(default)]
    pub progress_period_secs: Option<f64>,
}

fn default_modules() -> Vec<String> {
    vec!["basemod".to_string(), "bugs".to_string()]
}

fn default_tune() -> u64 {
    1000
}

fn default_generate_data() -> bool {
    true
}

fn default_monitor_type() -> String {
    "trace".to_string()
}

fn default_thin() -> u32 {
    1
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            default_modules: default_modules(),
            tune: default_tune(),
            generate_data: default_generate_data(),
            monitor_type: default_monitor_type(),
            thin: default_thin(),
            progress_period_secs: None,
        }
    }
}

impl ConsoleConfig {
    /// Parses a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConsoleError> {
        serde_yaml::from_str(yaml).map_err(|err| {
            ConsoleError::Conversion(ErrorInfo::new("config.parse", err.to_string()))
        })
    }

    /// Reads and parses a YAML file.
    pub fn from_path(path: &Path) -> Result<Self, ConsoleError> {
        let contents = fs::read_to_string(path).map_err(|err| ConsoleError::io(path, &err))?;
        Self::from_yaml_str(&contents).map_err(|err| match err {
            ConsoleError::Conversion(info) => {
                ConsoleError::Conversion(info.with_context("path", path.display().to_string()))
            }
            other => other,
        })
    }
}

use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::Deserialize;

use crate::engine::EngineOptions;

/// Configuration loaded from `caseflow.yaml`.
/// All fields are optional; missing fields fall back to CLI/env/defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CaseflowConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Directory of workflow definition files preloaded by `serve`.
    pub definitions_dir: Option<String>,
    pub max_body: Option<usize>,
    pub halt_on_step_failure: Option<bool>,
    pub step_timeout_s: Option<f64>,
    pub instance_timeout_s: Option<f64>,
    pub max_steps: Option<usize>,
}

impl CaseflowConfig {
    /// Load configuration from a YAML file.
    ///
    /// - If `path` is `Some`, load that specific file (error if missing).
    /// - If `path` is `None`, auto-detect `caseflow.yaml` in cwd; return defaults if absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let default_path = Path::new("caseflow.yaml");
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path.to_path_buf()
            }
        };

        let contents = std::fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path.display()))?;

        let config: CaseflowConfig = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", file_path.display()))?;

        Ok(config)
    }

    /// Engine options from the file, on top of the engine defaults.
    pub fn engine_options(&self) -> Result<EngineOptions> {
        let mut options = EngineOptions::default();
        if let Some(halt) = self.halt_on_step_failure {
            options.halt_on_step_failure = halt;
        }
        if let Some(s) = self.step_timeout_s {
            options.step_timeout = Some(seconds("step_timeout_s", s)?);
        }
        if let Some(s) = self.instance_timeout_s {
            options.instance_timeout = Some(seconds("instance_timeout_s", s)?);
        }
        if let Some(max) = self.max_steps {
            options.max_steps = max;
        }
        Ok(options)
    }
}

pub(crate) fn seconds(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("'{}' must be a non-negative number of seconds, got {}", name, value))
}

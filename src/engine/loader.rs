//! Reading workflow definitions from YAML or JSON documents.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use crate::engine::types::WorkflowDefinition;

/// Parse a definition from YAML (JSON documents parse too).
pub fn parse_definition(source: &str) -> Result<WorkflowDefinition> {
    let definition: WorkflowDefinition =
        serde_yml::from_str(source).context("Failed to parse workflow definition")?;
    Ok(definition)
}

/// Load one definition file. `.json` files go through serde_json, anything
/// else through the YAML parser. A definition without an `id` takes the file stem.
pub fn load_definition(path: &Path) -> Result<WorkflowDefinition> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read definition file: {}", path.display()))?;

    let mut definition: WorkflowDefinition =
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse definition: {}", path.display()))?
        } else {
            parse_definition(&contents)
                .with_context(|| format!("Failed to parse definition: {}", path.display()))?
        };

    if definition.id.is_empty()
        && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
    {
        definition.id = stem.to_string();
    }

    Ok(definition)
}

/// Load every `.yaml`, `.yml` and `.json` file in `dir`, sorted by file name.
pub fn load_dir(dir: &Path) -> Result<Vec<(PathBuf, WorkflowDefinition)>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read definitions dir: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml" | "yml" | "json")
            )
        })
        .collect();
    paths.sort();

    paths
        .into_iter()
        .map(|path| load_definition(&path).map(|def| (path, def)))
        .collect()
}

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

const CLASS_EXTENSION: &str = ".cls";

/// Identifies Apex test classes to run by file name pattern instead of by
/// explicit name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchTest {
    /// Namespace prefix applied to every resolved class name.
    pub namespace: Option<String>,
    /// Glob patterns, relative to the workspace root.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl BatchTest {
    /// Resolve the patterns to class names. Only `.cls` files are candidates;
    /// the extension is stripped and the namespace (when non-blank) prefixed.
    /// Match order follows the patterns; duplicates are dropped.
    pub fn class_names(&self, workspace: &Path) -> Result<Vec<String>> {
        let prefix = match &self.namespace {
            Some(ns) if !ns.trim().is_empty() => format!("{}.", ns.trim()),
            _ => String::new(),
        };

        let mut names = Vec::new();
        for pattern in &self.patterns {
            let full = workspace.join(pattern).to_string_lossy().to_string();
            let entries = glob::glob(&full)
                .with_context(|| format!("invalid test pattern '{}'", pattern))?;
            for entry in entries.flatten() {
                let Some(file_name) = entry.file_name().and_then(|name| name.to_str()) else {
                    continue;
                };
                if let Some(stem) = file_name.strip_suffix(CLASS_EXTENSION) {
                    let name = format!("{}{}", prefix, stem);
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        Ok(names)
    }
}

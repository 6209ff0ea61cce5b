use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::batch::BatchTest;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub tests: TestsConfig,
}

/// Controls how the deployment is submitted and polled.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Directory containing the metadata to deploy, relative to the workspace.
    pub source_dir: String,
    /// Org alias or username; the CLI's default org is used when unset.
    pub target_org: Option<String>,
    /// Platform test level. Defaults to RunSpecifiedTests when tests are
    /// listed and nothing is configured here.
    pub test_level: Option<String>,
    /// Give up polling after this many seconds.
    pub wait_secs: u64,
    /// Seconds between deploy status checks.
    pub poll_secs: u64,
    /// Deploy CLI override, split shell-style.
    /// Example: "npx sf"
    pub command: Option<String>,
    /// Validate the deployment without saving anything to the org.
    pub dry_run: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            source_dir: "force-app".into(),
            target_org: None,
            test_level: None,
            wait_secs: 600,
            poll_secs: 5,
            command: None,
            dry_run: false,
        }
    }
}

impl DeployConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }

    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }
}

/// Controls report output.
#[derive(Debug, Default, Deserialize)]
pub struct ReportConfig {
    /// Directory the JUnit XML report is written into, relative to the
    /// workspace. Report generation is skipped entirely when unset.
    pub junit_dir: Option<PathBuf>,
}

/// Which tests the deployment runs.
#[derive(Debug, Default, Deserialize)]
pub struct TestsConfig {
    /// Explicitly named test classes.
    #[serde(default)]
    pub names: Vec<String>,
    /// Pattern-matched test classes, resolved against the workspace.
    #[serde(default)]
    pub batch: Vec<BatchTest>,
}

impl Config {
    /// Load `verdict.toml` from the workspace root. A missing file means
    /// defaults; a malformed one is an error.
    pub fn load(workspace: &Path) -> Result<Self> {
        let path = workspace.join("verdict.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }
}

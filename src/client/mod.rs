pub mod sf_cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::DeployConfig;
use crate::models::DeployOutcome;

/// Everything the deploy client needs to know to submit one deployment.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub source_dir: String,
    pub target_org: Option<String>,
    pub test_level: Option<String>,
    pub run_tests: Vec<String>,
    pub dry_run: bool,
}

/// Trait for platform deploy client adapters. The client owns the wire
/// protocol and the polling loop; callers get back one final outcome.
#[async_trait]
pub trait DeployClient: Send + Sync {
    /// Submit the deployment and poll until it reaches a terminal status.
    async fn deploy(&self, request: &DeployRequest) -> Result<DeployOutcome>;

    /// Display name for this client (e.g., "sf CLI").
    fn name(&self) -> &str;
}

/// Construct the deploy client for the given workspace.
pub fn connect(workspace: PathBuf, config: &DeployConfig) -> Arc<dyn DeployClient> {
    Arc::new(sf_cli::SfCliClient::new(workspace, config))
}

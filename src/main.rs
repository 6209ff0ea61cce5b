mod batch;
mod client;
mod config;
mod failure;
mod models;
mod report;
mod task;

use std::path::PathBuf;

use anyhow::Result;

use config::Config;
use task::DeployTask;

#[tokio::main]
async fn main() -> Result<()> {
    let workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let target_org = std::env::args().nth(1);

    let mut config = Config::load(&workspace)?;
    if target_org.is_some() {
        config.deploy.target_org = target_org;
    }

    let client = client::connect(workspace.clone(), &config.deploy);
    DeployTask::new(config, workspace, client).run().await
}

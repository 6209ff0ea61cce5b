use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};

use crate::client::{DeployClient, DeployRequest};
use crate::config::Config;
use crate::failure;
use crate::report::XmlReport;

/// Runs one deployment end to end: resolve the tests to run, submit through
/// the deploy client, write the JUnit report, signal failure.
pub struct DeployTask {
    config: Config,
    workspace: PathBuf,
    client: Arc<dyn DeployClient>,
}

impl DeployTask {
    pub fn new(config: Config, workspace: PathBuf, client: Arc<dyn DeployClient>) -> Self {
        Self {
            config,
            workspace,
            client,
        }
    }

    /// Explicitly named tests plus every batch group's resolved class names,
    /// in declaration order, without duplicates.
    pub fn run_tests(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for name in &self.config.tests.names {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        for batch in &self.config.tests.batch {
            for name in batch.class_names(&self.workspace)? {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    pub async fn run(&self) -> Result<()> {
        let run_tests = self.run_tests()?;
        if !run_tests.is_empty() {
            println!("running tests: {}", run_tests.join(", "));
        }

        let request = DeployRequest {
            source_dir: self.config.deploy.source_dir.clone(),
            target_org: self.config.deploy.target_org.clone(),
            test_level: self.test_level(&run_tests),
            run_tests,
            dry_run: self.config.deploy.dry_run,
        };

        println!("deploying {} via {}", request.source_dir, self.client.name());
        let outcome = self.client.deploy(&request).await?;

        let tests = &outcome.test_result;
        println!(
            "deployment {} finished: {} ({} tests run, {} failed)",
            outcome.id, outcome.status, tests.num_tests_run, tests.num_failures
        );

        if let Some(dir) = &self.config.report.junit_dir {
            let path = XmlReport::new(self.workspace.join(dir)).report(tests)?;
            println!("wrote JUnit report to {}", path.display());
        }

        if let Some(diagnostic) = failure::summarize(&outcome) {
            bail!(diagnostic);
        }
        Ok(())
    }

    /// Defaults the test level to RunSpecifiedTests when tests were listed
    /// but no level was configured.
    fn test_level(&self, run_tests: &[String]) -> Option<String> {
        match &self.config.deploy.test_level {
            Some(level) => Some(level.clone()),
            None if !run_tests.is_empty() => Some("RunSpecifiedTests".to_string()),
            None => None,
        }
    }
}

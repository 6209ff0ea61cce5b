pub mod coverage;
pub mod deploy;

pub use coverage::{CoverageResult, CoverageWarning, FlowCoverageResult, FlowCoverageWarning};
pub use deploy::{DeployMessage, DeployOutcome, DeployStatus};
pub use test::{OutcomeKind, TestFailure, TestOutcome, TestRunSummary, qualify};

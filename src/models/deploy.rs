use std::fmt;

use super::test::TestRunSummary;

/// One component-level outcome from the deployment.
#[derive(Debug, Clone)]
pub struct DeployMessage {
    pub file_name: String,
    pub full_name: String,
    pub success: bool,
    pub problem: Option<String>,
    pub line_number: Option<u32>,
    pub column_number: Option<u32>,
}

impl DeployMessage {
    /// Location qualifier for diagnostics: `(line,column)` when the platform
    /// reported a position, else the full component name when it differs
    /// from the file name.
    pub fn location_qualifier(&self) -> Option<String> {
        match self.line_number {
            Some(line) if line != 0 => {
                Some(format!("({},{})", line, self.column_number.unwrap_or(0)))
            }
            _ if self.full_name != self.file_name => Some(format!("({})", self.full_name)),
            _ => None,
        }
    }
}

/// Lifecycle states a deployment moves through on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStatus {
    Pending,
    InProgress,
    Succeeded,
    SucceededPartial,
    Failed,
    Canceling,
    Canceled,
}

impl DeployStatus {
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            DeployStatus::Succeeded
                | DeployStatus::SucceededPartial
                | DeployStatus::Failed
                | DeployStatus::Canceled
        )
    }
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeployStatus::Pending => "Pending",
            DeployStatus::InProgress => "InProgress",
            DeployStatus::Succeeded => "Succeeded",
            DeployStatus::SucceededPartial => "SucceededPartial",
            DeployStatus::Failed => "Failed",
            DeployStatus::Canceling => "Canceling",
            DeployStatus::Canceled => "Canceled",
        })
    }
}

/// Final result of one deployment, as reported by the deploy client.
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    pub id: String,
    pub status: DeployStatus,
    pub success: bool,
    pub messages: Vec<DeployMessage>,
    pub test_result: TestRunSummary,
}

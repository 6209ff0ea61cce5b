use super::test::qualify;

/// Per-class line coverage counters from a test run.
#[derive(Debug, Clone)]
pub struct CoverageResult {
    pub name: String,
    pub num_locations: u32,
    pub num_locations_not_covered: u32,
}

impl CoverageResult {
    pub fn covered(&self) -> u32 {
        self.num_locations.saturating_sub(self.num_locations_not_covered)
    }
}

/// A named or global code coverage problem. A warning without a class name
/// applies to the run as a whole.
#[derive(Debug, Clone)]
pub struct CoverageWarning {
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub message: String,
}

impl CoverageWarning {
    /// Namespace-qualified class name, or `None` for a global warning.
    pub fn qualified_name(&self) -> Option<String> {
        self.name
            .as_deref()
            .map(|name| qualify(self.namespace.as_deref(), name))
    }
}

/// Element coverage counters for one declarative flow.
#[derive(Debug, Clone)]
pub struct FlowCoverageResult {
    pub flow_name: String,
    pub flow_namespace: Option<String>,
    pub num_elements: u32,
    pub num_elements_not_covered: u32,
}

impl FlowCoverageResult {
    /// True when the test run exercised none of the flow's elements.
    pub fn is_uncovered(&self) -> bool {
        self.num_elements == self.num_elements_not_covered
    }
}

/// Coverage problem reported against a flow, or globally when unnamed.
#[derive(Debug, Clone)]
pub struct FlowCoverageWarning {
    pub flow_namespace: Option<String>,
    pub flow_name: Option<String>,
    pub message: String,
}

impl FlowCoverageWarning {
    pub fn qualified_flow_name(&self) -> Option<String> {
        self.flow_name
            .as_deref()
            .map(|name| qualify(self.flow_namespace.as_deref(), name))
    }
}

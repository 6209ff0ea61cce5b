use crate::models::{DeployOutcome, TestRunSummary};

/// Aggregate everything that went wrong in an unsuccessful deployment into
/// one diagnostic string. Returns `None` when the deployment succeeded.
pub fn summarize(outcome: &DeployOutcome) -> Option<String> {
    if outcome.success {
        return None;
    }

    let mut buf = String::from("Failures:\n");

    // TODO: append DeployMessage::location_qualifier to these lines once
    // report consumers confirm the format change.
    for message in &outcome.messages {
        if message.success {
            continue;
        }
        buf.push_str(&message.file_name);
        buf.push(':');
        if let Some(problem) = &message.problem {
            buf.push_str(problem);
        }
        buf.push('\n');
    }

    let tests = &outcome.test_result;
    for test in tests.failures() {
        let Some(failure) = test.failure() else {
            continue;
        };
        buf.push_str(&format!(
            "Test failure, method: {}.{} -- {} stack {}\n\n",
            test.qualified_class_name(),
            test.method_name,
            failure.message,
            failure.stack_trace.as_deref().unwrap_or("")
        ));
    }

    for warning in &tests.coverage_warnings {
        buf.push_str("Code coverage issue");
        if let Some(name) = warning.qualified_name() {
            buf.push_str(", class: ");
            buf.push_str(&name);
        }
        buf.push_str(" -- ");
        buf.push_str(&warning.message);
        buf.push('\n');
    }

    for warning in &tests.flow_coverage_warnings {
        buf.push_str("Flow coverage issue");
        if let Some(name) = warning.qualified_flow_name() {
            buf.push_str(", flow: ");
            buf.push_str(&name);
        }
        buf.push_str(" -- ");
        buf.push_str(&warning.message);
        buf.push('\n');
    }

    append_missing_flow_coverage(tests, &mut buf);

    Some(buf)
}

/// List the flows the test run never touched at all.
fn append_missing_flow_coverage(tests: &TestRunSummary, buf: &mut String) {
    let uncovered: Vec<&str> = tests
        .flow_coverage
        .iter()
        .filter(|flow| flow.is_uncovered())
        .map(|flow| flow.flow_name.as_str())
        .collect();
    if uncovered.is_empty() {
        return;
    }
    buf.push_str(&format!(
        "\nThere are {} flows that have no coverage:\n",
        uncovered.len()
    ));
    for name in uncovered {
        buf.push_str(&format!("\t - {}\n", name));
    }
}

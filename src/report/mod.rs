pub mod coverage;
pub mod xml;

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::models::{TestFailure, TestRunSummary, qualify};
use self::xml::Element;

/// Fixed suite name; also determines the report file name.
const SUITE_NAME: &str = "Apex";
const REPORT_FILE_NAME: &str = "TEST-Apex.xml";
const MS_PER_SECOND: f64 = 1000.0;

/// Pseudo-test used to surface coverage results to JUnit consumers.
const COVERAGE_TEST_CLASS: &str = "ApexCodeCoverageTest";
const COVERAGE_TEST_METHOD: &str = "testCoverage";
const COVERAGE_FALLBACK_MESSAGE: &str = "See Standard Output for failure detail";

/// Writes a JUnit-format XML report for the Apex test run embedded in a
/// deploy result.
pub struct XmlReport {
    to_dir: PathBuf,
}

impl XmlReport {
    pub fn new(to_dir: impl Into<PathBuf>) -> Self {
        Self { to_dir: to_dir.into() }
    }

    /// Build and persist the report. Returns the path of the written file.
    pub fn report(&self, results: &TestRunSummary) -> Result<PathBuf> {
        self.write(&build(results))
    }

    /// Serialize an already-built document into the report directory,
    /// overwriting any previous report.
    pub fn write(&self, doc: &Element) -> Result<PathBuf> {
        fs::create_dir_all(&self.to_dir).with_context(|| {
            format!("failed to create report directory {}", self.to_dir.display())
        })?;
        let path = self.to_dir.join(REPORT_FILE_NAME);
        let file = File::create(&path)
            .with_context(|| format!("failed to open {} for writing", path.display()))?;
        xml::write_document(doc, BufWriter::new(file))
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// Assemble the report document for a test run, stamped with the current UTC
/// time.
pub fn build(results: &TestRunSummary) -> Element {
    build_at(results, &Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string())
}

fn build_at(results: &TestRunSummary, timestamp: &str) -> Element {
    let mut suite = Element::new("testsuite");
    suite.set_attr("name", SUITE_NAME);
    suite.set_attr("timestamp", timestamp);
    suite.append(Element::new("properties"));

    for outcome in &results.outcomes {
        suite.append(test_case(
            outcome.namespace.as_deref(),
            &outcome.class_name,
            &outcome.method_name,
            outcome.time_ms,
            outcome.failure(),
        ));
    }
    report_coverage(&mut suite, results);

    // The synthetic coverage case counts toward the suite total. The platform
    // has no error/failure distinction, so errors stays zero.
    suite.set_attr("tests", (results.outcomes.len() + 1).to_string());
    suite.set_attr("failures", results.num_failures.to_string());
    suite.set_attr("errors", "0");
    suite.set_attr("time", seconds(results.total_time_ms));

    // Placeholder elements some report consumers expect to find.
    suite.append(Element::new("system-out"));
    suite.append(Element::new("system-err"));
    suite
}

/// One pseudo test-case that carries the coverage outcome, plus a suite-level
/// system-out with the full coverage summary.
fn report_coverage(suite: &mut Element, results: &TestRunSummary) {
    let mut case = test_case(None, COVERAGE_TEST_CLASS, COVERAGE_TEST_METHOD, 0.0, None);
    let summary = coverage::summary(&results.coverage);

    if results.coverage_warnings.is_empty() {
        suite.append(case);
        append_system_out(suite, &summary);
        return;
    }

    // The first global warning becomes the failure message; class-qualified
    // warnings are listed one per line in system-out.
    let mut message: Option<&str> = None;
    let mut detail = String::new();
    for warning in &results.coverage_warnings {
        match warning.qualified_name() {
            Some(name) => {
                detail.push_str(&name);
                detail.push_str(": ");
                detail.push_str(&warning.message);
                detail.push('\n');
            }
            None => {
                if message.is_none() {
                    message = Some(&warning.message);
                }
            }
        }
    }

    let mut failure = Element::new("failure");
    failure.set_attr("message", message.unwrap_or(COVERAGE_FALLBACK_MESSAGE));
    case.append(failure);
    suite.append(case);
    append_system_out(suite, &format!("{}\n{}", detail, summary));
}

fn test_case(
    namespace: Option<&str>,
    class_name: &str,
    method_name: &str,
    time_ms: f64,
    failure: Option<&TestFailure>,
) -> Element {
    let mut case = Element::new("testcase");
    case.set_attr("name", method_name);
    case.set_attr("classname", qualify(namespace, class_name));
    case.set_attr("time", seconds(time_ms));
    if let Some(failure) = failure {
        let mut nested = Element::new("failure");
        nested.set_attr("type", &failure.failure_type);
        nested.set_attr("message", &failure.message);
        if let Some(trace) = &failure.stack_trace {
            nested.append_text(trace);
        }
        case.append(nested);
    }
    case
}

fn append_system_out(suite: &mut Element, text: &str) {
    let mut out = Element::new("system-out");
    out.append_cdata(text);
    suite.append(out);
}

fn seconds(ms: f64) -> String {
    (ms / MS_PER_SECOND).to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use quick_xml::Reader;
    use quick_xml::events::{BytesStart, Event};

    use super::*;
    use crate::models::{
        CoverageResult, CoverageWarning, OutcomeKind, TestOutcome, TestRunSummary,
    };

    fn passed(class_name: &str, method_name: &str, time_ms: f64) -> TestOutcome {
        TestOutcome {
            namespace: None,
            class_name: class_name.into(),
            method_name: method_name.into(),
            time_ms,
            kind: OutcomeKind::Passed,
        }
    }

    fn failed(class_name: &str, method_name: &str, time_ms: f64) -> TestOutcome {
        TestOutcome {
            namespace: None,
            class_name: class_name.into(),
            method_name: method_name.into(),
            time_ms,
            kind: OutcomeKind::Failed(TestFailure {
                failure_type: "System.AssertException".into(),
                message: "Assertion Failed".into(),
                stack_trace: Some(format!("Class.{}.{}: line 4", class_name, method_name)),
            }),
        }
    }

    fn summary_with(outcomes: Vec<TestOutcome>) -> TestRunSummary {
        let num_failures = outcomes.iter().filter(|o| o.failure().is_some()).count() as u32;
        TestRunSummary {
            num_tests_run: outcomes.len() as u32,
            num_failures,
            total_time_ms: outcomes.iter().map(|o| o.time_ms).sum(),
            outcomes,
            coverage: vec![CoverageResult {
                name: "AccountService".into(),
                num_locations: 100,
                num_locations_not_covered: 20,
            }],
            ..TestRunSummary::default()
        }
    }

    fn render(results: &TestRunSummary) -> String {
        let mut out = Vec::new();
        xml::write_document(&build_at(results, "2026-08-04T10:00:00"), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn attrs_of(start: &BytesStart) -> HashMap<String, String> {
        start
            .attributes()
            .map(|attr| {
                let attr = attr.unwrap();
                (
                    String::from_utf8(attr.key.as_ref().to_vec()).unwrap(),
                    attr.unescape_value().unwrap().into_owned(),
                )
            })
            .collect()
    }

    /// Parse the rendered report back into (suite attrs, testcase attrs).
    fn parse(rendered: &str) -> (HashMap<String, String>, Vec<HashMap<String, String>>) {
        let mut reader = Reader::from_str(rendered);
        let mut suite = HashMap::new();
        let mut cases = Vec::new();
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                    b"testsuite" => suite = attrs_of(&e),
                    b"testcase" => cases.push(attrs_of(&e)),
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }
        (suite, cases)
    }

    #[test]
    fn suite_counts_include_the_coverage_case() {
        let results = summary_with(vec![
            passed("A", "one", 10.0),
            passed("A", "two", 10.0),
            passed("B", "three", 10.0),
            failed("B", "four", 20.0),
        ]);
        let (suite, cases) = parse(&render(&results));
        assert_eq!(suite["tests"], "5");
        assert_eq!(suite["failures"], "1");
        assert_eq!(suite["errors"], "0");
        assert_eq!(suite["time"], "0.05");
        assert_eq!(cases.len(), 5);
    }

    #[test]
    fn testcases_carry_name_classname_and_seconds() {
        let mut results = summary_with(vec![passed("AccountService", "testCreate", 123.0)]);
        results.outcomes[0].namespace = Some("cv".into());
        let (_, cases) = parse(&render(&results));
        assert_eq!(cases[0]["name"], "testCreate");
        assert_eq!(cases[0]["classname"], "cv.AccountService");
        assert_eq!(cases[0]["time"], "0.123");
    }

    #[test]
    fn failures_nest_type_message_and_stack_trace() {
        let results = summary_with(vec![failed("AccountService", "testCreate", 1500.0)]);
        let rendered = render(&results);
        assert!(rendered.contains(
            "<failure type=\"System.AssertException\" message=\"Assertion Failed\">\
             Class.AccountService.testCreate: line 4</failure>"
        ));
    }

    #[test]
    fn coverage_case_without_warnings_has_no_failure() {
        let results = summary_with(vec![passed("A", "one", 10.0)]);
        let rendered = render(&results);
        assert!(rendered.contains(
            "<testcase name=\"testCoverage\" classname=\"ApexCodeCoverageTest\" time=\"0\"/>"
        ));
        let expected = coverage::summary(&results.coverage);
        assert!(rendered.contains(&format!("<system-out><![CDATA[{}]]></system-out>", expected)));
    }

    #[test]
    fn coverage_case_uses_first_global_warning_as_message() {
        let mut results = summary_with(vec![passed("A", "one", 10.0)]);
        results.coverage_warnings = vec![
            CoverageWarning {
                namespace: Some("cv".into()),
                name: Some("LowCoverage".into()),
                message: "Test coverage of selected Apex Class is 10%".into(),
            },
            CoverageWarning {
                namespace: None,
                name: None,
                message: "Average test coverage across all Apex Classes is 60%".into(),
            },
            CoverageWarning {
                namespace: None,
                name: None,
                message: "a later global warning".into(),
            },
        ];
        let rendered = render(&results);
        assert!(rendered.contains(
            "<failure message=\"Average test coverage across all Apex Classes is 60%\"/>"
        ));
        assert!(
            rendered.contains("cv.LowCoverage: Test coverage of selected Apex Class is 10%\n")
        );
    }

    #[test]
    fn coverage_case_falls_back_when_all_warnings_are_named() {
        let mut results = summary_with(vec![passed("A", "one", 10.0)]);
        results.coverage_warnings = vec![CoverageWarning {
            namespace: None,
            name: Some("LowCoverage".into()),
            message: "Test coverage of selected Apex Class is 10%".into(),
        }];
        let rendered = render(&results);
        assert!(rendered.contains("<failure message=\"See Standard Output for failure detail\"/>"));
    }

    #[test]
    fn suite_ends_with_empty_placeholder_streams() {
        let rendered = render(&summary_with(vec![passed("A", "one", 10.0)]));
        assert!(rendered.ends_with("  <system-out/>\n  <system-err/>\n</testsuite>\n"));
    }

    #[test]
    fn round_trip_preserves_counts_and_case_attributes() {
        let results = summary_with(vec![
            passed("AccountService", "testCreate", 250.0),
            failed("AccountService", "testDelete", 1500.0),
        ]);
        let (suite, cases) = parse(&render(&results));
        assert_eq!(suite["name"], "Apex");
        assert_eq!(suite["timestamp"], "2026-08-04T10:00:00");
        assert_eq!(suite["tests"], "3");
        assert_eq!(suite["failures"], "1");
        assert_eq!(cases[0]["time"], "0.25");
        assert_eq!(cases[1]["name"], "testDelete");
        assert_eq!(cases[1]["classname"], "AccountService");
        assert_eq!(cases[1]["time"], "1.5");
    }

    #[test]
    fn rewriting_the_same_document_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let report = XmlReport::new(dir.path().join("reports").join("junit"));
        let doc = build_at(&summary_with(vec![passed("A", "one", 10.0)]), "2026-08-04T10:00:00");

        let first_path = report.write(&doc).unwrap();
        assert!(first_path.ends_with("TEST-Apex.xml"));
        let first = fs::read(&first_path).unwrap();
        let second = fs::read(report.write(&doc).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}

use crate::models::CoverageResult;

/// Render the per-class coverage summary: an aggregate `Total` line first,
/// then one line per class in input order. Classes with no instrumented
/// locations are skipped entirely, including from the aggregate sums.
pub fn summary(coverage: &[CoverageResult]) -> String {
    let mut all_covered: u64 = 0;
    let mut all_total: u64 = 0;
    let mut lines = String::new();
    for result in coverage {
        if result.num_locations == 0 {
            continue;
        }
        let covered = u64::from(result.covered());
        let total = u64::from(result.num_locations);
        all_covered += covered;
        all_total += total;
        lines.push_str(&line(&result.name, covered, total));
    }
    format!("{}\n{}", line("Total", all_covered, all_total), lines)
}

/// One `name: percentage% (covered/total)` line, flagged when under the
/// platform's 75% deployment minimum. Empty when nothing was instrumented.
fn line(name: &str, covered: u64, total: u64) -> String {
    if total == 0 {
        return String::new();
    }
    let percentage = 100 * covered / total;
    format!(
        "{}: {}% ({}/{}){}\n",
        name,
        percentage,
        covered,
        total,
        if percentage < 75 { " below 75%" } else { "" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, total: u32, not_covered: u32) -> CoverageResult {
        CoverageResult {
            name: name.into(),
            num_locations: total,
            num_locations_not_covered: not_covered,
        }
    }

    #[test]
    fn flags_classes_below_the_minimum() {
        let out = summary(&[result("AccountService", 100, 30)]);
        assert!(out.contains("AccountService: 70% (70/100) below 75%\n"));
        assert!(out.contains("Total: 70% (70/100) below 75%\n"));
    }

    #[test]
    fn aggregates_across_classes() {
        let out = summary(&[result("A", 100, 20), result("B", 50, 0)]);
        assert_eq!(out, "Total: 86% (130/150)\n\nA: 80% (80/100)\nB: 100% (50/50)\n");
    }

    #[test]
    fn skips_classes_with_no_locations() {
        let out = summary(&[result("Empty", 0, 0), result("A", 40, 10)]);
        assert!(!out.contains("Empty"));
        // The aggregate only accumulates over emitted classes.
        assert!(out.starts_with("Total: 75% (30/40)\n"));
    }

    #[test]
    fn percentage_truncates_toward_zero() {
        // 2/3 covered is 66.6..%, reported as 66%.
        let out = summary(&[result("A", 3, 1)]);
        assert!(out.contains("A: 66% (2/3) below 75%\n"));
    }
}

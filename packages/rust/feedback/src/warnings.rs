//! Advisory messages for quality checks that completed but failed.

use std::collections::BTreeMap;

use questioner_shared::TestResults;
use questioner_shared::results::{LintResults, Step};

use crate::{count_line, indent, pluralize};

/// Collect a message for every completed check whose `failed` flag is set.
pub(crate) fn collect(results: &TestResults, indentation: usize) -> BTreeMap<Step, String> {
    let complete = &results.complete;
    let mut warnings = BTreeMap::new();

    if results.failed_linting == Some(true) {
        if results.completed_steps.contains(&Step::Checkstyle) {
            if let Some(checkstyle) = &complete.checkstyle {
                warnings.insert(Step::Checkstyle, lint_warning(checkstyle, "checkstyle"));
            }
        } else if results.completed_steps.contains(&Step::Ktlint) {
            if let Some(ktlint) = &complete.ktlint {
                warnings.insert(Step::Ktlint, lint_warning(ktlint, "ktlint"));
            }
        }
    }

    if let Some(complexity) = complete.complexity.as_ref().filter(|c| c.failed) {
        let body = format!(
            "The solution has {} code {}.\nYour submission has {}.",
            complexity.solution,
            pluralize("path", complexity.solution),
            complexity.submission
        );
        warnings.insert(
            Step::Complexity,
            format!("Your submission is a bit too complicated:\n{}", indent(&body, indentation)),
        );
    }

    if let Some(class_size) = complete.class_size.as_ref().filter(|c| c.failed) {
        let body = format!(
            "The solution is {} {}.\nYour submission is {}.",
            class_size.solution,
            pluralize("byte", class_size.solution),
            class_size.submission
        );
        warnings.insert(
            Step::ClassSize,
            format!("Your submission class is too large:\n{}", indent(&body, indentation)),
        );
    }

    if let Some(features) = complete.features.as_ref().filter(|f| f.failed) {
        warnings.insert(
            Step::Features,
            format!(
                "Your submission generated design warnings:\n{}",
                indent(&features.errors.join("\n"), indentation)
            ),
        );
    }

    if let Some(line_count) = complete.line_count.as_ref().filter(|l| l.failed) {
        let solution = line_count.solution.source;
        let body = format!(
            "The solution has {solution} source {}.\nYour submission has {}.",
            pluralize("line", solution),
            line_count.submission.source
        );
        warnings.insert(
            Step::LineCount,
            format!("Your submission is too long:\n{}", indent(&body, indentation)),
        );
    }

    if let Some(coverage) = complete.coverage.as_ref().filter(|c| c.failed) {
        let body = format!(
            "You have {} more lines of unexecuted code than the solution.\nWhich exceeds the limit of {}.",
            coverage.increase, coverage.limit
        );
        warnings.insert(
            Step::Coverage,
            format!("Your submission contains unexecuted code:\n{}", indent(&body, indentation)),
        );
    }

    if let Some(count) = complete.execution_count.as_ref().filter(|c| c.failed) {
        let body = format!(
            "The solution executed {} {} to complete the tests.\nYour submission took {} ({}%).",
            count.solution,
            pluralize("line", count.solution),
            count.submission,
            percent(count.submission, count.solution)
        );
        warnings.insert(
            Step::ExecutionCount,
            format!("Your submission is too inefficient:\n{}", indent(&body, indentation)),
        );
    }

    if let Some(memory) = complete.memory_allocation.as_ref().filter(|m| m.failed) {
        let body = format!(
            "The solution allocated {} bytes to complete the tests.\nYour submission needed {} ({}%).",
            memory.solution,
            memory.submission,
            percent(memory.submission, memory.solution)
        );
        warnings.insert(
            Step::MemoryAllocation,
            format!("Your submission uses too much memory:\n{}", indent(&body, indentation)),
        );
    }

    if let Some(recursion) = complete.recursion.as_ref().filter(|r| r.failed) {
        warnings.insert(
            Step::Recursion,
            format!(
                "Your submission did not implement required recursive methods recursively: {}",
                recursion.missing_methods.join(", ")
            ),
        );
    }

    warnings
}

fn lint_warning(lint: &LintResults, checker: &str) -> String {
    let output = lint
        .errors
        .iter()
        .map(|error| {
            let location = &error.location;
            let prefix = if location.source.is_empty() {
                "  Line ".to_string()
            } else {
                format!("  {}:", location.source)
            };
            format!("{prefix}{}: {checker} error: {}", location.line, error.text())
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Your submission has {checker} errors:\n{output}\n{}",
        count_line(lint.errors.len())
    )
}

/// Submission as a rounded percentage of the solution.
fn percent(submission: u64, solution: u64) -> u64 {
    (submission as f64 / solution.max(1) as f64 * 100.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use questioner_shared::results::{
        Comparison, CoverageComparison, FeaturesComparison, LineCountComparison, LineCounts,
        LintError, RecursionComparison, SourceLocation,
    };

    fn failing(solution: u64, submission: u64) -> Option<Comparison> {
        Some(Comparison {
            solution,
            submission,
            failed: true,
            ..Default::default()
        })
    }

    #[test]
    fn passing_checks_produce_no_warnings() {
        let mut results = TestResults::default();
        results.complete.complexity = Some(Comparison {
            solution: 2,
            submission: 2,
            ..Default::default()
        });
        assert!(collect(&results, 2).is_empty());
    }

    #[test]
    fn complexity_warning_text() {
        let mut results = TestResults::default();
        results.complete.complexity = failing(1, 4);
        let warnings = collect(&results, 2);
        assert_eq!(
            warnings[&Step::Complexity],
            "Your submission is a bit too complicated:\n  The solution has 1 code path.\n  Your submission has 4."
        );
    }

    #[test]
    fn execution_count_reports_percentage() {
        let mut results = TestResults::default();
        results.complete.execution_count = failing(200, 500);
        let warnings = collect(&results, 2);
        assert!(warnings[&Step::ExecutionCount].contains("The solution executed 200 lines"));
        assert!(warnings[&Step::ExecutionCount].contains("Your submission took 500 (250%)."));
    }

    #[test]
    fn lint_warnings_need_failed_linting_flag() {
        let mut results = TestResults::default();
        results.completed_steps.push(Step::Checkstyle);
        results.complete.checkstyle = Some(LintResults {
            errors: vec![LintError {
                location: SourceLocation {
                    source: String::new(),
                    line: 7,
                    column: 3,
                },
                message: Some("Line is longer than 100 characters.".into()),
                ..Default::default()
            }],
        });
        assert!(collect(&results, 2).is_empty());

        results.failed_linting = Some(true);
        let warnings = collect(&results, 2);
        assert_eq!(
            warnings[&Step::Checkstyle],
            "Your submission has checkstyle errors:\n  Line 7: checkstyle error: Line is longer than 100 characters.\n1 error"
        );
    }

    #[test]
    fn design_coverage_and_recursion_warnings() {
        let mut results = TestResults::default();
        results.complete.features = Some(FeaturesComparison {
            errors: vec!["Don't use a for loop".into(), "Don't use arrays".into()],
            failed: true,
        });
        results.complete.coverage = Some(CoverageComparison {
            increase: 3,
            limit: 1.0,
            failed: true,
            ..Default::default()
        });
        results.complete.recursion = Some(RecursionComparison {
            missing_methods: vec!["sum".into(), "count".into()],
            failed: true,
        });
        let warnings = collect(&results, 2);
        assert_eq!(
            warnings[&Step::Features],
            "Your submission generated design warnings:\n  Don't use a for loop\n  Don't use arrays"
        );
        assert!(warnings[&Step::Coverage].contains("3 more lines of unexecuted code"));
        assert!(warnings[&Step::Coverage].ends_with("Which exceeds the limit of 1."));
        assert!(warnings[&Step::Recursion].ends_with("recursively: sum, count"));
    }

    #[test]
    fn class_size_warning_text() {
        let mut results = TestResults::default();
        results.complete.class_size = failing(1, 900);
        let warnings = collect(&results, 2);
        assert_eq!(
            warnings[&Step::ClassSize],
            "Your submission class is too large:\n  The solution is 1 byte.\n  Your submission is 900."
        );
    }

    #[test]
    fn line_count_warning_uses_source_lines() {
        let mut results = TestResults::default();
        results.complete.line_count = Some(LineCountComparison {
            solution: LineCounts {
                source: 5,
                comment: 2,
                blank: 1,
            },
            submission: LineCounts {
                source: 19,
                comment: 0,
                blank: 4,
            },
            failed: true,
            ..Default::default()
        });
        let warnings = collect(&results, 2);
        assert_eq!(
            warnings[&Step::LineCount],
            "Your submission is too long:\n  The solution has 5 source lines.\n  Your submission has 19."
        );
    }

    #[test]
    fn memory_allocation_warning_reports_percentage() {
        let mut results = TestResults::default();
        results.complete.memory_allocation = failing(400, 1000);
        let warnings = collect(&results, 2);
        assert_eq!(
            warnings[&Step::MemoryAllocation],
            "Your submission uses too much memory:\n  The solution allocated 400 bytes to complete the tests.\n  Your submission needed 1000 (250%)."
        );
    }
}

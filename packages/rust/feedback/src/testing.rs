//! Failing-test explanation for runs that did not succeed.

use questioner_shared::results::{TestResult, TestType, TestingResult};

use crate::indent;

/// The smallest set of test cases that reproduces one failure.
///
/// The simplest failure is the failing case with the shortest explanation.
/// Static method failures stand alone; otherwise every case that shared its
/// receiver is returned in execution order.
pub fn simplify_test_result(testing: &TestingResult) -> Vec<&TestResult> {
    if testing.passed {
        return Vec::new();
    }

    let simplest = testing
        .tests
        .iter()
        .filter(|test| !test.passed)
        .filter_map(|test| {
            let explanation = test.explanation.as_deref().filter(|e| !e.is_empty())?;
            Some((test, explanation.len()))
        })
        .min_by_key(|(_, len)| *len)
        .map(|(test, _)| test);

    let Some(simplest) = simplest else {
        return Vec::new();
    };

    if simplest.test_type == TestType::StaticMethod {
        return vec![simplest];
    }

    let mut related: Vec<&TestResult> = testing
        .tests
        .iter()
        .filter(|test| test.runner_id == simplest.runner_id)
        .collect();
    related.sort_by_key(|test| test.step_count);
    related
}

/// Build the explanation for a failing run, or `None` when no failing case
/// carries an explanation.
pub(crate) fn failure_message(
    testing: &TestingResult,
    failure_count: u32,
    indentation: usize,
) -> Option<String> {
    let failures = simplify_test_result(testing);
    let last = failures.last()?;

    let explanation = last.explanation.as_deref().unwrap_or("");
    let mut message = format!(
        "Ran {} test{}. Stopped after finding {failure_count} failure{}{}\n\n{explanation}",
        testing.test_count,
        if testing.test_count > 1 { "s" } else { "" },
        if failure_count > 1 { "s" } else { "" },
        if failure_count > 1 { ". Here is one:" } else { ":" },
    );

    if let Some(trace) = last.submission_stack_trace.as_deref().filter(|t| !t.is_empty()) {
        message.push_str(&format!(
            "\n\nSubmission exception stack trace:\n{}",
            indent(trace, indentation)
        ));
    }

    let output: String = failures
        .iter()
        .filter_map(|test| test.output.as_deref())
        .collect::<String>()
        .trim()
        .to_string();
    let output_differs = last.differs.iter().any(|differ| differ.is_output());
    if !output.is_empty() && !output_differs {
        message.push_str(&format!("\n\nTesting output:\n{output}"));
    }

    if failures.len() > 1 {
        let sequence = failures
            .iter()
            .map(|test| test.method_call.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        message.push_str(&format!(
            "\n\nTesting method sequence:\n{}",
            indent(&sequence, indentation)
        ));
    }

    tracing::trace!(cases = failures.len(), "built test failure message");
    Some(message)
}

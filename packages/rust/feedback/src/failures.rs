//! Messages for runs that stopped before testing could finish.

use questioner_shared::TestResults;
use questioner_shared::results::{CompilationError, LintResults, SourceLocation, Step};

use crate::{TerminalOutput, count_line, indent};

/// Pick the message for a timed-out or failed run.
///
/// Returns `None` when the failed steps leave testing results usable.
pub(crate) fn hard_failure(
    results: &TestResults,
    contents: &str,
    indentation: usize,
) -> Option<TerminalOutput> {
    let failed = &results.failed;

    if results.timeout {
        return Some(TerminalOutput::error(
            true,
            format!(
                "Testing your submission timed out.\n{}",
                indent(
                    "Check for unterminated loops.\nOr your algorithm may be too slow.",
                    indentation
                )
            ),
        ));
    }
    if failed.template_submission.is_some() {
        return Some(TerminalOutput::error(
            true,
            "Templating failed. Please report a bug.",
        ));
    }
    if let Some(checkstyle) = &failed.checkstyle {
        return Some(TerminalOutput::error(false, lint_failure(checkstyle, "checkstyle")));
    }
    if let Some(ktlint) = &failed.ktlint {
        return Some(TerminalOutput::error(false, lint_failure(ktlint, "ktlint")));
    }
    if let Some(compile) = &failed.compile_submission {
        let output = compile
            .errors
            .iter()
            .map(|error| compile_diagnostic(error, contents))
            .collect::<Vec<_>>()
            .join("\n");
        return Some(TerminalOutput::error(
            false,
            format!("{output}\n{}", count_line(compile.errors.len())),
        ));
    }

    let submission_error = failed
        .check_initial_submission
        .as_ref()
        .or(failed.check_compiled_submission.as_ref())
        .or(failed.check_executed_submission.as_ref())
        .or(failed.features.as_ref())
        .or(failed.class_size.as_ref());
    if let Some(message) = submission_error {
        return Some(TerminalOutput::error(
            false,
            format!("Your submission had errors:\n{}", indent(message, indentation)),
        ));
    }
    if let Some(message) = &failed.complexity {
        return Some(TerminalOutput::error(
            false,
            format!(
                "Your submission was too complex to test:\n{}",
                indent(message, indentation)
            ),
        ));
    }
    if let Some(message) = &failed.line_count {
        return Some(TerminalOutput::error(
            false,
            format!(
                "Your submission was too long to test:\n{}",
                indent(message, indentation)
            ),
        ));
    }
    if !results.completed_steps.contains(&Step::Testing) {
        return Some(TerminalOutput::error(
            true,
            "Invalid testing result. If this happens repeatedly, please report a bug.",
        ));
    }
    None
}

/// `"Line 3"` for the submission itself, `"Other.java:3"` for other files.
pub(crate) fn location_prefix(location: &SourceLocation) -> String {
    if location.source.is_empty() {
        format!("Line {}", location.line)
    } else {
        format!("{}:{}", location.source, location.line)
    }
}

fn lint_failure(lint: &LintResults, checker: &str) -> String {
    let output = lint
        .errors
        .iter()
        .map(|error| {
            format!(
                "{}: {checker} error: {}",
                location_prefix(&error.location),
                error.text()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("{output}\n{}", count_line(lint.errors.len()))
}

fn compile_diagnostic(error: &CompilationError, contents: &str) -> String {
    let Some(location) = &error.location else {
        return error.message.clone();
    };

    let mut message_lines = error.message.split('\n');
    let first = message_lines.next().unwrap_or("");
    let rest = message_lines
        .filter(|line| {
            !(location.source.is_empty() && line.trim().starts_with("location: class"))
        })
        .collect::<Vec<_>>()
        .join("\n");

    let source_line = usize::try_from(location.line)
        .ok()
        .and_then(|line| line.checked_sub(1))
        .and_then(|index| contents.split('\n').nth(index))
        .filter(|line| !line.is_empty());

    let mut out = format!("{}: error: {first}\n", location_prefix(location));
    if let Some(line) = source_line {
        let column = usize::try_from(location.column.max(0)).unwrap_or(0);
        out.push_str(line);
        out.push('\n');
        out.push_str(&" ".repeat(column));
        out.push('^');
    }
    if !rest.is_empty() {
        out.push('\n');
        out.push_str(&rest);
    }
    out
}

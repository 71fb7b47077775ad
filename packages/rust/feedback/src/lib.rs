//! Turn a grading report into the single message a student sees.
//!
//! [`terminal_output`] walks a fixed decision procedure: hard failures first,
//! then the failing-test explanation, then quality warnings in a fixed
//! priority order ([`WARNING_ORDER`]). The only nondeterminism is the
//! congratulatory phrase, which [`terminal_output_with_rng`] lets callers seed.

mod failures;
mod phrases;
mod testing;
mod warnings;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use questioner_shared::{FeedbackSection, Step, TestResults};

pub use testing::simplify_test_result;

/// Warning keys in the order they are reported when no test failed.
pub const WARNING_ORDER: [Step; 10] = [
    Step::Checkstyle,
    Step::Ktlint,
    Step::Recursion,
    Step::Complexity,
    Step::Features,
    Step::LineCount,
    Step::ExecutionCount,
    Step::MemoryAllocation,
    Step::Coverage,
    Step::ClassSize,
];

const REPORT_BUG: &str =
    "Error printing testing output. If this happens repeatedly, please report a bug.";

// ---------------------------------------------------------------------------
// Options / output
// ---------------------------------------------------------------------------

/// Presentation options for [`terminal_output`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputOptions {
    pub success_message: String,
    /// Only these warnings are reported; `None` reports all.
    pub show_warnings: Option<Vec<Step>>,
    /// Warnings presented as making the submission incorrect.
    pub treat_as_errors: Option<Vec<Step>>,
    /// Warnings shown as a header above a failing-test explanation.
    pub show_with_test_results: Option<Vec<Step>>,
    pub indentation: usize,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self::from(&FeedbackSection::default())
    }
}

impl From<&FeedbackSection> for OutputOptions {
    fn from(section: &FeedbackSection) -> Self {
        Self {
            success_message: section.success_message.clone(),
            show_warnings: None,
            treat_as_errors: None,
            show_with_test_results: None,
            indentation: section.indentation,
        }
    }
}

/// The rendered message plus how a front end should present it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalOutput {
    /// The submission could not be evaluated.
    pub error: bool,
    /// Resubmitting unchanged code may give a different result.
    pub retry: bool,
    pub output: String,
}

impl TerminalOutput {
    fn error(retry: bool, output: impl Into<String>) -> Self {
        Self {
            error: true,
            retry,
            output: output.into(),
        }
    }

    fn message(output: impl Into<String>) -> Self {
        Self {
            error: false,
            retry: false,
            output: output.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Render `results` for the submission `contents`.
pub fn render(results: &TestResults, contents: &str, options: &OutputOptions) -> String {
    terminal_output(results, contents, options).output
}

/// [`render`] with a caller-supplied phrase generator.
pub fn render_with_rng<R: Rng + ?Sized>(
    results: &TestResults,
    contents: &str,
    options: &OutputOptions,
    rng: &mut R,
) -> String {
    terminal_output_with_rng(results, contents, options, rng).output
}

/// Render `results` and classify the message.
pub fn terminal_output(
    results: &TestResults,
    contents: &str,
    options: &OutputOptions,
) -> TerminalOutput {
    terminal_output_with_rng(results, contents, options, &mut rand::thread_rng())
}

/// [`terminal_output`] with a caller-supplied phrase generator.
pub fn terminal_output_with_rng<R: Rng + ?Sized>(
    results: &TestResults,
    contents: &str,
    options: &OutputOptions,
    rng: &mut R,
) -> TerminalOutput {
    let indentation = options.indentation;

    if results.timeout || !results.failed_steps.is_empty() {
        if let Some(output) = failures::hard_failure(results, contents, indentation) {
            return output;
        }
    }

    let Some(testing) = &results.complete.testing else {
        return TerminalOutput::error(
            true,
            "Didn't return a testing result. If this happens repeatedly, please report a bug.",
        );
    };

    let mut warnings = warnings::collect(results, indentation);

    if !results.succeeded {
        let Some(failure_count) = results.failure_count else {
            return TerminalOutput::error(true, REPORT_BUG);
        };
        let Some(message) = testing::failure_message(testing, failure_count, indentation) else {
            return TerminalOutput::error(true, REPORT_BUG);
        };
        warnings.insert(Step::Testing, message);
    }

    if let Some(show) = &options.show_warnings {
        warnings.retain(|step, _| show.contains(step));
    }
    debug!(warnings = ?warnings.keys().collect::<Vec<_>>(), "collected feedback warnings");

    let phrase = phrases::pick(rng);
    if warnings.is_empty() {
        return TerminalOutput::message(format!("{} {phrase}!", options.success_message));
    }

    if let Some(testing) = warnings.get(&Step::Testing) {
        let header = options.show_with_test_results.as_ref().and_then(|shown| {
            WARNING_ORDER
                .iter()
                .filter(|step| shown.contains(step))
                .filter_map(|step| warnings.get(step))
                .last()
        });
        return match header {
            Some(warning) => TerminalOutput::message(format!(
                "Your submission will eventually be considered incorrect because of this error:\n{}\n---\n{testing}",
                indent(warning, indentation)
            )),
            None => TerminalOutput::message(testing.clone()),
        };
    }

    for step in WARNING_ORDER {
        let Some(warning) = warnings.get(&step) else {
            continue;
        };
        let treat_as_error = options
            .treat_as_errors
            .as_ref()
            .is_some_and(|steps| steps.contains(&step));
        let output = if treat_as_error {
            format!(
                "Your code passed the tests, but was considered incorrect because of this error:\n{}",
                indent(warning, indentation)
            )
        } else {
            format!(
                "Your code passed all the tests! {phrase}!\n\nBut we noticed something you could improve:\n{}",
                indent(warning, indentation)
            )
        };
        return TerminalOutput::message(output);
    }

    TerminalOutput::error(true, REPORT_BUG)
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Indent every non-blank line by `width` spaces.
pub(crate) fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn pluralize(word: &str, count: u64) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}

/// `"1 error"` or `"<n> errors"`.
pub(crate) fn count_line(count: usize) -> String {
    format!("{count} {}", pluralize("error", count as u64))
}

//! The grading report produced by running a submission against a question.
//!
//! These types mirror the grading engine's JSON output (camelCase keys) and are
//! read-only once produced. Every section is optional because a run stops at the
//! first failing step.

use serde::{Deserialize, Serialize};

use crate::types::Language;

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One step of the grading run. Also used as the key for warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    CheckInitialSubmission,
    TemplateSubmission,
    CompileSubmission,
    Checkstyle,
    Ktlint,
    CheckCompiledSubmission,
    ClassSize,
    Complexity,
    Features,
    LineCount,
    Partial,
    CheckExecutedSubmission,
    Recursion,
    #[serde(rename = "executioncount")]
    ExecutionCount,
    MemoryAllocation,
    Testing,
    Coverage,
    ExtraOutput,
}

impl Step {
    /// Every step, in the order the grading engine runs them.
    pub const ALL: [Step; 18] = [
        Step::CheckInitialSubmission,
        Step::TemplateSubmission,
        Step::CompileSubmission,
        Step::Checkstyle,
        Step::Ktlint,
        Step::CheckCompiledSubmission,
        Step::ClassSize,
        Step::Complexity,
        Step::Features,
        Step::LineCount,
        Step::Partial,
        Step::CheckExecutedSubmission,
        Step::Recursion,
        Step::ExecutionCount,
        Step::MemoryAllocation,
        Step::Testing,
        Step::Coverage,
        Step::ExtraOutput,
    ];

    /// Identifier used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckInitialSubmission => "checkInitialSubmission",
            Self::TemplateSubmission => "templateSubmission",
            Self::CompileSubmission => "compileSubmission",
            Self::Checkstyle => "checkstyle",
            Self::Ktlint => "ktlint",
            Self::CheckCompiledSubmission => "checkCompiledSubmission",
            Self::ClassSize => "classSize",
            Self::Complexity => "complexity",
            Self::Features => "features",
            Self::LineCount => "lineCount",
            Self::Partial => "partial",
            Self::CheckExecutedSubmission => "checkExecutedSubmission",
            Self::Recursion => "recursion",
            Self::ExecutionCount => "executioncount",
            Self::MemoryAllocation => "memoryAllocation",
            Self::Testing => "testing",
            Self::Coverage => "coverage",
            Self::ExtraOutput => "extraOutput",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Step {
    type Err = crate::QuestionerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Step::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| crate::QuestionerError::validation(format!("unknown step {s}")))
    }
}

// ---------------------------------------------------------------------------
// TestResults
// ---------------------------------------------------------------------------

/// Full report of one grading run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestResults {
    pub language: Option<Language>,
    pub completed_steps: Vec<Step>,
    pub complete: CompletedTasks,
    pub failed_steps: Vec<Step>,
    pub failed: FailedTasks,
    pub skipped_steps: Vec<Step>,
    pub timeout: bool,
    pub line_count_timeout: bool,
    pub completed: bool,
    pub succeeded: bool,
    pub failed_linting: Option<bool>,
    pub failure_count: Option<u32>,
}

impl TestResults {
    /// The quality gate: whether the run passed every correctness and quality step.
    pub fn passed_quality_gate(&self) -> bool {
        self.complete
            .partial
            .as_ref()
            .is_some_and(|partial| partial.passed_steps.quality)
    }
}

/// Results of steps that ran to completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletedTasks {
    pub compile_submission: Option<serde_json::Value>,
    pub checkstyle: Option<LintResults>,
    pub ktlint: Option<LintResults>,
    pub class_size: Option<Comparison>,
    pub complexity: Option<Comparison>,
    pub features: Option<FeaturesComparison>,
    pub line_count: Option<LineCountComparison>,
    pub partial: Option<PartialCredit>,
    pub recursion: Option<RecursionComparison>,
    pub execution_count: Option<Comparison>,
    pub memory_allocation: Option<Comparison>,
    pub testing: Option<TestingResult>,
    pub coverage: Option<CoverageComparison>,
    pub extra_output: Option<OutputComparison>,
}

/// Messages from steps that failed outright.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FailedTasks {
    pub check_initial_submission: Option<String>,
    pub template_submission: Option<serde_json::Value>,
    pub compile_submission: Option<CompilationFailed>,
    pub checkstyle: Option<LintResults>,
    pub ktlint: Option<LintResults>,
    pub check_compiled_submission: Option<String>,
    pub class_size: Option<String>,
    pub complexity: Option<String>,
    pub features: Option<String>,
    pub line_count: Option<String>,
    pub check_executed_submission: Option<String>,
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Position of a diagnostic in the submitted source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceLocation {
    /// Source file name; empty for the submission itself.
    pub source: String,
    pub line: i64,
    pub column: i64,
}

/// One style-checker diagnostic. Checkstyle reports `message`, ktlint `detail`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LintError {
    pub location: SourceLocation,
    pub message: Option<String>,
    pub detail: Option<String>,
    pub severity: Option<String>,
    pub rule_id: Option<String>,
}

impl LintError {
    /// The diagnostic text, whichever checker produced it.
    pub fn text(&self) -> &str {
        self.message
            .as_deref()
            .or(self.detail.as_deref())
            .unwrap_or("")
    }
}

/// Output of a style checker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LintResults {
    pub errors: Vec<LintError>,
}

/// One compiler diagnostic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilationError {
    pub location: Option<SourceLocation>,
    pub message: String,
}

/// A failed compilation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilationFailed {
    pub errors: Vec<CompilationError>,
}

// ---------------------------------------------------------------------------
// Quality comparisons
// ---------------------------------------------------------------------------

/// Solution-versus-submission measurement with a limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Comparison {
    pub solution: u64,
    pub submission: u64,
    pub limit: f64,
    pub increase: i64,
    pub failed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesComparison {
    pub errors: Vec<String>,
    pub failed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LineCounts {
    pub source: u64,
    pub comment: u64,
    pub blank: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LineCountComparison {
    pub solution: LineCounts,
    pub submission: LineCounts,
    pub limit: f64,
    pub allowance: f64,
    pub increase: i64,
    pub failed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecursionComparison {
    pub missing_methods: Vec<String>,
    pub failed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LineCoverage {
    pub covered: u64,
    pub total: u64,
    pub missed: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageComparison {
    pub solution: LineCoverage,
    pub submission: LineCoverage,
    pub missed: Vec<u64>,
    pub limit: f64,
    pub increase: i64,
    pub failed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputComparison {
    pub solution: u64,
    pub submission: u64,
    pub truncated: bool,
    pub failed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PassedSteps {
    pub compiled: bool,
    pub design: bool,
    pub partially_correct: bool,
    pub fully_correct: bool,
    pub quality: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PassedCount {
    pub passed: u32,
    pub total: u32,
    pub completed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialCredit {
    pub passed_steps: PassedSteps,
    pub passed_test_count: Option<PassedCount>,
    pub passed_mutant_count: Option<PassedCount>,
}

// ---------------------------------------------------------------------------
// Testing
// ---------------------------------------------------------------------------

/// How a test case exercised the submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestType {
    Constructor,
    Initializer,
    #[default]
    Method,
    StaticMethod,
    FactoryMethod,
    CopyConstructor,
}

/// Which part of the observed behavior differed from the solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Differ {
    Stdout,
    Stderr,
    InterleavedOutput,
    Return,
    Threw,
    Parameters,
    VerifierThrew,
    InstanceValidationThrew,
}

impl Differ {
    /// Whether this difference is about captured output.
    pub fn is_output(&self) -> bool {
        matches!(self, Self::Stdout | Self::Stderr | Self::InterleavedOutput)
    }
}

/// One executed test case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    #[serde(rename = "type")]
    pub test_type: TestType,
    #[serde(rename = "runnerID")]
    pub runner_id: u64,
    pub step_count: u64,
    pub method_call: String,
    pub differs: Vec<Differ>,
    pub output_amount: u64,
    pub message: Option<String>,
    pub arguments: Option<String>,
    pub expected: Option<String>,
    pub found: Option<String>,
    pub explanation: Option<String>,
    pub output: Option<String>,
    pub complexity: Option<u64>,
    pub submission_stack_trace: Option<String>,
    pub stdin: Option<String>,
    pub truncated_lines: Option<u64>,
}

/// The `testing` step's result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestingResult {
    pub tests: Vec<TestResult>,
    pub test_count: u32,
    pub completed: bool,
    pub failed_receiver_generation: bool,
    pub passed: bool,
    pub output_amount: u64,
    pub truncated_lines: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_names_match_wire_format() {
        for step in Step::ALL {
            let json = serde_json::to_string(&step).expect("serialize step");
            assert_eq!(json, format!("\"{}\"", step.as_str()));
            assert_eq!(step.as_str().parse::<Step>().unwrap(), step);
        }
        assert!("linting".parse::<Step>().is_err());
    }

    #[test]
    fn parses_engine_report() {
        let json = r#"{
            "language": "java",
            "completedSteps": ["compileSubmission", "checkstyle", "partial", "testing"],
            "failedSteps": [],
            "complete": {
                "partial": {"passedSteps": {"compiled": true, "design": true, "partiallyCorrect": true, "fullyCorrect": true, "quality": true}},
                "testing": {
                    "tests": [{"name": "t", "passed": false, "type": "STATIC_METHOD", "runnerID": 3,
                               "stepCount": 1, "methodCall": "addOne(1)", "differs": ["RETURN"],
                               "outputAmount": 0, "explanation": "expected 2"}],
                    "testCount": 1, "completed": true, "passed": false
                }
            },
            "failed": {},
            "timeout": false,
            "succeeded": false,
            "failureCount": 1
        }"#;
        let results: TestResults = serde_json::from_str(json).expect("parse report");
        assert!(results.passed_quality_gate());
        let testing = results.complete.testing.expect("testing result");
        assert_eq!(testing.tests[0].test_type, TestType::StaticMethod);
        assert_eq!(testing.tests[0].runner_id, 3);
        assert_eq!(testing.tests[0].differs, vec![Differ::Return]);
        assert_eq!(results.failure_count, Some(1));
    }

    #[test]
    fn quality_gate_requires_partial_credit() {
        assert!(!TestResults::default().passed_quality_gate());
    }

    #[test]
    fn lint_error_text_prefers_message() {
        let checkstyle = LintError {
            message: Some("Missing a Javadoc comment.".into()),
            ..Default::default()
        };
        let ktlint = LintError {
            detail: Some("Unexpected indentation".into()),
            ..Default::default()
        };
        assert_eq!(checkstyle.text(), "Missing a Javadoc comment.");
        assert_eq!(ktlint.text(), "Unexpected indentation");
    }
}

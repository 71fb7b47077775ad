//! Independent re-validation of a stored solution.

use chrono::Utc;
use tracing::instrument;

use questioner_engine::GradingEngine;
use questioner_shared::{
    PIPELINE_VERSION, Question, QuestionerError, Result, Solution, ValidationRecord,
};

/// Re-run the question's official tests against `solution`.
///
/// The returned solution is valid exactly when the run passes the quality
/// gate, and carries a fresh validation record either way. Passing a question
/// other than the one the solution answers is a programmer error.
#[instrument(skip_all, fields(original_id = %solution.original_id, path = %question.published.path))]
pub fn validate(
    engine: &dyn GradingEngine,
    solution: &Solution,
    question: &Question,
) -> Result<Solution> {
    let coordinates = &solution.coordinates;
    if question.published.path != coordinates.path
        || question.published.author != coordinates.author
        || !question.published.languages.contains(&coordinates.language)
    {
        return Err(QuestionerError::misuse(format!(
            "question {}/{} does not match solution coordinates {}/{}/{}",
            question.published.author,
            question.published.path,
            coordinates.author,
            coordinates.path,
            coordinates.language
        )));
    }
    if question.testing_settings.is_none() {
        return Err(QuestionerError::validation(format!(
            "question {} has no testing settings",
            question.published.path
        )));
    }

    let results = engine.test(question, coordinates.language, &solution.contents)?;
    let valid = results.passed_quality_gate();
    tracing::debug!(valid, "validated solution");

    Ok(Solution {
        valid,
        validation: Some(ValidationRecord {
            validated_at: Utc::now(),
            question_version: question.published.version.clone(),
            question_hash: question.published.content_hash.clone(),
            pipeline_version: PIPELINE_VERSION.to_string(),
        }),
        ..solution.clone()
    })
}

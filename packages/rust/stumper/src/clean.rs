//! Normalize a scraped candidate into a corpus [`Solution`].
//!
//! Cleaning strips comments and assertion messages, checks for bad words,
//! reformats with the language's formatter, and removes the template again so
//! that only the student's own code is stored.

use tracing::instrument;

use questioner_engine::GradingEngine;
use questioner_shared::{Candidate, Language, Question, QuestionerError, Result, Solution};

use crate::bad_words::BadWordCache;

pub const TEMPLATE_START: &str = "// TEMPLATE_START";
pub const TEMPLATE_END: &str = "// TEMPLATE_END";

/// Clean `candidate` into an unvalidated solution.
#[instrument(skip_all, fields(original_id = %candidate.original_id, language = %candidate.language))]
pub fn clean(
    engine: &dyn GradingEngine,
    bad_words: &BadWordCache,
    candidate: &Candidate<'_>,
) -> Result<Solution> {
    let question = candidate.question;
    let language = candidate.language;
    let template = question.template(language);

    let stripped = engine.strip_comments(language, &candidate.contents)?;
    let templated = template_submission(engine, question, language, &stripped)?;
    let cleaned = engine.strip_assertion_messages(language, &templated)?;

    let has_bad_words = bad_words.has_bad_words(engine, question, language, &cleaned)?;

    let formatted = engine.format(language, &cleaned)?;
    let contents = de_template(&formatted, template.is_some())?;

    tracing::debug!(has_bad_words, "cleaned candidate");
    Ok(Solution::cleaned(
        candidate.submitted_at,
        contents,
        candidate.contents_hash.clone(),
        has_bad_words,
        candidate.original_id.clone(),
        candidate.coordinates(),
    ))
}

/// Merge `contents` into the question's template for `language`, if it has one.
pub(crate) fn template_submission(
    engine: &dyn GradingEngine,
    question: &Question,
    language: Language,
    contents: &str,
) -> Result<String> {
    match question.template(language) {
        Some(template) => engine.template(language, template, &wrap_template(contents)),
        None => Ok(contents.to_string()),
    }
}

/// Surround `contents` with template markers.
pub fn wrap_template(contents: &str) -> String {
    format!("{TEMPLATE_START}\n{contents}\n{TEMPLATE_END} \n")
}

/// Keep only the lines strictly between the template markers, with common
/// indentation removed. Without a template `contents` is returned unchanged.
pub fn de_template(contents: &str, templated: bool) -> Result<String> {
    if !templated {
        return Ok(contents.to_string());
    }

    let lines: Vec<&str> = contents.lines().collect();
    let start = lines
        .iter()
        .position(|line| line.trim() == TEMPLATE_START)
        .ok_or_else(|| QuestionerError::validation("template start marker not found"))?;
    let end = lines
        .iter()
        .skip(start + 1)
        .position(|line| line.trim() == TEMPLATE_END)
        .map(|offset| start + 1 + offset)
        .ok_or_else(|| QuestionerError::validation("template end marker not found"))?;

    Ok(trim_indent(&lines[start + 1..end]))
}

/// Drop leading and trailing blank lines and the smallest common indentation.
fn trim_indent(lines: &[&str]) -> String {
    let first = lines.iter().position(|line| !line.trim().is_empty());
    let last = lines.iter().rposition(|line| !line.trim().is_empty());
    let (Some(first), Some(last)) = (first, last) else {
        return String::new();
    };
    let body = &lines[first..=last];

    let margin = body
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    body.iter()
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                line.get(margin..).unwrap_or_else(|| line.trim_start())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

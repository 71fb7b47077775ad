//! Core domain types for questions, submissions, and curated solutions.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Version stamped into validation records.
pub const PIPELINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// SHA-256 hex digest of text content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Source language of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Java,
    Kotlin,
}

impl Language {
    /// Lowercase identifier used on the wire and in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Java => "java",
            Self::Kotlin => "kotlin",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = crate::QuestionerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "java" => Ok(Self::Java),
            "kotlin" => Ok(Self::Kotlin),
            other => Err(crate::QuestionerError::validation(format!(
                "invalid language {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Question
// ---------------------------------------------------------------------------

/// Identity of a question in a given language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinates {
    pub language: Language,
    pub path: String,
    pub author: String,
}

/// Metadata published alongside a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedMetadata {
    /// Display name.
    pub name: String,
    /// Question slug.
    pub path: String,
    /// Author email.
    pub author: String,
    /// Published version string.
    pub version: String,
    /// Hash of the question definition; changes with every new version.
    pub content_hash: String,
    /// Languages the question can be solved in.
    #[serde(default)]
    pub languages: Vec<Language>,
}

/// A published exercise, as produced by the authoring parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub published: PublishedMetadata,
    /// Settings handed to the grading engine when running the official tests.
    #[serde(default)]
    pub testing_settings: Option<serde_json::Value>,
    /// Per-language template the submission is merged into.
    #[serde(default)]
    pub templates: BTreeMap<Language, String>,
    /// Per-language reference solution.
    #[serde(default)]
    pub correct: BTreeMap<Language, String>,
}

impl Question {
    /// Template for `language`, if the question uses one.
    pub fn template(&self, language: Language) -> Option<&str> {
        self.templates.get(&language).map(String::as_str)
    }

    /// Reference solution for `language`.
    pub fn correct(&self, language: Language) -> Option<&str> {
        self.correct.get(&language).map(String::as_str)
    }

    /// Coordinates of this question in `language`.
    pub fn coordinates(&self, language: Language) -> Coordinates {
        Coordinates {
            language,
            path: self.published.path.clone(),
            author: self.published.author.clone(),
        }
    }

    /// Whether `coordinates` name this question.
    pub fn matches(&self, coordinates: &Coordinates) -> bool {
        self.published.path == coordinates.path
            && self.published.author == coordinates.author
            && self.published.languages.contains(&coordinates.language)
    }
}

// ---------------------------------------------------------------------------
// Submission / Candidate
// ---------------------------------------------------------------------------

/// A graded submission as received from the grading front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub contents: String,
    pub language: Language,
    /// Link back to the scraped record this submission came from.
    #[serde(default, rename = "originalID", skip_serializing_if = "Option::is_none")]
    pub original_id: Option<String>,
}

/// A raw scraped submission awaiting cleaning.
#[derive(Debug, Clone)]
pub struct Candidate<'q> {
    pub submitted_at: DateTime<Utc>,
    pub contents: String,
    pub original_id: String,
    pub question: &'q Question,
    pub language: Language,
    /// Hash of `contents`, computed once.
    pub contents_hash: String,
}

impl<'q> Candidate<'q> {
    pub fn new(
        submitted_at: DateTime<Utc>,
        contents: impl Into<String>,
        original_id: impl Into<String>,
        question: &'q Question,
        language: Language,
    ) -> Self {
        let contents = contents.into();
        let contents_hash = content_hash(&contents);
        Self {
            submitted_at,
            contents,
            original_id: original_id.into(),
            question,
            language,
            contents_hash,
        }
    }

    /// Coordinates of the question this candidate answers.
    pub fn coordinates(&self) -> Coordinates {
        self.question.coordinates(self.language)
    }
}

// ---------------------------------------------------------------------------
// Solution
// ---------------------------------------------------------------------------

/// Hashes of the raw and cleaned contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hashes {
    pub original: String,
    pub cleaned: String,
}

/// Stamp written by an independent validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRecord {
    pub validated_at: DateTime<Utc>,
    pub question_version: String,
    pub question_hash: String,
    pub pipeline_version: String,
}

/// A cleaned, hashed corpus entry derived from a [`Candidate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    pub submitted_at: DateTime<Utc>,
    pub contents: String,
    pub hashes: Hashes,
    pub has_bad_words: bool,
    #[serde(rename = "originalID")]
    pub original_id: String,
    pub coordinates: Coordinates,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRecord>,
    #[serde(default)]
    pub processed: bool,
    /// Random value used to shuffle solutions deterministically in queries.
    pub random_tiebreak: i32,
}

impl Solution {
    /// Build a freshly cleaned, not yet validated solution.
    pub fn cleaned(
        submitted_at: DateTime<Utc>,
        contents: String,
        original_hash: String,
        has_bad_words: bool,
        original_id: String,
        coordinates: Coordinates,
    ) -> Self {
        let cleaned = content_hash(&contents);
        Self {
            submitted_at,
            contents,
            hashes: Hashes {
                original: original_hash,
                cleaned,
            },
            has_bad_words,
            original_id,
            coordinates,
            valid: false,
            validation: None,
            processed: false,
            random_tiebreak: rand::random(),
        }
    }
}

// ---------------------------------------------------------------------------
// ValidatorOptions
// ---------------------------------------------------------------------------

/// Options for one validate/calibrate request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorOptions {
    pub max_mutation_count: u32,
    pub retries: u32,
    pub verbose: bool,
    pub root_directory: PathBuf,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            max_mutation_count: 256,
            retries: 4,
            verbose: false,
            root_directory: PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn question() -> Question {
        Question {
            published: PublishedMetadata {
                name: "Add One".into(),
                path: "add-one".into(),
                author: "challen@illinois.edu".into(),
                version: "2024.1.0".into(),
                content_hash: "abc123".into(),
                languages: vec![Language::Java, Language::Kotlin],
            },
            testing_settings: None,
            templates: BTreeMap::new(),
            correct: BTreeMap::from([(Language::Java, "int addOne(int x) { return x + 1; }".into())]),
        }
    }

    #[test]
    fn content_hash_is_sha256() {
        let hash = content_hash("hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn candidate_hashes_contents() {
        let question = question();
        let candidate = Candidate::new(Utc::now(), "x", "id-1", &question, Language::Java);
        assert_eq!(candidate.contents_hash, content_hash("x"));
        assert_eq!(candidate.coordinates().path, "add-one");
    }

    #[test]
    fn question_matches_coordinates() {
        let question = question();
        assert!(question.matches(&question.coordinates(Language::Kotlin)));

        let mut other = question.coordinates(Language::Java);
        other.author = "someone@illinois.edu".into();
        assert!(!question.matches(&other));
    }

    #[test]
    fn question_without_languages_matches_nothing() {
        let mut question = question();
        let coordinates = question.coordinates(Language::Java);
        question.published.languages.clear();
        assert!(!question.matches(&coordinates));
    }

    #[test]
    fn language_parses_and_serializes_lowercase() {
        assert_eq!("kotlin".parse::<Language>().unwrap(), Language::Kotlin);
        assert!("scala".parse::<Language>().is_err());
        assert_eq!(serde_json::to_string(&Language::Java).unwrap(), r#""java""#);
    }

    #[test]
    fn solution_serializes_with_original_id_key() {
        let question = question();
        let solution = Solution::cleaned(
            Utc::now(),
            "int addOne(int x) { return x + 1; }".into(),
            "raw".into(),
            false,
            "scraped-1".into(),
            question.coordinates(Language::Java),
        );
        assert!(!solution.valid);
        let json = serde_json::to_string(&solution).expect("serialize");
        assert!(json.contains(r#""originalID":"scraped-1""#));
        assert!(json.contains(r#""hasBadWords":false"#));
    }

    #[test]
    fn submission_reads_optional_original_id() {
        let json = r#"{"contents":"x","language":"java"}"#;
        let submission: Submission = serde_json::from_str(json).expect("parse");
        assert!(submission.original_id.is_none());

        let json = r#"{"contents":"x","language":"java","originalID":"abc"}"#;
        let submission: Submission = serde_json::from_str(json).expect("parse");
        assert_eq!(submission.original_id.as_deref(), Some("abc"));
    }
}

//! Harvest real student solutions into a curated, validated corpus.
//!
//! A graded submission that passed the quality gate becomes a [`Candidate`],
//! is cleaned into a [`Solution`], deduplicated against the store, persisted
//! unvalidated, and then independently re-validated before being marked valid.
//!
//! The existence checks, cleaning, and writes are not atomic. Concurrent
//! ingestion of the same content is resolved by the store's unique indexes,
//! whose rejections are reported as [`IngestOutcome::Duplicate`].

mod bad_words;
mod clean;
mod validate;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use questioner_engine::GradingEngine;
use questioner_shared::{Candidate, Question, Result, Submission, TestResults};
use questioner_storage::Storage;

pub use bad_words::BadWordCache;
pub use clean::{TEMPLATE_END, TEMPLATE_START, clean, de_template, wrap_template};
pub use validate::validate;

/// Why a submission was not ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The grading run did not pass the quality gate.
    QualityGate,
    /// The submission has no scraped record to link back to.
    MissingOriginalId,
    /// Cleaning failed; nothing was written.
    CleanFailed,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::QualityGate => "did not pass the quality gate",
            Self::MissingOriginalId => "no original ID",
            Self::CleanFailed => "cleaning failed",
        })
    }
}

/// Result of [`Stumper::add_stumper_solution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Skipped(SkipReason),
    /// An equivalent solution is already stored.
    Duplicate,
    /// The solution was written; `valid` reports the independent validation.
    Stored { valid: bool },
}

/// Counts from one [`Stumper::revalidate_pending`] batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevalidateSummary {
    pub checked: usize,
    pub valid: usize,
    pub invalid: usize,
    pub missing_question: usize,
    pub failed: usize,
}

/// The ingestion pipeline bound to a store and an engine.
pub struct Stumper {
    store: Storage,
    engine: Arc<dyn GradingEngine>,
    bad_words: BadWordCache,
}

impl Stumper {
    pub fn new(store: Storage, engine: Arc<dyn GradingEngine>) -> Self {
        Self {
            store,
            engine,
            bad_words: BadWordCache::new(),
        }
    }

    pub fn store(&self) -> &Storage {
        &self.store
    }

    /// Ingest one graded submission.
    ///
    /// Only submissions that passed the quality gate and carry an original ID
    /// are considered. Per-item cleaning and validation failures are logged
    /// and reported in the outcome; storage failures other than duplicates
    /// are returned.
    #[instrument(skip_all, fields(path = %question.published.path, language = %submission.language))]
    pub async fn add_stumper_solution(
        &self,
        submitted_at: DateTime<Utc>,
        submission: &Submission,
        results: &TestResults,
        question: &Question,
    ) -> Result<IngestOutcome> {
        if !results.passed_quality_gate() {
            return Ok(IngestOutcome::Skipped(SkipReason::QualityGate));
        }
        let Some(original_id) = submission.original_id.as_deref() else {
            return Ok(IngestOutcome::Skipped(SkipReason::MissingOriginalId));
        };

        let candidate = Candidate::new(
            submitted_at,
            submission.contents.as_str(),
            original_id,
            question,
            submission.language,
        );
        let coordinates = candidate.coordinates();
        if self.store.exists_original_id(original_id).await?
            || self
                .store
                .exists_original_hash(&coordinates, &candidate.contents_hash)
                .await?
        {
            return Ok(IngestOutcome::Duplicate);
        }

        let solution = match clean(self.engine.as_ref(), &self.bad_words, &candidate) {
            Ok(solution) => solution,
            Err(e) => {
                warn!(original_id, error = %e, "failed to clean candidate");
                return Ok(IngestOutcome::Skipped(SkipReason::CleanFailed));
            }
        };
        if self
            .store
            .exists_cleaned_hash(&coordinates, &solution.hashes.cleaned)
            .await?
        {
            return Ok(IngestOutcome::Duplicate);
        }

        match self.store.upsert_solution(&solution).await {
            Ok(()) => {}
            Err(e) if e.is_duplicate() => return Ok(IngestOutcome::Duplicate),
            Err(e) => return Err(e),
        }

        let validated = match validate(self.engine.as_ref(), &solution, question) {
            Ok(validated) => validated,
            Err(e) => {
                warn!(original_id, error = %e, "failed to validate solution");
                return Ok(IngestOutcome::Stored { valid: false });
            }
        };
        match self.store.upsert_solution(&validated).await {
            Ok(()) => {}
            Err(e) if e.is_duplicate() => return Ok(IngestOutcome::Duplicate),
            Err(e) => return Err(e),
        }

        info!(original_id, valid = validated.valid, has_bad_words = validated.has_bad_words, "stored solution");
        Ok(IngestOutcome::Stored {
            valid: validated.valid,
        })
    }

    /// Validate up to `limit` stored solutions that have never been validated.
    ///
    /// Each solution is matched to its question by coordinates. Failures are
    /// logged and counted, and the batch continues.
    #[instrument(skip_all, fields(limit))]
    pub async fn revalidate_pending(
        &self,
        questions: &[Question],
        limit: usize,
    ) -> Result<RevalidateSummary> {
        let mut summary = RevalidateSummary::default();
        let mut pending = self.store.get_unvalidated(limit);

        while let Some(mut bound) = pending.next().await? {
            summary.checked += 1;
            let coordinates = &bound.solution.coordinates;
            let Some(question) = questions.iter().find(|q| q.matches(coordinates)) else {
                warn!(original_id = %bound.solution.original_id, path = %coordinates.path, "no question for solution");
                summary.missing_question += 1;
                continue;
            };

            let validated = match validate(self.engine.as_ref(), &bound.solution, question) {
                Ok(validated) => validated,
                Err(e) => {
                    warn!(original_id = %bound.solution.original_id, error = %e, "revalidation failed");
                    summary.failed += 1;
                    continue;
                }
            };
            let valid = validated.valid;
            bound.solution = validated;
            if let Err(e) = bound.save().await {
                warn!(original_id = %bound.solution.original_id, error = %e, "failed to save revalidated solution");
                summary.failed += 1;
                continue;
            }
            if valid {
                summary.valid += 1;
            } else {
                summary.invalid += 1;
            }
        }

        info!(
            checked = summary.checked,
            valid = summary.valid,
            invalid = summary.invalid,
            failed = summary.failed,
            "revalidation batch complete"
        );
        Ok(summary)
    }
}

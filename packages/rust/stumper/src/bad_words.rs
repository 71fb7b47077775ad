//! Per-question reference word sets for the bad-word check.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use questioner_engine::GradingEngine;
use questioner_shared::{Language, Question, QuestionerError, Result};

use crate::clean::template_submission;

/// Identity of a question version in one language.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BadWordKey {
    path: String,
    author: String,
    content_hash: String,
    language: Language,
}

impl BadWordKey {
    fn new(question: &Question, language: Language) -> Self {
        Self {
            path: question.published.path.clone(),
            author: question.published.author.clone(),
            content_hash: question.published.content_hash.clone(),
            language,
        }
    }
}

/// Memoized reference word sets, computed from each question's own solution.
///
/// Entries are never evicted; a new question version has a new content hash
/// and therefore a new entry.
#[derive(Default)]
pub struct BadWordCache {
    entries: Mutex<HashMap<BadWordKey, Arc<BTreeSet<String>>>>,
}

impl BadWordCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached question versions.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The words the reference solution for `language` uses.
    ///
    /// Falls back to the Java reference when the question has none for
    /// `language`. Failures are not cached.
    pub fn reference_words(
        &self,
        engine: &dyn GradingEngine,
        question: &Question,
        language: Language,
    ) -> Result<Arc<BTreeSet<String>>> {
        let key = BadWordKey::new(question, language);
        if let Some(words) = self.lock()?.get(&key) {
            return Ok(Arc::clone(words));
        }

        let (reference_language, reference) = question
            .correct(language)
            .map(|contents| (language, contents))
            .or_else(|| question.correct(Language::Java).map(|c| (Language::Java, c)))
            .ok_or_else(|| {
                QuestionerError::validation(format!(
                    "question {} has no reference solution",
                    question.published.path
                ))
            })?;

        let templated = template_submission(engine, question, reference_language, reference)?;
        let words = Arc::new(engine.bad_words(reference_language, &templated)?);
        tracing::debug!(
            path = %question.published.path,
            %language,
            words = words.len(),
            "cached reference words"
        );

        self.lock()?.insert(key, Arc::clone(&words));
        Ok(words)
    }

    /// Whether `contents` uses any word absent from the question's reference set.
    pub fn has_bad_words(
        &self,
        engine: &dyn GradingEngine,
        question: &Question,
        language: Language,
        contents: &str,
    ) -> Result<bool> {
        let reference = self.reference_words(engine, question, language)?;
        let words = engine.bad_words(language, contents)?;
        Ok(words.iter().any(|word| !reference.contains(word)))
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<BadWordKey, Arc<BTreeSet<String>>>>> {
        self.entries
            .lock()
            .map_err(|_| QuestionerError::misuse("bad word cache lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{FakeEngine, question};

    #[test]
    fn reference_words_are_memoized_per_version() {
        let engine = FakeEngine::default();
        let cache = BadWordCache::new();
        let mut q = question(None);

        cache.reference_words(&engine, &q, Language::Java).expect("first");
        cache.reference_words(&engine, &q, Language::Java).expect("second");
        assert_eq!(cache.len(), 1);
        assert_eq!(engine.calls("bad_words"), 1);

        q.published.content_hash = "v2".into();
        cache.reference_words(&engine, &q, Language::Java).expect("new version");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn words_outside_reference_are_bad() {
        let engine = FakeEngine::default();
        let cache = BadWordCache::new();
        let q = question(None);

        assert!(!cache
            .has_bad_words(&engine, &q, Language::Java, "int addOne(int x) { return x + 1; }")
            .unwrap());
        assert!(cache
            .has_bad_words(&engine, &q, Language::Java, "int addOne(int poop) { return poop + 1; }")
            .unwrap());
    }

    #[test]
    fn kotlin_without_reference_uses_java() {
        let engine = FakeEngine::default();
        let cache = BadWordCache::new();
        let q = question(None);
        let words = cache.reference_words(&engine, &q, Language::Kotlin).expect("fallback");
        assert!(words.contains("addOne"));
    }
}

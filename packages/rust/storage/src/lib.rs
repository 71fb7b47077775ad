//! libSQL storage for the curated solution corpus.
//!
//! The [`Storage`] struct wraps a local libSQL database holding one row per
//! [`Solution`]. Three unique indexes enforce corpus identity: the scraped
//! `originalID`, and per-question cleaned and original content hashes.
//! Writes rejected by those indexes surface as [`QuestionerError::Duplicate`].
//!
//! **Access rules:**
//! - Ingestion and revalidation: read-write via [`Storage::open`]
//! - Reporting: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Row, params};
use tracing::debug;

use questioner_shared::{
    Coordinates, Hashes, QuestionerError, Result, Solution, ValidationRecord,
};

/// Rows fetched per round trip by [`Unvalidated`].
const PAGE_SIZE: usize = 32;

const SOLUTION_COLUMNS: &str = "id, original_id, language, path, author, submitted_at, contents, \
     original_hash, cleaned_hash, has_bad_words, valid, processed, random_tiebreak, \
     validated_at, question_version, question_hash, pipeline_version";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| QuestionerError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(QuestionerError::Storage(format!(
                "database not found: {}",
                path.display()
            )));
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        QuestionerError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0,
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(QuestionerError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Existence checks
    // -----------------------------------------------------------------------

    async fn exists(&self, sql: &str, values: Vec<libsql::Value>) -> Result<bool> {
        let mut rows = self.conn.query(sql, values).await.map_err(storage_err)?;
        match rows.next().await {
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Whether a solution scraped from `original_id` is stored.
    pub async fn exists_original_id(&self, original_id: &str) -> Result<bool> {
        self.exists(
            "SELECT 1 FROM solutions WHERE original_id = ?1 LIMIT 1",
            vec![original_id.into()],
        )
        .await
    }

    /// Whether a solution with this raw content hash is stored for `coordinates`.
    pub async fn exists_original_hash(
        &self,
        coordinates: &Coordinates,
        original_hash: &str,
    ) -> Result<bool> {
        self.exists(
            "SELECT 1 FROM solutions
             WHERE language = ?1 AND path = ?2 AND author = ?3 AND original_hash = ?4 LIMIT 1",
            vec![
                coordinates.language.as_str().into(),
                coordinates.path.as_str().into(),
                coordinates.author.as_str().into(),
                original_hash.into(),
            ],
        )
        .await
    }

    /// Whether a solution with this cleaned content hash is stored for `coordinates`.
    pub async fn exists_cleaned_hash(
        &self,
        coordinates: &Coordinates,
        cleaned_hash: &str,
    ) -> Result<bool> {
        self.exists(
            "SELECT 1 FROM solutions
             WHERE language = ?1 AND path = ?2 AND author = ?3 AND cleaned_hash = ?4 LIMIT 1",
            vec![
                coordinates.language.as_str().into(),
                coordinates.path.as_str().into(),
                coordinates.author.as_str().into(),
                cleaned_hash.into(),
            ],
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Solution operations
    // -----------------------------------------------------------------------

    /// Insert a solution, or replace the one with the same `originalID`.
    pub async fn upsert_solution(&self, solution: &Solution) -> Result<()> {
        self.check_writable()?;
        let validation = solution.validation.as_ref();
        self.conn
            .execute(
                "INSERT INTO solutions (original_id, language, path, author, submitted_at, contents,
                    original_hash, cleaned_hash, has_bad_words, valid, processed, random_tiebreak,
                    validated_at, question_version, question_hash, pipeline_version, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                 ON CONFLICT(original_id) DO UPDATE SET
                   language = excluded.language,
                   path = excluded.path,
                   author = excluded.author,
                   submitted_at = excluded.submitted_at,
                   contents = excluded.contents,
                   original_hash = excluded.original_hash,
                   cleaned_hash = excluded.cleaned_hash,
                   has_bad_words = excluded.has_bad_words,
                   valid = excluded.valid,
                   processed = excluded.processed,
                   random_tiebreak = excluded.random_tiebreak,
                   validated_at = excluded.validated_at,
                   question_version = excluded.question_version,
                   question_hash = excluded.question_hash,
                   pipeline_version = excluded.pipeline_version,
                   updated_at = excluded.updated_at",
                params![
                    solution.original_id.as_str(),
                    solution.coordinates.language.as_str(),
                    solution.coordinates.path.as_str(),
                    solution.coordinates.author.as_str(),
                    solution.submitted_at.timestamp_millis(),
                    solution.contents.as_str(),
                    solution.hashes.original.as_str(),
                    solution.hashes.cleaned.as_str(),
                    i64::from(solution.has_bad_words),
                    i64::from(solution.valid),
                    i64::from(solution.processed),
                    i64::from(solution.random_tiebreak),
                    validation.map(|v| v.validated_at.timestamp_millis()),
                    validation.map(|v| v.question_version.as_str()),
                    validation.map(|v| v.question_hash.as_str()),
                    validation.map(|v| v.pipeline_version.as_str()),
                    Utc::now().timestamp_millis(),
                ],
            )
            .await
            .map_err(write_err)?;
        debug!(
            original_id = %solution.original_id,
            valid = solution.valid,
            "upserted solution"
        );
        Ok(())
    }

    /// Get a solution by its scraped record ID.
    pub async fn get_solution(&self, original_id: &str) -> Result<Option<Solution>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SOLUTION_COLUMNS} FROM solutions WHERE original_id = ?1"),
                params![original_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_solution(&row)?.1)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Count all stored solutions.
    pub async fn count_solutions(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM solutions").await
    }

    /// Count solutions that [`Storage::get_unvalidated`] would yield.
    pub async fn count_unvalidated(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM solutions WHERE has_bad_words = 0 AND validated_at IS NULL")
            .await
    }

    async fn count(&self, sql: &str) -> Result<u64> {
        let mut rows = self.conn.query(sql, params![]).await.map_err(storage_err)?;
        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).map_err(storage_err)?;
                Ok(u64::try_from(count).unwrap_or(0))
            }
            Ok(None) => Ok(0),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Solutions without bad words that have never been validated, oldest
    /// rows first, up to `limit`.
    ///
    /// Rows are fetched lazily in pages as the cursor advances.
    pub fn get_unvalidated(&self, limit: usize) -> Unvalidated<'_> {
        Unvalidated {
            store: self,
            remaining: limit,
            after_id: 0,
            page: std::collections::VecDeque::new(),
            exhausted: false,
        }
    }

    async fn unvalidated_page(&self, after_id: i64, size: usize) -> Result<Vec<(i64, Solution)>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {SOLUTION_COLUMNS} FROM solutions
                     WHERE has_bad_words = 0 AND validated_at IS NULL AND id > ?1
                     ORDER BY id LIMIT ?2"
                ),
                params![after_id, size as i64],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_solution(&row)?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Unvalidated cursor
// ---------------------------------------------------------------------------

/// A stored solution paired with the store it came from.
pub struct BoundSolution<'s> {
    pub solution: Solution,
    store: &'s Storage,
}

impl BoundSolution<'_> {
    /// Write `solution` back to the store it was read from.
    pub async fn save(&self) -> Result<()> {
        self.store.upsert_solution(&self.solution).await
    }
}

/// Lazily paged cursor returned by [`Storage::get_unvalidated`].
pub struct Unvalidated<'s> {
    store: &'s Storage,
    remaining: usize,
    after_id: i64,
    page: std::collections::VecDeque<(i64, Solution)>,
    exhausted: bool,
}

impl<'s> Unvalidated<'s> {
    /// Next unvalidated solution, or `None` when the limit or the table is exhausted.
    pub async fn next(&mut self) -> Result<Option<BoundSolution<'s>>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        if self.page.is_empty() && !self.exhausted {
            let size = PAGE_SIZE.min(self.remaining);
            let page = self.store.unvalidated_page(self.after_id, size).await?;
            self.exhausted = page.len() < size;
            self.page.extend(page);
        }
        let Some((id, solution)) = self.page.pop_front() else {
            return Ok(None);
        };
        self.after_id = id;
        self.remaining -= 1;
        Ok(Some(BoundSolution {
            solution,
            store: self.store,
        }))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn storage_err(e: libsql::Error) -> QuestionerError {
    QuestionerError::Storage(e.to_string())
}

/// Map write failures, singling out unique-index rejections.
fn write_err(e: libsql::Error) -> QuestionerError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") {
        QuestionerError::Duplicate(message)
    } else {
        QuestionerError::Storage(message)
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| QuestionerError::Storage(format!("invalid timestamp: {ms}")))
}

/// Convert a database row to `(row id, Solution)`.
fn row_to_solution(row: &Row) -> Result<(i64, Solution)> {
    let id: i64 = row.get(0).map_err(storage_err)?;
    let language: String = row.get(2).map_err(storage_err)?;
    let submitted_at: i64 = row.get(5).map_err(storage_err)?;
    let validated_at: Option<i64> = row.get::<i64>(13).ok();

    let validation = match validated_at {
        Some(ms) => Some(ValidationRecord {
            validated_at: from_millis(ms)?,
            question_version: row.get(14).map_err(storage_err)?,
            question_hash: row.get(15).map_err(storage_err)?,
            pipeline_version: row.get(16).map_err(storage_err)?,
        }),
        None => None,
    };

    let solution = Solution {
        original_id: row.get(1).map_err(storage_err)?,
        coordinates: Coordinates {
            language: language.parse()?,
            path: row.get(3).map_err(storage_err)?,
            author: row.get(4).map_err(storage_err)?,
        },
        submitted_at: from_millis(submitted_at)?,
        contents: row.get(6).map_err(storage_err)?,
        hashes: Hashes {
            original: row.get(7).map_err(storage_err)?,
            cleaned: row.get(8).map_err(storage_err)?,
        },
        has_bad_words: row.get::<i64>(9).map_err(storage_err)? != 0,
        valid: row.get::<i64>(10).map_err(storage_err)? != 0,
        processed: row.get::<i64>(11).map_err(storage_err)? != 0,
        random_tiebreak: i32::try_from(row.get::<i64>(12).map_err(storage_err)?)
            .map_err(|e| QuestionerError::Storage(format!("invalid random_tiebreak: {e}")))?,
        validation,
    };
    Ok((id, solution))
}

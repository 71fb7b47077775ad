//! SQL migration definitions for the solution corpus database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: solutions with identity indexes",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Curated student solutions. Timestamps are Unix epoch milliseconds.
CREATE TABLE IF NOT EXISTS solutions (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    original_id     TEXT NOT NULL,
    language        TEXT NOT NULL,
    path            TEXT NOT NULL,
    author          TEXT NOT NULL,
    submitted_at    INTEGER NOT NULL,
    contents        TEXT NOT NULL,
    original_hash   TEXT NOT NULL,
    cleaned_hash    TEXT NOT NULL,
    has_bad_words   INTEGER NOT NULL,
    valid           INTEGER NOT NULL DEFAULT 0,
    processed       INTEGER NOT NULL DEFAULT 0,
    random_tiebreak INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_solutions_original_id
    ON solutions(original_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_solutions_cleaned_hash
    ON solutions(language, path, author, cleaned_hash);
CREATE UNIQUE INDEX IF NOT EXISTS idx_solutions_original_hash
    ON solutions(language, path, author, original_hash);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Validation records on solutions",
            sql: r#"
ALTER TABLE solutions ADD COLUMN validated_at INTEGER;
ALTER TABLE solutions ADD COLUMN question_version TEXT;
ALTER TABLE solutions ADD COLUMN question_hash TEXT;
ALTER TABLE solutions ADD COLUMN pipeline_version TEXT;

CREATE INDEX IF NOT EXISTS idx_solutions_unvalidated
    ON solutions(has_bad_words, validated_at);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}

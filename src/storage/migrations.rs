//! Versioned schema migrations for the relational store.
//!
//! Scripts are embedded at compile time and named
//! `<zero-padded version>_<description>.sql`. Applied versions are recorded
//! in the `schema_migration` table, which is the only source of truth for
//! what has run: each version is applied at most once per database, in
//! ascending order, each inside its own transaction.

use sqlx::{AnyPool, Executor};
use std::collections::HashSet;
use tracing::Span;

use super::types::StoreError;

/// Embedded migration scripts as `(file name, SQL)` pairs.
pub static BUNDLED_MIGRATIONS: &[(&str, &str)] = &[
    (
        "000001_create_clip_table.sql",
        include_str!("../../migrations/000001_create_clip_table.sql"),
    ),
    (
        "000002_add_clip_created_at_index.sql",
        include_str!("../../migrations/000002_add_clip_created_at_index.sql"),
    ),
];

const SELECT_APPLIED: &str = "SELECT version FROM schema_migration ORDER BY version ASC";

const SQLITE: &str = "SQLite";
const POSTGRES: &str = "PostgreSQL";

/// Serializes migrators on PostgreSQL; plain reads of the ledger still pass.
const LOCK_LEDGER: &str = "LOCK TABLE schema_migration IN SHARE ROW EXCLUSIVE MODE";

const CREATE_LEDGER: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_migration (
        version BIGINT PRIMARY KEY,
        applied_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub sql: &'static str,
}

impl Migration {
    /// Parse a script file name like `000001_create_clip_table.sql`.
    pub fn parse(file_name: &str, sql: &'static str) -> Result<Self, StoreError> {
        let malformed =
            || StoreError::MalformedMigration(format!("invalid migration file name: {file_name}"));

        let stem = file_name.strip_suffix(".sql").ok_or_else(malformed)?;
        let (version, name) = stem.split_once('_').ok_or_else(malformed)?;
        if name.is_empty() {
            return Err(malformed());
        }
        // i64::from_str would also accept a leading sign
        if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
            return Err(StoreError::MalformedMigration(format!(
                "invalid migration version: {version}"
            )));
        }
        let version = version.parse::<i64>().map_err(|_| {
            StoreError::MalformedMigration(format!("invalid migration version: {version}"))
        })?;

        Ok(Self {
            version,
            name: name.to_string(),
            sql,
        })
    }
}

/// Parse and order a migration set. Versions must be unique.
pub(crate) fn load_migrations(
    files: &[(&str, &'static str)],
) -> Result<Vec<Migration>, StoreError> {
    let mut migrations = files
        .iter()
        .map(|(file_name, sql)| Migration::parse(file_name, sql))
        .collect::<Result<Vec<_>, _>>()?;
    migrations.sort_by_key(|m| m.version);

    if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
        return Err(StoreError::MalformedMigration(format!(
            "duplicate migration version {} ({} and {})",
            pair[0].version, pair[0].name, pair[1].name
        )));
    }

    Ok(migrations)
}

// ============================================================================
// Migrator
// ============================================================================

pub struct Migrator {
    pool: AnyPool,
    log: Span,
    files: &'static [(&'static str, &'static str)],
}

impl Migrator {
    pub fn new(pool: &AnyPool, log: &Span) -> Self {
        Self {
            pool: pool.clone(),
            log: log.clone(),
            files: BUNDLED_MIGRATIONS,
        }
    }

    /// Use a different script set instead of the bundled one.
    pub fn with_migrations(mut self, files: &'static [(&'static str, &'static str)]) -> Self {
        self.files = files;
        self
    }

    /// Bring the schema up to date. Returns the versions applied by this run.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MalformedMigration` before touching the schema if
    /// any script name is invalid, and `StoreError::MigrationApply` if a
    /// script fails; that script's transaction is rolled back and no later
    /// script runs.
    pub async fn run(&self) -> Result<Vec<i64>, StoreError> {
        let migrations = load_migrations(self.files)?;

        match sqlx::query(CREATE_LEDGER).execute(&self.pool).await {
            Ok(_) => {}
            // PostgreSQL: a concurrent migrator created the ledger first
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {}
            Err(e) => return Err(e.into()),
        }

        let applied: HashSet<i64> = sqlx::query_scalar::<_, i64>(SELECT_APPLIED)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .collect();

        let backend = self.pool.acquire().await?.backend_name().to_string();

        let mut newly_applied = Vec::new();
        for migration in migrations.iter().filter(|m| !applied.contains(&m.version)) {
            if self.apply(migration, &backend).await? {
                newly_applied.push(migration.version);
            }
        }

        if newly_applied.is_empty() {
            tracing::debug!(parent: &self.log, "Schema is up to date");
        }
        Ok(newly_applied)
    }

    /// Apply one migration. Returns `false` if another writer recorded the
    /// same version first.
    ///
    /// The transaction takes the write lock up front and re-reads the ledger
    /// under it, so concurrent migrators serialize per version instead of
    /// failing on a lock upgrade.
    async fn apply(&self, migration: &Migration, backend: &str) -> Result<bool, StoreError> {
        let apply_error = |source| StoreError::MigrationApply {
            version: migration.version,
            name: migration.name.clone(),
            source,
        };

        let mut tx = self.pool.begin_with(begin_statement(backend)).await?;

        if backend == POSTGRES {
            if let Err(e) = sqlx::query(LOCK_LEDGER).execute(&mut *tx).await {
                let _ = tx.rollback().await;
                return Err(apply_error(e));
            }
        }

        let recorded: Result<i64, sqlx::Error> =
            sqlx::query_scalar("SELECT COUNT(*) FROM schema_migration WHERE version = $1")
                .bind(migration.version)
                .fetch_one(&mut *tx)
                .await;
        match recorded {
            Ok(0) => {}
            Ok(_) => {
                let _ = tx.rollback().await;
                self.log_skipped(migration);
                return Ok(false);
            }
            Err(e) => {
                let _ = tx.rollback().await;
                return Err(apply_error(e));
            }
        }

        if let Err(e) = (&mut *tx).execute(sqlx::raw_sql(migration.sql)).await {
            let _ = tx.rollback().await;
            return Err(apply_error(e));
        }

        let recorded = sqlx::query("INSERT INTO schema_migration (version) VALUES ($1)")
            .bind(migration.version)
            .execute(&mut *tx)
            .await;
        match recorded {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                let _ = tx.rollback().await;
                self.log_skipped(migration);
                return Ok(false);
            }
            Err(e) => {
                let _ = tx.rollback().await;
                return Err(apply_error(e));
            }
        }

        tx.commit().await.map_err(apply_error)?;

        tracing::info!(
            parent: &self.log,
            version = migration.version,
            name = %migration.name,
            "Applied migration"
        );
        Ok(true)
    }

    fn log_skipped(&self, migration: &Migration) {
        tracing::info!(
            parent: &self.log,
            version = migration.version,
            name = %migration.name,
            "Migration already applied by another process"
        );
    }
}

/// SQLite must take the write lock at BEGIN: upgrading a read snapshot
/// fails with SQLITE_BUSY without waiting on the busy timeout.
fn begin_statement(backend: &str) -> &'static str {
    match backend {
        SQLITE => "BEGIN IMMEDIATE",
        _ => "BEGIN",
    }
}

// ============================================================================
// Tests
// ============================================================================

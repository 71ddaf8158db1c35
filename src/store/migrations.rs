//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                telegram_id INTEGER PRIMARY KEY,
                first_name TEXT NOT NULL,
                current_weight REAL,
                goal_weight REAL,
                height REAL,
                timezone TEXT NOT NULL DEFAULT 'UTC',
                onboarding_step TEXT NOT NULL DEFAULT 'weight',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS weight_logs (
                id TEXT PRIMARY KEY,
                telegram_id INTEGER NOT NULL REFERENCES users(telegram_id),
                weight REAL NOT NULL,
                logged_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_weight_logs_user ON weight_logs(telegram_id, logged_at);

            CREATE TABLE IF NOT EXISTS fasting_periods (
                id TEXT PRIMARY KEY,
                telegram_id INTEGER NOT NULL REFERENCES users(telegram_id),
                started_at TEXT NOT NULL,
                ended_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_fasting_user ON fasting_periods(telegram_id, started_at);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_fasting_one_open
                ON fasting_periods(telegram_id) WHERE ended_at IS NULL;

            CREATE TABLE IF NOT EXISTS food_logs (
                id TEXT PRIMARY KEY,
                telegram_id INTEGER NOT NULL REFERENCES users(telegram_id),
                calories REAL NOT NULL,
                protein REAL,
                carbs REAL,
                fat REAL,
                items TEXT NOT NULL DEFAULT '[]',
                meal_type TEXT,
                notes TEXT,
                logged_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_food_logs_user ON food_logs(telegram_id, logged_at);

            CREATE TABLE IF NOT EXISTS daily_summaries (
                telegram_id INTEGER NOT NULL REFERENCES users(telegram_id),
                date TEXT NOT NULL,
                total_calories REAL NOT NULL,
                total_protein REAL NOT NULL,
                total_carbs REAL NOT NULL,
                total_fat REAL NOT NULL,
                meal_count INTEGER NOT NULL,
                fasting_hours REAL NOT NULL,
                summary TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (telegram_id, date)
            );
        "#,
    },
    Migration {
        version: 2,
        name: "web_login",
        sql: r#"
            CREATE TABLE IF NOT EXISTS login_codes (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                telegram_id INTEGER,
                session_token TEXT,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                verified_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_login_codes_code ON login_codes(code, created_at);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_login_codes_one_pending
                ON login_codes(code) WHERE status = 'pending';

            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                telegram_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
        "#,
    },
];

/// Run all pending migrations.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::info!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}

//! Schema migration framework.
//!
//! Numbered SQL migrations are embedded at compile time via `include_str!`
//! and run exactly once each, tracked by the `schema_version` table. A
//! database created before the framework existed is detected by the
//! presence of the `user_profiles` table and has the baseline marked as
//! applied without running its SQL.

use rusqlite::Connection;

struct Migration {
    version: i32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("migrations/001_baseline.sql"),
}];

fn ensure_schema_version_table(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("Failed to create schema_version table: {}", e))
}

fn current_version(conn: &Connection) -> Result<i32, String> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| format!("Failed to read schema version: {}", e))
}

/// Detect a pre-framework database and mark the baseline as applied so its
/// CREATE TABLE statements never run against populated tables.
fn bootstrap_existing_db(conn: &Connection) -> Result<bool, String> {
    if current_version(conn)? > 0 {
        return Ok(false);
    }

    let has_profiles: bool = conn
        .prepare("SELECT 1 FROM user_profiles LIMIT 1")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if has_profiles {
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            [1],
        )
        .map_err(|e| format!("Failed to bootstrap schema version: {}", e))?;
        log::info!("Migration bootstrap: marked v1 (baseline) as applied for existing database");
        return Ok(true);
    }

    Ok(false)
}

/// Hot-copy the database to `<db_path>.pre-migration.bak` before applying
/// pending migrations. Skipped for in-memory databases.
fn backup_before_migration(conn: &Connection) -> Result<(), String> {
    let db_path: String = conn
        .query_row("PRAGMA database_list", [], |row| row.get(2))
        .map_err(|e| format!("Failed to get database path: {}", e))?;

    if db_path.is_empty() || db_path == ":memory:" {
        return Ok(());
    }

    let backup_path = format!("{}.pre-migration.bak", db_path);
    let mut backup_conn = Connection::open(&backup_path)
        .map_err(|e| format!("Failed to open backup file: {}", e))?;

    let backup = rusqlite::backup::Backup::new(conn, &mut backup_conn)
        .map_err(|e| format!("Failed to initialize pre-migration backup: {}", e))?;
    backup
        .step(-1)
        .map_err(|e| format!("Pre-migration backup failed: {}", e))?;

    log::info!("Pre-migration backup created at {}", backup_path);
    Ok(())
}

/// Run all pending migrations. Returns how many were applied.
///
/// Forward-compat guard: a database with a higher version than the highest
/// known migration refuses to open rather than running against a schema
/// this build does not understand.
pub fn run_migrations(conn: &Connection) -> Result<usize, String> {
    ensure_schema_version_table(conn)?;
    bootstrap_existing_db(conn)?;

    let current = current_version(conn)?;
    let max_known = MIGRATIONS.last().map(|m| m.version).unwrap_or(0);

    if current > max_known {
        return Err(format!(
            "Database schema version ({}) is newer than this build of fundnet supports ({}). \
             Update fundnet before opening this database.",
            current, max_known
        ));
    }

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        return Ok(0);
    }

    backup_before_migration(conn)?;

    for migration in &pending {
        conn.execute_batch(migration.sql)
            .map_err(|e| format!("Migration v{} failed: {}", migration.version, e))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [migration.version],
        )
        .map_err(|e| format!("Failed to record migration v{}: {}", migration.version, e))?;
        log::info!("Applied migration v{}", migration.version);
    }

    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_db() -> Connection {
        Connection::open_in_memory().expect("in-memory db")
    }

    #[test]
    fn test_fresh_db_applies_baseline() {
        let conn = mem_db();
        let applied = run_migrations(&conn).expect("migrations should succeed");
        assert_eq!(applied, 1, "should apply exactly 1 migration (baseline)");
        assert_eq!(current_version(&conn).expect("version query"), 1);

        // Roster table accepts a full row
        conn.execute(
            "INSERT INTO user_profiles (id, email, company_name, created_at, updated_at)
             VALUES ('u1', 'ops@acme.fund', 'Acme Fund', '2025-01-01', '2025-01-01')",
            [],
        )
        .expect("user_profiles should exist");
        conn.execute(
            "INSERT INTO company_members (id, company_user_id, member_user_id, member_email,
             member_name, role_in_company, invited_by, created_at)
             VALUES ('m1', 'u1', 'u2', 'analyst@acme.fund', 'Ana Lyst', 'Analyst', 'admin', '2025-01-01')",
            [],
        )
        .expect("company_members should exist with all columns");

        // Each period table carries its own column names
        conn.execute(
            "INSERT INTO survey_responses_2021 (firm_name, email_address) VALUES ('Acme Fund', 'a@x.com')",
            [],
        )
        .expect("2021 shape");
        conn.execute(
            "INSERT INTO survey_responses_2022 (organisation, email) VALUES ('Acme Fund', 'a@x.com')",
            [],
        )
        .expect("2022 shape");
        conn.execute(
            "INSERT INTO survey_responses_2024 (organisation_name, fund_name, email_address)
             VALUES ('Acme', 'Acme Fund II', 'a@x.com')",
            [],
        )
        .expect("2024 shape");
    }

    #[test]
    fn test_roster_exclusivity_constraint() {
        let conn = mem_db();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO company_members (id, company_user_id, member_user_id, member_email, created_at)
             VALUES ('m1', 'c1', 'u9', 'x@y.co', '2025-01-01')",
            [],
        )
        .unwrap();
        // Same member under a different company must violate the unique index
        let err = conn
            .execute(
                "INSERT INTO company_members (id, company_user_id, member_user_id, member_email, created_at)
                 VALUES ('m2', 'c2', 'u9', 'x@y.co', '2025-01-02')",
                [],
            )
            .unwrap_err();
        assert!(err.to_string().contains("UNIQUE"));
    }

    #[test]
    fn test_bootstrap_existing_db() {
        let conn = mem_db();

        // Simulate a pre-framework database
        conn.execute_batch(
            "CREATE TABLE user_profiles (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                company_name TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            INSERT INTO user_profiles VALUES ('u1', 'ops@acme.fund', 'Acme', '2024-01-01', '2024-01-01');",
        )
        .expect("seed existing db");

        let applied = run_migrations(&conn).expect("migrations should succeed");
        assert_eq!(applied, 0, "bootstrap should mark v1 as applied, not run SQL");
        assert_eq!(current_version(&conn).unwrap(), 1);

        let email: String = conn
            .query_row("SELECT email FROM user_profiles WHERE id = 'u1'", [], |r| {
                r.get(0)
            })
            .expect("existing data preserved");
        assert_eq!(email, "ops@acme.fund");
    }

    #[test]
    fn test_forward_compat_guard() {
        let conn = mem_db();
        ensure_schema_version_table(&conn).unwrap();
        conn.execute("INSERT INTO schema_version (version) VALUES (999)", [])
            .unwrap();

        let err = run_migrations(&conn).unwrap_err();
        assert!(err.contains("newer than this build"), "got: {}", err);
    }

    #[test]
    fn test_idempotency() {
        let conn = mem_db();
        assert_eq!(run_migrations(&conn).expect("first run"), 1);
        assert_eq!(run_migrations(&conn).expect("second run"), 0);
        assert_eq!(current_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_pre_migration_backup_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("fundnet_test.db");

        let conn = Connection::open(&db_path).expect("open db");
        conn.execute_batch("PRAGMA journal_mode=WAL;").unwrap();
        assert_eq!(run_migrations(&conn).expect("migrations"), 1);

        let backup_path = dir.path().join("fundnet_test.db.pre-migration.bak");
        assert!(backup_path.exists(), "backup missing at {}", backup_path.display());
    }
}

//! SQLite-backed store for identity profiles, company rosters, and the
//! per-period survey record sets.
//!
//! The database lives at `~/.fundnet/fundnet.db`. In the hosted deployment
//! these tables are managed Postgres resources; the store is accessed only
//! through exact-match and case-insensitive-substring queries plus
//! logical-key updates, so the SQLite shape carries the same contracts.

use std::path::PathBuf;

use rusqlite::Connection;

pub mod types;
pub use types::*;

mod identities;
mod memberships;
mod records;

pub struct MemberDb {
    conn: Connection,
}

impl MemberDb {
    /// Open (or create) the database at `~/.fundnet/fundnet.db` and apply
    /// pending schema migrations.
    pub fn open() -> Result<Self, DbError> {
        Self::open_at(Self::db_path()?)
    }

    /// Open a database at an explicit path. Useful for testing and for
    /// deployments that pin `db_path` in configuration.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;
        Ok(Self { conn })
    }

    /// Open a fresh in-memory database with the full schema applied.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within an immediate (writer-exclusive) transaction.
    /// Commits on Ok, rolls back on Err. Concurrent writers serialize here,
    /// which is what makes the consolidation rewrite safe to race.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    fn db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".fundnet").join("fundnet.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_transaction_commits_on_ok() {
        let db = MemberDb::open_in_memory().unwrap();
        db.with_transaction(|tx| {
            tx.conn_ref()
                .execute(
                    "INSERT INTO user_profiles (id, email, created_at, updated_at)
                     VALUES ('u1', 'a@x.com', '2025-01-01', '2025-01-01')",
                    [],
                )
                .map_err(DbError::from)?;
            Ok(())
        })
        .unwrap();

        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM user_profiles", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_with_transaction_rolls_back_on_err() {
        let db = MemberDb::open_in_memory().unwrap();
        let result: Result<(), DbError> = db.with_transaction(|tx| {
            tx.conn_ref()
                .execute(
                    "INSERT INTO user_profiles (id, email, created_at, updated_at)
                     VALUES ('u1', 'a@x.com', '2025-01-01', '2025-01-01')",
                    [],
                )
                .map_err(DbError::from)?;
            Err(DbError::Migration("boom".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM user_profiles", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0, "insert should have rolled back");
    }
}

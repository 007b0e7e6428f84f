use chrono::Utc;
use rusqlite::params;

use super::*;

impl MemberDb {
    // =========================================================================
    // Identity profiles
    // =========================================================================

    /// Insert or update an identity profile. Idempotent; incoming fields only
    /// overwrite when explicitly provided.
    pub fn upsert_identity(&self, identity: &DbIdentity) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO user_profiles (id, email, company_name, full_name, created_at, updated_at)
             VALUES (?1, LOWER(?2), ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                company_name = COALESCE(excluded.company_name, user_profiles.company_name),
                full_name = COALESCE(excluded.full_name, user_profiles.full_name),
                updated_at = excluded.updated_at",
            params![
                identity.id,
                identity.email,
                identity.company_name,
                identity.full_name,
                identity.created_at,
                identity.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get an identity profile by id.
    pub fn get_identity(&self, id: &str) -> Result<Option<DbIdentity>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, email, company_name, full_name, created_at, updated_at
             FROM user_profiles WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::map_identity_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Look up an identity profile by email (case-insensitive).
    pub fn find_identity_by_email(&self, email: &str) -> Result<Option<DbIdentity>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, email, company_name, full_name, created_at, updated_at
             FROM user_profiles WHERE email = LOWER(?1)",
        )?;
        let mut rows = stmt.query_map(params![email.trim()], Self::map_identity_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Substring search over profiles by email or company name, ordered by
    /// company name. The caller deduplicates and caps for presentation.
    pub fn search_identities(&self, query: &str, limit: i64) -> Result<Vec<DbIdentity>, DbError> {
        let pattern = format!("%{}%", query);
        let mut stmt = self.conn.prepare(
            "SELECT id, email, company_name, full_name, created_at, updated_at
             FROM user_profiles
             WHERE email LIKE ?1 OR company_name LIKE ?1
             ORDER BY company_name, email
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![pattern, limit], Self::map_identity_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Assign (or reassign) a platform role to an identity. Idempotent.
    pub fn set_role(&self, user_id: &str, email: &str, role: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO user_roles (user_id, email, role, created_at)
             VALUES (?1, LOWER(?2), ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET role = excluded.role",
            params![user_id, email, role, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Platform role for an identity, if one was ever assigned.
    pub fn get_role(&self, user_id: &str) -> Result<Option<String>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT role FROM user_roles WHERE user_id = ?1")?;
        let mut rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Number of identity profiles in the directory.
    pub fn count_identities(&self) -> Result<u64, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM user_profiles", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn map_identity_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbIdentity> {
        Ok(DbIdentity {
            id: row.get(0)?,
            email: row.get(1)?,
            company_name: row.get(2)?,
            full_name: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

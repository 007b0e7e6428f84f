use chrono::Utc;
use rusqlite::params;

use super::*;

impl MemberDb {
    // =========================================================================
    // Company rosters
    // =========================================================================

    /// Insert a roster row. The UNIQUE constraint on member_user_id surfaces
    /// as a SQLite constraint error if the member is already rostered; the
    /// roster service checks first and treats the constraint as a backstop.
    pub fn insert_membership(&self, membership: &DbMembership) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO company_members (
                id, company_user_id, member_user_id, member_email, member_name,
                role_in_company, is_active, invited_by, created_at
             ) VALUES (?1, ?2, ?3, LOWER(?4), ?5, ?6, ?7, ?8, ?9)",
            params![
                membership.id,
                membership.company_user_id,
                membership.member_user_id,
                membership.member_email,
                membership.member_name,
                membership.role_in_company,
                membership.is_active as i32,
                membership.invited_by,
                membership.created_at,
            ],
        )?;
        Ok(())
    }

    /// Get a roster row by id.
    pub fn get_membership(&self, id: &str) -> Result<Option<DbMembership>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, company_user_id, member_user_id, member_email, member_name,
                    role_in_company, is_active, invited_by, created_at
             FROM company_members WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::map_membership_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// The active membership naming this identity as member, if any. This is
    /// the primary/secondary discriminator: Some = secondary, None = primary.
    pub fn membership_for_member(
        &self,
        member_user_id: &str,
    ) -> Result<Option<DbMembership>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, company_user_id, member_user_id, member_email, member_name,
                    role_in_company, is_active, invited_by, created_at
             FROM company_members
             WHERE member_user_id = ?1 AND is_active = 1
             LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![member_user_id], Self::map_membership_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// All roster rows for one company, newest first.
    pub fn list_members_for_company(
        &self,
        company_user_id: &str,
    ) -> Result<Vec<DbMembership>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, company_user_id, member_user_id, member_email, member_name,
                    role_in_company, is_active, invited_by, created_at
             FROM company_members
             WHERE company_user_id = ?1
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![company_user_id], Self::map_membership_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every roster row, newest first. Admin-console view.
    pub fn list_all_memberships(&self) -> Result<Vec<DbMembership>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, company_user_id, member_user_id, member_email, member_name,
                    role_in_company, is_active, invited_by, created_at
             FROM company_members
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], Self::map_membership_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Update display name and/or role-in-company. Ownership columns are
    /// deliberately not updatable; re-parenting is delete-and-recreate.
    /// Returns false when the row does not exist.
    pub fn update_membership_fields(
        &self,
        id: &str,
        member_name: Option<&str>,
        role_in_company: Option<&str>,
    ) -> Result<bool, DbError> {
        let updated = self.conn.execute(
            "UPDATE company_members SET
                member_name = COALESCE(?2, member_name),
                role_in_company = COALESCE(?3, role_in_company)
             WHERE id = ?1",
            params![id, member_name, role_in_company],
        )?;
        Ok(updated > 0)
    }

    /// Delete a roster row. Returns false when the row does not exist. The
    /// underlying identity profile is never touched here.
    pub fn delete_membership(&self, id: &str) -> Result<bool, DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM company_members WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    // =========================================================================
    // Member activity log
    // =========================================================================

    /// Record an action taken by a secondary identity, scoped to the owning
    /// company.
    #[allow(clippy::too_many_arguments)]
    pub fn log_member_activity(
        &self,
        company_user_id: &str,
        member_user_id: &str,
        member_email: &str,
        member_name: Option<&str>,
        action_type: &str,
        action_label: &str,
        entity_type: Option<&str>,
        entity_id: Option<&str>,
        details: Option<&str>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO member_activity_log (
                company_user_id, member_user_id, member_email, member_name,
                action_type, action_label, entity_type, entity_id, details, created_at
             ) VALUES (?1, ?2, LOWER(?3), ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                company_user_id,
                member_user_id,
                member_email,
                member_name,
                action_type,
                action_label,
                entity_type,
                entity_id,
                details,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Recent activity for one company, newest first.
    pub fn list_member_activity(
        &self,
        company_user_id: &str,
        limit: i64,
    ) -> Result<Vec<DbActivityEntry>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, company_user_id, member_user_id, member_email, member_name,
                    action_type, action_label, entity_type, entity_id, details, created_at
             FROM member_activity_log
             WHERE company_user_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![company_user_id, limit], |row| {
            Ok(DbActivityEntry {
                id: row.get(0)?,
                company_user_id: row.get(1)?,
                member_user_id: row.get(2)?,
                member_email: row.get(3)?,
                member_name: row.get(4)?,
                action_type: row.get(5)?,
                action_label: row.get(6)?,
                entity_type: row.get(7)?,
                entity_id: row.get(8)?,
                details: row.get(9)?,
                created_at: row.get(10)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn map_membership_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbMembership> {
        Ok(DbMembership {
            id: row.get(0)?,
            company_user_id: row.get(1)?,
            member_user_id: row.get(2)?,
            member_email: row.get(3)?,
            member_name: row.get(4)?,
            role_in_company: row.get(5)?,
            is_active: row.get::<_, i32>(6)? != 0,
            invited_by: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership(id: &str, company: &str, member: &str, email: &str) -> DbMembership {
        DbMembership {
            id: id.into(),
            company_user_id: company.into(),
            member_user_id: member.into(),
            member_email: email.into(),
            member_name: Some("Ana Lyst".into()),
            role_in_company: Some("Analyst".into()),
            is_active: true,
            invited_by: Some("admin-1".into()),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn test_membership_discriminates_secondary_from_primary() {
        let db = MemberDb::open_in_memory().unwrap();
        db.insert_membership(&membership("m1", "c1", "u2", "ana@acme.fund"))
            .unwrap();

        assert!(db.membership_for_member("u2").unwrap().is_some());
        assert!(db.membership_for_member("c1").unwrap().is_none());
    }

    #[test]
    fn test_second_roster_row_for_same_member_is_rejected() {
        let db = MemberDb::open_in_memory().unwrap();
        db.insert_membership(&membership("m1", "c1", "u2", "ana@acme.fund"))
            .unwrap();
        let err = db
            .insert_membership(&membership("m2", "c9", "u2", "ana@acme.fund"))
            .unwrap_err();
        assert!(err.to_string().contains("UNIQUE"));
    }

    #[test]
    fn test_update_fields_never_reparents() {
        let db = MemberDb::open_in_memory().unwrap();
        db.insert_membership(&membership("m1", "c1", "u2", "ana@acme.fund"))
            .unwrap();

        assert!(db
            .update_membership_fields("m1", Some("Ana L."), None)
            .unwrap());
        let row = db.get_membership("m1").unwrap().unwrap();
        assert_eq!(row.member_name.as_deref(), Some("Ana L."));
        // Untouched by COALESCE
        assert_eq!(row.role_in_company.as_deref(), Some("Analyst"));
        assert_eq!(row.company_user_id, "c1");

        assert!(!db.update_membership_fields("missing", Some("x"), None).unwrap());
    }

    #[test]
    fn test_delete_membership_reports_missing() {
        let db = MemberDb::open_in_memory().unwrap();
        db.insert_membership(&membership("m1", "c1", "u2", "ana@acme.fund"))
            .unwrap();
        assert!(db.delete_membership("m1").unwrap());
        assert!(!db.delete_membership("m1").unwrap());
        // Member reverts to primary-like: no roster row remains
        assert!(db.membership_for_member("u2").unwrap().is_none());
    }

    #[test]
    fn test_activity_log_roundtrip() {
        let db = MemberDb::open_in_memory().unwrap();
        db.log_member_activity(
            "c1",
            "u2",
            "Ana@Acme.Fund",
            Some("Ana Lyst"),
            "survey_edit",
            "Edited 2024 survey draft",
            Some("survey"),
            Some("42"),
            Some(r#"{"section":"team"}"#),
        )
        .unwrap();

        let entries = db.list_member_activity("c1", 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].member_email, "ana@acme.fund");
        assert_eq!(entries[0].action_type, "survey_edit");
        assert!(db.list_member_activity("c2", 10).unwrap().is_empty());
    }
}

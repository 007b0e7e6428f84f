use rusqlite::params;

use super::*;
use crate::config::PeriodSchema;

/// Build the case-insensitive exact-match predicate for every name column
/// of a period, binding the name once as `?N`.
fn name_match_predicate(schema: &PeriodSchema, param_index: usize) -> String {
    let clauses: Vec<String> = schema
        .name_columns
        .iter()
        .map(|col| format!("LOWER({col}) = LOWER(?{param_index})"))
        .collect();
    format!("({})", clauses.join(" OR "))
}

impl MemberDb {
    // =========================================================================
    // Period record sets (all access is driven by the PeriodSchema mapping)
    // =========================================================================

    /// Rows of one period whose company-name column matches a LIKE pattern.
    /// Multi-name periods are scanned once per name column so that both the
    /// organisation and the fund spellings surface as candidates.
    pub fn period_rows_like(
        &self,
        schema: &PeriodSchema,
        pattern: &str,
    ) -> Result<Vec<PeriodRow>, DbError> {
        let mut rows = Vec::new();
        for col in &schema.name_columns {
            let sql = match &schema.email_column {
                Some(email_col) => format!(
                    "SELECT {col}, {email_col} FROM {table}
                     WHERE {col} IS NOT NULL AND {col} LIKE ?1",
                    table = schema.table,
                ),
                None => format!(
                    "SELECT {col}, NULL FROM {table}
                     WHERE {col} IS NOT NULL AND {col} LIKE ?1",
                    table = schema.table,
                ),
            };
            let mut stmt = self.conn.prepare(&sql)?;
            let mapped = stmt.query_map(params![pattern], |row| {
                Ok(PeriodRow {
                    name: row.get(0)?,
                    email: row.get(1)?,
                })
            })?;
            for row in mapped {
                rows.push(row?);
            }
        }
        Ok(rows)
    }

    /// Every named row of one period. Used by the separator-insensitive
    /// search strategy, which compares normalized keys in code because the
    /// store's LIKE cannot see through spacing differences.
    pub fn period_all_rows(&self, schema: &PeriodSchema) -> Result<Vec<PeriodRow>, DbError> {
        self.period_rows_like(schema, "%")
    }

    /// Distinct contact emails on records of one period carrying the exact
    /// company name (case-insensitive). Empty when the period captured no
    /// email column.
    pub fn period_emails_for_name(
        &self,
        schema: &PeriodSchema,
        name: &str,
    ) -> Result<Vec<String>, DbError> {
        let Some(email_col) = &schema.email_column else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT DISTINCT {email_col} FROM {table}
             WHERE {email_col} IS NOT NULL AND {email_col} != '' AND {predicate}",
            table = schema.table,
            predicate = name_match_predicate(schema, 1),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![name], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Records of one period carrying the exact company name, viewed through
    /// the period's field mapping.
    pub fn period_records_for_name(
        &self,
        schema: &PeriodSchema,
        name: &str,
    ) -> Result<Vec<HistoricalRecord>, DbError> {
        let first_name_col = &schema.name_columns[0];
        let email_select = match &schema.email_column {
            Some(col) => col.as_str(),
            None => "NULL",
        };
        let sql = format!(
            "SELECT id, {first_name_col}, {email_select}, {owner} FROM {table}
             WHERE {predicate}",
            owner = schema.owner_column,
            table = schema.table,
            predicate = name_match_predicate(schema, 1),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let period = schema.period;
        let rows = stmt.query_map(params![name], move |row| {
            Ok(HistoricalRecord {
                period,
                record_id: row.get(0)?,
                company_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                email: row.get(2)?,
                owner_id: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Rewrite every record of one period carrying any of the exact company
    /// names so that it is owned by `owner_id`, normalizing the contact
    /// email to the canonical one where the period's schema has an email
    /// column.
    ///
    /// Set-based "ensure owned": rows already owned by `owner_id` still
    /// match and still count, which is what makes the operation idempotent.
    /// One statement covers all names, so a record carrying two selected
    /// spellings (organisation and fund) is touched — and counted — once.
    /// Returns the number of rows the rewrite touched.
    pub fn period_claim_records(
        &self,
        schema: &PeriodSchema,
        names: &[String],
        owner_id: &str,
        canonical_email: Option<&str>,
    ) -> Result<u64, DbError> {
        if names.is_empty() {
            return Ok(0);
        }
        let lowered: Vec<String> = names.iter().map(|n| n.trim().to_lowercase()).collect();

        let email_param = match (&schema.email_column, canonical_email) {
            (Some(_), Some(email)) => Some(email),
            _ => None,
        };
        let email_set = match (&schema.email_column, email_param) {
            (Some(email_col), Some(_)) => format!(", {email_col} = ?2"),
            _ => String::new(),
        };
        let set_params = if email_param.is_some() { 2 } else { 1 };

        let mut clauses = Vec::new();
        let mut next = set_params + 1;
        for col in &schema.name_columns {
            let placeholders: Vec<String> = (next..next + lowered.len())
                .map(|i| format!("?{i}"))
                .collect();
            clauses.push(format!("LOWER({col}) IN ({})", placeholders.join(", ")));
            next += lowered.len();
        }

        let sql = format!(
            "UPDATE {table} SET {owner} = ?1{email_set} WHERE {predicate}",
            table = schema.table,
            owner = schema.owner_column,
            predicate = clauses.join(" OR "),
        );

        let mut values: Vec<&dyn rusqlite::ToSql> = Vec::new();
        values.push(&owner_id);
        if let Some(email) = email_param.as_ref() {
            values.push(email);
        }
        for _ in &schema.name_columns {
            for name in &lowered {
                values.push(name);
            }
        }

        let touched = self.conn.execute(&sql, &values[..])?;
        Ok(touched as u64)
    }

    /// Count of completed submissions in one period, per the period's status
    /// column. Periods without a status column count every row.
    pub fn period_completed_count(&self, schema: &PeriodSchema) -> Result<u64, DbError> {
        let sql = match &schema.status_column {
            Some(status_col) => format!(
                "SELECT COUNT(*) FROM {table} WHERE {status_col} = 'completed'",
                table = schema.table,
            ),
            None => format!("SELECT COUNT(*) FROM {table}", table = schema.table),
        };
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

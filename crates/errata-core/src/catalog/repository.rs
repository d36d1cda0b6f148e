//! SQLite persistence for the error code catalog
//!
//! All SQL for the catalog lives here. The reconciliation path executes its
//! writes through an explicit transaction handle obtained from `begin`, so a
//! whole batch becomes visible atomically.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::error::{Error, Result};

use super::model::{
    ErrorCode, ErrorCodeDraft, ErrorCodeFilter, ErrorCodeKind, Page, PageRequest,
};

/// Repository for error code database operations
#[derive(Debug, Clone)]
pub struct ErrorCodeRepository {
    pool: SqlitePool,
}

impl ErrorCodeRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction for a batch of writes
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool.begin().await.map_err(Error::Database)
    }

    // ========== Writes ==========

    /// Insert a new record, returns the store-assigned id
    pub async fn insert(&self, draft: &ErrorCodeDraft, kind: ErrorCodeKind) -> Result<i64> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        self.insert_in(&mut *conn, draft, kind).await
    }

    /// Insert a new record on an existing connection or transaction
    pub async fn insert_in(
        &self,
        conn: &mut SqliteConnection,
        draft: &ErrorCodeDraft,
        kind: ErrorCodeKind,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO error_codes (code, application_name, message, type)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(draft.code)
        .bind(&draft.application_name)
        .bind(&draft.message)
        .bind(kind.as_str())
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;

        Ok(result.last_insert_rowid())
    }

    /// Overwrite an existing record's fields
    pub async fn update(&self, id: i64, draft: &ErrorCodeDraft, kind: ErrorCodeKind) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE error_codes SET
                code = ?,
                application_name = ?,
                message = ?,
                type = ?,
                update_time = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(draft.code)
        .bind(&draft.application_name)
        .bind(&draft.message)
        .bind(kind.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    /// Update only the message of an existing record, on an existing
    /// connection or transaction
    pub async fn update_message_in(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        message: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE error_codes SET
                message = ?,
                update_time = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(message)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    /// Delete a record by id
    pub async fn delete_by_id(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM error_codes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    // ========== Keyed lookups ==========

    /// Get a record by id
    pub async fn find_by_id(&self, id: i64) -> Result<Option<ErrorCode>> {
        let row: Option<ErrorCodeRow> = sqlx::query_as(
            r#"
            SELECT id, code, application_name, message, type AS kind, create_time, update_time
            FROM error_codes
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => Ok(Some(row.into_error_code()?)),
            None => Ok(None),
        }
    }

    /// Get a record by its unique code
    pub async fn find_by_code(&self, code: i64) -> Result<Option<ErrorCode>> {
        let row: Option<ErrorCodeRow> = sqlx::query_as(
            r#"
            SELECT id, code, application_name, message, type AS kind, create_time, update_time
            FROM error_codes
            WHERE code = ?
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => Ok(Some(row.into_error_code()?)),
            None => Ok(None),
        }
    }

    /// Bulk lookup by code set, one query for a whole reconciliation batch
    pub async fn find_by_codes(&self, codes: &[i64]) -> Result<Vec<ErrorCode>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: String = codes.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            r#"
            SELECT id, code, application_name, message, type AS kind, create_time, update_time
            FROM error_codes
            WHERE code IN ({})
            "#,
            placeholders
        );

        let mut query = sqlx::query_as::<_, ErrorCodeRow>(&sql);
        for code in codes {
            query = query.bind(*code);
        }

        let rows: Vec<ErrorCodeRow> = query
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.into_iter().map(|row| row.into_error_code()).collect()
    }

    // ========== Filtered queries ==========

    /// One page of records matching the filter, newest first
    pub async fn find_page(
        &self,
        filter: &ErrorCodeFilter,
        page: &PageRequest,
    ) -> Result<Page<ErrorCode>> {
        let where_clause = filter_clause(filter);

        let count_sql = format!("SELECT COUNT(*) FROM error_codes {}", where_clause);
        let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
        if let Some(code) = filter.code {
            count_query = count_query.bind(code);
        }
        if let Some(application_name) = &filter.application_name {
            count_query = count_query.bind(format!("%{}%", application_name));
        }
        if let Some(kind) = filter.kind {
            count_query = count_query.bind(kind.as_str());
        }
        let (total,) = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        let offset = i64::from(page.page.saturating_sub(1)) * i64::from(page.page_size);
        let select_sql = format!(
            r#"
            SELECT id, code, application_name, message, type AS kind, create_time, update_time
            FROM error_codes
            {}
            ORDER BY id DESC
            LIMIT ? OFFSET ?
            "#,
            where_clause
        );
        let mut select_query = sqlx::query_as::<_, ErrorCodeRow>(&select_sql);
        if let Some(code) = filter.code {
            select_query = select_query.bind(code);
        }
        if let Some(application_name) = &filter.application_name {
            select_query = select_query.bind(format!("%{}%", application_name));
        }
        if let Some(kind) = filter.kind {
            select_query = select_query.bind(kind.as_str());
        }
        select_query = select_query.bind(i64::from(page.page_size)).bind(offset);

        let rows: Vec<ErrorCodeRow> = select_query
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        let items = rows
            .into_iter()
            .map(|row| row.into_error_code())
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total,
            page: page.page,
            page_size: page.page_size,
        })
    }

    /// All records matching the filter, in code order (export path)
    pub async fn find_list(&self, filter: &ErrorCodeFilter) -> Result<Vec<ErrorCode>> {
        let where_clause = filter_clause(filter);
        let sql = format!(
            r#"
            SELECT id, code, application_name, message, type AS kind, create_time, update_time
            FROM error_codes
            {}
            ORDER BY code ASC
            "#,
            where_clause
        );

        let mut query = sqlx::query_as::<_, ErrorCodeRow>(&sql);
        if let Some(code) = filter.code {
            query = query.bind(code);
        }
        if let Some(application_name) = &filter.application_name {
            query = query.bind(format!("%{}%", application_name));
        }
        if let Some(kind) = filter.kind {
            query = query.bind(kind.as_str());
        }

        let rows: Vec<ErrorCodeRow> = query
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.into_iter().map(|row| row.into_error_code()).collect()
    }

    /// Records for one application updated strictly after the given time
    pub async fn find_changed_since(
        &self,
        application_name: &str,
        min_update_time: DateTime<Utc>,
    ) -> Result<Vec<ErrorCode>> {
        let rows: Vec<ErrorCodeRow> = sqlx::query_as(
            r#"
            SELECT id, code, application_name, message, type AS kind, create_time, update_time
            FROM error_codes
            WHERE application_name = ? AND datetime(update_time) > datetime(?)
            ORDER BY update_time ASC
            "#,
        )
        .bind(application_name)
        .bind(min_update_time)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(|row| row.into_error_code()).collect()
    }

    /// Count all records in the catalog
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM error_codes")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(count)
    }
}

/// Build the WHERE clause for a filter; bind order is code, application
/// name, kind
fn filter_clause(filter: &ErrorCodeFilter) -> String {
    let mut conditions = Vec::new();
    if filter.code.is_some() {
        conditions.push("code = ?");
    }
    if filter.application_name.is_some() {
        conditions.push("application_name LIKE ?");
    }
    if filter.kind.is_some() {
        conditions.push("type = ?");
    }

    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

// ========== Database Row Types ==========

#[derive(sqlx::FromRow)]
struct ErrorCodeRow {
    id: i64,
    code: i64,
    application_name: String,
    message: String,
    kind: String,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

impl ErrorCodeRow {
    fn into_error_code(self) -> Result<ErrorCode> {
        let kind = ErrorCodeKind::from_str(&self.kind)
            .ok_or_else(|| Error::Parse(format!("Invalid error code type: {}", self.kind)))?;

        Ok(ErrorCode {
            id: self.id,
            code: self.code,
            application_name: self.application_name,
            message: self.message,
            kind,
            create_time: self.create_time,
            update_time: self.update_time,
        })
    }
}

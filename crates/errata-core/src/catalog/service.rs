//! Error code catalog service
//!
//! Business rules on top of the repository: duplicate and existence checks
//! for the manual paths, and batch reconciliation that merges
//! externally-declared error codes into the catalog without disturbing
//! manually curated entries.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::error::{Error, Result};

use super::model::{
    DeclaredErrorCode, ErrorCode, ErrorCodeDraft, ErrorCodeFilter, ErrorCodeKind,
    ErrorCodeSnapshot, Page, PageRequest,
};
use super::repository::ErrorCodeRepository;

/// Check that `code` is free for use by the record identified by `exclude_id`
///
/// A record is allowed to keep its own code on update, so a match on
/// `exclude_id` passes. This is a best-effort pre-check; the store's unique
/// index on `code` remains the authoritative defense under concurrency.
pub async fn validate_code_available(
    repo: &ErrorCodeRepository,
    code: i64,
    exclude_id: Option<i64>,
) -> Result<()> {
    let Some(existing) = repo.find_by_code(code).await? else {
        return Ok(());
    };

    match exclude_id {
        Some(id) if existing.id == id => Ok(()),
        _ => Err(Error::DuplicateCode(code)),
    }
}

/// Fetch a record by id, failing when it does not exist
pub async fn require_error_code(repo: &ErrorCodeRepository, id: i64) -> Result<ErrorCode> {
    repo.find_by_id(id).await?.ok_or(Error::NotFound(id))
}

fn validate_draft(draft: &ErrorCodeDraft) -> Result<()> {
    if draft.application_name.trim().is_empty() {
        return Err(Error::InvalidInput(
            "application name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Error code catalog service
///
/// Manual CRUD keeps records operator-owned (`Manual`); `reconcile` merges
/// declared batches as `AutoGenerated` records.
pub struct ErrorCodeService {
    repo: ErrorCodeRepository,
}

impl ErrorCodeService {
    /// Create a new service over the given repository
    pub fn new(repo: ErrorCodeRepository) -> Self {
        Self { repo }
    }

    /// Get a reference to the underlying repository
    pub fn repository(&self) -> &ErrorCodeRepository {
        &self.repo
    }

    /// Create a manually curated error code, returns the assigned id
    pub async fn create(&self, draft: &ErrorCodeDraft) -> Result<i64> {
        validate_draft(draft)?;
        validate_code_available(&self.repo, draft.code, None).await?;

        let id = self.repo.insert(draft, ErrorCodeKind::Manual).await?;
        info!(
            id,
            code = draft.code,
            application = %draft.application_name,
            "Created error code"
        );
        Ok(id)
    }

    /// Overwrite an existing record; the record becomes operator-owned
    pub async fn update(&self, id: i64, draft: &ErrorCodeDraft) -> Result<()> {
        validate_draft(draft)?;
        require_error_code(&self.repo, id).await?;
        validate_code_available(&self.repo, draft.code, Some(id)).await?;

        self.repo.update(id, draft, ErrorCodeKind::Manual).await?;
        info!(id, code = draft.code, "Updated error code");
        Ok(())
    }

    /// Delete a record by id
    pub async fn delete(&self, id: i64) -> Result<()> {
        require_error_code(&self.repo, id).await?;

        self.repo.delete_by_id(id).await?;
        info!(id, "Deleted error code");
        Ok(())
    }

    /// Get a record by id
    pub async fn get(&self, id: i64) -> Result<Option<ErrorCode>> {
        self.repo.find_by_id(id).await
    }

    /// One page of records matching the filter
    pub async fn page(
        &self,
        filter: &ErrorCodeFilter,
        page: &PageRequest,
    ) -> Result<Page<ErrorCode>> {
        if page.page == 0 || page.page_size == 0 {
            return Err(Error::InvalidInput(
                "page and page size must be at least 1".to_string(),
            ));
        }
        self.repo.find_page(filter, page).await
    }

    /// All records matching the filter
    pub async fn list(&self, filter: &ErrorCodeFilter) -> Result<Vec<ErrorCode>> {
        self.repo.find_list(filter).await
    }

    /// Records for one application updated strictly after `min_update_time`,
    /// in the external snapshot shape
    pub async fn changed_since(
        &self,
        application_name: &str,
        min_update_time: DateTime<Utc>,
    ) -> Result<Vec<ErrorCodeSnapshot>> {
        let records = self
            .repo
            .find_changed_since(application_name, min_update_time)
            .await?;
        Ok(records.into_iter().map(ErrorCodeSnapshot::from).collect())
    }

    /// Merge a batch of externally-declared error codes into the catalog.
    ///
    /// Runs as a single transaction. Each entry is applied independently, in
    /// batch order: unknown codes are inserted as auto-generated records;
    /// known codes are updated only when the existing record is
    /// auto-generated, owned by the same application, and carries a
    /// different message. Ownership conflicts are logged and skipped, never
    /// raised, so one misconfigured application cannot fail the batch.
    pub async fn reconcile(&self, declared: &[DeclaredErrorCode]) -> Result<()> {
        if declared.is_empty() {
            return Ok(());
        }

        // One bulk lookup for the whole batch
        let codes: Vec<i64> = declared
            .iter()
            .map(|d| d.code)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let existing = self.repo.find_by_codes(&codes).await?;
        let mut by_code: HashMap<i64, ErrorCode> = existing
            .into_iter()
            .map(|record| (record.code, record))
            .collect();

        let mut tx = self.repo.begin().await?;
        for entry in declared {
            match by_code.get(&entry.code).cloned() {
                None => {
                    let draft = ErrorCodeDraft {
                        code: entry.code,
                        application_name: entry.application_name.clone(),
                        message: entry.message.clone(),
                    };
                    let id = self
                        .repo
                        .insert_in(&mut *tx, &draft, ErrorCodeKind::AutoGenerated)
                        .await?;
                    debug!(
                        id,
                        code = entry.code,
                        application = %entry.application_name,
                        "Registered auto-generated error code"
                    );

                    // Keep the index current so a duplicate declared code
                    // later in the batch takes the update path
                    let now = Utc::now();
                    by_code.insert(
                        entry.code,
                        ErrorCode {
                            id,
                            code: entry.code,
                            application_name: entry.application_name.clone(),
                            message: entry.message.clone(),
                            kind: ErrorCodeKind::AutoGenerated,
                            create_time: now,
                            update_time: now,
                        },
                    );
                }
                Some(existing) => {
                    // Manually curated records are immune to reconciliation
                    if existing.kind != ErrorCodeKind::AutoGenerated {
                        continue;
                    }
                    // Same code claimed by two applications: keep the
                    // catalog entry, surface the conflict, move on
                    if existing.application_name != entry.application_name {
                        error!(
                            code = entry.code,
                            declared_application = %entry.application_name,
                            existing_application = %existing.application_name,
                            "Skipping declared error code, already owned by another application"
                        );
                        continue;
                    }
                    // Unchanged message needs no write
                    if existing.message == entry.message {
                        continue;
                    }

                    self.repo
                        .update_message_in(&mut *tx, existing.id, &entry.message)
                        .await?;
                    debug!(
                        id = existing.id,
                        code = entry.code,
                        "Refreshed auto-generated error code message"
                    );
                    by_code.insert(
                        entry.code,
                        ErrorCode {
                            message: entry.message.clone(),
                            ..existing
                        },
                    );
                }
            }
        }
        tx.commit().await.map_err(Error::Database)?;

        info!(entries = declared.len(), "Reconciled declared error codes");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use chrono::Duration;

    async fn create_test_service() -> ErrorCodeService {
        let db = Database::in_memory()
            .await
            .expect("Failed to create test database");
        ErrorCodeService::new(ErrorCodeRepository::new(db.pool().clone()))
    }

    fn draft(code: i64, application_name: &str, message: &str) -> ErrorCodeDraft {
        ErrorCodeDraft {
            code,
            application_name: application_name.to_string(),
            message: message.to_string(),
        }
    }

    fn declared(code: i64, application_name: &str, message: &str) -> DeclaredErrorCode {
        DeclaredErrorCode {
            code,
            application_name: application_name.to_string(),
            message: message.to_string(),
        }
    }

    // ========== Manual CRUD ==========

    #[tokio::test]
    async fn test_create_and_get() {
        let service = create_test_service().await;

        let id = service
            .create(&draft(1001, "billing", "Account not found"))
            .await
            .expect("Failed to create");

        let record = service
            .get(id)
            .await
            .expect("Failed to get")
            .expect("Record not found");
        assert_eq!(record.code, 1001);
        assert_eq!(record.kind, ErrorCodeKind::Manual);
    }

    #[tokio::test]
    async fn test_create_duplicate_code_fails() {
        let service = create_test_service().await;

        service
            .create(&draft(1001, "billing", "m"))
            .await
            .expect("Failed to create");

        let result = service.create(&draft(1001, "orders", "m2")).await;
        assert!(matches!(result, Err(Error::DuplicateCode(1001))));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_application_name() {
        let service = create_test_service().await;

        let result = service.create(&draft(1001, "  ", "m")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_update_missing_record_fails() {
        let service = create_test_service().await;

        let result = service.update(42, &draft(1001, "billing", "m")).await;
        assert!(matches!(result, Err(Error::NotFound(42))));
    }

    #[tokio::test]
    async fn test_update_to_taken_code_fails() {
        let service = create_test_service().await;

        service
            .create(&draft(1001, "billing", "m"))
            .await
            .expect("Failed to create");
        let id = service
            .create(&draft(1002, "billing", "m"))
            .await
            .expect("Failed to create");

        let result = service.update(id, &draft(1001, "billing", "m")).await;
        assert!(matches!(result, Err(Error::DuplicateCode(1001))));
    }

    #[tokio::test]
    async fn test_update_to_own_code_succeeds() {
        let service = create_test_service().await;

        let id = service
            .create(&draft(1001, "billing", "old"))
            .await
            .expect("Failed to create");

        service
            .update(id, &draft(1001, "billing", "new"))
            .await
            .expect("Failed to update");

        let record = service.get(id).await.expect("Failed to get").unwrap();
        assert_eq!(record.message, "new");
    }

    #[tokio::test]
    async fn test_update_forces_manual_kind() {
        let service = create_test_service().await;

        service
            .reconcile(&[declared(1001, "billing", "m")])
            .await
            .expect("Failed to reconcile");
        let record = service
            .repository()
            .find_by_code(1001)
            .await
            .expect("Failed to find")
            .unwrap();
        assert_eq!(record.kind, ErrorCodeKind::AutoGenerated);

        service
            .update(record.id, &draft(1001, "billing", "edited"))
            .await
            .expect("Failed to update");

        let record = service.get(record.id).await.expect("Failed to get").unwrap();
        assert_eq!(record.kind, ErrorCodeKind::Manual);
    }

    #[tokio::test]
    async fn test_delete() {
        let service = create_test_service().await;

        let id = service
            .create(&draft(1001, "billing", "m"))
            .await
            .expect("Failed to create");

        service.delete(id).await.expect("Failed to delete");
        assert!(service.get(id).await.expect("Failed to get").is_none());

        let result = service.delete(id).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_page_rejects_zero_page() {
        let service = create_test_service().await;

        let result = service
            .page(
                &ErrorCodeFilter::default(),
                &PageRequest { page: 0, page_size: 20 },
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    // ========== Reconciliation ==========

    #[tokio::test]
    async fn test_reconcile_empty_batch_is_noop() {
        let service = create_test_service().await;

        service.reconcile(&[]).await.expect("Failed to reconcile");
        assert_eq!(
            service.repository().count().await.expect("Failed to count"),
            0
        );
    }

    #[tokio::test]
    async fn test_reconcile_inserts_new_codes() {
        let service = create_test_service().await;

        service
            .reconcile(&[declared(1, "A", "m1")])
            .await
            .expect("Failed to reconcile");

        let record = service
            .repository()
            .find_by_code(1)
            .await
            .expect("Failed to find")
            .expect("Record not inserted");
        assert_eq!(record.application_name, "A");
        assert_eq!(record.message, "m1");
        assert_eq!(record.kind, ErrorCodeKind::AutoGenerated);
    }

    #[tokio::test]
    async fn test_reconcile_updates_message_only() {
        let service = create_test_service().await;

        service
            .reconcile(&[declared(1, "A", "old")])
            .await
            .expect("Failed to reconcile");
        let before = service
            .repository()
            .find_by_code(1)
            .await
            .expect("Failed to find")
            .unwrap();

        service
            .reconcile(&[declared(1, "A", "new")])
            .await
            .expect("Failed to reconcile");

        let after = service
            .repository()
            .find_by_code(1)
            .await
            .expect("Failed to find")
            .unwrap();
        assert_eq!(after.message, "new");
        assert_eq!(after.id, before.id);
        assert_eq!(after.code, before.code);
        assert_eq!(after.application_name, before.application_name);
        assert_eq!(after.kind, ErrorCodeKind::AutoGenerated);
    }

    #[tokio::test]
    async fn test_reconcile_skips_on_application_mismatch() {
        let service = create_test_service().await;

        service
            .reconcile(&[declared(1, "A", "m")])
            .await
            .expect("Failed to reconcile");
        let before = service
            .repository()
            .find_by_code(1)
            .await
            .expect("Failed to find")
            .unwrap();

        service
            .reconcile(&[declared(1, "B", "m2")])
            .await
            .expect("Failed to reconcile");

        let after = service
            .repository()
            .find_by_code(1)
            .await
            .expect("Failed to find")
            .unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_reconcile_never_touches_manual_records() {
        let service = create_test_service().await;

        let id = service
            .create(&draft(1, "A", "m"))
            .await
            .expect("Failed to create");
        let before = service.get(id).await.expect("Failed to get").unwrap();

        service
            .reconcile(&[declared(1, "A", "m2")])
            .await
            .expect("Failed to reconcile");

        let after = service.get(id).await.expect("Failed to get").unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_reconcile_skips_unchanged_message() {
        let service = create_test_service().await;

        service
            .reconcile(&[declared(1, "A", "m")])
            .await
            .expect("Failed to reconcile");
        let before = service
            .repository()
            .find_by_code(1)
            .await
            .expect("Failed to find")
            .unwrap();

        service
            .reconcile(&[declared(1, "A", "m")])
            .await
            .expect("Failed to reconcile");

        let after = service
            .repository()
            .find_by_code(1)
            .await
            .expect("Failed to find")
            .unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let service = create_test_service().await;
        let batch = vec![
            declared(1, "A", "m1"),
            declared(2, "A", "m2"),
            declared(3, "B", "m3"),
        ];

        service.reconcile(&batch).await.expect("Failed to reconcile");
        let first: Vec<ErrorCode> = service
            .list(&ErrorCodeFilter::default())
            .await
            .expect("Failed to list");

        service.reconcile(&batch).await.expect("Failed to reconcile");
        let second: Vec<ErrorCode> = service
            .list(&ErrorCodeFilter::default())
            .await
            .expect("Failed to list");

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_reconcile_entries_are_independent() {
        let service = create_test_service().await;

        // One manual record, one conflicting owner, one fresh code
        service
            .create(&draft(1, "A", "manual"))
            .await
            .expect("Failed to create");
        service
            .reconcile(&[declared(2, "A", "m")])
            .await
            .expect("Failed to reconcile");

        service
            .reconcile(&[
                declared(1, "A", "ignored"),
                declared(2, "B", "ignored"),
                declared(3, "C", "inserted"),
            ])
            .await
            .expect("Failed to reconcile");

        let records = service
            .list(&ErrorCodeFilter::default())
            .await
            .expect("Failed to list");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].message, "manual");
        assert_eq!(records[1].message, "m");
        assert_eq!(records[2].message, "inserted");
        assert_eq!(records[2].kind, ErrorCodeKind::AutoGenerated);
    }

    #[tokio::test]
    async fn test_reconcile_duplicate_codes_in_batch_last_wins() {
        let service = create_test_service().await;

        service
            .reconcile(&[declared(1, "A", "m1"), declared(1, "A", "m2")])
            .await
            .expect("Failed to reconcile");

        assert_eq!(
            service.repository().count().await.expect("Failed to count"),
            1
        );
        let record = service
            .repository()
            .find_by_code(1)
            .await
            .expect("Failed to find")
            .unwrap();
        assert_eq!(record.message, "m2");
        assert_eq!(record.kind, ErrorCodeKind::AutoGenerated);
    }

    #[tokio::test]
    async fn test_reconcile_duplicate_codes_in_batch_respects_ownership() {
        let service = create_test_service().await;

        service
            .reconcile(&[declared(1, "A", "m1"), declared(1, "B", "m2")])
            .await
            .expect("Failed to reconcile");

        let record = service
            .repository()
            .find_by_code(1)
            .await
            .expect("Failed to find")
            .unwrap();
        assert_eq!(record.application_name, "A");
        assert_eq!(record.message, "m1");
    }

    // ========== Change feed ==========

    #[tokio::test]
    async fn test_changed_since_filters_by_application_and_time() {
        let service = create_test_service().await;

        service
            .reconcile(&[declared(1, "A", "m1"), declared(2, "B", "m2")])
            .await
            .expect("Failed to reconcile");

        let past = Utc::now() - Duration::hours(1);
        let snapshots = service
            .changed_since("A", past)
            .await
            .expect("Failed to query");
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].code, 1);
        assert_eq!(snapshots[0].message, "m1");

        let future = Utc::now() + Duration::hours(1);
        let snapshots = service
            .changed_since("A", future)
            .await
            .expect("Failed to query");
        assert!(snapshots.is_empty());
    }
}

//! Unit of work: the transaction lifecycle wrapper
//!
//! State machine per instance: Idle → Active → Idle, via commit or rollback.
//! Committing persists every staged change through the context inside the
//! transaction; disposal performs an implicit rollback when a transaction is
//! still active. Only one transaction may be active at a time per context
//! scope.

use std::sync::Arc;

use crate::core::error::{StoreError, StoreResult};
use crate::store::context::DataContext;

/// Transaction lifecycle wrapper around one [`DataContext`] scope.
pub struct UnitOfWork {
    context: Arc<DataContext>,
    active: bool,
    disposed: bool,
}

impl UnitOfWork {
    pub fn new(context: Arc<DataContext>) -> Self {
        Self {
            context,
            active: false,
            disposed: false,
        }
    }

    /// Start a new transaction.
    ///
    /// Fails with an invalid-state error when a transaction is already in
    /// progress.
    pub async fn begin(&mut self) -> StoreResult<()> {
        tracing::info!("starting a new transaction");

        if self.active {
            return Err(StoreError::invalid_state(
                "the transaction has already been started",
            ));
        }

        self.context.begin_transaction()?;
        self.active = true;

        Ok(())
    }

    /// Apply the outstanding staged changes and commit the transaction.
    ///
    /// Fails with an invalid-state error when no transaction is in progress.
    /// If applying the staged changes fails, the transaction stays active so
    /// the caller can roll it back.
    pub async fn commit(&mut self) -> StoreResult<()> {
        tracing::info!("committing the transaction");

        if !self.active {
            return Err(StoreError::invalid_state(
                "the transaction has not been started",
            ));
        }

        self.context.save_changes()?;
        self.context.commit_transaction()?;
        self.active = false;

        Ok(())
    }

    /// Discard the current transaction.
    ///
    /// A harmless no-op when no transaction is in progress.
    pub async fn rollback(&mut self) -> StoreResult<()> {
        tracing::info!("rolling back the transaction");

        if !self.active {
            tracing::warn!("nothing to do, the transaction has not been started");

            return Ok(());
        }

        self.context.rollback_transaction()?;
        self.active = false;

        Ok(())
    }

    /// Release the unit of work, rolling back any active transaction.
    ///
    /// Idempotent; after disposal every call is a no-op.
    pub async fn dispose(&mut self) -> StoreResult<()> {
        tracing::debug!("disposing the unit of work");

        if self.disposed {
            return Ok(());
        }

        if self.active {
            self.context.rollback_transaction()?;
            self.active = false;
        }

        self.disposed = true;

        Ok(())
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.active && !self.disposed {
            // Best-effort synchronous cleanup for scopes that never disposed.
            let _ = self.context.rollback_transaction();
            tracing::warn!("unit of work dropped with an active transaction, rolled back");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    #[derive(Clone, Debug)]
    struct Event {
        id: Uuid,
        created_at: DateTime<Utc>,
        updated_at: Option<DateTime<Utc>>,
        name: String,
    }

    crate::impl_entity!(Event);

    fn event(name: &str) -> Event {
        Event {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: None,
            name: name.to_string(),
        }
    }

    fn context() -> Arc<DataContext> {
        let context = Arc::new(DataContext::new());
        context.register::<Event>().unwrap();

        context
    }

    #[tokio::test]
    async fn test_begin_twice_fails() {
        let mut uow = UnitOfWork::new(context());

        uow.begin().await.unwrap();
        let err = uow.begin().await.unwrap_err();

        assert!(matches!(err, StoreError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_commit_without_begin_fails() {
        let mut uow = UnitOfWork::new(context());

        let err = uow.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_rollback_without_begin_is_noop() {
        let mut uow = UnitOfWork::new(context());

        uow.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_persists_staged_changes() {
        let context = context();
        let mut uow = UnitOfWork::new(Arc::clone(&context));

        uow.begin().await.unwrap();
        context.stage_insert(event("committed")).unwrap();
        uow.commit().await.unwrap();

        assert_eq!(context.snapshot::<Event>(false).unwrap().len(), 1);

        // the transaction is released; a new one can start
        uow.begin().await.unwrap();
        uow.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_rollback_discards_saved_work() {
        let context = context();
        let mut uow = UnitOfWork::new(Arc::clone(&context));

        uow.begin().await.unwrap();
        context.stage_insert(event("discarded")).unwrap();
        context.save_changes().unwrap();
        uow.rollback().await.unwrap();

        assert!(context.snapshot::<Event>(false).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_rolls_back() {
        let context = context();
        let mut uow = UnitOfWork::new(Arc::clone(&context));

        uow.begin().await.unwrap();
        uow.dispose().await.unwrap();
        uow.dispose().await.unwrap();

        // the context-level transaction was released
        assert!(!context.transaction_active().unwrap());
    }

    #[tokio::test]
    async fn test_drop_releases_active_transaction() {
        let context = context();

        {
            let mut uow = UnitOfWork::new(Arc::clone(&context));
            uow.begin().await.unwrap();
        }

        assert!(!context.transaction_active().unwrap());
    }
}

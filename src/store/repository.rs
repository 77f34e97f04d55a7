//! Generic repository over one entity type
//!
//! Single entry point for CRUD and read composition. Reads always run against
//! a non-tracked snapshot of committed rows and honor the default query
//! filter (soft-deleted rows hidden) unless [`Repository::ignore_query_filters`]
//! was called on the instance. Mutations stage changes on the shared
//! [`DataContext`]; nothing touches committed state until
//! `UnitOfWork::commit` (or `DataContext::save_changes`) runs.
//!
//! The find/paginate families cover every combination of
//! {predicate, ordering, includes}; the combination is part of the method
//! name since each piece changes the signature.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use crate::core::entity::Entity;
use crate::core::error::{StoreError, StoreResult};
use crate::query::include::{self, Includable, IncludeList, IncludePath};
use crate::query::order_by::{self, OrderBy, OrderThenBy};
use crate::query::page::PaginatedSet;
use crate::query::source::Query;
use crate::store::context::{ContextReadView, DataContext};

/// Builds repositories from a shared context handle.
pub trait RepositorySource {
    /// Build a repository over this context for one entity type.
    fn repository<T: Entity>(&self) -> Repository<T>;
}

impl RepositorySource for Arc<DataContext> {
    fn repository<T: Entity>(&self) -> Repository<T> {
        Repository::new(Arc::clone(self))
    }
}

/// Repository for one entity type, bound to one context scope.
pub struct Repository<T: Entity> {
    context: Arc<DataContext>,
    ignore_filters: AtomicBool,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Repository<T> {
    pub fn new(context: Arc<DataContext>) -> Self {
        Self {
            context,
            ignore_filters: AtomicBool::new(false),
            _entity: PhantomData,
        }
    }

    /// Bypass the default query filter for all subsequent reads on this
    /// instance. The toggle is per-repository, not per-call.
    pub fn ignore_query_filters(&self) -> &Self {
        self.ignore_filters.store(true, Ordering::Relaxed);

        self
    }

    fn filters_ignored(&self) -> bool {
        self.ignore_filters.load(Ordering::Relaxed)
    }

    fn base_query(&self) -> StoreResult<Query<T>> {
        Ok(Query::new(self.context.snapshot::<T>(self.filters_ignored())?))
    }

    fn apply_includes(&self, query: Query<T>, includes: &IncludeList<T>) -> StoreResult<Query<T>> {
        let view = ContextReadView::new(&self.context, self.filters_ignored());

        Ok(includes.apply(query, &view)?.extract())
    }

    // === Mutations ===

    /// Ensure a detached instance is tracked by the current scope.
    pub async fn reattach(&self, entity: &T) -> StoreResult<()> {
        self.context.attach(entity)
    }

    /// Ensure every detached instance of the batch is tracked.
    pub async fn reattach_many(&self, entities: &[T]) -> StoreResult<()> {
        self.context.attach_many(entities)
    }

    /// Stage an insertion. Timestamps are left untouched.
    pub async fn add(&self, entity: T) -> StoreResult<()> {
        self.context.stage_insert(entity)
    }

    /// Stage a batch of insertions.
    pub async fn add_many(&self, entities: Vec<T>) -> StoreResult<()> {
        if entities.is_empty() {
            return Err(StoreError::missing_argument("entities"));
        }

        self.context.stage_insert_many(entities)
    }

    /// Reattach, stamp `updated_at` and stage an update.
    pub async fn update(&self, mut entity: T) -> StoreResult<()> {
        self.context.attach(&entity)?;
        entity.set_updated_at(self.context.clock().now_utc());

        self.context.stage_update(entity)
    }

    /// Fetch by id and stage the mutated entity; a no-op when the id does
    /// not resolve.
    pub async fn update_by_id(&self, id: Uuid, mutate: impl FnOnce(&mut T)) -> StoreResult<()> {
        if let Some(mut entity) = self.get(id).await? {
            mutate(&mut entity);
            self.update(entity).await?;
        }

        Ok(())
    }

    /// Reattach, stamp and stage a batch of updates.
    pub async fn update_many(&self, mut entities: Vec<T>) -> StoreResult<()> {
        if entities.is_empty() {
            return Err(StoreError::missing_argument("entities"));
        }

        self.context.attach_many(&entities)?;

        let now = self.context.clock().now_utc();
        for entity in &mut entities {
            entity.set_updated_at(now);
        }

        self.context.stage_update_many(entities)
    }

    /// Apply the mutation to every entity matching the predicate; a no-op
    /// when nothing matches.
    pub async fn update_where(
        &self,
        predicate: impl Fn(&T) -> bool,
        mutate: impl Fn(&mut T),
    ) -> StoreResult<()> {
        let mut entities = self.find_where(predicate).await?;

        if !entities.is_empty() {
            for entity in &mut entities {
                mutate(entity);
            }
            self.update_many(entities).await?;
        }

        Ok(())
    }

    /// Reattach and stage a removal.
    ///
    /// For soft-delete entity types the persistence layer converts the
    /// removal into a timestamped soft delete at save time.
    pub async fn delete(&self, entity: T) -> StoreResult<()> {
        self.context.attach(&entity)?;

        self.context.stage_remove(entity)
    }

    /// Reattach and stage a batch of removals.
    pub async fn delete_many(&self, entities: Vec<T>) -> StoreResult<()> {
        if entities.is_empty() {
            return Err(StoreError::missing_argument("entities"));
        }

        self.context.attach_many(&entities)?;

        self.context.stage_remove_many(entities)
    }

    /// Resolve the id and stage its removal; a no-op when the id does not
    /// resolve.
    pub async fn delete_by_id(&self, id: Uuid) -> StoreResult<()> {
        if let Some(entity) = self.get(id).await? {
            self.delete(entity).await?;
        }

        Ok(())
    }

    /// Resolve an id set and stage the removals; a no-op when none resolve.
    pub async fn delete_by_ids(&self, ids: &[Uuid]) -> StoreResult<()> {
        let entities = self.find_where(|entity| ids.contains(&entity.id())).await?;

        if !entities.is_empty() {
            self.delete_many(entities).await?;
        }

        Ok(())
    }

    /// Resolve the predicate and stage the removals; a no-op when nothing
    /// matches.
    pub async fn delete_where(&self, predicate: impl Fn(&T) -> bool) -> StoreResult<()> {
        let entities = self.find_where(predicate).await?;

        if !entities.is_empty() {
            self.delete_many(entities).await?;
        }

        Ok(())
    }

    // === Reads ===

    /// Count all entities.
    pub async fn count(&self) -> StoreResult<usize> {
        Ok(self.base_query()?.count())
    }

    /// Count the entities matching the predicate.
    pub async fn count_where(&self, predicate: impl Fn(&T) -> bool) -> StoreResult<usize> {
        Ok(self.base_query()?.filter(predicate).count())
    }

    /// Check whether any entity matches the predicate.
    pub async fn exists(&self, predicate: impl Fn(&T) -> bool) -> StoreResult<bool> {
        Ok(self.count_where(predicate).await? > 0)
    }

    /// Check whether the id resolves.
    pub async fn exists_by_id(&self, id: Uuid) -> StoreResult<bool> {
        self.exists(|entity| entity.id() == id).await
    }

    /// Get an entity by id.
    pub async fn get(&self, id: Uuid) -> StoreResult<Option<T>> {
        self.get_by(|entity| entity.id() == id).await
    }

    /// Get an entity by id with its eager-load paths populated.
    pub async fn get_with<P: Entity>(
        &self,
        id: Uuid,
        includable: impl FnOnce(Includable<T>) -> IncludePath<T, P>,
    ) -> StoreResult<Option<T>> {
        self.get_by_with(|entity| entity.id() == id, includable)
            .await
    }

    /// Get the first entity matching the predicate.
    pub async fn get_by(&self, predicate: impl Fn(&T) -> bool) -> StoreResult<Option<T>> {
        Ok(self
            .base_query()?
            .filter(predicate)
            .into_vec()
            .into_iter()
            .next())
    }

    /// Get the first entity matching the predicate, with its eager-load
    /// paths populated.
    pub async fn get_by_with<P: Entity>(
        &self,
        predicate: impl Fn(&T) -> bool,
        includable: impl FnOnce(Includable<T>) -> IncludePath<T, P>,
    ) -> StoreResult<Option<T>> {
        let matched = self.base_query()?.filter(predicate);
        let includes = include::build(includable);

        Ok(self
            .apply_includes(matched, &includes)?
            .into_vec()
            .into_iter()
            .next())
    }

    /// Find all entities.
    pub async fn find(&self) -> StoreResult<Vec<T>> {
        Ok(self.base_query()?.into_vec())
    }

    /// Find the entities matching the predicate.
    pub async fn find_where(&self, predicate: impl Fn(&T) -> bool) -> StoreResult<Vec<T>> {
        Ok(self.base_query()?.filter(predicate).into_vec())
    }

    /// Find all entities, ordered.
    pub async fn find_order_by(
        &self,
        order: impl FnOnce(OrderBy<T>) -> OrderThenBy<T>,
    ) -> StoreResult<Vec<T>> {
        let query = self.base_query()?;

        Ok(order_by::build(order).apply(query)?.extract().into_vec())
    }

    /// Find the entities matching the predicate, ordered.
    pub async fn find_where_order_by(
        &self,
        predicate: impl Fn(&T) -> bool,
        order: impl FnOnce(OrderBy<T>) -> OrderThenBy<T>,
    ) -> StoreResult<Vec<T>> {
        let query = self.base_query()?.filter(predicate);

        Ok(order_by::build(order).apply(query)?.extract().into_vec())
    }

    /// Find all entities with their eager-load paths populated.
    pub async fn find_include<P: Entity>(
        &self,
        includable: impl FnOnce(Includable<T>) -> IncludePath<T, P>,
    ) -> StoreResult<Vec<T>> {
        let query = self.base_query()?;
        let includes = include::build(includable);

        Ok(self.apply_includes(query, &includes)?.into_vec())
    }

    /// Find the entities matching the predicate, with their eager-load paths
    /// populated.
    pub async fn find_where_include<P: Entity>(
        &self,
        predicate: impl Fn(&T) -> bool,
        includable: impl FnOnce(Includable<T>) -> IncludePath<T, P>,
    ) -> StoreResult<Vec<T>> {
        let query = self.base_query()?.filter(predicate);
        let includes = include::build(includable);

        Ok(self.apply_includes(query, &includes)?.into_vec())
    }

    /// Find all entities, ordered, with their eager-load paths populated.
    pub async fn find_order_by_include<P: Entity>(
        &self,
        order: impl FnOnce(OrderBy<T>) -> OrderThenBy<T>,
        includable: impl FnOnce(Includable<T>) -> IncludePath<T, P>,
    ) -> StoreResult<Vec<T>> {
        let query = self.base_query()?;
        let ordered = order_by::build(order).apply(query)?.extract();
        let includes = include::build(includable);

        Ok(self.apply_includes(ordered, &includes)?.into_vec())
    }

    /// Find the entities matching the predicate, ordered, with their
    /// eager-load paths populated.
    pub async fn find_where_order_by_include<P: Entity>(
        &self,
        predicate: impl Fn(&T) -> bool,
        order: impl FnOnce(OrderBy<T>) -> OrderThenBy<T>,
        includable: impl FnOnce(Includable<T>) -> IncludePath<T, P>,
    ) -> StoreResult<Vec<T>> {
        let query = self.base_query()?.filter(predicate);
        let ordered = order_by::build(order).apply(query)?.extract();
        let includes = include::build(includable);

        Ok(self.apply_includes(ordered, &includes)?.into_vec())
    }

    // === Pagination ===

    /// Paginate all entities.
    pub async fn paginate(
        &self,
        current_page: usize,
        per_page: usize,
    ) -> StoreResult<PaginatedSet<T>> {
        self.base_query()?.into_paginated_set(current_page, per_page)
    }

    /// Paginate the entities matching the predicate.
    pub async fn paginate_where(
        &self,
        predicate: impl Fn(&T) -> bool,
        current_page: usize,
        per_page: usize,
    ) -> StoreResult<PaginatedSet<T>> {
        self.base_query()?
            .filter(predicate)
            .into_paginated_set(current_page, per_page)
    }

    /// Paginate all entities, ordered.
    pub async fn paginate_order_by(
        &self,
        order: impl FnOnce(OrderBy<T>) -> OrderThenBy<T>,
        current_page: usize,
        per_page: usize,
    ) -> StoreResult<PaginatedSet<T>> {
        let query = self.base_query()?;

        order_by::build(order)
            .apply(query)?
            .extract()
            .into_paginated_set(current_page, per_page)
    }

    /// Paginate the entities matching the predicate, ordered.
    pub async fn paginate_where_order_by(
        &self,
        predicate: impl Fn(&T) -> bool,
        order: impl FnOnce(OrderBy<T>) -> OrderThenBy<T>,
        current_page: usize,
        per_page: usize,
    ) -> StoreResult<PaginatedSet<T>> {
        let query = self.base_query()?.filter(predicate);

        order_by::build(order)
            .apply(query)?
            .extract()
            .into_paginated_set(current_page, per_page)
    }

    /// Paginate all entities with their eager-load paths populated.
    pub async fn paginate_include<P: Entity>(
        &self,
        includable: impl FnOnce(Includable<T>) -> IncludePath<T, P>,
        current_page: usize,
        per_page: usize,
    ) -> StoreResult<PaginatedSet<T>> {
        let query = self.base_query()?;

        self.paginate_with_includes(query, includable, current_page, per_page)
    }

    /// Paginate the entities matching the predicate, with their eager-load
    /// paths populated.
    pub async fn paginate_where_include<P: Entity>(
        &self,
        predicate: impl Fn(&T) -> bool,
        includable: impl FnOnce(Includable<T>) -> IncludePath<T, P>,
        current_page: usize,
        per_page: usize,
    ) -> StoreResult<PaginatedSet<T>> {
        let query = self.base_query()?.filter(predicate);

        self.paginate_with_includes(query, includable, current_page, per_page)
    }

    /// Paginate all entities, ordered, with their eager-load paths
    /// populated.
    pub async fn paginate_order_by_include<P: Entity>(
        &self,
        order: impl FnOnce(OrderBy<T>) -> OrderThenBy<T>,
        includable: impl FnOnce(Includable<T>) -> IncludePath<T, P>,
        current_page: usize,
        per_page: usize,
    ) -> StoreResult<PaginatedSet<T>> {
        let query = self.base_query()?;
        let ordered = order_by::build(order).apply(query)?.extract();

        self.paginate_with_includes(ordered, includable, current_page, per_page)
    }

    /// Paginate the entities matching the predicate, ordered, with their
    /// eager-load paths populated.
    pub async fn paginate_where_order_by_include<P: Entity>(
        &self,
        predicate: impl Fn(&T) -> bool,
        order: impl FnOnce(OrderBy<T>) -> OrderThenBy<T>,
        includable: impl FnOnce(Includable<T>) -> IncludePath<T, P>,
        current_page: usize,
        per_page: usize,
    ) -> StoreResult<PaginatedSet<T>> {
        let query = self.base_query()?.filter(predicate);
        let ordered = order_by::build(order).apply(query)?.extract();

        self.paginate_with_includes(ordered, includable, current_page, per_page)
    }

    /// Slice the page first, then populate includes for the page items only.
    fn paginate_with_includes<P: Entity>(
        &self,
        query: Query<T>,
        includable: impl FnOnce(Includable<T>) -> IncludePath<T, P>,
        current_page: usize,
        per_page: usize,
    ) -> StoreResult<PaginatedSet<T>> {
        let mut set = query.into_paginated_set(current_page, per_page)?;
        let includes = include::build(includable);

        let items = std::mem::take(&mut set.items);
        set.items = self.apply_includes(Query::new(items), &includes)?.into_vec();

        Ok(set)
    }
}

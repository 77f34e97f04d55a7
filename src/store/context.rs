//! The per-scope data context: change tracking, query filters, transactions
//!
//! A [`DataContext`] owns one logical scope's committed rows, attach registry
//! and staged changes. Repositories for different entity types constructed
//! over the same context share the pending-change set and the transaction
//! boundary. Entity types are registered explicitly — there is no runtime
//! scanning — and registering a type with the soft-delete capability installs
//! both the default query filter and the save hook that converts staged
//! removals into soft deletes.
//!
//! The context is `Send + Sync`, but it is a request-scoped object: callers
//! must not interleave mutations from concurrent tasks. Use a
//! [`DataContextFactory`] to create independent contexts for parallel work.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::core::entity::{Entity, SoftDelete};
use crate::core::error::{StoreError, StoreResult};
use crate::query::include::NavigationSource;

/// Attach state of an entity instance relative to a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// The instance is unknown to the change tracker
    Detached,
    /// The instance is tracked by the context
    Attached,
}

enum PendingChange<T> {
    Insert(T),
    Update(T),
    Remove(T),
}

struct SoftDeleteHook<T> {
    mark: Arc<dyn Fn(&mut T, DateTime<Utc>) + Send + Sync>,
    excluded: Arc<dyn Fn(&T) -> bool + Send + Sync>,
}

struct TypedSet<T: Entity> {
    rows: IndexMap<Uuid, T>,
    attached: HashSet<Uuid>,
    pending: Vec<PendingChange<T>>,
    soft_delete: Option<SoftDeleteHook<T>>,
    tx_snapshot: Option<IndexMap<Uuid, T>>,
}

impl<T: Entity> TypedSet<T> {
    fn new(soft_delete: Option<SoftDeleteHook<T>>) -> Self {
        Self {
            rows: IndexMap::new(),
            attached: HashSet::new(),
            pending: Vec::new(),
            soft_delete,
            tx_snapshot: None,
        }
    }

    fn snapshot(&self, ignore_filters: bool) -> Vec<T> {
        self.rows
            .values()
            .filter(|row| {
                ignore_filters
                    || self
                        .soft_delete
                        .as_ref()
                        .is_none_or(|hook| !(hook.excluded)(row))
            })
            .cloned()
            .collect()
    }
}

/// Object-safe view over a typed set, keyed by `TypeId` in the context.
trait AnySet: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn entity_name(&self) -> &'static str;
    fn pending_len(&self) -> usize;
    fn save(&mut self, now: DateTime<Utc>) -> StoreResult<usize>;
    fn tx_begin(&mut self);
    fn tx_commit(&mut self);
    fn tx_rollback(&mut self);
    fn fetch_by(
        &self,
        ignore_filters: bool,
        predicate: &mut dyn FnMut(&(dyn Any + Send + Sync)) -> bool,
    ) -> Vec<Box<dyn Any + Send + Sync>>;
}

impl<T: Entity> AnySet for TypedSet<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn entity_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn save(&mut self, now: DateTime<Utc>) -> StoreResult<usize> {
        // Save hook: staged removals of soft-delete entities become updates
        // that stamp the deletion timestamp.
        if let Some(hook) = &self.soft_delete {
            for change in &mut self.pending {
                if let PendingChange::Remove(entity) = change {
                    let mut entity = entity.clone();
                    (hook.mark)(&mut entity, now);
                    *change = PendingChange::Update(entity);
                }
            }
        }

        // Reject the whole batch before applying anything, walking the staged
        // changes against the would-be key set.
        let mut keys: HashSet<Uuid> = self.rows.keys().copied().collect();
        for change in &self.pending {
            match change {
                PendingChange::Insert(entity) => {
                    if !keys.insert(entity.id()) {
                        return Err(StoreError::conflict(format!(
                            "duplicate key '{}' for {}",
                            entity.id(),
                            std::any::type_name::<T>(),
                        )));
                    }
                }
                PendingChange::Update(entity) => {
                    if !keys.contains(&entity.id()) {
                        return Err(StoreError::conflict(format!(
                            "row '{}' of {} does not exist",
                            entity.id(),
                            std::any::type_name::<T>(),
                        )));
                    }
                }
                PendingChange::Remove(entity) => {
                    if !keys.remove(&entity.id()) {
                        return Err(StoreError::conflict(format!(
                            "row '{}' of {} does not exist",
                            entity.id(),
                            std::any::type_name::<T>(),
                        )));
                    }
                }
            }
        }

        let mut affected = 0;
        for change in self.pending.drain(..) {
            match change {
                PendingChange::Insert(entity) | PendingChange::Update(entity) => {
                    self.attached.insert(entity.id());
                    self.rows.insert(entity.id(), entity);
                }
                PendingChange::Remove(entity) => {
                    self.rows.shift_remove(&entity.id());
                    self.attached.remove(&entity.id());
                }
            }

            affected += 1;
        }

        Ok(affected)
    }

    fn tx_begin(&mut self) {
        self.tx_snapshot = Some(self.rows.clone());
    }

    fn tx_commit(&mut self) {
        self.tx_snapshot = None;
    }

    fn tx_rollback(&mut self) {
        if let Some(snapshot) = self.tx_snapshot.take() {
            self.rows = snapshot;
        }
    }

    fn fetch_by(
        &self,
        ignore_filters: bool,
        predicate: &mut dyn FnMut(&(dyn Any + Send + Sync)) -> bool,
    ) -> Vec<Box<dyn Any + Send + Sync>> {
        self.rows
            .values()
            .filter(|row| {
                ignore_filters
                    || self
                        .soft_delete
                        .as_ref()
                        .is_none_or(|hook| !(hook.excluded)(row))
            })
            .filter(|row| predicate(*row))
            .map(|row| Box::new(row.clone()) as Box<dyn Any + Send + Sync>)
            .collect()
    }
}

struct ContextInner {
    sets: HashMap<TypeId, Box<dyn AnySet>>,
    transaction_active: bool,
}

/// The change-tracking data context for one logical scope.
pub struct DataContext {
    inner: RwLock<ContextInner>,
    clock: Arc<dyn Clock>,
}

impl DataContext {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(ContextInner {
                sets: HashMap::new(),
                transaction_active: false,
            }),
            clock,
        }
    }

    /// Register an entity type with the context.
    ///
    /// Every type must be registered before repositories touch it; there is
    /// no runtime type scanning.
    pub fn register<T: Entity>(&self) -> StoreResult<()> {
        self.install::<T>(None)
    }

    /// Register a soft-delete entity type.
    ///
    /// Installs the default query filter that hides soft-deleted rows and the
    /// save hook that converts staged removals into timestamped soft deletes.
    pub fn register_soft_delete<T: SoftDelete>(&self) -> StoreResult<()> {
        self.install::<T>(Some(SoftDeleteHook {
            mark: Arc::new(|entity: &mut T, now| entity.set_deleted_at(Some(now))),
            excluded: Arc::new(|entity: &T| entity.is_deleted()),
        }))
    }

    fn install<T: Entity>(&self, soft_delete: Option<SoftDeleteHook<T>>) -> StoreResult<()> {
        let mut inner = self.write()?;

        if inner.sets.contains_key(&TypeId::of::<T>()) {
            return Err(StoreError::invalid_state(format!(
                "{} is already registered",
                std::any::type_name::<T>(),
            )));
        }

        inner
            .sets
            .insert(TypeId::of::<T>(), Box::new(TypedSet::new(soft_delete)));

        Ok(())
    }

    pub(crate) fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Attach state of an entity instance.
    pub fn entry_state<T: Entity>(&self, id: Uuid) -> StoreResult<EntryState> {
        self.with_set::<T, _>(|set| {
            if set.attached.contains(&id) {
                EntryState::Attached
            } else {
                EntryState::Detached
            }
        })
    }

    /// Mark a detached instance as tracked by this context.
    pub(crate) fn attach<T: Entity>(&self, entity: &T) -> StoreResult<()> {
        self.with_set_mut::<T, _>(|set| {
            set.attached.insert(entity.id());
        })
    }

    pub(crate) fn attach_many<T: Entity>(&self, entities: &[T]) -> StoreResult<()> {
        self.with_set_mut::<T, _>(|set| {
            for entity in entities {
                set.attached.insert(entity.id());
            }
        })
    }

    pub(crate) fn stage_insert<T: Entity>(&self, entity: T) -> StoreResult<()> {
        self.with_set_mut::<T, _>(|set| set.pending.push(PendingChange::Insert(entity)))
    }

    pub(crate) fn stage_insert_many<T: Entity>(&self, entities: Vec<T>) -> StoreResult<()> {
        self.with_set_mut::<T, _>(|set| {
            set.pending
                .extend(entities.into_iter().map(PendingChange::Insert));
        })
    }

    pub(crate) fn stage_update<T: Entity>(&self, entity: T) -> StoreResult<()> {
        self.with_set_mut::<T, _>(|set| set.pending.push(PendingChange::Update(entity)))
    }

    pub(crate) fn stage_update_many<T: Entity>(&self, entities: Vec<T>) -> StoreResult<()> {
        self.with_set_mut::<T, _>(|set| {
            set.pending
                .extend(entities.into_iter().map(PendingChange::Update));
        })
    }

    pub(crate) fn stage_remove<T: Entity>(&self, entity: T) -> StoreResult<()> {
        self.with_set_mut::<T, _>(|set| set.pending.push(PendingChange::Remove(entity)))
    }

    pub(crate) fn stage_remove_many<T: Entity>(&self, entities: Vec<T>) -> StoreResult<()> {
        self.with_set_mut::<T, _>(|set| {
            set.pending
                .extend(entities.into_iter().map(PendingChange::Remove));
        })
    }

    /// Detached clones of the committed rows, honoring the default query
    /// filter unless `ignore_filters` is set.
    pub(crate) fn snapshot<T: Entity>(&self, ignore_filters: bool) -> StoreResult<Vec<T>> {
        self.with_set::<T, _>(|set| set.snapshot(ignore_filters))
    }

    /// Apply every staged change, returning the affected-row count.
    ///
    /// The soft-delete save hook runs first; storage conflicts (duplicate
    /// keys, missing rows) reject the batch before anything is applied.
    pub fn save_changes(&self) -> StoreResult<usize> {
        let mut inner = self.write()?;
        let now = self.clock.now_utc();

        let mut affected = 0;
        for set in inner.sets.values_mut() {
            affected += set.save(now)?;
        }

        tracing::debug!(affected, "saved staged changes");

        Ok(affected)
    }

    /// Whether any staged change has not been saved yet.
    pub fn has_pending_changes(&self) -> StoreResult<bool> {
        let inner = self.read()?;

        Ok(inner.sets.values().any(|set| set.pending_len() > 0))
    }

    pub(crate) fn begin_transaction(&self) -> StoreResult<()> {
        let mut inner = self.write()?;

        if inner.transaction_active {
            return Err(StoreError::invalid_state(
                "the transaction has already been started",
            ));
        }

        for set in inner.sets.values_mut() {
            set.tx_begin();
        }
        inner.transaction_active = true;

        Ok(())
    }

    pub(crate) fn commit_transaction(&self) -> StoreResult<()> {
        let mut inner = self.write()?;

        if !inner.transaction_active {
            return Err(StoreError::invalid_state(
                "the transaction has not been started",
            ));
        }

        for set in inner.sets.values_mut() {
            set.tx_commit();
        }
        inner.transaction_active = false;

        Ok(())
    }

    pub(crate) fn rollback_transaction(&self) -> StoreResult<()> {
        let mut inner = self.write()?;

        if !inner.transaction_active {
            return Err(StoreError::invalid_state(
                "the transaction has not been started",
            ));
        }

        for set in inner.sets.values_mut() {
            set.tx_rollback();
        }
        inner.transaction_active = false;

        Ok(())
    }

    pub(crate) fn transaction_active(&self) -> StoreResult<bool> {
        Ok(self.read()?.transaction_active)
    }

    fn with_set<T: Entity, R>(&self, f: impl FnOnce(&TypedSet<T>) -> R) -> StoreResult<R> {
        let inner = self.read()?;
        let set = inner
            .sets
            .get(&TypeId::of::<T>())
            .ok_or_else(|| unregistered::<T>())?;
        let set = set
            .as_any()
            .downcast_ref::<TypedSet<T>>()
            .ok_or_else(|| unregistered::<T>())?;

        Ok(f(set))
    }

    fn with_set_mut<T: Entity, R>(&self, f: impl FnOnce(&mut TypedSet<T>) -> R) -> StoreResult<R> {
        let mut inner = self.write()?;
        let set = inner
            .sets
            .get_mut(&TypeId::of::<T>())
            .ok_or_else(|| unregistered::<T>())?;
        let set = set
            .as_any_mut()
            .downcast_mut::<TypedSet<T>>()
            .ok_or_else(|| unregistered::<T>())?;

        Ok(f(set))
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, ContextInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::conflict(format!("failed to acquire read lock: {e}")))
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, ContextInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::conflict(format!("failed to acquire write lock: {e}")))
    }
}

impl Default for DataContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DataContext {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.read() {
            for set in inner.sets.values() {
                let pending = set.pending_len();
                if pending > 0 {
                    tracing::warn!(
                        entity = set.entity_name(),
                        pending,
                        "context dropped with staged changes that were never saved"
                    );
                }
            }
        }
    }
}

fn unregistered<T: Entity>() -> StoreError {
    StoreError::invalid_state(format!(
        "{} is not registered with this context",
        std::any::type_name::<T>(),
    ))
}

/// The context's non-tracked read view, handed to include loaders.
pub(crate) struct ContextReadView<'a> {
    context: &'a DataContext,
    ignore_filters: bool,
}

impl<'a> ContextReadView<'a> {
    pub(crate) fn new(context: &'a DataContext, ignore_filters: bool) -> Self {
        Self {
            context,
            ignore_filters,
        }
    }
}

impl NavigationSource for ContextReadView<'_> {
    fn fetch_by(
        &self,
        type_id: TypeId,
        predicate: &mut dyn FnMut(&(dyn Any + Send + Sync)) -> bool,
    ) -> StoreResult<Vec<Box<dyn Any + Send + Sync>>> {
        let inner = self.context.read()?;
        let set = inner.sets.get(&type_id).ok_or_else(|| {
            StoreError::invalid_state("navigation target type is not registered with this context")
        })?;

        Ok(set.fetch_by(self.ignore_filters, predicate))
    }
}

/// The entity registrations shared by every context a factory creates.
#[derive(Clone, Default)]
pub struct ContextProfile {
    installers: Vec<Arc<dyn Fn(&DataContext) -> StoreResult<()> + Send + Sync>>,
}

impl ContextProfile {
    pub fn new() -> Self {
        Self {
            installers: Vec::new(),
        }
    }

    pub fn with_entity<T: Entity>(mut self) -> Self {
        self.installers
            .push(Arc::new(|context| context.register::<T>()));

        self
    }

    pub fn with_soft_delete_entity<T: SoftDelete>(mut self) -> Self {
        self.installers
            .push(Arc::new(|context| context.register_soft_delete::<T>()));

        self
    }

    fn install(&self, context: &DataContext) -> StoreResult<()> {
        for installer in &self.installers {
            installer(context)?;
        }

        Ok(())
    }
}

/// Creates independent context scopes.
///
/// One context is owned per logical request scope; background or parallel
/// work gets its own context through a factory.
#[async_trait]
pub trait ContextFactory: Send + Sync {
    async fn create(&self) -> StoreResult<Arc<DataContext>>;
}

/// [`ContextFactory`] stamping out contexts from one registration profile.
pub struct DataContextFactory {
    profile: ContextProfile,
    clock: Arc<dyn Clock>,
}

impl DataContextFactory {
    pub fn new(profile: ContextProfile) -> Self {
        Self {
            profile,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl ContextFactory for DataContextFactory {
    async fn create(&self) -> StoreResult<Arc<DataContext>> {
        let context = Arc::new(DataContext::with_clock(Arc::clone(&self.clock)));
        self.profile.install(&context)?;

        Ok(context)
    }
}

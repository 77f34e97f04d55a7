//! Entity traits defining the base contract for all persisted types

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Base trait for all entities in the store.
///
/// All entities carry:
/// - id: Unique identifier, assigned at construction and never changed
/// - created_at: Creation timestamp, immutable once set
/// - updated_at: Last modification timestamp, stamped by the repository
///   on every update
pub trait Entity: Clone + Send + Sync + 'static {
    /// Get the unique identifier for this entity instance
    fn id(&self) -> Uuid;

    /// Get the creation timestamp
    fn created_at(&self) -> DateTime<Utc>;

    /// Get the last update timestamp, if the entity was ever updated
    fn updated_at(&self) -> Option<DateTime<Utc>>;

    /// Overwrite the last update timestamp.
    ///
    /// Called by the repository when staging an update; entity code should
    /// not need to call this directly.
    fn set_updated_at(&mut self, at: DateTime<Utc>);
}

/// Capability extension for entities that are soft-deleted.
///
/// Soft-deleted rows keep their data but are excluded from default queries
/// until the caller explicitly bypasses the filter. The deleted flag is
/// derived from the deletion timestamp, so `is_deleted() == true` exactly
/// when `deleted_at()` is set.
pub trait SoftDelete: Entity {
    /// Get the deletion timestamp
    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    /// Set or clear the deletion timestamp.
    ///
    /// Set by the context's save hook when a staged removal is converted
    /// into a soft delete.
    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>);

    /// Check if the entity has been soft-deleted
    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}

/// Implement [`Entity`] for a struct with `id`, `created_at` and
/// `updated_at` fields of the conventional types.
///
/// ```rust,ignore
/// #[derive(Clone)]
/// struct User {
///     id: Uuid,
///     created_at: DateTime<Utc>,
///     updated_at: Option<DateTime<Utc>>,
///     email: String,
/// }
///
/// impl_entity!(User);
/// ```
#[macro_export]
macro_rules! impl_entity {
    ($ty:ty) => {
        impl $crate::core::entity::Entity for $ty {
            fn id(&self) -> ::uuid::Uuid {
                self.id
            }

            fn created_at(&self) -> ::chrono::DateTime<::chrono::Utc> {
                self.created_at
            }

            fn updated_at(&self) -> Option<::chrono::DateTime<::chrono::Utc>> {
                self.updated_at
            }

            fn set_updated_at(&mut self, at: ::chrono::DateTime<::chrono::Utc>) {
                self.updated_at = Some(at);
            }
        }
    };
}

/// Implement [`Entity`] and [`SoftDelete`] for a struct that additionally
/// has a `deleted_at` field.
#[macro_export]
macro_rules! impl_soft_delete_entity {
    ($ty:ty) => {
        $crate::impl_entity!($ty);

        impl $crate::core::entity::SoftDelete for $ty {
            fn deleted_at(&self) -> Option<::chrono::DateTime<::chrono::Utc>> {
                self.deleted_at
            }

            fn set_deleted_at(&mut self, at: Option<::chrono::DateTime<::chrono::Utc>>) {
                self.deleted_at = at;
            }
        }
    };
}

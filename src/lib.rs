//! # Holdfast
//!
//! A generic repository and unit-of-work persistence core for Rust.
//!
//! ## Features
//!
//! - **Entity Contracts**: Base identity/timestamp traits with an optional
//!   soft-delete capability
//! - **Composable Query Expressions**: Fluent `OrderBy`/`ThenBy` and
//!   `Include`/`ThenInclude` builders whose legal call order is enforced by
//!   the types
//! - **Pagination**: Page descriptors with total/last-page bookkeeping
//! - **Generic Repository**: Full CRUD plus a find/paginate surface covering
//!   every combination of predicate, ordering and eager-load composition
//! - **Unit of Work**: Explicit transaction lifecycle over a per-scope
//!   change-tracking context
//! - **Soft Delete Support**: Staged removals of soft-delete entities become
//!   timestamped updates at save time; default queries hide deleted rows
//! - **Validation Adapter**: Uniform field→messages error maps over the
//!   `validator` engine
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use holdfast::prelude::*;
//!
//! #[derive(Clone)]
//! struct User {
//!     id: Uuid,
//!     created_at: DateTime<Utc>,
//!     updated_at: Option<DateTime<Utc>>,
//!     deleted_at: Option<DateTime<Utc>>,
//!     email: String,
//! }
//!
//! impl_soft_delete_entity!(User);
//!
//! let context = Arc::new(DataContext::new());
//! context.register_soft_delete::<User>()?;
//!
//! let users: Repository<User> = context.repository();
//! let mut uow = UnitOfWork::new(Arc::clone(&context));
//!
//! uow.begin().await?;
//! users.add(user).await?;
//! uow.commit().await?;
//!
//! let page = users
//!     .paginate_order_by(|order| order.by_ascending(|u: &User| u.email.clone()), 1, 20)
//!     .await?;
//! ```

pub mod clock;
pub mod core;
pub mod query;
pub mod store;
pub mod validation;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::clock::{Clock, FixedClock, SystemClock};
    pub use crate::core::{
        entity::{Entity, SoftDelete},
        error::{StoreError, StoreResult, ValidationFailure},
    };

    // === Macros ===
    pub use crate::{impl_entity, impl_soft_delete_entity};

    // === Query expressions ===
    pub use crate::query::{
        Includable, IncludeKind, IncludePath, Navigation, NavigationSource, OrderBy,
        OrderByDirection, OrderThenBy, PaginatedSet, Query,
    };

    // === Store ===
    pub use crate::store::{
        ContextFactory, ContextProfile, DataContext, DataContextFactory, EntryState, Repository,
        RepositorySource, UnitOfWork,
    };

    // === Validation ===
    pub use crate::validation::{ValidationOutcome, validate, validate_all};

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use std::sync::Arc;
    pub use uuid::Uuid;
}

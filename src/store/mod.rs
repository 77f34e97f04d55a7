//! Persistence layer: context, repository, unit of work

pub mod context;
pub mod repository;
pub mod unit_of_work;

pub use context::{ContextFactory, ContextProfile, DataContext, DataContextFactory, EntryState};
pub use repository::{Repository, RepositorySource};
pub use unit_of_work::UnitOfWork;

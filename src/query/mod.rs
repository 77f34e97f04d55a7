//! Composable query expressions: ordering, eager-load includes, pagination

pub mod include;
pub mod order_by;
pub mod page;
pub mod source;

pub use include::{Includable, IncludeKind, IncludePath, IncludedQuery, Navigation, NavigationSource};
pub use order_by::{OrderBy, OrderByDirection, OrderThenBy, OrderedQuery};
pub use page::PaginatedSet;
pub use source::Query;

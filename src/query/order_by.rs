//! Fluent ordering builder
//!
//! `OrderBy` is the entry state: the only available calls are
//! [`OrderBy::by_ascending`] and [`OrderBy::by_descending`]. Both return
//! [`OrderThenBy`], which accepts further `then_by_*` refinements. The
//! progression is enforced by the types, so a `then_by_*` call cannot precede
//! the primary key.
//!
//! Applying the builder to a [`Query`] is a two-phase apply/extract split:
//! the builder stays a pure expression object and the caller decides when to
//! consume the ordered query.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::core::error::{StoreError, StoreResult};
use crate::query::source::Query;

/// Direction of one ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderByDirection {
    Ascending,
    Descending,
}

type KeyCompare<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// One accumulated ordering key: a comparator derived from a key selector,
/// plus the requested direction. Insertion order defines precedence.
struct OrderByKeySelector<T> {
    compare: KeyCompare<T>,
    direction: OrderByDirection,
}

pub(crate) struct OrderByList<T> {
    items: Vec<OrderByKeySelector<T>>,
}

impl<T> OrderByList<T> {
    fn push<K: Ord>(
        &mut self,
        key_selector: impl Fn(&T) -> K + Send + Sync + 'static,
        direction: OrderByDirection,
    ) {
        self.items.push(OrderByKeySelector {
            compare: Arc::new(move |a, b| key_selector(a).cmp(&key_selector(b))),
            direction,
        });
    }

    /// Sort the query by the accumulated keys.
    ///
    /// The first key establishes the primary ordering; the rest break ties in
    /// insertion order, each honoring its own direction.
    pub(crate) fn apply(&self, query: Query<T>) -> StoreResult<OrderedQuery<T>> {
        if self.items.is_empty() {
            return Err(StoreError::invalid_state("no ordering was specified"));
        }

        let mut items = query.into_vec();
        items.sort_by(|a, b| {
            for selector in &self.items {
                let ordering = match selector.direction {
                    OrderByDirection::Ascending => (selector.compare)(a, b),
                    OrderByDirection::Descending => (selector.compare)(a, b).reverse(),
                };

                if ordering != Ordering::Equal {
                    return ordering;
                }
            }

            Ordering::Equal
        });

        Ok(OrderedQuery {
            query: Query::new(items),
        })
    }
}

/// Entry state of the ordering builder.
pub struct OrderBy<T> {
    list: OrderByList<T>,
}

impl<T> OrderBy<T> {
    pub fn new() -> Self {
        Self {
            list: OrderByList { items: Vec::new() },
        }
    }

    /// Order by the given key selector in ascending order.
    pub fn by_ascending<K: Ord>(
        mut self,
        key_selector: impl Fn(&T) -> K + Send + Sync + 'static,
    ) -> OrderThenBy<T> {
        self.list.push(key_selector, OrderByDirection::Ascending);

        OrderThenBy { list: self.list }
    }

    /// Order by the given key selector in descending order.
    pub fn by_descending<K: Ord>(
        mut self,
        key_selector: impl Fn(&T) -> K + Send + Sync + 'static,
    ) -> OrderThenBy<T> {
        self.list.push(key_selector, OrderByDirection::Descending);

        OrderThenBy { list: self.list }
    }
}

impl<T> Default for OrderBy<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder state reached after the primary key is set.
pub struct OrderThenBy<T> {
    list: OrderByList<T>,
}

impl<T> OrderThenBy<T> {
    /// Refine the ordering by an additional ascending key.
    pub fn then_by_ascending<K: Ord>(
        mut self,
        key_selector: impl Fn(&T) -> K + Send + Sync + 'static,
    ) -> Self {
        self.list.push(key_selector, OrderByDirection::Ascending);

        self
    }

    /// Refine the ordering by an additional descending key.
    pub fn then_by_descending<K: Ord>(
        mut self,
        key_selector: impl Fn(&T) -> K + Send + Sync + 'static,
    ) -> Self {
        self.list.push(key_selector, OrderByDirection::Descending);

        self
    }

    /// Apply the accumulated ordering to a query.
    pub fn apply(&self, query: Query<T>) -> StoreResult<OrderedQuery<T>> {
        self.list.apply(query)
    }
}

/// An ordered query, ready to be extracted.
#[derive(Debug)]
pub struct OrderedQuery<T> {
    query: Query<T>,
}

impl<T> OrderedQuery<T> {
    /// Extract the ordered query source.
    pub fn extract(self) -> Query<T> {
        self.query
    }
}

/// The shape repositories accept for an ordering expression.
///
/// ```rust,ignore
/// repo.find_order_by(|order| order.by_ascending(|a: &Author| a.name.clone()))
/// ```
pub(crate) fn build<T>(expression: impl FnOnce(OrderBy<T>) -> OrderThenBy<T>) -> OrderThenBy<T> {
    expression(OrderBy::new())
}

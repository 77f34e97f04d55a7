//! Fluent eager-load builder
//!
//! [`Includable`] is the entry state: [`Includable::include`] starts an
//! eager-load path from the entity root and returns [`IncludePath`], which can
//! either start another independent root path (`include`) or extend the
//! current path one level deeper (`then_include`). The progression is enforced
//! by the types: `then_include` is only reachable after an `include`, and its
//! navigation is keyed off the just-included element type.
//!
//! Each call appends one [`IncludeKind`]-tagged segment; applying the builder
//! left-folds the segment list onto the query in insertion order. The kind tag
//! is a closed two-variant enum, so the dispatch is static and no invalid kind
//! can occur.

use std::any::TypeId;
use std::sync::Arc;

use uuid::Uuid;

use crate::core::entity::Entity;
use crate::core::error::StoreResult;
use crate::query::source::Query;

/// The kind of one accumulated include segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    /// Starts a new eager-load path from the entity root
    Include,
    /// Extends the most recently started path one level deeper
    ThenInclude,
}

/// Read access to related entities while includes are applied.
///
/// Implemented by the context's non-tracked read view; the type-erased
/// signature keeps navigation selectors free of any context type parameter.
pub trait NavigationSource {
    /// Fetch detached clones of every row of `type_id` matching `predicate`.
    fn fetch_by(
        &self,
        type_id: TypeId,
        predicate: &mut dyn FnMut(&(dyn std::any::Any + Send + Sync)) -> bool,
    ) -> StoreResult<Vec<Box<dyn std::any::Any + Send + Sync>>>;
}

fn fetch_related<P: Entity>(
    source: &dyn NavigationSource,
    mut predicate: impl FnMut(&P) -> bool,
) -> StoreResult<Vec<P>> {
    let rows = source.fetch_by(TypeId::of::<P>(), &mut |row| {
        row.downcast_ref::<P>().is_some_and(|row| predicate(row))
    })?;

    Ok(rows
        .into_iter()
        .filter_map(|row| row.downcast::<P>().ok().map(|row| *row))
        .collect())
}

type Loader<T> = Arc<dyn Fn(&mut T, &dyn NavigationSource) -> StoreResult<()> + Send + Sync>;
type Visitor<T, P> = Arc<dyn for<'a> Fn(&'a mut T) -> Vec<&'a mut P> + Send + Sync>;

fn visitor<T, P>(
    visit: impl for<'a> Fn(&'a mut T) -> Vec<&'a mut P> + Send + Sync + 'static,
) -> Visitor<T, P> {
    Arc::new(visit)
}

/// A reusable navigation selector from a parent entity to a related one.
///
/// Pairs the loader that populates the navigation slot with a visitor that
/// yields the populated children, so a nested `then_include` can descend
/// through it. Entity types typically expose these as associated functions:
///
/// ```rust,ignore
/// impl Author {
///     fn books() -> Navigation<Author, Book> {
///         Navigation::to_many(|b: &Book| Some(b.author_id), |a| &mut a.books)
///     }
/// }
/// ```
pub struct Navigation<T: Entity, P: Entity> {
    load: Loader<T>,
    visit: Visitor<T, P>,
}

impl<T: Entity, P: Entity> Navigation<T, P> {
    /// A to-one navigation: the parent carries the foreign key and an
    /// `Option<P>` slot.
    pub fn to_one(
        foreign_key: impl Fn(&T) -> Option<Uuid> + Send + Sync + 'static,
        slot: impl for<'a> Fn(&'a mut T) -> &'a mut Option<P> + Send + Sync + 'static,
    ) -> Self {
        let slot: Arc<dyn for<'a> Fn(&'a mut T) -> &'a mut Option<P> + Send + Sync> =
            Arc::new(slot);

        let load_slot = Arc::clone(&slot);
        let load: Loader<T> = Arc::new(move |parent, source| {
            let related = match foreign_key(parent) {
                Some(id) => fetch_related::<P>(source, |candidate| candidate.id() == id)?.pop(),
                None => None,
            };

            *load_slot(parent) = related;

            Ok(())
        });

        let visit = visitor(move |parent: &mut T| slot(parent).as_mut().into_iter().collect());

        Self { load, visit }
    }

    /// A to-many navigation: each child carries a foreign key back to the
    /// parent, which holds a `Vec<P>` slot.
    pub fn to_many(
        child_key: impl Fn(&P) -> Option<Uuid> + Send + Sync + 'static,
        slot: impl for<'a> Fn(&'a mut T) -> &'a mut Vec<P> + Send + Sync + 'static,
    ) -> Self {
        let slot: Arc<dyn for<'a> Fn(&'a mut T) -> &'a mut Vec<P> + Send + Sync> = Arc::new(slot);

        let load_slot = Arc::clone(&slot);
        let load: Loader<T> = Arc::new(move |parent, source| {
            let parent_id = parent.id();
            *load_slot(parent) =
                fetch_related::<P>(source, |candidate| child_key(candidate) == Some(parent_id))?;

            Ok(())
        });

        let visit = visitor(move |parent: &mut T| slot(parent).iter_mut().collect());

        Self { load, visit }
    }
}

struct IncludeSegment<T> {
    kind: IncludeKind,
    load: Loader<T>,
}

/// The type-erased, fully accumulated include list a repository applies.
pub(crate) struct IncludeList<T> {
    segments: Vec<IncludeSegment<T>>,
}

impl<T: Entity> IncludeList<T> {
    /// Left-fold every segment onto the query, loading each row's navigation
    /// from `source`.
    pub(crate) fn apply(
        &self,
        mut query: Query<T>,
        source: &dyn NavigationSource,
    ) -> StoreResult<IncludedQuery<T>> {
        for segment in &self.segments {
            tracing::trace!(kind = ?segment.kind, "applying include segment");

            for row in query.items_mut() {
                (segment.load)(row, source)?;
            }
        }

        Ok(IncludedQuery { query })
    }
}

/// Entry state of the eager-load builder.
pub struct Includable<T: Entity> {
    list: IncludeList<T>,
}

impl<T: Entity> Includable<T> {
    pub fn new() -> Self {
        Self {
            list: IncludeList {
                segments: Vec::new(),
            },
        }
    }

    /// Start an eager-load path from the entity root.
    pub fn include<P: Entity>(self, navigation: Navigation<T, P>) -> IncludePath<T, P> {
        let mut list = self.list;
        list.segments.push(IncludeSegment {
            kind: IncludeKind::Include,
            load: navigation.load,
        });

        IncludePath {
            list,
            cursor: navigation.visit,
        }
    }
}

impl<T: Entity> Default for Includable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder state positioned at the tip of the most recently started path.
pub struct IncludePath<T: Entity, P: Entity> {
    list: IncludeList<T>,
    cursor: Visitor<T, P>,
}

impl<T: Entity, P: Entity> IncludePath<T, P> {
    /// Start another independent eager-load path from the entity root.
    pub fn include<Q: Entity>(self, navigation: Navigation<T, Q>) -> IncludePath<T, Q> {
        let mut list = self.list;
        list.segments.push(IncludeSegment {
            kind: IncludeKind::Include,
            load: navigation.load,
        });

        IncludePath {
            list,
            cursor: navigation.visit,
        }
    }

    /// Extend the current path one level deeper.
    ///
    /// The navigation is keyed off the just-included element type; after a
    /// to-many include the nested loader runs once per loaded child.
    pub fn then_include<Q: Entity>(self, navigation: Navigation<P, Q>) -> IncludePath<T, Q> {
        let mut list = self.list;

        let load_cursor = Arc::clone(&self.cursor);
        let child_load = navigation.load;
        let load: Loader<T> = Arc::new(move |parent, source| {
            for child in load_cursor(parent) {
                child_load(child, source)?;
            }

            Ok(())
        });

        list.segments.push(IncludeSegment {
            kind: IncludeKind::ThenInclude,
            load,
        });

        let visit_cursor = self.cursor;
        let child_visit = navigation.visit;
        let cursor = visitor(move |parent: &mut T| {
            visit_cursor(parent)
                .into_iter()
                .flat_map(|child| child_visit(child))
                .collect()
        });

        IncludePath { list, cursor }
    }

    /// Apply the accumulated includes to a query.
    pub fn apply(
        &self,
        query: Query<T>,
        source: &dyn NavigationSource,
    ) -> StoreResult<IncludedQuery<T>> {
        self.list.apply(query, source)
    }

    pub(crate) fn into_list(self) -> IncludeList<T> {
        self.list
    }
}

/// A query with its eager-load paths populated, ready to be extracted.
pub struct IncludedQuery<T> {
    query: Query<T>,
}

impl<T> IncludedQuery<T> {
    /// Extract the augmented query source.
    pub fn extract(self) -> Query<T> {
        self.query
    }
}

pub(crate) fn build<T: Entity, P: Entity>(
    expression: impl FnOnce(Includable<T>) -> IncludePath<T, P>,
) -> IncludeList<T> {
    expression(Includable::new()).into_list()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::any::Any;

    #[derive(Clone, Debug)]
    struct Author {
        id: Uuid,
        created_at: DateTime<Utc>,
        updated_at: Option<DateTime<Utc>>,
        name: &'static str,
        books: Vec<Book>,
    }

    #[derive(Clone, Debug)]
    struct Book {
        id: Uuid,
        created_at: DateTime<Utc>,
        updated_at: Option<DateTime<Utc>>,
        author_id: Uuid,
        title: &'static str,
        reviews: Vec<Review>,
    }

    #[derive(Clone, Debug)]
    struct Review {
        id: Uuid,
        created_at: DateTime<Utc>,
        updated_at: Option<DateTime<Utc>>,
        book_id: Uuid,
        score: u8,
    }

    crate::impl_entity!(Author);
    crate::impl_entity!(Book);
    crate::impl_entity!(Review);

    fn author_books() -> Navigation<Author, Book> {
        Navigation::to_many(|b: &Book| Some(b.author_id), |a: &mut Author| &mut a.books)
    }

    fn book_reviews() -> Navigation<Book, Review> {
        Navigation::to_many(|r: &Review| Some(r.book_id), |b: &mut Book| &mut b.reviews)
    }

    struct FakeSource {
        books: Vec<Book>,
        reviews: Vec<Review>,
    }

    impl NavigationSource for FakeSource {
        fn fetch_by(
            &self,
            type_id: TypeId,
            predicate: &mut dyn FnMut(&(dyn Any + Send + Sync)) -> bool,
        ) -> StoreResult<Vec<Box<dyn Any + Send + Sync>>> {
            let mut rows: Vec<Box<dyn Any + Send + Sync>> = Vec::new();

            if type_id == TypeId::of::<Book>() {
                for book in &self.books {
                    if predicate(book) {
                        rows.push(Box::new(book.clone()));
                    }
                }
            } else if type_id == TypeId::of::<Review>() {
                for review in &self.reviews {
                    if predicate(review) {
                        rows.push(Box::new(review.clone()));
                    }
                }
            }

            Ok(rows)
        }
    }

    fn fixture() -> (Author, FakeSource) {
        let now = Utc::now();
        let author = Author {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: None,
            name: "ursula",
            books: Vec::new(),
        };
        let book = Book {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: None,
            author_id: author.id,
            title: "dispossessed",
            reviews: Vec::new(),
        };
        let review = Review {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: None,
            book_id: book.id,
            score: 5,
        };
        let stray_review = Review {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: None,
            book_id: Uuid::new_v4(),
            score: 1,
        };

        let source = FakeSource {
            books: vec![book],
            reviews: vec![review, stray_review],
        };

        (author, source)
    }

    #[test]
    fn test_include_populates_navigation() {
        let (author, source) = fixture();

        let authors = Includable::new()
            .include(author_books())
            .apply(Query::new(vec![author]), &source)
            .unwrap()
            .extract()
            .into_vec();

        assert_eq!(authors[0].books.len(), 1);
        assert_eq!(authors[0].books[0].title, "dispossessed");
        // nested navigation untouched without then_include
        assert!(authors[0].books[0].reviews.is_empty());
    }

    #[test]
    fn test_then_include_descends_one_level() {
        let (author, source) = fixture();

        let authors = Includable::new()
            .include(author_books())
            .then_include(book_reviews())
            .apply(Query::new(vec![author]), &source)
            .unwrap()
            .extract()
            .into_vec();

        let reviews = &authors[0].books[0].reviews;
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].score, 5);
    }

    #[test]
    fn test_to_one_navigation() {
        #[derive(Clone, Debug)]
        struct Profile {
            id: Uuid,
            created_at: DateTime<Utc>,
            updated_at: Option<DateTime<Utc>>,
            author_id: Option<Uuid>,
            author: Option<Author>,
        }

        crate::impl_entity!(Profile);

        let (author, _) = fixture();

        struct AuthorSource {
            authors: Vec<Author>,
        }

        impl NavigationSource for AuthorSource {
            fn fetch_by(
                &self,
                type_id: TypeId,
                predicate: &mut dyn FnMut(&(dyn Any + Send + Sync)) -> bool,
            ) -> StoreResult<Vec<Box<dyn Any + Send + Sync>>> {
                let mut rows: Vec<Box<dyn Any + Send + Sync>> = Vec::new();
                if type_id == TypeId::of::<Author>() {
                    for author in &self.authors {
                        if predicate(author) {
                            rows.push(Box::new(author.clone()));
                        }
                    }
                }
                Ok(rows)
            }
        }

        let profile = Profile {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: None,
            author_id: Some(author.id),
            author: None,
        };
        let author_source = AuthorSource {
            authors: vec![author],
        };

        let profiles = Includable::new()
            .include(Navigation::to_one(
                |p: &Profile| p.author_id,
                |p| &mut p.author,
            ))
            .apply(Query::new(vec![profile]), &author_source)
            .unwrap()
            .extract()
            .into_vec();

        assert_eq!(profiles[0].author.as_ref().unwrap().name, "ursula");
    }
}

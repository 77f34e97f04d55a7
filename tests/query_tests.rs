//! Integration tests for ordering, eager-load includes and pagination.

mod store_harness;

use store_harness::*;

use holdfast::prelude::*;

#[tokio::test]
async fn order_by_primary_key_selector() {
    let (context, _, _) = seeded_context().await;
    let books: Repository<Book> = context.repository();

    let years: Vec<_> = books
        .find_order_by(|order| order.by_ascending(|b: &Book| b.year))
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.year)
        .collect();

    assert_eq!(years, vec![1969, 1974, 1988]);
}

#[tokio::test]
async fn order_by_descending_with_tie_break() {
    let (context, le_guin_id, banks_id) = seeded_context().await;
    let books: Repository<Book> = context.repository();

    // two extra books sharing years so the secondary key decides
    books
        .add_many(vec![
            book(banks_id, "Use of Weapons", 1974),
            book(le_guin_id, "A Wizard of Earthsea", 1988),
        ])
        .await
        .unwrap();
    context.save_changes().unwrap();

    let titles: Vec<_> = books
        .find_order_by(|order| {
            order
                .by_descending(|b: &Book| b.year)
                .then_by_ascending(|b: &Book| b.title.clone())
        })
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.title)
        .collect();

    assert_eq!(
        titles,
        vec![
            "A Wizard of Earthsea",
            "The Player of Games",
            "The Dispossessed",
            "Use of Weapons",
            "The Left Hand of Darkness",
        ]
    );
}

#[tokio::test]
async fn find_where_order_by_composes() {
    let (context, le_guin_id, _) = seeded_context().await;
    let books: Repository<Book> = context.repository();

    let titles: Vec<_> = books
        .find_where_order_by(
            |b| b.author_id == le_guin_id,
            |order| order.by_descending(|b: &Book| b.year),
        )
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.title)
        .collect();

    assert_eq!(titles, vec!["The Dispossessed", "The Left Hand of Darkness"]);
}

#[tokio::test]
async fn include_populates_only_requested_paths() {
    let (context, _, _) = seeded_context().await;
    let books: Repository<Book> = context.repository();

    let dispossessed = books
        .get_by_with(
            |b| b.title == "The Dispossessed",
            |inc| inc.include(Book::reviews()),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(dispossessed.reviews.len(), 2);
    // the author navigation was not requested and stays unpopulated
    assert!(dispossessed.author.is_none());
}

#[tokio::test]
async fn include_two_independent_roots() {
    let (context, _, _) = seeded_context().await;
    let books: Repository<Book> = context.repository();

    let loaded = books
        .find_include(|inc| inc.include(Book::author()).include(Book::reviews()))
        .await
        .unwrap();

    let dispossessed = loaded
        .iter()
        .find(|b| b.title == "The Dispossessed")
        .unwrap();
    assert_eq!(dispossessed.author.as_ref().unwrap().name, "Le Guin");
    assert_eq!(dispossessed.reviews.len(), 2);

    let left_hand = loaded
        .iter()
        .find(|b| b.title == "The Left Hand of Darkness")
        .unwrap();
    assert!(left_hand.reviews.is_empty());
    assert!(left_hand.author.is_some());
}

#[tokio::test]
async fn then_include_descends_through_collection() {
    let (context, le_guin_id, _) = seeded_context().await;
    let authors: Repository<Author> = context.repository();

    let ursula = authors
        .get_with(le_guin_id, |inc| {
            inc.include(Author::books()).then_include(Book::reviews())
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(ursula.books.len(), 2);

    let with_reviews: Vec<_> = ursula
        .books
        .iter()
        .filter(|b| !b.reviews.is_empty())
        .collect();
    assert_eq!(with_reviews.len(), 1);
    assert_eq!(with_reviews[0].reviews.len(), 2);
}

#[tokio::test]
async fn include_of_soft_deleted_target_honors_filter() {
    let (context, le_guin_id, _) = seeded_context().await;
    let authors: Repository<Author> = context.repository();
    let books: Repository<Book> = context.repository();

    authors.delete_by_id(le_guin_id).await.unwrap();
    context.save_changes().unwrap();

    // the author rows are filtered out of the navigation fetch too
    let dispossessed = books
        .get_by_with(
            |b| b.title == "The Dispossessed",
            |inc| inc.include(Book::author()),
        )
        .await
        .unwrap()
        .unwrap();
    assert!(dispossessed.author.is_none());

    // bypassing the filter on the repository also bypasses it for includes
    let unfiltered: Repository<Book> = context.repository();
    let dispossessed = unfiltered
        .ignore_query_filters()
        .get_by_with(
            |b| b.title == "The Dispossessed",
            |inc| inc.include(Book::author()),
        )
        .await
        .unwrap()
        .unwrap();
    assert!(dispossessed.author.as_ref().unwrap().is_deleted());
}

#[tokio::test]
async fn paginate_shapes_pages() {
    let (context, le_guin_id, _) = seeded_context().await;
    let books: Repository<Book> = context.repository();

    // 25 rows total: 3 seeded plus 22 extra
    let extra: Vec<_> = (0..22)
        .map(|i| book(le_guin_id, &format!("Extra {i:02}"), 2000 + i))
        .collect();
    books.add_many(extra).await.unwrap();
    context.save_changes().unwrap();

    let page = books
        .paginate_order_by(|order| order.by_ascending(|b: &Book| b.year), 3, 10)
        .await
        .unwrap();

    assert_eq!(page.total, 25);
    assert_eq!(page.last_page, 3);
    assert_eq!(page.items.len(), 5);
    assert!(page.has_previous_page());
    assert!(!page.has_next_page());
}

#[tokio::test]
async fn paginate_empty_source_short_circuits() {
    let (context, _, _) = seeded_context().await;
    let books: Repository<Book> = context.repository();

    let page = books
        .paginate_where(|b| b.year > 3000, 1, 10)
        .await
        .unwrap();

    assert_eq!(page.total, 0);
    assert_eq!(page.last_page, 0);
    assert!(page.items.is_empty());
    assert!(!page.has_next_page());
    assert!(!page.has_previous_page());
}

#[tokio::test]
async fn paginate_rejects_out_of_range_arguments() {
    let (context, _, _) = seeded_context().await;
    let books: Repository<Book> = context.repository();

    let err = books.paginate(0, 10).await.unwrap_err();
    assert!(matches!(err, StoreError::OutOfRange { .. }));

    let err = books.paginate(1, 0).await.unwrap_err();
    assert!(matches!(err, StoreError::OutOfRange { .. }));

    // rejected before the source is consulted, even for empty matches
    let err = books
        .paginate_where(|b| b.year > 3000, 0, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::OutOfRange { .. }));
}

#[tokio::test]
async fn paginate_with_includes_loads_page_items() {
    let (context, _, _) = seeded_context().await;
    let books: Repository<Book> = context.repository();

    let page = books
        .paginate_where_order_by_include(
            |b| b.year < 2000,
            |order| order.by_ascending(|b: &Book| b.title.clone()),
            |inc| inc.include(Book::reviews()),
            1,
            2,
        )
        .await
        .unwrap();

    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].title, "The Dispossessed");
    assert_eq!(page.items[0].reviews.len(), 2);
}

#[tokio::test]
async fn soft_deleted_rows_leave_query_results_and_counts() {
    let (context, le_guin_id, _) = seeded_context().await;
    let authors: Repository<Author> = context.repository();

    authors.delete_by_id(le_guin_id).await.unwrap();
    context.save_changes().unwrap();

    let page = authors.paginate(1, 10).await.unwrap();
    assert_eq!(page.total, 1);

    let names: Vec<_> = authors
        .find_order_by(|order| order.by_ascending(|a: &Author| a.name.clone()))
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();
    assert_eq!(names, vec!["Banks"]);
}

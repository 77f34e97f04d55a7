//! Shared test harness for the store integration suites
//!
//! Provides a small library-domain entity graph — soft-deletable `Author`,
//! `Book` with navigations to its author and reviews, `Review` — plus
//! constructors and a pre-registered context.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! mod store_harness;
//! use store_harness::*;
//! ```

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use holdfast::prelude::*;

// ---------------------------------------------------------------------------
// Entity graph
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Author {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub name: String,
    pub books: Vec<Book>,
}

#[derive(Clone, Debug)]
pub struct Book {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub author_id: Uuid,
    pub title: String,
    pub year: i32,
    pub author: Option<Author>,
    pub reviews: Vec<Review>,
}

#[derive(Clone, Debug)]
pub struct Review {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub book_id: Uuid,
    pub score: u8,
}

impl_soft_delete_entity!(Author);
impl_entity!(Book);
impl_entity!(Review);

impl Author {
    pub fn books() -> Navigation<Author, Book> {
        Navigation::to_many(|book: &Book| Some(book.author_id), |author: &mut Author| {
            &mut author.books
        })
    }
}

impl Book {
    pub fn author() -> Navigation<Book, Author> {
        Navigation::to_one(|book: &Book| Some(book.author_id), |book| &mut book.author)
    }

    pub fn reviews() -> Navigation<Book, Review> {
        Navigation::to_many(|review: &Review| Some(review.book_id), |book: &mut Book| {
            &mut book.reviews
        })
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

pub fn author(name: &str) -> Author {
    Author {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        updated_at: None,
        deleted_at: None,
        name: name.to_string(),
        books: Vec::new(),
    }
}

pub fn book(author_id: Uuid, title: &str, year: i32) -> Book {
    Book {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        updated_at: None,
        author_id,
        title: title.to_string(),
        year,
        author: None,
        reviews: Vec::new(),
    }
}

pub fn review(book_id: Uuid, score: u8) -> Review {
    Review {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        updated_at: None,
        book_id,
        score,
    }
}

// ---------------------------------------------------------------------------
// Context setup
// ---------------------------------------------------------------------------

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// A context with the whole entity graph registered.
pub fn context() -> Arc<DataContext> {
    init_tracing();

    let context = Arc::new(DataContext::new());
    context.register_soft_delete::<Author>().unwrap();
    context.register::<Book>().unwrap();
    context.register::<Review>().unwrap();

    context
}

/// A context seeded with two authors, three books and three reviews.
///
/// Returns the context plus the seeded author ids (le_guin, banks).
pub async fn seeded_context() -> (Arc<DataContext>, Uuid, Uuid) {
    let context = context();

    let le_guin = author("Le Guin");
    let banks = author("Banks");

    let dispossessed = book(le_guin.id, "The Dispossessed", 1974);
    let left_hand = book(le_guin.id, "The Left Hand of Darkness", 1969);
    let player = book(banks.id, "The Player of Games", 1988);

    let reviews = vec![
        review(dispossessed.id, 5),
        review(dispossessed.id, 4),
        review(player.id, 5),
    ];

    let le_guin_id = le_guin.id;
    let banks_id = banks.id;

    let authors: Repository<Author> = context.repository();
    authors.add_many(vec![le_guin, banks]).await.unwrap();

    let books: Repository<Book> = context.repository();
    books
        .add_many(vec![dispossessed, left_hand, player])
        .await
        .unwrap();

    let review_repo: Repository<Review> = context.repository();
    review_repo.add_many(reviews).await.unwrap();

    context.save_changes().unwrap();

    (context, le_guin_id, banks_id)
}

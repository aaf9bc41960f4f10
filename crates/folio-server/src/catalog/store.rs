use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;

use folio_core::error::{FolioError, Result};

use crate::obs::metrics::Histogram;

use super::model::{Book, BookPatch, NewBook, NewQuote, Quote};

/// Persistence seam for the catalog handlers.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_books(&self) -> Result<Vec<Book>>;
    async fn get_book(&self, id: u64) -> Result<Option<Book>>;
    async fn create_book(&self, new: NewBook) -> Result<Book>;
    /// `None` when no book has `id`.
    async fn update_book(&self, id: u64, patch: BookPatch) -> Result<Option<Book>>;
    /// `false` when no book has `id`.
    async fn delete_book(&self, id: u64) -> Result<bool>;

    async fn list_quotes(&self) -> Result<Vec<Quote>>;
    async fn get_quote(&self, id: u64) -> Result<Option<Quote>>;
    async fn create_quote(&self, new: NewQuote) -> Result<Quote>;
    async fn delete_quote(&self, id: u64) -> Result<bool>;
}

/// Process-local catalog. Ids start at 1 and are never reused.
pub struct InMemoryCatalogStore {
    books: DashMap<u64, Book>,
    quotes: DashMap<u64, Quote>,
    next_book: AtomicU64,
    next_quote: AtomicU64,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self {
            books: DashMap::new(),
            quotes: DashMap::new(),
            next_book: AtomicU64::new(1),
            next_quote: AtomicU64::new(1),
        }
    }
}

impl Default for InMemoryCatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn list_books(&self) -> Result<Vec<Book>> {
        let mut out: Vec<Book> = self.books.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|b| b.id);
        Ok(out)
    }

    async fn get_book(&self, id: u64) -> Result<Option<Book>> {
        Ok(self.books.get(&id).map(|b| b.clone()))
    }

    async fn create_book(&self, new: NewBook) -> Result<Book> {
        let id = self.next_book.fetch_add(1, Ordering::Relaxed);
        let book = new.into_book(id);
        self.books.insert(id, book.clone());
        Ok(book)
    }

    async fn update_book(&self, id: u64, patch: BookPatch) -> Result<Option<Book>> {
        Ok(self.books.get_mut(&id).map(|mut b| {
            b.apply(patch);
            b.clone()
        }))
    }

    async fn delete_book(&self, id: u64) -> Result<bool> {
        Ok(self.books.remove(&id).is_some())
    }

    async fn list_quotes(&self) -> Result<Vec<Quote>> {
        let mut out: Vec<Quote> = self.quotes.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|q| q.id);
        Ok(out)
    }

    async fn get_quote(&self, id: u64) -> Result<Option<Quote>> {
        Ok(self.quotes.get(&id).map(|q| q.clone()))
    }

    async fn create_quote(&self, new: NewQuote) -> Result<Quote> {
        let id = self.next_quote.fetch_add(1, Ordering::Relaxed);
        let quote = new.into_quote(id);
        self.quotes.insert(id, quote.clone());
        Ok(quote)
    }

    async fn delete_quote(&self, id: u64) -> Result<bool> {
        Ok(self.quotes.remove(&id).is_some())
    }
}

/// Times every call of the wrapped store into a
/// `{operation, table}` histogram, failed calls included.
pub struct MeteredStore<S> {
    inner: S,
    query_duration: Histogram,
}

impl<S> MeteredStore<S> {
    pub fn new(inner: S, query_duration: Histogram) -> Self {
        Self { inner, query_duration }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn observe(&self, operation: &str, table: &str, started: Instant) -> Result<()> {
        self.query_duration
            .observe_duration(&[("operation", operation), ("table", table)], started.elapsed())
            .map_err(|e| FolioError::Internal(e.to_string()))
    }
}

const BOOK: &str = "book";
const QUOTE: &str = "quote";

#[async_trait]
impl<S: CatalogStore> CatalogStore for MeteredStore<S> {
    async fn list_books(&self) -> Result<Vec<Book>> {
        let started = Instant::now();
        let out = self.inner.list_books().await;
        self.observe("select", BOOK, started)?;
        out
    }

    async fn get_book(&self, id: u64) -> Result<Option<Book>> {
        let started = Instant::now();
        let out = self.inner.get_book(id).await;
        self.observe("select", BOOK, started)?;
        out
    }

    async fn create_book(&self, new: NewBook) -> Result<Book> {
        let started = Instant::now();
        let out = self.inner.create_book(new).await;
        self.observe("insert", BOOK, started)?;
        out
    }

    async fn update_book(&self, id: u64, patch: BookPatch) -> Result<Option<Book>> {
        let started = Instant::now();
        let out = self.inner.update_book(id, patch).await;
        self.observe("update", BOOK, started)?;
        out
    }

    async fn delete_book(&self, id: u64) -> Result<bool> {
        let started = Instant::now();
        let out = self.inner.delete_book(id).await;
        self.observe("delete", BOOK, started)?;
        out
    }

    async fn list_quotes(&self) -> Result<Vec<Quote>> {
        let started = Instant::now();
        let out = self.inner.list_quotes().await;
        self.observe("select", QUOTE, started)?;
        out
    }

    async fn get_quote(&self, id: u64) -> Result<Option<Quote>> {
        let started = Instant::now();
        let out = self.inner.get_quote(id).await;
        self.observe("select", QUOTE, started)?;
        out
    }

    async fn create_quote(&self, new: NewQuote) -> Result<Quote> {
        let started = Instant::now();
        let out = self.inner.create_quote(new).await;
        self.observe("insert", QUOTE, started)?;
        out
    }

    async fn delete_quote(&self, id: u64) -> Result<bool> {
        let started = Instant::now();
        let out = self.inner.delete_quote(id).await;
        self.observe("delete", QUOTE, started)?;
        out
    }
}

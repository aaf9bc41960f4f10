//! `/api/books` and `/api/quotes`.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use folio_core::error::FolioError;

use crate::app_state::AppState;
use crate::error::ApiResult;

use super::model::{Book, BookPatch, NewBook, NewQuote, Quote};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/books", get(list_books).post(create_book))
        .route("/books/:id", get(get_book).patch(update_book).delete(delete_book))
        .route("/quotes", get(list_quotes).post(create_quote))
        .route("/quotes/random", get(random_quote))
        .route("/quotes/:id", get(get_quote).delete(delete_quote))
}

pub async fn list_books(State(state): State<AppState>) -> ApiResult<Json<Vec<Book>>> {
    let books = state.store().list_books().await?;
    tracing::info!(count = books.len(), "listed books");
    Ok(Json(books))
}

pub async fn get_book(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Json<Book>> {
    let book = state.store().get_book(id).await?.ok_or_else(|| book_not_found(id))?;
    Ok(Json(book))
}

pub async fn create_book(
    State(state): State<AppState>,
    Json(new): Json<NewBook>,
) -> ApiResult<(StatusCode, Json<Book>)> {
    new.validate()?;
    let book = state.store().create_book(new).await?;
    state
        .telemetry()
        .metrics()
        .books_created
        .inc(&[("category", book.category())])?;
    tracing::info!(id = book.id, category = book.category(), "book created");
    Ok((StatusCode::CREATED, Json(book)))
}

pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(patch): Json<BookPatch>,
) -> ApiResult<Json<Book>> {
    patch.validate()?;
    let book = state
        .store()
        .update_book(id, patch)
        .await?
        .ok_or_else(|| book_not_found(id))?;
    state.telemetry().metrics().books_updated.inc(&[])?;
    Ok(Json(book))
}

pub async fn delete_book(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<StatusCode> {
    if !state.store().delete_book(id).await? {
        return Err(book_not_found(id).into());
    }
    state.telemetry().metrics().books_deleted.inc(&[])?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_quotes(State(state): State<AppState>) -> ApiResult<Json<Vec<Quote>>> {
    Ok(Json(state.store().list_quotes().await?))
}

pub async fn get_quote(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Json<Quote>> {
    let quote = state.store().get_quote(id).await?.ok_or_else(|| quote_not_found(id))?;
    Ok(Json(quote))
}

pub async fn create_quote(
    State(state): State<AppState>,
    Json(new): Json<NewQuote>,
) -> ApiResult<(StatusCode, Json<Quote>)> {
    new.validate()?;
    let quote = state.store().create_quote(new).await?;
    Ok((StatusCode::CREATED, Json(quote)))
}

/// A random quote with the author filled in, or `null` when there are none.
pub async fn random_quote(State(state): State<AppState>) -> ApiResult<Json<Option<Quote>>> {
    let quotes = state.store().list_quotes().await?;
    if quotes.is_empty() {
        return Ok(Json(None));
    }
    let n = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().subsec_nanos() as usize;
    let mut quote = quotes[n % quotes.len()].clone();
    quote.author = Some(quote.author_or_unknown().to_owned());
    Ok(Json(Some(quote)))
}

pub async fn delete_quote(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<StatusCode> {
    if !state.store().delete_quote(id).await? {
        return Err(quote_not_found(id).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

fn book_not_found(id: u64) -> FolioError {
    FolioError::NotFound(format!("book {id} not found"))
}

fn quote_not_found(id: u64) -> FolioError {
    FolioError::NotFound(format!("quote {id} not found"))
}

use serde::{Deserialize, Serialize};

use folio_core::error::{FolioError, Result};

use crate::obs::families::UNCATEGORIZED;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: u64,
    pub title: String,
    pub author: String,
    pub published_year: Option<i32>,
    pub genre: Option<String>,
    pub description: Option<String>,
}

impl Book {
    /// Label value for `books_created_total{category}`.
    pub fn category(&self) -> &str {
        self.genre.as_deref().filter(|g| !g.is_empty()).unwrap_or(UNCATEGORIZED)
    }

    pub fn apply(&mut self, patch: BookPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(author) = patch.author {
            self.author = author;
        }
        if patch.published_year.is_some() {
            self.published_year = patch.published_year;
        }
        if patch.genre.is_some() {
            self.genre = patch.genre;
        }
        if patch.description.is_some() {
            self.description = patch.description;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBook {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub published_year: Option<i32>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewBook {
    pub fn validate(&self) -> Result<()> {
        required("title", &self.title)?;
        required("author", &self.author)
    }

    pub fn into_book(self, id: u64) -> Book {
        Book {
            id,
            title: self.title,
            author: self.author,
            published_year: self.published_year,
            genre: self.genre,
            description: self.description,
        }
    }
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub published_year: Option<i32>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl BookPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            required("title", title)?;
        }
        if let Some(author) = &self.author {
            required("author", author)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub id: u64,
    pub text: String,
    pub author: Option<String>,
}

impl Quote {
    pub fn author_or_unknown(&self) -> &str {
        self.author.as_deref().filter(|a| !a.is_empty()).unwrap_or("Unknown Author")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewQuote {
    pub text: String,
    #[serde(default)]
    pub author: Option<String>,
}

impl NewQuote {
    pub fn validate(&self) -> Result<()> {
        required("text", &self.text)
    }

    pub fn into_quote(self, id: u64) -> Quote {
        Quote { id, text: self.text, author: self.author }
    }
}

fn required(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(FolioError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(())
}

//! Page-number field validation.
//!
//! The field accepts any base-10 number (fractions included) that lies in
//! `1 <= n <= total`. Accepted values commit `floor(n)`. While the page count is
//! unknown, submission is deferred and reported as [`PageInputError::BoundUnknown`].

use crate::error::PageInputError;

/// Validates `text` against the current page count and returns the page to commit.
pub fn validate_page_input(text: &str, total_pages: Option<u32>) -> Result<u32, PageInputError> {
    let trimmed = text.trim();
    let value: f64 = trimmed
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| PageInputError::NotANumber {
            text: text.to_owned(),
        })?;

    let Some(total) = total_pages else {
        return Err(PageInputError::BoundUnknown);
    };

    if value > f64::from(total) {
        return Err(PageInputError::OutOfRange { value, total });
    }
    if value < 1.0 {
        return Err(PageInputError::BelowFirstPage { value });
    }

    Ok(value.floor() as u32)
}

/// Text buffer bound to the page-number field.
///
/// The buffer is only reconciled with the viewport on submit or when
/// navigation resynchronises it; an invalid submission keeps the text.
#[derive(Debug, Clone, PartialEq)]
pub struct PageInput {
    text: String,
    error: Option<PageInputError>,
}

impl Default for PageInput {
    fn default() -> Self {
        Self {
            text: "1".to_owned(),
            error: None,
        }
    }
}

impl PageInput {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn error(&self) -> Option<&PageInputError> {
        self.error.as_ref()
    }

    /// Replaces the buffer. An error from an earlier submission no longer
    /// describes the new text and is dropped.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.error = None;
    }

    pub fn push(&mut self, c: char) {
        self.text.push(c);
    }

    pub fn pop(&mut self) {
        self.text.pop();
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Overwrites the buffer with the committed page and drops any pending error.
    pub fn sync_to(&mut self, page: u32) {
        self.text = page.to_string();
        self.error = None;
    }

    pub fn submit(&mut self, total_pages: Option<u32>) -> Result<u32, PageInputError> {
        match validate_page_input(&self.text, total_pages) {
            Ok(page) => {
                self.error = None;
                Ok(page)
            }
            Err(err) => {
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }
}

//! Document loading and rasterisation backed by pdfium.

mod locator;
#[cfg(feature = "pdf")]
mod pdfium;

pub use locator::{fetch_document, Fetcher, Locator, LocatorError};
#[cfg(feature = "pdf")]
pub use pdfium::{PdfiumDocument, PdfiumSource};

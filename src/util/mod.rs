//! Small helpers shared by extraction and the HTTP layer.
//!
//! - **URL validation**: rejects clip targets that would make the server
//!   fetch from itself or its private network
//! - **Text**: plain-text rendering of extracted HTML

mod text;
mod url_validator;

pub use text::html_to_text;
pub use url_validator::{validate_url, UrlValidationError};

//! Utility functions shared by the feed and input layers.
//!
//! - **Text**: XML-safe text cleanup and placeholder-title detection
//! - **URL validation**: enclosure links must be public HTTP(S)

mod text;
mod url_validator;

pub use text::{is_placeholder_title, strip_control_chars};
pub use url_validator::{validate_media_url, UrlValidationError};

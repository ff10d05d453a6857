//! HTML utilities for displaying stored emails.

pub mod sanitize;

pub use sanitize::{render_preview, sanitize_html};

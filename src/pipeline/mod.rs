//! Pipeline stages around the format converters.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ converter ──▶ postprocess
//! (URL/path)  (per format)   (cleanup)
//! ```
//!
//! 1. [`input`] — canonicalise the user-supplied path or URL to a fully
//!    buffered [`crate::converters::ConversionInput`]; the only stage that
//!    reads files or downloads documents
//! 2. the converter selected by [`crate::converters::ConverterRegistry`]
//! 3. [`postprocess`] — deterministic cleanup rules applied to HTML-walker
//!    output (blank-line collapsing, heading spacing, invisible characters)

pub mod input;
pub mod postprocess;

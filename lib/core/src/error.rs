//! Error handling foundation for the CSDT access layer.
//!
//! Crates define their own domain error enums and carry them inside a
//! rootcause [`Report`], adding context as errors cross layer boundaries.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

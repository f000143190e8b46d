//! Reading documents.
//!
//! - [`model`] - [`Model`], the per-type entry point for creating records and
//!   starting queries
//! - [`builder`] - [`Query`], a chainable read description executed against
//!   one or many targets

pub mod builder;
pub mod model;

pub use builder::{Many, Multiplicity, One, Query};
pub use model::Model;

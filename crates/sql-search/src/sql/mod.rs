//! SQL text building and parameter binding.

mod builder;
mod params;

pub use builder::{Delimiter, SqlBuilder};
pub use params::{SqlParameter, SqlQueryParameterManager, SqlValue};

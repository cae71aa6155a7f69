//! Core types consumed by the compiler.
//!
//! - [`SearchParameterInfo`] - the static description of a search parameter
//! - [`SearchOptions`] - per-request paging, sorting and version filters
//! - [`ContinuationToken`] / [`IncludesContinuationToken`] - opaque paging tokens
//! - surrogate id helpers mapping `_lastUpdated` instants to surrogate ids

mod continuation;
mod options;
mod search_params;
mod surrogate_id;

pub use continuation::{ContinuationToken, IncludesContinuationToken};
pub use options::{ResourceVersionType, SearchOptions, SortSpec};
pub use search_params::{SearchParamType, SearchParameterInfo, SortDirection, names};
pub use surrogate_id::{MAX_RESOURCE_SURROGATE_ID, last_updated_to_surrogate_id};

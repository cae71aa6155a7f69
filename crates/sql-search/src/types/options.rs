//! Per-request search options.

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use super::search_params::{SearchParameterInfo, SortDirection};

/// Which resource versions a search may return.
///
/// A small bit set; combine flags with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceVersionType(u8);

impl ResourceVersionType {
    /// The current version of live resources.
    pub const LATEST: Self = Self(1);
    /// Superseded versions.
    pub const HISTORY: Self = Self(2);
    /// Resources whose current version is a deletion marker.
    pub const SOFT_DELETED: Self = Self(4);

    /// Returns true if every flag in `other` is set.
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw flag bits.
    pub fn bits(&self) -> u8 {
        self.0
    }
}

impl Default for ResourceVersionType {
    fn default() -> Self {
        Self::LATEST
    }
}

impl BitOr for ResourceVersionType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One entry of the requested sort order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    /// The parameter to sort by.
    pub parameter: SearchParameterInfo,
    /// The sort direction.
    pub direction: SortDirection,
}

impl SortSpec {
    /// Creates an ascending sort.
    pub fn ascending(parameter: SearchParameterInfo) -> Self {
        Self {
            parameter,
            direction: SortDirection::Ascending,
        }
    }

    /// Creates a descending sort.
    pub fn descending(parameter: SearchParameterInfo) -> Self {
        Self {
            parameter,
            direction: SortDirection::Descending,
        }
    }
}

/// Paging, sorting and filtering context for one compile call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SearchOptions {
    /// Page size. The generated SQL fetches one extra row to detect more pages.
    pub max_item_count: u32,

    /// Maximum number of included resources per page.
    pub include_count: u32,

    /// Requested sort order.
    pub sort: Vec<SortSpec>,

    /// Resource versions to return.
    pub resource_version_types: ResourceVersionType,

    /// Opaque token from a previous page.
    pub continuation_token: Option<String>,

    /// Opaque token for the `$includes` operation.
    pub includes_continuation_token: Option<String>,

    /// Only count matches.
    pub count_only: bool,

    /// Omit the parameter hash so the database reuses one plan for every value.
    pub reuse_query_plans: bool,

    /// The search runs as part of a background operation.
    pub is_async_operation: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_item_count: 10,
            include_count: 1000,
            sort: Vec::new(),
            resource_version_types: ResourceVersionType::LATEST,
            continuation_token: None,
            includes_continuation_token: None,
            count_only: false,
            reuse_query_plans: false,
            is_async_operation: false,
        }
    }
}

impl SearchOptions {
    /// Creates options with the given page size.
    pub fn new(max_item_count: u32) -> Self {
        Self {
            max_item_count,
            ..Default::default()
        }
    }

    /// Sets the include limit.
    pub fn with_include_count(mut self, include_count: u32) -> Self {
        self.include_count = include_count;
        self
    }

    /// Adds a sort entry.
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort.push(sort);
        self
    }

    /// Sets the resource version filter.
    pub fn with_resource_version_types(mut self, types: ResourceVersionType) -> Self {
        self.resource_version_types = types;
        self
    }

    /// Sets the continuation token.
    pub fn with_continuation_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = Some(token.into());
        self
    }

    /// Sets the `$includes` continuation token.
    pub fn with_includes_continuation_token(mut self, token: impl Into<String>) -> Self {
        self.includes_continuation_token = Some(token.into());
        self
    }

    /// Switches to count-only mode.
    pub fn with_count_only(mut self, count_only: bool) -> Self {
        self.count_only = count_only;
        self
    }

    /// Sets query plan reuse.
    pub fn with_reuse_query_plans(mut self, reuse: bool) -> Self {
        self.reuse_query_plans = reuse;
        self
    }

    /// Marks the search as part of an async operation.
    pub fn with_async_operation(mut self, is_async: bool) -> Self {
        self.is_async_operation = is_async;
        self
    }

    /// The first sort entry that is not served by the resource primary key.
    pub fn value_sort(&self) -> Option<&SortSpec> {
        self.sort.iter().find(|s| !s.parameter.is_primary_key_sort())
    }

    /// Returns true when the sort order maps onto the resource primary key.
    pub fn is_primary_key_sort(&self) -> bool {
        self.sort.iter().all(|s| s.parameter.is_primary_key_sort())
    }

    /// Returns true when a SortValue column has to flow through the CTEs.
    pub fn is_sort_value_needed(&self) -> bool {
        !self.count_only && self.value_sort().is_some()
    }
}

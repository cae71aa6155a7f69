//! URI search parameters.

use super::dispatch::{self, unsupported_field};
use super::{QueryGenerator, RenderContext};
use crate::error::SqlSearchResult;
use crate::expression::{FieldName, StringExpression};
use crate::schema::tables::uri_search_param::URI;

/// Handles `dbo.UriSearchParam` predicates.
pub struct UriQueryGenerator;

impl UriQueryGenerator {
    /// Builds SQL for a URI match, including `:above` (the stored URI is a
    /// prefix of the literal) and `:below`.
    pub fn visit_string(expr: &StringExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        if expr.field != FieldName::Uri {
            return Err(unsupported_field(QueryGenerator::Uri, expr.field));
        }
        dispatch::simple_string(
            ctx,
            expr.operator,
            &URI,
            expr.component_index,
            &expr.value,
            expr.ignore_case,
        )
    }
}

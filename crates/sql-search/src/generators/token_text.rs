//! Token display text (`:text` modifier).

use super::dispatch::{self, unsupported_field};
use super::{QueryGenerator, RenderContext};
use crate::error::SqlSearchResult;
use crate::expression::{FieldName, StringExpression};
use crate::schema::tables::token_text::TEXT;

/// Handles `dbo.TokenText` predicates.
pub struct TokenTextQueryGenerator;

impl TokenTextQueryGenerator {
    /// Builds SQL for a match against the token display text.
    pub fn visit_string(expr: &StringExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        if expr.field != FieldName::TokenText {
            return Err(unsupported_field(QueryGenerator::TokenText, expr.field));
        }
        dispatch::simple_string(
            ctx,
            expr.operator,
            &TEXT,
            expr.component_index,
            &expr.value,
            expr.ignore_case,
        )
    }
}

//! Date search parameters.

use super::dispatch::{self, unsupported_field};
use super::{QueryGenerator, RenderContext};
use crate::error::SqlSearchResult;
use crate::expression::{BinaryExpression, FieldName};
use crate::schema::tables::date_time_search_param::{
    END_DATE_TIME, IS_LONGER_THAN_A_DAY, IS_MAX, IS_MIN, START_DATE_TIME,
};

/// Handles `dbo.DateTimeSearchParam` predicates.
pub struct DateTimeQueryGenerator;

impl DateTimeQueryGenerator {
    /// Builds SQL for a comparison against the period bounds or flags.
    pub fn visit_binary(expr: &BinaryExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        let column = match expr.field {
            FieldName::DateTimeStart => &START_DATE_TIME,
            FieldName::DateTimeEnd => &END_DATE_TIME,
            FieldName::DateTimeIsLongerThanADay => &IS_LONGER_THAN_A_DAY,
            FieldName::DateTimeIsMin => &IS_MIN,
            FieldName::DateTimeIsMax => &IS_MAX,
            other => return Err(unsupported_field(QueryGenerator::DateTime, other)),
        };
        dispatch::simple_binary(ctx, expr.operator, column, expr.component_index, expr.value.clone(), true)
    }
}

//! Predicates on `dbo.Resource`.
//!
//! `_id`, `_type` and `_lastUpdated` are columns of the resource table (the
//! last updated instant is encoded in the surrogate id), so they never touch
//! an index table. The same columns exist on every index table, which lets
//! the planner push these predicates down into index table CTEs.

use chrono::{DateTime, Duration, DurationRound, Utc};

use super::dispatch::{self, render, unsupported_field, unsupported_node, unsupported_operator};
use super::reference::string_values;
use super::{QueryGenerator, RenderContext};
use crate::error::{SqlSearchError, SqlSearchResult};
use crate::expression::{
    BinaryExpression, BinaryOperator, FieldName, InExpression, PrimaryKeyRange,
    SearchParameterExpression, StringExpression, StringOperator, Value,
};
use crate::schema::tables::resource::{RESOURCE_ID, RESOURCE_SURROGATE_ID, RESOURCE_TYPE_ID};
use crate::types::{MAX_RESOURCE_SURROGATE_ID, last_updated_to_surrogate_id, names};

/// Handles resource table predicates.
pub struct ResourceTableQueryGenerator;

impl ResourceTableQueryGenerator {
    /// Routes a resource table search parameter to the generator of its column.
    pub fn visit_search_parameter(
        expr: &SearchParameterExpression,
        ctx: &mut RenderContext<'_>,
    ) -> SqlSearchResult<()> {
        let generator = match expr.parameter.code.as_str() {
            names::ID => QueryGenerator::ResourceId,
            names::RESOURCE_TYPE => QueryGenerator::ResourceTypeId,
            names::LAST_UPDATED => QueryGenerator::LastUpdated,
            other => {
                return Err(SqlSearchError::UnexpectedSearchParameter {
                    name: other.to_string(),
                });
            }
        };
        render(generator, &expr.expression, ctx)
    }

    /// Builds SQL for surrogate id ranges, resume positions and `_lastUpdated`.
    pub fn visit_binary(
        generator: QueryGenerator,
        expr: &BinaryExpression,
        ctx: &mut RenderContext<'_>,
    ) -> SqlSearchResult<()> {
        match expr.field {
            FieldName::ResourceSurrogateId => dispatch::simple_binary(
                ctx,
                expr.operator,
                &RESOURCE_SURROGATE_ID,
                None,
                expr.value.clone(),
                true,
            ),
            // resume positions differ on every page and must not split the plan cache
            FieldName::SurrogateIdKeyset => dispatch::simple_binary(
                ctx,
                expr.operator,
                &RESOURCE_SURROGATE_ID,
                None,
                expr.value.clone(),
                false,
            ),
            FieldName::PrimaryKey => match &expr.value {
                Value::PrimaryKeyRange(range) => primary_key_range(ctx, expr.operator, range),
                other => Err(SqlSearchError::InvalidValue {
                    column: RESOURCE_SURROGATE_ID.name.to_string(),
                    expected: "primary key range".to_string(),
                    actual: other.type_name().to_string(),
                }),
            },
            FieldName::DateTimeStart | FieldName::DateTimeEnd
                if matches!(generator, QueryGenerator::LastUpdated) =>
            {
                match &expr.value {
                    Value::DateTime(instant) => last_updated(ctx, expr.operator, *instant),
                    other => Err(SqlSearchError::InvalidValue {
                        column: RESOURCE_SURROGATE_ID.name.to_string(),
                        expected: "datetime".to_string(),
                        actual: other.type_name().to_string(),
                    }),
                }
            }
            other => Err(unsupported_field(generator, other)),
        }
    }

    /// Builds SQL for `_id` and `_type`.
    pub fn visit_string(
        generator: QueryGenerator,
        expr: &StringExpression,
        ctx: &mut RenderContext<'_>,
    ) -> SqlSearchResult<()> {
        match (generator, expr.field) {
            (QueryGenerator::ResourceId, FieldName::TokenCode | FieldName::String) => {
                dispatch::simple_string(ctx, expr.operator, &RESOURCE_ID, None, &expr.value, expr.ignore_case)
            }
            (QueryGenerator::ResourceTypeId, FieldName::TokenCode | FieldName::String) => {
                if expr.operator != StringOperator::Equals {
                    return Err(unsupported_operator(generator, expr.operator));
                }
                dispatch::resource_type_predicate(ctx, &RESOURCE_TYPE_ID, None, &expr.value)
            }
            (QueryGenerator::ResourceId | QueryGenerator::ResourceTypeId, field) => {
                Err(unsupported_field(generator, field))
            }
            _ => Err(unsupported_node(generator, "string")),
        }
    }

    /// Builds SQL for `_id` or `_type` lists.
    pub fn visit_in(
        generator: QueryGenerator,
        expr: &InExpression,
        ctx: &mut RenderContext<'_>,
    ) -> SqlSearchResult<()> {
        match generator {
            QueryGenerator::ResourceId => dispatch::simple_in(ctx, &RESOURCE_ID, None, &expr.values),
            QueryGenerator::ResourceTypeId => {
                let names = string_values(&expr.values, RESOURCE_TYPE_ID.name)?;
                dispatch::resource_types_in(ctx, &RESOURCE_TYPE_ID, None, &names)
            }
            QueryGenerator::ResourceSurrogateId => {
                dispatch::simple_in(ctx, &RESOURCE_SURROGATE_ID, None, &expr.values)
            }
            _ => Err(unsupported_node(generator, "in")),
        }
    }
}

/// `_lastUpdated` as a surrogate id range. Surrogate ids have millisecond
/// resolution, so bounds are taken at millisecond boundaries.
fn last_updated(
    ctx: &mut RenderContext<'_>,
    operator: BinaryOperator,
    instant: DateTime<Utc>,
) -> SqlSearchResult<()> {
    let start = instant
        .duration_trunc(Duration::milliseconds(1))
        .unwrap_or(instant);
    let low = last_updated_to_surrogate_id(start);
    let high = start
        .checked_add_signed(Duration::milliseconds(1))
        .map_or(MAX_RESOURCE_SURROGATE_ID, last_updated_to_surrogate_id);

    match operator {
        BinaryOperator::GreaterThanOrEqual => bound(ctx, BinaryOperator::GreaterThanOrEqual, low),
        BinaryOperator::GreaterThan => bound(ctx, BinaryOperator::GreaterThanOrEqual, high),
        BinaryOperator::LessThan => bound(ctx, BinaryOperator::LessThan, low),
        BinaryOperator::LessThanOrEqual => bound(ctx, BinaryOperator::LessThan, high),
        BinaryOperator::Equal => {
            bound(ctx, BinaryOperator::GreaterThanOrEqual, low)?;
            ctx.append(" AND ");
            bound(ctx, BinaryOperator::LessThan, high)
        }
        BinaryOperator::NotEqual => {
            ctx.append("(");
            bound(ctx, BinaryOperator::LessThan, low)?;
            ctx.append(" OR ");
            bound(ctx, BinaryOperator::GreaterThanOrEqual, high)?;
            ctx.append(")");
            Ok(())
        }
    }
}

fn bound(ctx: &mut RenderContext<'_>, operator: BinaryOperator, surrogate_id: i64) -> SqlSearchResult<()> {
    dispatch::simple_binary(ctx, operator, &RESOURCE_SURROGATE_ID, None, surrogate_id, true)
}

/// `((ResourceTypeId = @t AND ResourceSurrogateId > @sid) OR ResourceTypeId IN (...))`.
fn primary_key_range(
    ctx: &mut RenderContext<'_>,
    operator: BinaryOperator,
    range: &PrimaryKeyRange,
) -> SqlSearchResult<()> {
    let has_next = !range.next_resource_type_ids.is_empty();
    if has_next {
        ctx.append("(");
    }
    ctx.append("(");
    dispatch::simple_binary(
        ctx,
        BinaryOperator::Equal,
        &RESOURCE_TYPE_ID,
        None,
        range.current.resource_type_id,
        false,
    )?;
    ctx.append(" AND ");
    dispatch::simple_binary(
        ctx,
        operator,
        &RESOURCE_SURROGATE_ID,
        None,
        range.current.resource_surrogate_id,
        false,
    )?;
    ctx.append(")");

    if has_next {
        ctx.append(" OR ")
            .append_column(&RESOURCE_TYPE_ID, None)
            .append(" IN (");
        for (i, id) in range.next_resource_type_ids.iter().enumerate() {
            if i > 0 {
                ctx.append(", ");
            }
            ctx.append_parameter(&RESOURCE_TYPE_ID, *id, false)?;
        }
        ctx.append("))");
    }
    Ok(())
}

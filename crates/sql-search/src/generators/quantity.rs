//! Quantity search parameters.

use super::dispatch::{self, unsupported_field, unsupported_operator};
use super::token::system_predicate;
use super::{QueryGenerator, RenderContext};
use crate::error::SqlSearchResult;
use crate::expression::{BinaryExpression, BinaryOperator, FieldName, MissingFieldExpression, StringExpression, StringOperator};
use crate::schema::tables::quantity_code;
use crate::schema::tables::quantity_search_param::{
    HIGH_VALUE, LOW_VALUE, QUANTITY_CODE_ID, SINGLE_VALUE, SYSTEM_ID,
};

/// Handles `dbo.QuantitySearchParam` predicates.
pub struct QuantityQueryGenerator;

impl QuantityQueryGenerator {
    /// Builds SQL for a comparison against the quantity value.
    pub fn visit_binary(expr: &BinaryExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        let column = match expr.field {
            FieldName::Quantity => &SINGLE_VALUE,
            FieldName::QuantityLow => &LOW_VALUE,
            FieldName::QuantityHigh => &HIGH_VALUE,
            other => return Err(unsupported_field(QueryGenerator::Quantity, other)),
        };
        dispatch::guarded_binary(ctx, expr.operator, column, expr.component_index, expr.value.clone())
    }

    /// Builds SQL for the unit system or code.
    pub fn visit_string(expr: &StringExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        if expr.operator != StringOperator::Equals {
            return Err(unsupported_operator(QueryGenerator::Quantity, expr.operator));
        }
        match expr.field {
            FieldName::QuantitySystem => system_predicate(ctx, &SYSTEM_ID, expr.component_index, &expr.value),
            FieldName::QuantityCode => match ctx.model.try_get_quantity_code_id(&expr.value) {
                Some(id) => dispatch::simple_binary(
                    ctx,
                    BinaryOperator::Equal,
                    &QUANTITY_CODE_ID,
                    expr.component_index,
                    id,
                    true,
                ),
                None => {
                    ctx.append_column(&QUANTITY_CODE_ID, expr.component_index)
                        .append(" IN (SELECT ");
                    ctx.sb.append_column(&quantity_code::QUANTITY_CODE_ID, None);
                    ctx.append(" FROM ")
                        .append(quantity_code::TABLE.name)
                        .append(" WHERE ");
                    ctx.sb.append_column(&quantity_code::VALUE, None);
                    ctx.append(" = ")
                        .append_parameter(&quantity_code::VALUE, expr.value.as_str(), true)?
                        .append(")");
                    Ok(())
                }
            },
            other => Err(unsupported_field(QueryGenerator::Quantity, other)),
        }
    }

    /// Builds SQL for a quantity without a unit system or code.
    pub fn visit_missing_field(expr: &MissingFieldExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        let column = match expr.field {
            FieldName::QuantitySystem => &SYSTEM_ID,
            FieldName::QuantityCode => &QUANTITY_CODE_ID,
            other => return Err(unsupported_field(QueryGenerator::Quantity, other)),
        };
        dispatch::missing_field(ctx, column, expr.component_index);
        Ok(())
    }
}

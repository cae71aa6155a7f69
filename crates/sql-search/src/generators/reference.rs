//! Reference search parameters.

use super::dispatch::{self, unsupported_field, unsupported_operator};
use super::{QueryGenerator, RenderContext};
use crate::error::{SqlSearchError, SqlSearchResult};
use crate::expression::{FieldName, InExpression, MissingFieldExpression, StringExpression, StringOperator, Value};
use crate::schema::tables::reference_search_param::{
    BASE_URI, REFERENCE_RESOURCE_ID, REFERENCE_RESOURCE_TYPE_ID,
};

/// Handles `dbo.ReferenceSearchParam` predicates.
pub struct ReferenceQueryGenerator;

impl ReferenceQueryGenerator {
    /// Builds SQL for the base URI, target type or target id of a reference.
    pub fn visit_string(expr: &StringExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        match expr.field {
            FieldName::ReferenceBaseUri => dispatch::simple_string(
                ctx,
                expr.operator,
                &BASE_URI,
                expr.component_index,
                &expr.value,
                expr.ignore_case,
            ),
            FieldName::ReferenceResourceType => {
                if expr.operator != StringOperator::Equals {
                    return Err(unsupported_operator(QueryGenerator::Reference, expr.operator));
                }
                dispatch::resource_type_predicate(
                    ctx,
                    &REFERENCE_RESOURCE_TYPE_ID,
                    expr.component_index,
                    &expr.value,
                )
            }
            FieldName::ReferenceResourceId => dispatch::simple_string(
                ctx,
                expr.operator,
                &REFERENCE_RESOURCE_ID,
                expr.component_index,
                &expr.value,
                expr.ignore_case,
            ),
            other => Err(unsupported_field(QueryGenerator::Reference, other)),
        }
    }

    /// Builds SQL for references without a base URI or target type.
    pub fn visit_missing_field(expr: &MissingFieldExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        let column = match expr.field {
            FieldName::ReferenceBaseUri => &BASE_URI,
            FieldName::ReferenceResourceType => &REFERENCE_RESOURCE_TYPE_ID,
            other => return Err(unsupported_field(QueryGenerator::Reference, other)),
        };
        dispatch::missing_field(ctx, column, expr.component_index);
        Ok(())
    }

    /// Builds SQL for a target type or id matching any of several values.
    pub fn visit_in(expr: &InExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        match expr.field {
            FieldName::ReferenceResourceId => {
                dispatch::simple_in(ctx, &REFERENCE_RESOURCE_ID, expr.component_index, &expr.values)
            }
            FieldName::ReferenceResourceType => {
                let names = string_values(&expr.values, REFERENCE_RESOURCE_TYPE_ID.name)?;
                dispatch::resource_types_in(ctx, &REFERENCE_RESOURCE_TYPE_ID, expr.component_index, &names)
            }
            other => Err(unsupported_field(QueryGenerator::Reference, other)),
        }
    }
}

/// Extracts resource type names from an IN list.
pub(crate) fn string_values(values: &[Value], column: &str) -> SqlSearchResult<Vec<String>> {
    values
        .iter()
        .map(|value| match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(SqlSearchError::InvalidValue {
                column: column.to_string(),
                expected: "resource type name".to_string(),
                actual: other.type_name().to_string(),
            }),
        })
        .collect()
}

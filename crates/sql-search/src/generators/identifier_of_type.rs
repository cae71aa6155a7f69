//! `identifier:of-type` search.

use super::dispatch::{self, unsupported_field, unsupported_operator};
use super::token::{TokenColumns, TokenQueryGenerator};
use super::{QueryGenerator, RenderContext};
use crate::error::SqlSearchResult;
use crate::expression::{FieldName, MissingFieldExpression, StringExpression, StringOperator};
use crate::schema::tables::identifier_of_type_search_param::{IDENTIFIER_VALUE, SYSTEM_ID};

/// Handles `dbo.IdentifierOfTypeSearchParam` predicates.
///
/// The table is not a composite table: both the type coding and the
/// identifier value live on one row without component suffixes.
pub struct IdentifierOfTypeQueryGenerator;

impl IdentifierOfTypeQueryGenerator {
    /// Builds SQL for the type coding or the identifier value.
    pub fn visit_string(expr: &StringExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        match expr.field {
            FieldName::TokenSystem | FieldName::TokenCode => {
                let unsuffixed = StringExpression {
                    component_index: None,
                    ..expr.clone()
                };
                TokenQueryGenerator::visit_string_on(
                    QueryGenerator::IdentifierOfType,
                    &TokenColumns::IDENTIFIER_OF_TYPE,
                    &unsuffixed,
                    ctx,
                )
            }
            FieldName::String => {
                if expr.operator != StringOperator::Equals {
                    return Err(unsupported_operator(QueryGenerator::IdentifierOfType, expr.operator));
                }
                dispatch::simple_string(ctx, expr.operator, &IDENTIFIER_VALUE, None, &expr.value, false)
            }
            other => Err(unsupported_field(QueryGenerator::IdentifierOfType, other)),
        }
    }

    /// Builds SQL for a type coding without a system.
    pub fn visit_missing_field(expr: &MissingFieldExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        match expr.field {
            FieldName::TokenSystem => {
                dispatch::missing_field(ctx, &SYSTEM_ID, None);
                Ok(())
            }
            other => Err(unsupported_field(QueryGenerator::IdentifierOfType, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;
    use crate::generators::test_support::Harness;

    #[test]
    fn test_identifier_of_type() {
        let mut h = Harness::new();
        let expr = Expression::and(vec![
            Expression::string_component(
                StringOperator::Equals,
                FieldName::TokenSystem,
                0,
                "http://terminology.hl7.org/CodeSystem/v2-0203",
                false,
            ),
            Expression::string_component(StringOperator::Equals, FieldName::TokenCode, 0, "MR", false),
            Expression::string_component(StringOperator::Equals, FieldName::String, 1, "446053", false),
        ]);

        let sql = h.render(QueryGenerator::IdentifierOfType, &expr).unwrap();

        assert_eq!(
            sql,
            "SystemId IN (SELECT SystemId FROM dbo.System WHERE Value = @p0) AND Code = @p1 AND IdentifierValue = @p2"
        );
    }
}

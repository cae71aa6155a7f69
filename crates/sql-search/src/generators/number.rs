//! Number search parameters.

use super::dispatch::{self, unsupported_field};
use super::{QueryGenerator, RenderContext};
use crate::error::SqlSearchResult;
use crate::expression::{BinaryExpression, FieldName};
use crate::schema::tables::number_search_param::{HIGH_VALUE, LOW_VALUE, SINGLE_VALUE};

/// Handles `dbo.NumberSearchParam` predicates.
///
/// A row stores either a single value or a low/high range; the unused
/// columns are NULL, so every comparison is guarded by `IS NOT NULL`.
pub struct NumberQueryGenerator;

impl NumberQueryGenerator {
    /// Builds SQL for a numeric comparison.
    pub fn visit_binary(expr: &BinaryExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        let column = match expr.field {
            FieldName::Number => &SINGLE_VALUE,
            FieldName::NumberLow => &LOW_VALUE,
            FieldName::NumberHigh => &HIGH_VALUE,
            other => return Err(unsupported_field(QueryGenerator::Number, other)),
        };
        dispatch::guarded_binary(ctx, expr.operator, column, expr.component_index, expr.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SqlSearchError;
    use crate::expression::{BinaryOperator, Expression};
    use crate::generators::test_support::Harness;
    use rust_decimal::Decimal;

    #[test]
    fn test_number_guarded_comparison() {
        let mut h = Harness::new();
        let expr = Expression::binary(BinaryOperator::GreaterThan, FieldName::Number, Decimal::new(55, 1));

        let sql = h.render(QueryGenerator::Number, &expr).unwrap();

        assert_eq!(sql, "SingleValue IS NOT NULL AND SingleValue > @p0");
    }

    #[test]
    fn test_number_range_inside_or() {
        let mut h = Harness::new();
        let expr = Expression::or(vec![
            Expression::binary(BinaryOperator::LessThanOrEqual, FieldName::NumberLow, 10),
            Expression::binary(BinaryOperator::GreaterThanOrEqual, FieldName::NumberHigh, 20),
        ]);

        let sql = h.render(QueryGenerator::Number, &expr).unwrap();

        assert_eq!(
            sql,
            "(LowValue IS NOT NULL AND LowValue <= @p0 OR HighValue IS NOT NULL AND HighValue >= @p1)"
        );
    }

    #[test]
    fn test_number_rejects_string_value() {
        let mut h = Harness::new();
        let expr = Expression::binary(BinaryOperator::Equal, FieldName::Number, "ten");

        let err = h.render(QueryGenerator::Number, &expr).unwrap_err();

        assert!(matches!(err, SqlSearchError::InvalidValue { .. }));
    }
}

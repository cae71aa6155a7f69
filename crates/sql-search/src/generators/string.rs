//! String search parameters.
//!
//! `Text` holds the first 256 characters of a value. Longer values are stored
//! in full in `TextOverflow`, so a literal that does not fit in `Text` can
//! only ever match through the overflow column.

use super::dispatch::{self, append_collation, like_pattern, unsupported_field, unsupported_operator};
use super::{QueryGenerator, RenderContext};
use crate::error::SqlSearchResult;
use crate::expression::{BinaryExpression, FieldName, InExpression, StringExpression, StringOperator};
use crate::schema::Column;
use crate::schema::tables::string_search_param::{IS_MAX, IS_MIN, TEXT, TEXT_OVERFLOW};

/// Handles `dbo.StringSearchParam` predicates.
pub struct StringQueryGenerator;

impl StringQueryGenerator {
    /// Builds SQL for a string match.
    pub fn visit_string(expr: &StringExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        if expr.field != FieldName::String {
            return Err(unsupported_field(QueryGenerator::String, expr.field));
        }

        if let Some(positive) = expr.operator.positive() {
            ctx.append("NOT (");
            Self::positive_match(positive, expr, ctx)?;
            ctx.append(")");
            return Ok(());
        }
        Self::positive_match(expr.operator, expr, ctx)
    }

    fn positive_match(
        operator: StringOperator,
        expr: &StringExpression,
        ctx: &mut RenderContext<'_>,
    ) -> SqlSearchResult<()> {
        let value = expr.value.as_str();
        let component = expr.component_index;
        let fits = TEXT.fits(value);

        match operator {
            StringOperator::Equals if fits => {
                let at_capacity = Some(value.chars().count()) == TEXT.max_length;
                Self::compare(ctx, &TEXT, component, operator, value, expr.ignore_case)?;
                if at_capacity {
                    // a stored value longer than Text shares this prefix
                    ctx.append(" AND ");
                    dispatch::missing_field(ctx, &TEXT_OVERFLOW, component);
                }
                Ok(())
            }
            StringOperator::StartsWith if fits => {
                Self::compare(ctx, &TEXT, component, operator, value, expr.ignore_case)
            }
            StringOperator::EndsWith if fits => {
                ctx.append("((");
                dispatch::missing_field(ctx, &TEXT_OVERFLOW, component);
                ctx.append(" AND ");
                Self::compare(ctx, &TEXT, component, operator, value, expr.ignore_case)?;
                ctx.append(") OR ");
                Self::overflow_match(ctx, component, operator, value, expr.ignore_case)?;
                ctx.append(")");
                Ok(())
            }
            StringOperator::Contains if fits => {
                ctx.append("(");
                Self::compare(ctx, &TEXT, component, operator, value, expr.ignore_case)?;
                ctx.append(" OR ");
                Self::overflow_match(ctx, component, operator, value, expr.ignore_case)?;
                ctx.append(")");
                Ok(())
            }
            StringOperator::Equals
            | StringOperator::StartsWith
            | StringOperator::EndsWith
            | StringOperator::Contains => {
                Self::overflow_match(ctx, component, operator, value, expr.ignore_case)
            }
            _ => Err(unsupported_operator(QueryGenerator::String, expr.operator)),
        }
    }

    /// `(TextOverflow IS NOT NULL AND TextOverflow <match>)`.
    fn overflow_match(
        ctx: &mut RenderContext<'_>,
        component: Option<usize>,
        operator: StringOperator,
        value: &str,
        ignore_case: bool,
    ) -> SqlSearchResult<()> {
        ctx.append("(")
            .append_column(&TEXT_OVERFLOW, component)
            .append(" IS NOT NULL AND ");
        Self::compare(ctx, &TEXT_OVERFLOW, component, operator, value, ignore_case)?;
        ctx.append(")");
        Ok(())
    }

    fn compare(
        ctx: &mut RenderContext<'_>,
        column: &Column,
        component: Option<usize>,
        operator: StringOperator,
        value: &str,
        ignore_case: bool,
    ) -> SqlSearchResult<()> {
        ctx.append_column(column, component);
        append_collation(ctx, column, ignore_case);
        match like_pattern(operator, value) {
            Some(pattern) => ctx.append(" LIKE ").append_parameter(column, pattern, true)?,
            None => ctx.append(" = ").append_parameter(column, value, true)?,
        };
        Ok(())
    }

    /// Builds SQL for the sort flags `IsMin` / `IsMax`.
    pub fn visit_binary(expr: &BinaryExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        let column = match expr.field {
            FieldName::StringIsMin => &IS_MIN,
            FieldName::StringIsMax => &IS_MAX,
            other => return Err(unsupported_field(QueryGenerator::String, other)),
        };
        dispatch::simple_binary(ctx, expr.operator, column, expr.component_index, expr.value.clone(), true)
    }

    /// Builds SQL for an exact match against any of several values.
    pub fn visit_in(expr: &InExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        if expr.field != FieldName::String {
            return Err(unsupported_field(QueryGenerator::String, expr.field));
        }
        dispatch::simple_in(ctx, &TEXT, expr.component_index, &expr.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SqlSearchError;
    use crate::expression::{BinaryOperator, Expression};
    use crate::generators::test_support::Harness;
    use crate::sql::SqlValue;

    fn render(expr: Expression) -> (String, Vec<SqlValue>) {
        let mut h = Harness::new();
        let sql = h.render(QueryGenerator::String, &expr).unwrap();
        let values = h.params.parameters().iter().map(|p| p.value.clone()).collect();
        (sql, values)
    }

    #[test]
    fn test_string_starts_with_default() {
        let (sql, values) = render(Expression::string(
            StringOperator::StartsWith,
            FieldName::String,
            "Smi",
            true,
        ));

        assert_eq!(sql, "Text LIKE @p0");
        assert_eq!(values, vec![SqlValue::NVarChar("Smi%".into())]);
    }

    #[test]
    fn test_string_exact_is_case_sensitive() {
        let (sql, _) = render(Expression::string_equals(FieldName::String, "Smith"));

        assert_eq!(sql, "Text COLLATE Latin1_General_100_CS_AS = @p0");
        assert!(!sql.contains("TextOverflow"));
    }

    #[test]
    fn test_string_contains_checks_overflow() {
        let (sql, _) = render(Expression::string(
            StringOperator::Contains,
            FieldName::String,
            "mit",
            true,
        ));

        assert_eq!(
            sql,
            "(Text LIKE @p0 OR (TextOverflow IS NOT NULL AND TextOverflow LIKE @p1))"
        );
    }

    #[test]
    fn test_string_ends_with() {
        let (sql, values) = render(Expression::string(
            StringOperator::EndsWith,
            FieldName::String,
            "th",
            true,
        ));

        assert!(sql.starts_with("((TextOverflow IS NULL AND Text LIKE @p0) OR"));
        assert_eq!(values[0], SqlValue::NVarChar("%th".into()));
    }

    #[test]
    fn test_string_too_long_uses_overflow_only() {
        let long = "a".repeat(300);
        let (sql, values) = render(Expression::string(
            StringOperator::Equals,
            FieldName::String,
            long.clone(),
            true,
        ));

        assert_eq!(sql, "(TextOverflow IS NOT NULL AND TextOverflow = @p0)");
        assert!(!sql.contains("Text ="));
        assert_eq!(values, vec![SqlValue::NVarChar(long)]);
    }

    #[test]
    fn test_string_at_capacity_excludes_overflow_rows() {
        let (sql, _) = render(Expression::string(
            StringOperator::Equals,
            FieldName::String,
            "b".repeat(256),
            true,
        ));

        assert_eq!(sql, "Text = @p0 AND TextOverflow IS NULL");
    }

    #[test]
    fn test_string_not_contains() {
        let (sql, _) = render(Expression::string(
            StringOperator::NotContains,
            FieldName::String,
            "x",
            true,
        ));

        assert!(sql.starts_with("NOT ((Text LIKE"));
    }

    #[test]
    fn test_string_is_min_flag() {
        let (sql, values) = render(Expression::binary(BinaryOperator::Equal, FieldName::StringIsMin, true));

        assert_eq!(sql, "IsMin = @p0");
        assert_eq!(values, vec![SqlValue::Bit(true)]);
    }

    #[test]
    fn test_string_rejects_token_field() {
        let mut h = Harness::new();
        let err = h
            .render(QueryGenerator::String, &Expression::string_equals(FieldName::TokenCode, "x"))
            .unwrap_err();

        assert!(matches!(err, SqlSearchError::UnsupportedField { .. }));
    }
}

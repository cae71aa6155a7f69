//! Token search parameters.
//!
//! `Code` holds the first 256 characters of a code and `CodeOverflow` the
//! remainder. Systems are interned: a known system compares by id, an unknown
//! one is resolved through `dbo.System` at query time.

use super::dispatch::{self, unsupported_field, unsupported_operator};
use super::{QueryGenerator, RenderContext};
use crate::error::{SqlSearchError, SqlSearchResult};
use crate::expression::{BinaryOperator, FieldName, InExpression, MissingFieldExpression, StringExpression, StringOperator, Value};
use crate::schema::Column;
use crate::schema::tables::{identifier_of_type_search_param, system, token_search_param};

/// The system and code columns of a token-shaped table.
#[derive(Debug, Clone, Copy)]
pub struct TokenColumns {
    /// Interned system id.
    pub system_id: Column,
    /// Leading characters of the code.
    pub code: Column,
    /// Remainder of codes longer than `code`.
    pub code_overflow: Column,
}

impl TokenColumns {
    /// `dbo.TokenSearchParam` and the token components of composite tables.
    pub const TOKEN: TokenColumns = TokenColumns {
        system_id: token_search_param::SYSTEM_ID,
        code: token_search_param::CODE,
        code_overflow: token_search_param::CODE_OVERFLOW,
    };

    /// `dbo.IdentifierOfTypeSearchParam`.
    pub const IDENTIFIER_OF_TYPE: TokenColumns = TokenColumns {
        system_id: identifier_of_type_search_param::SYSTEM_ID,
        code: identifier_of_type_search_param::CODE,
        code_overflow: identifier_of_type_search_param::CODE_OVERFLOW,
    };
}

/// Handles `dbo.TokenSearchParam` predicates.
pub struct TokenQueryGenerator;

impl TokenQueryGenerator {
    /// Builds SQL for a system or code match.
    pub fn visit_string(expr: &StringExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        Self::visit_string_on(QueryGenerator::Token, &TokenColumns::TOKEN, expr, ctx)
    }

    pub(crate) fn visit_string_on(
        generator: QueryGenerator,
        columns: &TokenColumns,
        expr: &StringExpression,
        ctx: &mut RenderContext<'_>,
    ) -> SqlSearchResult<()> {
        match (expr.field, expr.operator) {
            (FieldName::TokenSystem, StringOperator::Equals) => {
                system_predicate(ctx, &columns.system_id, expr.component_index, &expr.value)
            }
            (FieldName::TokenCode, StringOperator::Equals | StringOperator::StartsWith) => {
                code_predicate(ctx, columns, expr.component_index, expr.operator, &expr.value)
            }
            (FieldName::TokenSystem | FieldName::TokenCode, operator) => {
                Err(unsupported_operator(generator, operator))
            }
            (field, _) => Err(unsupported_field(generator, field)),
        }
    }

    /// Builds SQL for `:missing` on the system.
    pub fn visit_missing_field(expr: &MissingFieldExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        match expr.field {
            FieldName::TokenSystem => {
                dispatch::missing_field(ctx, &token_search_param::SYSTEM_ID, expr.component_index);
                Ok(())
            }
            other => Err(unsupported_field(QueryGenerator::Token, other)),
        }
    }

    /// Builds SQL for a code matching any of several values.
    pub fn visit_in(expr: &InExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        if expr.field != FieldName::TokenCode {
            return Err(unsupported_field(QueryGenerator::Token, expr.field));
        }

        let columns = TokenColumns::TOKEN;
        let all_fit = expr
            .values
            .iter()
            .all(|v| v.as_str().is_some_and(|s| s.chars().count() < capacity(&columns.code)));
        if all_fit {
            return dispatch::simple_in(ctx, &columns.code, expr.component_index, &expr.values);
        }

        // long codes need the overflow column, so spell the list out
        ctx.append("(");
        for (i, value) in expr.values.iter().enumerate() {
            if i > 0 {
                ctx.append(" OR ");
            }
            let code = match value {
                Value::String(s) => s,
                other => {
                    return Err(SqlSearchError::InvalidValue {
                        column: columns.code.name.to_string(),
                        expected: columns.code.sql_type.to_string(),
                        actual: other.type_name().to_string(),
                    });
                }
            };
            ctx.append("(");
            code_predicate(ctx, &columns, expr.component_index, StringOperator::Equals, code)?;
            ctx.append(")");
        }
        ctx.append(")");
        Ok(())
    }
}

fn capacity(column: &Column) -> usize {
    column.max_length.unwrap_or(usize::MAX)
}

/// `SystemId = @id`, or a lookup into `dbo.System` for systems not yet interned.
pub(crate) fn system_predicate(
    ctx: &mut RenderContext<'_>,
    column: &Column,
    component_index: Option<usize>,
    system_uri: &str,
) -> SqlSearchResult<()> {
    match ctx.model.try_get_system_id(system_uri) {
        Some(id) => dispatch::simple_binary(
            ctx,
            BinaryOperator::Equal,
            column,
            component_index,
            id,
            true,
        ),
        None => {
            ctx.append_column(column, component_index).append(" IN (SELECT ");
            ctx.sb.append_column(&system::SYSTEM_ID, None);
            ctx.append(" FROM ").append(system::TABLE.name).append(" WHERE ");
            ctx.sb.append_column(&system::VALUE, None);
            ctx.append(" = ")
                .append_parameter(&system::VALUE, system_uri, true)?
                .append(")");
            Ok(())
        }
    }
}

/// Matches a code, splitting literals longer than `Code` across the overflow
/// column.
pub(crate) fn code_predicate(
    ctx: &mut RenderContext<'_>,
    columns: &TokenColumns,
    component_index: Option<usize>,
    operator: StringOperator,
    code: &str,
) -> SqlSearchResult<()> {
    let max = capacity(&columns.code);
    let length = code.chars().count();

    if length > max {
        let split = code.char_indices().nth(max).map_or(code.len(), |(i, _)| i);
        let (prefix, rest) = code.split_at(split);
        dispatch::simple_string(ctx, StringOperator::Equals, &columns.code, component_index, prefix, false)?;
        ctx.append(" AND ")
            .append_column(&columns.code_overflow, component_index)
            .append(" IS NOT NULL AND ");
        return dispatch::simple_string(ctx, operator, &columns.code_overflow, component_index, rest, false);
    }

    dispatch::simple_string(ctx, operator, &columns.code, component_index, code, false)?;
    if operator == StringOperator::Equals && length == max {
        ctx.append(" AND ");
        dispatch::missing_field(ctx, &columns.code_overflow, component_index);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;
    use crate::generators::test_support::Harness;
    use crate::sql::SqlValue;

    #[test]
    fn test_token_code_and_interned_system() {
        let mut h = Harness::new();
        let expr = Expression::and(vec![
            Expression::string_equals(FieldName::TokenSystem, "http://loinc.org"),
            Expression::string_equals(FieldName::TokenCode, "1234-5"),
        ]);

        let sql = h.render(QueryGenerator::Token, &expr).unwrap();

        assert_eq!(sql, "SystemId = @p0 AND Code = @p1");
        assert_eq!(h.params.parameters()[0].value, SqlValue::Int(5));
    }

    #[test]
    fn test_token_unknown_system_uses_lookup() {
        let mut h = Harness::new();
        let expr = Expression::string_equals(FieldName::TokenSystem, "http://snomed.info/sct");

        let sql = h.render(QueryGenerator::Token, &expr).unwrap();

        assert_eq!(sql, "SystemId IN (SELECT SystemId FROM dbo.System WHERE Value = @p0)");
        assert_eq!(
            h.params.parameters()[0].value,
            SqlValue::NVarChar("http://snomed.info/sct".into())
        );
    }

    #[test]
    fn test_token_long_code_splits_into_overflow() {
        let mut h = Harness::new();
        let code = format!("{}{}", "c".repeat(256), "tail");
        let sql = h
            .render(QueryGenerator::Token, &Expression::string_equals(FieldName::TokenCode, code))
            .unwrap();

        assert_eq!(sql, "Code = @p0 AND CodeOverflow IS NOT NULL AND CodeOverflow = @p1");
        assert_eq!(h.params.parameters()[1].value, SqlValue::VarChar("tail".into()));
    }

    #[test]
    fn test_token_code_at_capacity() {
        let mut h = Harness::new();
        let sql = h
            .render(
                QueryGenerator::Token,
                &Expression::string_equals(FieldName::TokenCode, "c".repeat(256)),
            )
            .unwrap();

        assert_eq!(sql, "Code = @p0 AND CodeOverflow IS NULL");
    }

    #[test]
    fn test_token_in_list() {
        let mut h = Harness::new();
        let expr = Expression::in_list(FieldName::TokenCode, vec!["a".into(), "b".into()]);

        let sql = h.render(QueryGenerator::Token, &expr).unwrap();

        assert_eq!(sql, "Code IN (@p0, @p1)");
    }

    #[test]
    fn test_token_missing_system() {
        let mut h = Harness::new();
        let sql = h
            .render(QueryGenerator::Token, &Expression::missing_field(FieldName::TokenSystem))
            .unwrap();

        assert_eq!(sql, "SystemId IS NULL");
    }

    #[test]
    fn test_token_rejects_contains() {
        let mut h = Harness::new();
        let expr = Expression::string(StringOperator::Contains, FieldName::TokenCode, "x", false);

        let err = h.render(QueryGenerator::Token, &expr).unwrap_err();

        assert!(matches!(err, SqlSearchError::UnsupportedOperator { .. }));
    }
}

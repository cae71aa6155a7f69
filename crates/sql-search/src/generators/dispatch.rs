//! Routes expression nodes to generators and holds the shared predicate
//! helpers.

use tracing::warn;

use super::composite::CompositeQueryGenerator;
use super::compartment::CompartmentQueryGenerator;
use super::date::DateTimeQueryGenerator;
use super::identifier_of_type::IdentifierOfTypeQueryGenerator;
use super::number::NumberQueryGenerator;
use super::quantity::QuantityQueryGenerator;
use super::reference::ReferenceQueryGenerator;
use super::resource_table::ResourceTableQueryGenerator;
use super::string::StringQueryGenerator;
use super::token::TokenQueryGenerator;
use super::token_text::TokenTextQueryGenerator;
use super::uri::UriQueryGenerator;
use super::{QueryGenerator, RenderContext};
use crate::config::UnresolvedTypePolicy;
use crate::error::{SqlSearchError, SqlSearchResult};
use crate::expression::{
    BinaryExpression, BinaryOperator, Expression, FieldName, InExpression, MissingFieldExpression,
    MissingSearchParameterExpression, MultiaryExpression, MultiaryOperator,
    SearchParameterExpression, StringExpression, StringOperator, Value,
};
use crate::schema::tables::search_param;
use crate::schema::{Collation, Column};

/// Renders `expression` as a predicate of `generator`'s table.
pub fn render(
    generator: QueryGenerator,
    expression: &Expression,
    ctx: &mut RenderContext<'_>,
) -> SqlSearchResult<()> {
    if let QueryGenerator::Composite(kind) = generator {
        // keyset and surrogate id bounds pushed into the CTE address no component
        if let Some(component_index) =
            component_index(expression).filter(|_| !is_surrogate_id_leaf(expression))
        {
            return CompositeQueryGenerator::visit(kind, component_index, expression, ctx);
        }
    }

    match expression {
        Expression::SearchParameter(e) => visit_search_parameter(generator, e, ctx),
        Expression::MissingSearchParameter(e) => {
            visit_missing_search_parameter(generator, e, ctx)
        }
        Expression::Multiary(e) => visit_multiary(generator, e, ctx),
        Expression::Not(inner) => {
            ctx.append("NOT (");
            render(generator, inner, ctx)?;
            ctx.append(")");
            Ok(())
        }
        Expression::Binary(e) => visit_binary(generator, e, ctx),
        Expression::String(e) => visit_string(generator, e, ctx),
        Expression::MissingField(e) => visit_missing_field(generator, e, ctx),
        Expression::In(e) => visit_in(generator, e, ctx),
        Expression::Compartment(e) => match generator {
            QueryGenerator::Compartment | QueryGenerator::ReferenceCompartment => {
                CompartmentQueryGenerator::visit_compartment(generator, e, ctx)
            }
            _ => Err(unsupported_expression(generator, expression)),
        },
        Expression::Union(_)
        | Expression::Chained(_)
        | Expression::SqlChainLink(_)
        | Expression::Include(_) => Err(unsupported_expression(generator, expression)),
    }
}

fn visit_search_parameter(
    generator: QueryGenerator,
    expr: &SearchParameterExpression,
    ctx: &mut RenderContext<'_>,
) -> SqlSearchResult<()> {
    // resource table columns exist on every index table
    if generator.is_resource_table() || expr.parameter.is_resource_table_parameter() {
        return ResourceTableQueryGenerator::visit_search_parameter(expr, ctx);
    }

    append_search_param_id(&expr.parameter.url, ctx)?;
    ctx.append(" AND ");
    render(generator, &expr.expression, ctx)
}

fn visit_missing_search_parameter(
    generator: QueryGenerator,
    expr: &MissingSearchParameterExpression,
    ctx: &mut RenderContext<'_>,
) -> SqlSearchResult<()> {
    if generator.is_resource_table() {
        return Err(SqlSearchError::UnexpectedSearchParameter {
            name: expr.parameter.code.clone(),
        });
    }
    append_search_param_id(&expr.parameter.url, ctx)
}

/// `SearchParamId = @p`, recording the id as referenced.
pub(crate) fn append_search_param_id(url: &str, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
    let id = ctx.search_param_id(url)?;
    ctx.append_column(&search_param::SEARCH_PARAM_ID, None)
        .append(" = ")
        .append_parameter(&search_param::SEARCH_PARAM_ID, id, true)?;
    Ok(())
}

fn visit_multiary(
    generator: QueryGenerator,
    expr: &MultiaryExpression,
    ctx: &mut RenderContext<'_>,
) -> SqlSearchResult<()> {
    if expr.expressions.is_empty() {
        match expr.operator {
            MultiaryOperator::And => ctx.append("1 = 1"),
            MultiaryOperator::Or => ctx.append("0 = 1"),
        };
        return Ok(());
    }

    let is_or = expr.operator == MultiaryOperator::Or;
    if is_or {
        ctx.append("(");
    }
    let separator = format!(" {} ", expr.operator.as_sql());
    for (i, child) in expr.expressions.iter().enumerate() {
        if i > 0 {
            ctx.append(&separator);
        }
        render(generator, child, ctx)?;
    }
    if is_or {
        ctx.append(")");
    }
    Ok(())
}

fn is_surrogate_id_leaf(expression: &Expression) -> bool {
    matches!(
        expression,
        Expression::Binary(BinaryExpression {
            field: FieldName::ResourceSurrogateId | FieldName::SurrogateIdKeyset | FieldName::PrimaryKey,
            component_index: None,
            ..
        })
    )
}

fn visit_binary(
    generator: QueryGenerator,
    expr: &BinaryExpression,
    ctx: &mut RenderContext<'_>,
) -> SqlSearchResult<()> {
    if matches!(
        expr.field,
        FieldName::ResourceSurrogateId | FieldName::SurrogateIdKeyset | FieldName::PrimaryKey
    ) {
        return ResourceTableQueryGenerator::visit_binary(QueryGenerator::ResourceSurrogateId, expr, ctx);
    }

    match generator {
        QueryGenerator::Number => NumberQueryGenerator::visit_binary(expr, ctx),
        QueryGenerator::Quantity => QuantityQueryGenerator::visit_binary(expr, ctx),
        QueryGenerator::DateTime => DateTimeQueryGenerator::visit_binary(expr, ctx),
        QueryGenerator::String => StringQueryGenerator::visit_binary(expr, ctx),
        g if g.is_resource_table() => ResourceTableQueryGenerator::visit_binary(g, expr, ctx),
        _ => Err(unsupported_node(generator, "binary")),
    }
}

fn visit_string(
    generator: QueryGenerator,
    expr: &StringExpression,
    ctx: &mut RenderContext<'_>,
) -> SqlSearchResult<()> {
    match generator {
        QueryGenerator::String => StringQueryGenerator::visit_string(expr, ctx),
        QueryGenerator::Token => TokenQueryGenerator::visit_string(expr, ctx),
        QueryGenerator::TokenText => TokenTextQueryGenerator::visit_string(expr, ctx),
        QueryGenerator::Quantity => QuantityQueryGenerator::visit_string(expr, ctx),
        QueryGenerator::Uri => UriQueryGenerator::visit_string(expr, ctx),
        QueryGenerator::Reference => ReferenceQueryGenerator::visit_string(expr, ctx),
        QueryGenerator::IdentifierOfType => IdentifierOfTypeQueryGenerator::visit_string(expr, ctx),
        g if g.is_resource_table() => ResourceTableQueryGenerator::visit_string(g, expr, ctx),
        _ => Err(unsupported_node(generator, "string")),
    }
}

fn visit_missing_field(
    generator: QueryGenerator,
    expr: &MissingFieldExpression,
    ctx: &mut RenderContext<'_>,
) -> SqlSearchResult<()> {
    match generator {
        QueryGenerator::Token => TokenQueryGenerator::visit_missing_field(expr, ctx),
        QueryGenerator::Quantity => QuantityQueryGenerator::visit_missing_field(expr, ctx),
        QueryGenerator::Reference => ReferenceQueryGenerator::visit_missing_field(expr, ctx),
        QueryGenerator::IdentifierOfType => {
            IdentifierOfTypeQueryGenerator::visit_missing_field(expr, ctx)
        }
        _ => Err(unsupported_node(generator, "missing field")),
    }
}

fn visit_in(
    generator: QueryGenerator,
    expr: &InExpression,
    ctx: &mut RenderContext<'_>,
) -> SqlSearchResult<()> {
    match generator {
        QueryGenerator::Token => TokenQueryGenerator::visit_in(expr, ctx),
        QueryGenerator::String => StringQueryGenerator::visit_in(expr, ctx),
        QueryGenerator::Reference => ReferenceQueryGenerator::visit_in(expr, ctx),
        g if g.is_resource_table() => ResourceTableQueryGenerator::visit_in(g, expr, ctx),
        _ => Err(unsupported_node(generator, "in")),
    }
}

/// The component a leaf addresses, if it is a leaf.
fn component_index(expression: &Expression) -> Option<Option<usize>> {
    match expression {
        Expression::Binary(e) => Some(e.component_index),
        Expression::String(e) => Some(e.component_index),
        Expression::MissingField(e) => Some(e.component_index),
        Expression::In(e) => Some(e.component_index),
        _ => None,
    }
}

pub(crate) fn unsupported_expression(generator: QueryGenerator, expression: &Expression) -> SqlSearchError {
    unsupported_node(generator, expression.kind_name())
}

pub(crate) fn unsupported_node(generator: QueryGenerator, kind: &'static str) -> SqlSearchError {
    SqlSearchError::UnsupportedExpression {
        generator: generator.name(),
        kind,
    }
}

pub(crate) fn unsupported_field(generator: QueryGenerator, field: impl ToString) -> SqlSearchError {
    SqlSearchError::UnsupportedField {
        generator: generator.name(),
        field: field.to_string(),
    }
}

pub(crate) fn unsupported_operator(generator: QueryGenerator, operator: impl ToString) -> SqlSearchError {
    SqlSearchError::UnsupportedOperator {
        generator: generator.name(),
        operator: operator.to_string(),
    }
}

/// `column <op> @p`.
pub(crate) fn simple_binary(
    ctx: &mut RenderContext<'_>,
    operator: BinaryOperator,
    column: &Column,
    component_index: Option<usize>,
    value: impl Into<Value>,
    include_in_hash: bool,
) -> SqlSearchResult<()> {
    ctx.append_column(column, component_index)
        .append(" ")
        .append(operator.as_sql())
        .append(" ")
        .append_parameter(column, value, include_in_hash)?;
    Ok(())
}

/// `column IS NOT NULL AND column <op> @p` for nullable columns.
pub(crate) fn guarded_binary(
    ctx: &mut RenderContext<'_>,
    operator: BinaryOperator,
    column: &Column,
    component_index: Option<usize>,
    value: impl Into<Value>,
) -> SqlSearchResult<()> {
    if column.nullable {
        ctx.append_column(column, component_index).append(" IS NOT NULL AND ");
    }
    simple_binary(ctx, operator, column, component_index, value, true)
}

/// `column IS NULL`.
pub(crate) fn missing_field(ctx: &mut RenderContext<'_>, column: &Column, component_index: Option<usize>) {
    ctx.append_column(column, component_index).append(" IS NULL");
}

/// `column IN (@p0, @p1, ...)`. An empty list matches nothing.
pub(crate) fn simple_in(
    ctx: &mut RenderContext<'_>,
    column: &Column,
    component_index: Option<usize>,
    values: &[Value],
) -> SqlSearchResult<()> {
    if values.is_empty() {
        unsatisfiable(ctx);
        return Ok(());
    }
    ctx.append_column(column, component_index).append(" IN (");
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            ctx.append(", ");
        }
        ctx.append_parameter(column, value.clone(), true)?;
    }
    ctx.append(")");
    Ok(())
}

/// A predicate no row satisfies.
pub(crate) fn unsatisfiable(ctx: &mut RenderContext<'_>) {
    ctx.append("0 = 1");
}

/// String matching against one column.
///
/// Negated operators render as `NOT (...)` around the positive match. A
/// collation is spelled out only when the requested case handling differs
/// from the column's default.
pub(crate) fn simple_string(
    ctx: &mut RenderContext<'_>,
    operator: StringOperator,
    column: &Column,
    component_index: Option<usize>,
    value: &str,
    ignore_case: bool,
) -> SqlSearchResult<()> {
    if let Some(positive) = operator.positive() {
        ctx.append("NOT (");
        simple_string(ctx, positive, column, component_index, value, ignore_case)?;
        ctx.append(")");
        return Ok(());
    }

    if operator == StringOperator::LeftSideStartsWith {
        ctx.append_parameter(column, value, true)?;
        ctx.append(" LIKE ").append_column(column, component_index);
        append_collation(ctx, column, ignore_case);
        ctx.append(" + '%'");
        return Ok(());
    }

    ctx.append_column(column, component_index);
    append_collation(ctx, column, ignore_case);
    match like_pattern(operator, value) {
        Some(pattern) => {
            ctx.append(" LIKE ").append_parameter(column, pattern, true)?;
        }
        None => {
            ctx.append(" = ").append_parameter(column, value, true)?;
        }
    }
    Ok(())
}

/// The LIKE pattern for a positive matching operator; `None` for equality.
pub(crate) fn like_pattern(operator: StringOperator, value: &str) -> Option<String> {
    let escaped = escape_like(value);
    match operator {
        StringOperator::StartsWith => Some(format!("{escaped}%")),
        StringOperator::EndsWith => Some(format!("%{escaped}")),
        StringOperator::Contains => Some(format!("%{escaped}%")),
        _ => None,
    }
}

/// Escapes LIKE wildcards in a literal.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '[' => out.push_str("[[]"),
            '%' => out.push_str("[%]"),
            '_' => out.push_str("[_]"),
            _ => out.push(c),
        }
    }
    out
}

/// Appends a `COLLATE` clause when the requested case handling differs from
/// the column default.
pub(crate) fn append_collation(ctx: &mut RenderContext<'_>, column: &Column, ignore_case: bool) {
    let collation = match (column.collation, ignore_case) {
        (Some(Collation::CaseSensitive), true) => Some(Collation::CaseInsensitive),
        (Some(Collation::CaseInsensitive), false) => Some(Collation::CaseSensitive),
        _ => None,
    };
    if let Some(collation) = collation {
        ctx.append(" COLLATE ").append(collation.name());
    }
}

/// `column = @typeId`, or the unresolved-type policy when the name is unknown.
pub(crate) fn resource_type_predicate(
    ctx: &mut RenderContext<'_>,
    column: &Column,
    component_index: Option<usize>,
    resource_type: &str,
) -> SqlSearchResult<()> {
    match ctx.model.try_get_resource_type_id(resource_type) {
        Some(id) => simple_binary(ctx, BinaryOperator::Equal, column, component_index, id, true),
        None => unresolved_resource_type(ctx, resource_type),
    }
}

/// `column IN (@t0, ...)` over the resolvable names.
pub(crate) fn resource_types_in(
    ctx: &mut RenderContext<'_>,
    column: &Column,
    component_index: Option<usize>,
    resource_types: &[String],
) -> SqlSearchResult<()> {
    let mut ids = Vec::with_capacity(resource_types.len());
    for name in resource_types {
        match ctx.model.try_get_resource_type_id(name) {
            Some(id) => ids.push(Value::from(id)),
            None if ctx.config.unresolved_reference_type == UnresolvedTypePolicy::Error => {
                return Err(SqlSearchError::UnknownResourceType { name: name.clone() });
            }
            None => warn!(resource_type = %name, "Skipping unknown resource type"),
        }
    }
    if ids.is_empty() {
        return match resource_types.first() {
            Some(name) => unresolved_resource_type(ctx, name),
            None => {
                unsatisfiable(ctx);
                Ok(())
            }
        };
    }
    simple_in(ctx, column, component_index, &ids)
}

/// Applies the unresolved-type policy.
pub(crate) fn unresolved_resource_type(ctx: &mut RenderContext<'_>, resource_type: &str) -> SqlSearchResult<()> {
    match ctx.config.unresolved_reference_type {
        UnresolvedTypePolicy::Unsatisfiable => {
            warn!(resource_type = %resource_type, "Unknown resource type; predicate cannot match");
            unsatisfiable(ctx);
            Ok(())
        }
        UnresolvedTypePolicy::Error => Err(SqlSearchError::UnknownResourceType {
            name: resource_type.to_string(),
        }),
    }
}

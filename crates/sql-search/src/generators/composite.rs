//! Composite search parameters.
//!
//! A composite row stores its components side by side with the component
//! number appended to each column name. Each component leaf is rendered by
//! the generator of the component's type.

use super::dispatch;
use super::{QueryGenerator, RenderContext};
use crate::error::{SqlSearchError, SqlSearchResult};
use crate::expression::Expression;
use crate::schema::Table;
use crate::schema::tables::composites;
use crate::types::{SearchParamType, SearchParameterInfo};

/// The supported composite shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeKind {
    /// token$token
    TokenToken,
    /// token$date
    TokenDateTime,
    /// token$quantity
    TokenQuantity,
    /// token$string
    TokenString,
    /// token$number$number
    TokenNumberNumber,
    /// reference$token
    ReferenceToken,
}

impl CompositeKind {
    /// Picks the shape from a composite parameter's component types.
    pub fn for_components(parameter: &SearchParameterInfo) -> SqlSearchResult<Self> {
        use SearchParamType as T;

        let kind = match parameter.components.as_slice() {
            [T::Token, T::Token] => CompositeKind::TokenToken,
            [T::Token, T::Date] => CompositeKind::TokenDateTime,
            [T::Token, T::Quantity] => CompositeKind::TokenQuantity,
            [T::Token, T::String] => CompositeKind::TokenString,
            [T::Token, T::Number, T::Number] => CompositeKind::TokenNumberNumber,
            [T::Reference, T::Token] => CompositeKind::ReferenceToken,
            other => {
                return Err(SqlSearchError::invalid_operation(format!(
                    "composite search parameter '{}' has unsupported components {:?}",
                    parameter.code, other
                )));
            }
        };
        Ok(kind)
    }

    /// The composite table.
    pub fn table(&self) -> Table {
        match self {
            CompositeKind::TokenToken => composites::TOKEN_TOKEN,
            CompositeKind::TokenDateTime => composites::TOKEN_DATE_TIME,
            CompositeKind::TokenQuantity => composites::TOKEN_QUANTITY,
            CompositeKind::TokenString => composites::TOKEN_STRING,
            CompositeKind::TokenNumberNumber => composites::TOKEN_NUMBER_NUMBER,
            CompositeKind::ReferenceToken => composites::REFERENCE_TOKEN,
        }
    }

    /// The generator of each component, in component order.
    pub fn components(&self) -> &'static [QueryGenerator] {
        match self {
            CompositeKind::TokenToken => &[QueryGenerator::Token, QueryGenerator::Token],
            CompositeKind::TokenDateTime => &[QueryGenerator::Token, QueryGenerator::DateTime],
            CompositeKind::TokenQuantity => &[QueryGenerator::Token, QueryGenerator::Quantity],
            CompositeKind::TokenString => &[QueryGenerator::Token, QueryGenerator::String],
            CompositeKind::TokenNumberNumber => &[
                QueryGenerator::Token,
                QueryGenerator::Number,
                QueryGenerator::Number,
            ],
            CompositeKind::ReferenceToken => &[QueryGenerator::Reference, QueryGenerator::Token],
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            CompositeKind::TokenToken => "TokenTokenCompositeQueryGenerator",
            CompositeKind::TokenDateTime => "TokenDateTimeCompositeQueryGenerator",
            CompositeKind::TokenQuantity => "TokenQuantityCompositeQueryGenerator",
            CompositeKind::TokenString => "TokenStringCompositeQueryGenerator",
            CompositeKind::TokenNumberNumber => "TokenNumberNumberCompositeQueryGenerator",
            CompositeKind::ReferenceToken => "ReferenceTokenCompositeQueryGenerator",
        }
    }
}

/// Routes composite component leaves.
pub struct CompositeQueryGenerator;

impl CompositeQueryGenerator {
    /// Renders a leaf addressed to one component.
    pub fn visit(
        kind: CompositeKind,
        component_index: Option<usize>,
        expression: &Expression,
        ctx: &mut RenderContext<'_>,
    ) -> SqlSearchResult<()> {
        let composite = QueryGenerator::Composite(kind);
        let index = component_index.ok_or_else(|| {
            SqlSearchError::invalid_operation(format!(
                "{} requires a component index on {} expressions",
                composite.name(),
                expression.kind_name()
            ))
        })?;
        let component = kind.components().get(index).copied().ok_or_else(|| {
            SqlSearchError::invalid_operation(format!(
                "{} has no component {}",
                composite.name(),
                index
            ))
        })?;
        dispatch::render(component, expression, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{BinaryOperator, FieldName, StringOperator};
    use crate::generators::test_support::Harness;
    use rust_decimal::Decimal;

    fn code_value_quantity() -> SearchParameterInfo {
        SearchParameterInfo::new(
            "code-value-quantity",
            "http://hl7.org/fhir/SearchParameter/Observation-code-value-quantity",
            SearchParamType::Composite,
        )
        .with_components(vec![SearchParamType::Token, SearchParamType::Quantity])
    }

    #[test]
    fn test_composite_kind_from_components() {
        assert_eq!(
            CompositeKind::for_components(&code_value_quantity()).unwrap(),
            CompositeKind::TokenQuantity
        );

        let odd = code_value_quantity().with_components(vec![SearchParamType::Uri]);
        assert!(CompositeKind::for_components(&odd).is_err());
    }

    #[test]
    fn test_composite_component_suffixes() {
        let mut h = Harness::new();
        let expr = Expression::and(vec![
            Expression::string_component(StringOperator::Equals, FieldName::TokenCode, 0, "8480-6", false),
            Expression::binary_component(
                BinaryOperator::GreaterThan,
                FieldName::Quantity,
                1,
                Decimal::new(140, 0),
            ),
        ]);

        let sql = h
            .render(QueryGenerator::Composite(CompositeKind::TokenQuantity), &expr)
            .unwrap();

        assert_eq!(
            sql,
            "Code1 = @p0 AND SingleValue2 IS NOT NULL AND SingleValue2 > @p1"
        );
    }

    #[test]
    fn test_composite_with_keyset_bound() {
        let mut h = Harness::new();
        let expr = Expression::and(vec![
            Expression::string_component(StringOperator::Equals, FieldName::TokenCode, 0, "8480-6", false),
            Expression::binary(BinaryOperator::GreaterThan, FieldName::SurrogateIdKeyset, 42i64),
        ]);

        let sql = h
            .render(QueryGenerator::Composite(CompositeKind::TokenQuantity), &expr)
            .unwrap();

        assert_eq!(sql, "Code1 = @p0 AND ResourceSurrogateId > @p1");
    }

    #[test]
    fn test_composite_requires_component_index() {
        let mut h = Harness::new();
        let expr = Expression::string_equals(FieldName::TokenCode, "x");

        let err = h
            .render(QueryGenerator::Composite(CompositeKind::TokenToken), &expr)
            .unwrap_err();

        assert!(matches!(err, SqlSearchError::InvalidOperation { .. }));
    }
}

//! Compartment membership.
//!
//! Older schemas keep a denormalized `dbo.CompartmentAssignment` table. Newer
//! schemas derive membership from `dbo.ReferenceSearchParam`: a resource is in
//! `Patient/123` when one of the compartment's reference parameters points at
//! `Patient/123`.

use super::dispatch::{self, unsupported_node};
use super::{QueryGenerator, RenderContext};
use crate::error::SqlSearchResult;
use crate::expression::{BinaryOperator, CompartmentSearchExpression, Value};
use crate::schema::tables::{compartment_assignment, reference_search_param, search_param};

/// Handles compartment predicates for both storage layouts.
pub struct CompartmentQueryGenerator;

impl CompartmentQueryGenerator {
    /// Builds SQL for membership in one compartment.
    pub fn visit_compartment(
        generator: QueryGenerator,
        expr: &CompartmentSearchExpression,
        ctx: &mut RenderContext<'_>,
    ) -> SqlSearchResult<()> {
        match generator {
            QueryGenerator::Compartment => Self::by_assignment(expr, ctx)?,
            QueryGenerator::ReferenceCompartment => Self::by_reference(expr, ctx)?,
            _ => return Err(unsupported_node(generator, "compartment")),
        }

        if !expr.filtered_resource_types.is_empty() {
            ctx.append(" AND ");
            dispatch::resource_types_in(
                ctx,
                &search_param::RESOURCE_TYPE_ID,
                None,
                &expr.filtered_resource_types,
            )?;
        }
        Ok(())
    }

    fn by_assignment(expr: &CompartmentSearchExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        let compartment_type_id = ctx.model.get_compartment_type_id(&expr.compartment_type)?;
        dispatch::simple_binary(
            ctx,
            BinaryOperator::Equal,
            &compartment_assignment::COMPARTMENT_TYPE_ID,
            None,
            i64::from(compartment_type_id),
            true,
        )?;
        ctx.append(" AND ");
        dispatch::simple_binary(
            ctx,
            BinaryOperator::Equal,
            &compartment_assignment::REFERENCE_RESOURCE_ID,
            None,
            expr.compartment_id.as_str(),
            true,
        )
    }

    fn by_reference(expr: &CompartmentSearchExpression, ctx: &mut RenderContext<'_>) -> SqlSearchResult<()> {
        // the compartment type must be known even though only its owner type is compared
        ctx.model.get_compartment_type_id(&expr.compartment_type)?;

        dispatch::resource_type_predicate(
            ctx,
            &reference_search_param::REFERENCE_RESOURCE_TYPE_ID,
            None,
            &expr.compartment_type,
        )?;
        ctx.append(" AND ");
        dispatch::simple_binary(
            ctx,
            BinaryOperator::Equal,
            &reference_search_param::REFERENCE_RESOURCE_ID,
            None,
            expr.compartment_id.as_str(),
            true,
        )?;

        let param_ids = ctx.model.compartment_search_param_ids(&expr.compartment_type);
        if !param_ids.is_empty() {
            ctx.search_param_ids.extend(param_ids.iter().copied());
            let values: Vec<Value> = param_ids.into_iter().map(Value::from).collect();
            ctx.append(" AND ");
            dispatch::simple_in(ctx, &search_param::SEARCH_PARAM_ID, None, &values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SqlSearchError;
    use crate::expression::Expression;
    use crate::generators::test_support::Harness;
    use crate::sql::SqlValue;

    #[test]
    fn test_compartment_assignment() {
        let mut h = Harness::new();
        let expr = Expression::compartment("Patient", "123", vec![]);

        let sql = h.render(QueryGenerator::Compartment, &expr).unwrap();

        assert_eq!(sql, "CompartmentTypeId = @p0 AND ReferenceResourceId = @p1");
        assert_eq!(h.params.parameters()[0].value, SqlValue::TinyInt(1));
    }

    #[test]
    fn test_reference_compartment_with_filter() {
        let mut h = Harness::new();
        h.model = std::mem::take(&mut h.model).with_compartment_params("Patient", vec![22]);
        let expr = Expression::compartment("Patient", "123", vec!["Observation".to_string()]);

        let sql = h.render(QueryGenerator::ReferenceCompartment, &expr).unwrap();

        assert_eq!(
            sql,
            "ReferenceResourceTypeId = @p0 AND ReferenceResourceId = @p1 AND SearchParamId IN (@p2) AND ResourceTypeId IN (@p3)"
        );
        assert!(h.search_param_ids.contains(&22));
    }

    #[test]
    fn test_unknown_compartment_type() {
        let mut h = Harness::new();
        let expr = Expression::compartment("Spaceship", "1", vec![]);

        let err = h.render(QueryGenerator::Compartment, &expr).unwrap_err();

        assert!(matches!(err, SqlSearchError::UnknownCompartmentType { .. }));
    }
}

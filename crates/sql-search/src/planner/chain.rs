//! Chained search flattening.

use super::{SearchParamTableExpression, TableExpressionKind, and_all, flatten_and};
use crate::error::{SqlSearchError, SqlSearchResult};
use crate::expression::{Expression, MultiaryOperator, SqlChainLinkExpression};
use crate::generators::QueryGenerator;

/// Flattens a chained expression into a Chain CTE per link, each followed by
/// the Normal CTEs filtering that link's target.
///
/// `pushdown` holds the resource table predicates of the searched resource; it
/// only applies to the first link, whose source is the searched resource.
pub(super) fn flatten(
    expression: &Expression,
    level: usize,
    pushdown: Option<&Expression>,
    out: &mut Vec<SearchParamTableExpression>,
) -> SqlSearchResult<()> {
    let Expression::Chained(chained) = expression else {
        return Err(SqlSearchError::invalid_operation(format!(
            "expected a chained expression, found {}",
            expression.kind_name()
        )));
    };

    let mut conjuncts = Vec::new();
    flatten_and(&chained.expression, &mut conjuncts);

    let mut on_target = Vec::new();
    let mut filters = Vec::new();
    let mut nested = Vec::new();
    for conjunct in conjuncts {
        match conjunct {
            Expression::SearchParameter(e) if e.parameter.is_resource_table_parameter() => {
                on_target.push(conjunct.clone());
            }
            Expression::SearchParameter(e) => filters.push(SearchParamTableExpression::new(
                QueryGenerator::for_parameter(&e.parameter, &e.expression)?,
                Some(conjunct.clone()),
                TableExpressionKind::Normal,
                level,
            )),
            Expression::MissingSearchParameter(e) if !e.is_missing => {
                filters.push(SearchParamTableExpression::new(
                    QueryGenerator::for_parameter(&e.parameter, conjunct)?,
                    Some(conjunct.clone()),
                    TableExpressionKind::Normal,
                    level,
                ));
            }
            Expression::Multiary(e) if e.operator == MultiaryOperator::Or => {
                let generator = single_parameter_generator(&e.expressions)?;
                filters.push(SearchParamTableExpression::new(
                    generator,
                    Some(conjunct.clone()),
                    TableExpressionKind::Normal,
                    level,
                ));
            }
            Expression::Chained(_) => nested.push(conjunct),
            other => {
                return Err(SqlSearchError::invalid_operation(format!(
                    "unsupported {} expression inside a chained search",
                    other.kind_name()
                )));
            }
        }
    }

    if nested.len() > 1 {
        return Err(SqlSearchError::invalid_operation(
            "a chain link can continue into at most one nested chain",
        ));
    }

    let link = SqlChainLinkExpression {
        resource_types: chained.resource_types.clone(),
        reference_search_parameter: chained.reference_search_parameter.clone(),
        target_resource_types: chained.target_resource_types.clone(),
        reversed: chained.reversed,
        expression_on_source: if level == 1 {
            pushdown.cloned().map(Box::new)
        } else {
            None
        },
        expression_on_target: and_all(on_target).map(Box::new),
    };
    out.push(SearchParamTableExpression::new(
        QueryGenerator::Chain,
        Some(Expression::SqlChainLink(link)),
        TableExpressionKind::Chain,
        level,
    ));
    out.extend(filters);

    for inner in nested {
        flatten(inner, level + 1, None, out)?;
    }
    Ok(())
}

/// The generator of an OR whose branches all search one parameter.
fn single_parameter_generator(branches: &[Expression]) -> SqlSearchResult<QueryGenerator> {
    let mut generator = None;
    let mut url = None;
    for branch in branches {
        let Expression::SearchParameter(e) = branch else {
            return Err(SqlSearchError::invalid_operation(
                "an OR inside a chained search may only combine search parameters",
            ));
        };
        match url {
            None => {
                url = Some(e.parameter.url.as_str());
                generator = Some(QueryGenerator::for_parameter(&e.parameter, &e.expression)?);
            }
            Some(first) if first != e.parameter.url => {
                return Err(SqlSearchError::invalid_operation(
                    "an OR inside a chained search must target a single parameter",
                ));
            }
            Some(_) => {}
        }
    }
    generator.ok_or_else(|| SqlSearchError::invalid_operation("empty OR inside a chained search"))
}

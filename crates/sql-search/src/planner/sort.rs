//! Value sorts and continuation predicates.

use chrono::{DateTime, Utc};

use super::{SearchParamTableExpression, TableExpressionKind, and_with};
use crate::error::{SqlSearchError, SqlSearchResult};
use crate::expression::{BinaryOperator, Expression, FieldName, PrimaryKeyRange, PrimaryKeyValue, Value};
use crate::generators::QueryGenerator;
use crate::model::SqlServerModel;
use crate::schema::tables::{date_time_search_param, string_search_param};
use crate::schema::{Column, SchemaInformation, versions};
use crate::types::{ContinuationToken, SearchOptions, SearchParamType, SearchParameterInfo, SortDirection, names};

/// A sort on a search parameter value.
#[derive(Debug, Clone, PartialEq)]
pub struct SortPlan {
    /// The sort parameter.
    pub parameter: SearchParameterInfo,
    /// Requested direction.
    pub direction: SortDirection,
    /// Generator of the parameter's index table.
    pub generator: QueryGenerator,
    /// The column exposed as `SortValue`.
    pub column: Column,
}

impl SortPlan {
    /// The value sort requested by `options`, if any.
    ///
    /// Only one sort parameter outside `_type` / `_lastUpdated` is supported,
    /// and it must be a date or string parameter.
    pub fn for_options(options: &SearchOptions) -> SqlSearchResult<Option<Self>> {
        let mut value_sorts = options.sort.iter().filter(|s| !s.parameter.is_primary_key_sort());
        let Some(spec) = value_sorts.next() else {
            return Ok(None);
        };
        if value_sorts.next().is_some() {
            return Err(SqlSearchError::UnsupportedSort {
                message: "only one sort parameter other than _type and _lastUpdated is supported".to_string(),
            });
        }

        let descending = spec.direction == SortDirection::Descending;
        let (generator, column) = match spec.parameter.param_type {
            SearchParamType::Date if descending => (QueryGenerator::DateTime, date_time_search_param::END_DATE_TIME),
            SearchParamType::Date => (QueryGenerator::DateTime, date_time_search_param::START_DATE_TIME),
            SearchParamType::String => (QueryGenerator::String, string_search_param::TEXT),
            other => {
                return Err(SqlSearchError::UnsupportedSort {
                    message: format!("cannot sort by {} parameter '{}'", other, spec.parameter.code),
                });
            }
        };

        Ok(Some(Self {
            parameter: spec.parameter.clone(),
            direction: spec.direction,
            generator,
            column,
        }))
    }

    /// The Sort or SortWithFilter table expression.
    ///
    /// A filter on the sort parameter is folded in only on schemas without
    /// min/max flags. With flags, SortValue comes from the flagged row while a
    /// filter may match any row of the resource, so the filter has to stay in
    /// its own CTE.
    pub(crate) fn table_expression(
        &self,
        filter: Option<Expression>,
        schema: SchemaInformation,
        pushdown: Option<Expression>,
    ) -> SearchParamTableExpression {
        let flag = schema
            .supports(versions::MIN_MAX_SORT)
            .then(|| Expression::binary(BinaryOperator::Equal, self.flag_field(), true));

        let (kind, predicate) = match filter {
            Some(filter @ Expression::SearchParameter(_)) if flag.is_none() => {
                (TableExpressionKind::SortWithFilter, filter)
            }
            _ => (
                TableExpressionKind::Sort,
                match flag {
                    Some(flag) => Expression::search_parameter(self.parameter.clone(), flag),
                    None => Expression::missing_search_parameter(self.parameter.clone(), false),
                },
            ),
        };

        SearchParamTableExpression::new(
            self.generator,
            Some(and_with(std::iter::once(predicate), pushdown)),
            kind,
            0,
        )
    }

    fn flag_field(&self) -> FieldName {
        let descending = self.direction == SortDirection::Descending;
        match (self.generator, descending) {
            (QueryGenerator::DateTime, false) => FieldName::DateTimeIsMin,
            (QueryGenerator::DateTime, true) => FieldName::DateTimeIsMax,
            (_, false) => FieldName::StringIsMin,
            (_, true) => FieldName::StringIsMax,
        }
    }
}

/// Where a sorted page resumes.
#[derive(Debug, Clone, PartialEq)]
pub struct SortContinuation {
    /// The sort value of the last row returned.
    pub value: Value,
    /// The surrogate id of the last row returned.
    pub resource_surrogate_id: i64,
}

impl SortContinuation {
    /// Parses the token's sort value for the sort column.
    pub(crate) fn new(plan: &SortPlan, raw: &str, resource_surrogate_id: i64) -> SqlSearchResult<Self> {
        let value = match plan.generator {
            QueryGenerator::DateTime => DateTime::parse_from_rfc3339(raw)
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                .map_err(|_| SqlSearchError::InvalidContinuationToken {
                    token: raw.to_string(),
                })?,
            _ => Value::String(raw.to_string()),
        };
        Ok(Self {
            value,
            resource_surrogate_id,
        })
    }
}

/// The resume predicate for searches ordered by the resource primary key.
pub(crate) fn keyset_predicate(
    options: &SearchOptions,
    token: &ContinuationToken,
    model: &dyn SqlServerModel,
) -> Expression {
    let first = options.sort.first();
    let descending = first.is_some_and(|s| s.direction == SortDirection::Descending);

    match (token.resource_type_id, first) {
        (Some(resource_type_id), Some(spec)) if spec.parameter.code == names::RESOURCE_TYPE => {
            let mut next: Vec<i16> = model
                .resource_type_ids()
                .into_iter()
                .filter(|id| if descending { *id < resource_type_id } else { *id > resource_type_id })
                .collect();
            if descending {
                next.reverse();
            }
            Expression::binary(
                BinaryOperator::GreaterThan,
                FieldName::PrimaryKey,
                PrimaryKeyRange {
                    current: PrimaryKeyValue {
                        resource_type_id,
                        resource_surrogate_id: token.resource_surrogate_id,
                    },
                    next_resource_type_ids: next,
                },
            )
        }
        (_, Some(spec)) if spec.parameter.code == names::LAST_UPDATED && descending => Expression::binary(
            BinaryOperator::LessThan,
            FieldName::SurrogateIdKeyset,
            token.resource_surrogate_id,
        ),
        _ => Expression::binary(
            BinaryOperator::GreaterThan,
            FieldName::SurrogateIdKeyset,
            token.resource_surrogate_id,
        ),
    }
}

//! Normalizes an expression tree into the ordered list of table expressions
//! the statement assembler turns into CTEs.
//!
//! # Example
//!
//! `Patient?family=Smith&_sort=birthdate&_include=Patient:organization`
//! plans as:
//!
//! | # | Kind | Generator |
//! |---|------|-----------|
//! | 0 | Normal | String (`family`) |
//! | 1 | Sort | DateTime (`birthdate`) |
//! | 2 | Top | - |
//! | 3 | Include | Include (`organization`) |
//! | 4 | IncludeLimit | - |
//! | 5 | IncludeUnionAll | - |

mod chain;
mod sort;

use tracing::debug;

pub use sort::{SortContinuation, SortPlan};

use crate::error::{SqlSearchError, SqlSearchResult};
use crate::expression::{Expression, FieldName, IncludeExpression, MultiaryOperator};
use crate::generators::QueryGenerator;
use crate::model::SqlServerModel;
use crate::schema::{SchemaInformation, versions};
use crate::types::{ContinuationToken, IncludesContinuationToken, SearchOptions, names};

/// The role a table expression plays in the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableExpressionKind {
    /// Every current resource matching the resource table predicates.
    All,
    /// Rows of one index table matching a predicate.
    Normal,
    /// `UNION ALL` of the previous CTE and another predicate (top-level OR).
    Concatenation,
    /// Predecessor rows without a matching index row.
    NotExists,
    /// The page of matches.
    Top,
    /// One link of a chained search.
    Chain,
    /// Resources pulled in by `_include` / `_revinclude`.
    Include,
    /// Bounds the rows of the preceding Include.
    IncludeLimit,
    /// Matches plus every bounded include.
    IncludeUnionAll,
    /// Sort values for the requested sort parameter.
    Sort,
    /// Sort values restricted by a filter on the same parameter.
    SortWithFilter,
    /// Any of several disjoint scopes.
    Union,
}

impl TableExpressionKind {
    /// Returns true for kinds that carry a sort value.
    pub fn is_sort(&self) -> bool {
        matches!(self, TableExpressionKind::Sort | TableExpressionKind::SortWithFilter)
    }
}

/// One planned CTE.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParamTableExpression {
    /// Renders the predicate.
    pub generator: QueryGenerator,
    /// The predicate; `None` for kinds that only reshape their input.
    pub predicate: Option<Expression>,
    /// What the CTE does.
    pub kind: TableExpressionKind,
    /// 0 for the searched resource, n for the n-th chain target.
    pub chain_level: usize,
}

impl SearchParamTableExpression {
    /// Creates a table expression.
    pub fn new(
        generator: QueryGenerator,
        predicate: Option<Expression>,
        kind: TableExpressionKind,
        chain_level: usize,
    ) -> Self {
        Self {
            generator,
            predicate,
            kind,
            chain_level,
        }
    }

    fn reshaping(kind: TableExpressionKind) -> Self {
        Self::new(QueryGenerator::ResourceTable, None, kind, 0)
    }
}

/// The normalized search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlRootExpression {
    /// CTEs in emission order.
    pub search_param_table_expressions: Vec<SearchParamTableExpression>,
    /// Predicates applied to the resource table in the final projection.
    pub resource_table_expressions: Vec<Expression>,
}

/// Everything the assembler needs for one statement.
#[derive(Debug, Clone, Default)]
pub struct SearchPlan {
    /// Table and resource table expressions.
    pub root: SqlRootExpression,
    /// The value sort, if any.
    pub sort: Option<SortPlan>,
    /// Sorted-page resume position.
    pub sort_continuation: Option<SortContinuation>,
    /// The decoded `$includes` token.
    pub includes_continuation: Option<IncludesContinuationToken>,
    /// Codes of every search parameter in the search, in tree order.
    pub searched_parameters: Vec<String>,
}

impl SearchPlan {
    /// Returns true if the statement pulls in included resources.
    pub fn has_includes(&self) -> bool {
        self.root
            .search_param_table_expressions
            .iter()
            .any(|t| t.kind == TableExpressionKind::Include)
    }
}

/// Builds [`SearchPlan`]s.
pub struct SearchPlanner<'a> {
    model: &'a dyn SqlServerModel,
    schema: SchemaInformation,
    options: &'a SearchOptions,
}

/// Conjuncts sorted by where they end up.
#[derive(Default)]
struct Classified {
    unions: Vec<Expression>,
    ids: Vec<Expression>,
    pushable: Vec<Expression>,
    compartments: Vec<Expression>,
    filters: Vec<SearchParamTableExpression>,
    chains: Vec<Expression>,
    not_exists: Vec<SearchParamTableExpression>,
    includes: Vec<IncludeExpression>,
}

impl<'a> SearchPlanner<'a> {
    /// Creates a planner for one compile call.
    pub fn new(model: &'a dyn SqlServerModel, schema: SchemaInformation, options: &'a SearchOptions) -> Self {
        Self {
            model,
            schema,
            options,
        }
    }

    /// Plans `expression`.
    pub fn plan(&self, expression: &Expression) -> SqlSearchResult<SearchPlan> {
        let mut conjuncts = Vec::new();
        flatten_and(expression, &mut conjuncts);

        let mut classified = Classified::default();
        for conjunct in conjuncts {
            self.classify(conjunct, &mut classified)?;
        }

        let continuation = self.decode_continuation()?;
        let includes_continuation = self.decode_includes_continuation()?;

        let count_only = self.options.count_only;
        let sort = if count_only { None } else { SortPlan::for_options(self.options)? };
        if let Some(sort) = &sort {
            debug!(parameter = %sort.parameter.code, direction = ?sort.direction, "Planning value sort");
        }

        let mut sort_continuation = None;
        if let Some(token) = &continuation {
            match (&sort, &token.sort_value) {
                (Some(plan), Some(value)) => {
                    sort_continuation = Some(SortContinuation::new(plan, value, token.resource_surrogate_id)?);
                }
                _ => classified.pushable.push(sort::keyset_predicate(self.options, token, self.model)),
            }
        }

        let includes = if count_only {
            Vec::new()
        } else {
            std::mem::take(&mut classified.includes)
        };

        let has_filter_ctes = !classified.unions.is_empty()
            || !classified.compartments.is_empty()
            || !classified.filters.is_empty()
            || !classified.chains.is_empty()
            || !classified.not_exists.is_empty();
        let needs_ctes = has_filter_ctes || sort.is_some() || !includes.is_empty();

        let pushdown = and_all(classified.pushable.clone());
        let mut tables = Vec::new();

        for union in classified.unions {
            let predicate = match (union, &pushdown) {
                (Expression::Union(u), Some(extra)) => Expression::union(
                    u.expressions
                        .into_iter()
                        .map(|branch| and_with(std::iter::once(branch), Some(extra.clone())))
                        .collect(),
                ),
                (other, _) => other,
            };
            tables.push(SearchParamTableExpression::new(
                QueryGenerator::ResourceTable,
                Some(predicate),
                TableExpressionKind::Union,
                0,
            ));
        }

        let mut resource_table_expressions = classified.pushable.clone();
        if !classified.ids.is_empty() {
            if needs_ctes {
                tables.push(SearchParamTableExpression::new(
                    QueryGenerator::ResourceTable,
                    Some(and_with(and_all(classified.ids).into_iter(), pushdown.clone())),
                    TableExpressionKind::Normal,
                    0,
                ));
            } else {
                resource_table_expressions.extend(classified.ids);
            }
        }

        let compartment_generator = QueryGenerator::for_compartment(self.schema);
        for compartment in classified.compartments {
            tables.push(SearchParamTableExpression::new(
                compartment_generator,
                Some(and_with(std::iter::once(compartment), pushdown.clone())),
                TableExpressionKind::Normal,
                0,
            ));
        }

        let mut filters = classified.filters;
        let sort_filter = match &sort {
            Some(plan) if !self.schema.supports(versions::MIN_MAX_SORT) => {
                take_filter_on(&mut filters, &plan.parameter.code)
            }
            _ => None,
        };
        for mut filter in filters {
            filter.predicate = filter.predicate.map(|p| and_with(std::iter::once(p), pushdown.clone()));
            tables.push(filter);
        }

        for chained in &classified.chains {
            chain::flatten(chained, 1, pushdown.as_ref(), &mut tables)?;
        }

        tables.extend(classified.not_exists);

        if let Some(plan) = &sort {
            tables.push(plan.table_expression(sort_filter, self.schema, pushdown.clone()));
        }

        if !includes.is_empty() {
            tables.push(SearchParamTableExpression::reshaping(TableExpressionKind::Top));

            let (plain, iterate): (Vec<_>, Vec<_>) = includes.into_iter().partition(|i| !i.iterate);
            for include in plain.into_iter().chain(iterate) {
                tables.push(SearchParamTableExpression::new(
                    QueryGenerator::Include,
                    Some(Expression::Include(include)),
                    TableExpressionKind::Include,
                    0,
                ));
                tables.push(SearchParamTableExpression::reshaping(TableExpressionKind::IncludeLimit));
            }
            tables.push(SearchParamTableExpression::reshaping(TableExpressionKind::IncludeUnionAll));
        }

        if tables
            .first()
            .is_some_and(|t| matches!(t.kind, TableExpressionKind::NotExists | TableExpressionKind::Top))
        {
            tables.insert(
                0,
                SearchParamTableExpression::new(
                    QueryGenerator::ResourceTable,
                    and_all(resource_table_expressions.clone()),
                    TableExpressionKind::All,
                    0,
                ),
            );
        }

        let mut searched_parameters = Vec::new();
        collect_parameter_codes(expression, &mut searched_parameters);

        debug!(
            table_expressions = tables.len(),
            resource_table_expressions = resource_table_expressions.len(),
            "Planned search"
        );

        Ok(SearchPlan {
            root: SqlRootExpression {
                search_param_table_expressions: tables,
                resource_table_expressions,
            },
            sort,
            sort_continuation,
            includes_continuation,
            searched_parameters,
        })
    }

    fn classify(&self, conjunct: &Expression, out: &mut Classified) -> SqlSearchResult<()> {
        match conjunct {
            Expression::SearchParameter(e) if e.parameter.code == names::ID => {
                out.ids.push(conjunct.clone());
            }
            Expression::SearchParameter(e) if e.parameter.is_resource_table_parameter() => {
                out.pushable.push(conjunct.clone());
            }
            Expression::Binary(e)
                if matches!(
                    e.field,
                    FieldName::ResourceSurrogateId | FieldName::SurrogateIdKeyset | FieldName::PrimaryKey
                ) =>
            {
                out.pushable.push(conjunct.clone());
            }
            Expression::SearchParameter(e) => {
                out.filters.push(SearchParamTableExpression::new(
                    QueryGenerator::for_parameter(&e.parameter, &e.expression)?,
                    Some(conjunct.clone()),
                    TableExpressionKind::Normal,
                    0,
                ));
            }
            Expression::MissingSearchParameter(e) => {
                let table = SearchParamTableExpression::new(
                    QueryGenerator::for_parameter(&e.parameter, conjunct)?,
                    Some(conjunct.clone()),
                    if e.is_missing {
                        TableExpressionKind::NotExists
                    } else {
                        TableExpressionKind::Normal
                    },
                    0,
                );
                if e.is_missing {
                    out.not_exists.push(table);
                } else {
                    out.filters.push(table);
                }
            }
            Expression::Not(inner) => match inner.as_ref() {
                Expression::SearchParameter(e) if !e.parameter.is_resource_table_parameter() => {
                    out.not_exists.push(SearchParamTableExpression::new(
                        QueryGenerator::for_parameter(&e.parameter, &e.expression)?,
                        Some(inner.as_ref().clone()),
                        TableExpressionKind::NotExists,
                        0,
                    ));
                }
                _ => {
                    return Err(SqlSearchError::invalid_operation(format!(
                        "cannot negate a top-level {} expression",
                        inner.kind_name()
                    )));
                }
            },
            Expression::Multiary(e) if e.operator == MultiaryOperator::Or => {
                self.classify_or(conjunct, &e.expressions, out)?;
            }
            Expression::Compartment(_) => out.compartments.push(conjunct.clone()),
            Expression::Chained(_) => out.chains.push(conjunct.clone()),
            Expression::Union(_) => out.unions.push(conjunct.clone()),
            Expression::Include(include) => out.includes.push(include.clone()),
            other => {
                return Err(SqlSearchError::invalid_operation(format!(
                    "unexpected top-level {} expression",
                    other.kind_name()
                )));
            }
        }
        Ok(())
    }

    /// A top-level OR. Branches on one parameter stay in one CTE; branches on
    /// different parameters become a Normal CTE plus Concatenations.
    fn classify_or(&self, whole: &Expression, branches: &[Expression], out: &mut Classified) -> SqlSearchResult<()> {
        let mut parameters = Vec::with_capacity(branches.len());
        for branch in branches {
            match branch {
                Expression::SearchParameter(e) if !e.parameter.is_resource_table_parameter() => {
                    parameters.push(e);
                }
                other => {
                    return Err(SqlSearchError::invalid_operation(format!(
                        "a top-level OR may only combine search parameters, found {}",
                        other.kind_name()
                    )));
                }
            }
        }

        let Some(first) = parameters.first() else {
            return Err(SqlSearchError::invalid_operation("empty top-level OR"));
        };
        if parameters.iter().all(|p| p.parameter.url == first.parameter.url) {
            out.filters.push(SearchParamTableExpression::new(
                QueryGenerator::for_parameter(&first.parameter, &first.expression)?,
                Some(whole.clone()),
                TableExpressionKind::Normal,
                0,
            ));
            return Ok(());
        }

        for (i, (branch, parameter)) in branches.iter().zip(&parameters).enumerate() {
            out.filters.push(SearchParamTableExpression::new(
                QueryGenerator::for_parameter(&parameter.parameter, &parameter.expression)?,
                Some(branch.clone()),
                if i == 0 {
                    TableExpressionKind::Normal
                } else {
                    TableExpressionKind::Concatenation
                },
                0,
            ));
        }
        Ok(())
    }

    fn decode_continuation(&self) -> SqlSearchResult<Option<ContinuationToken>> {
        self.options
            .continuation_token
            .as_deref()
            .map(|token| {
                ContinuationToken::decode(token).inspect_err(|_| {
                    tracing::warn!(token = %token, "Rejecting undecodable continuation token");
                })
            })
            .transpose()
    }

    fn decode_includes_continuation(&self) -> SqlSearchResult<Option<IncludesContinuationToken>> {
        self.options
            .includes_continuation_token
            .as_deref()
            .map(|token| {
                IncludesContinuationToken::decode(token).inspect_err(|_| {
                    tracing::warn!(token = %token, "Rejecting undecodable includes continuation token");
                })
            })
            .transpose()
    }
}

/// Collects the conjuncts of nested top-level ANDs.
pub(crate) fn flatten_and<'e>(expression: &'e Expression, out: &mut Vec<&'e Expression>) {
    match expression {
        Expression::Multiary(e) if e.operator == MultiaryOperator::And => {
            for child in &e.expressions {
                flatten_and(child, out);
            }
        }
        other => out.push(other),
    }
}

/// AND of the expressions; `None` when empty.
pub(crate) fn and_all(mut expressions: Vec<Expression>) -> Option<Expression> {
    match expressions.len() {
        0 => None,
        1 => expressions.pop(),
        _ => Some(Expression::and(expressions)),
    }
}

/// AND of `expressions` and an optional extra predicate.
pub(crate) fn and_with(expressions: impl Iterator<Item = Expression>, extra: Option<Expression>) -> Expression {
    let mut all: Vec<Expression> = expressions.collect();
    all.extend(extra);
    and_all(all).unwrap_or_else(|| Expression::and(Vec::new()))
}

/// Removes the first level-0 Normal filter on `code`.
fn take_filter_on(filters: &mut Vec<SearchParamTableExpression>, code: &str) -> Option<Expression> {
    // a Normal followed by a Concatenation is the first branch of an OR
    let position = filters.iter().enumerate().position(|(i, t)| {
        t.kind == TableExpressionKind::Normal
            && matches!(&t.predicate, Some(Expression::SearchParameter(e)) if e.parameter.code == code)
            && filters
                .get(i + 1)
                .is_none_or(|next| next.kind != TableExpressionKind::Concatenation)
    })?;
    filters.remove(position).predicate
}

fn collect_parameter_codes(expression: &Expression, out: &mut Vec<String>) {
    let mut stack = vec![expression];
    let mut found = Vec::new();
    while let Some(node) = stack.pop() {
        match node {
            Expression::SearchParameter(e) => found.push(e.parameter.code.clone()),
            Expression::MissingSearchParameter(e) => found.push(e.parameter.code.clone()),
            Expression::Chained(e) => found.push(e.reference_search_parameter.code.clone()),
            _ => {}
        }
        // reversed so codes come out in tree order
        stack.extend(node.children().into_iter().rev());
    }
    out.extend(found);
}

//! Turns a [`SearchPlan`] into one statement: a chain of CTEs followed by the
//! final projection or count.
//!
//! Each table expression becomes one CTE named `cteN`. A CTE is intersected
//! with its restricting predecessor through a correlated `EXISTS`, or through
//! an `INNER JOIN` once the statement grows past the configured threshold.
//! Columns flowing between CTEs:
//!
//! | Kind | Columns |
//! |------|---------|
//! | All, Normal, Concatenation, NotExists, Union | `T1, Sid1` |
//! | Chain, Normal at chain level > 0 | `T1, Sid1, T2, Sid2` |
//! | Sort, SortWithFilter | `T1, Sid1, SortValue` |
//! | Top, IncludeUnionAll | `T1, Sid1, IsMatch, IsPartial[, SortValue]` |
//! | Include | `T1, Sid1, IsMatch` |
//! | IncludeLimit | `T1, Sid1, IsMatch, IsPartial` |

use std::collections::BTreeSet;

use tracing::trace;

use super::CompiledSearch;
use crate::config::SqlSearchConfig;
use crate::error::{SqlSearchError, SqlSearchResult};
use crate::expression::{BinaryOperator, Expression, FieldName, Value};
use crate::generators::{QueryGenerator, RenderContext, render};
use crate::model::SqlServerModel;
use crate::planner::{SearchParamTableExpression, SearchPlan, TableExpressionKind, flatten_and};
use crate::schema::tables::{resource, search_param};
use crate::schema::{Column, SchemaInformation, versions};
use crate::sql::{Delimiter, SqlBuilder, SqlQueryParameterManager, SqlValue};
use crate::types::{ResourceVersionType, SearchOptions, SortDirection, names};

/// Alias of `dbo.Resource` in the final projection.
const RESOURCE_ALIAS: &str = "r";

/// Assembles one statement. Single use: [`assemble`](Self::assemble)
/// consumes it.
pub(super) struct StatementAssembler<'a> {
    pub(super) model: &'a dyn SqlServerModel,
    pub(super) schema: SchemaInformation,
    pub(super) config: &'a SqlSearchConfig,
    pub(super) options: &'a SearchOptions,
    pub(super) plan: &'a SearchPlan,
    pub(super) use_join: bool,
    pub(super) sb: SqlBuilder,
    pub(super) params: SqlQueryParameterManager,
    pub(super) search_param_ids: BTreeSet<i16>,
    cte_count: usize,
    /// Output CTE of each table expression, by plan position.
    pub(super) names: Vec<String>,
    /// The Top CTE, once emitted.
    pub(super) top: Option<String>,
    /// IncludeLimit CTEs with the resource types they can produce.
    pub(super) include_limits: Vec<(String, Vec<String>)>,
    /// Types produced by the Include awaiting its IncludeLimit.
    pub(super) pending_include_types: Vec<String>,
}

impl<'a> StatementAssembler<'a> {
    pub(super) fn new(
        model: &'a dyn SqlServerModel,
        schema: SchemaInformation,
        config: &'a SqlSearchConfig,
        options: &'a SearchOptions,
        plan: &'a SearchPlan,
        use_join: bool,
    ) -> Self {
        Self {
            model,
            schema,
            config,
            options,
            plan,
            use_join,
            sb: SqlBuilder::new(),
            params: SqlQueryParameterManager::new(),
            search_param_ids: BTreeSet::new(),
            cte_count: 0,
            names: Vec::new(),
            top: None,
            include_limits: Vec::new(),
            pending_include_types: Vec::new(),
        }
    }

    pub(super) fn assemble(mut self) -> SqlSearchResult<CompiledSearch> {
        let plan = self.plan;
        for (index, table) in plan.root.search_param_table_expressions.iter().enumerate() {
            trace!(index, kind = ?table.kind, generator = table.generator.name(), "Emitting table expression");
            if table.kind == TableExpressionKind::Union {
                let name = self.union(index, table)?;
                self.names.push(name);
                continue;
            }

            let name = self.begin_cte();
            self.table_expression(index, table, &name)?;
            self.end_cte();
            self.names.push(name);
        }

        if self.options.count_only {
            self.count()?;
        } else {
            self.select()?;
        }

        let mut sql = String::new();
        if !self.options.reuse_query_plans {
            self.params.append_hash(&mut sql);
        }
        sql.push_str(self.sb.as_str());

        let hash = self.params.hash();
        Ok(CompiledSearch {
            sql,
            parameters: self.params.into_parameters(),
            search_param_ids: self.search_param_ids,
            hash,
        })
    }

    fn table_expression(&mut self, index: usize, table: &SearchParamTableExpression, name: &str) -> SqlSearchResult<()> {
        match table.kind {
            TableExpressionKind::All => self.filtered(None, table, false),
            TableExpressionKind::Normal if table.chain_level > 0 => self.chained_normal(index, table),
            TableExpressionKind::Normal => self.filtered(self.restricting_predecessor(index), table, false),
            TableExpressionKind::Concatenation => self.concatenation(index, table),
            TableExpressionKind::NotExists => self.not_exists(index, table),
            TableExpressionKind::Chain => self.chain_link(index, table),
            TableExpressionKind::Sort | TableExpressionKind::SortWithFilter => {
                self.filtered(self.restricting_predecessor(index), table, true)
            }
            TableExpressionKind::Top => {
                self.top(index)?;
                self.top = Some(name.to_string());
                Ok(())
            }
            TableExpressionKind::Include => self.include(table),
            TableExpressionKind::IncludeLimit => {
                self.include_limit(index)?;
                let produced = std::mem::take(&mut self.pending_include_types);
                self.include_limits.push((name.to_string(), produced));
                Ok(())
            }
            TableExpressionKind::IncludeUnionAll => self.include_union_all(),
            TableExpressionKind::Union => Err(SqlSearchError::invalid_operation(
                "union table expressions are emitted as a group",
            )),
        }
    }

    pub(super) fn context(&mut self, table_alias: Option<&'static str>) -> RenderContext<'_> {
        RenderContext {
            sb: &mut self.sb,
            params: &mut self.params,
            model: self.model,
            schema: self.schema,
            config: self.config,
            table_alias,
            search_param_ids: &mut self.search_param_ids,
        }
    }

    fn begin_cte(&mut self) -> String {
        let name = format!("cte{}", self.cte_count);
        if self.cte_count == 0 {
            self.sb.append("WITH ");
        } else {
            self.sb.append(",");
        }
        self.cte_count += 1;
        self.sb.append(&name).append_line(" AS");
        self.sb.append_line("(");
        self.sb.indent();
        name
    }

    fn end_cte(&mut self) {
        self.sb.end_line().outdent();
        self.sb.append_line(")");
    }

    /// The table expression whose rows the one at `index` is restricted to.
    /// A Concatenation shares the restriction of the branch it extends.
    pub(super) fn restricting_predecessor(&self, index: usize) -> Option<usize> {
        let tables = &self.plan.root.search_param_table_expressions;
        let previous = index.checked_sub(1)?;
        match tables.get(index)?.kind {
            TableExpressionKind::Concatenation => self.restricting_predecessor(previous),
            _ => Some(previous),
        }
    }

    pub(super) fn name_of(&self, index: usize) -> SqlSearchResult<String> {
        self.names
            .get(index)
            .cloned()
            .ok_or_else(|| SqlSearchError::invalid_operation(format!("table expression {index} has not been emitted")))
    }

    /// `pred.T1 = alias.ResourceTypeId AND pred.Sid1 = alias.ResourceSurrogateId`,
    /// on T2 / Sid2 for `second` columns. The type is only compared on
    /// partitioned schemas, where it enables partition elimination.
    pub(super) fn append_key_match(&mut self, predecessor: &str, second: bool, alias: Option<&str>) {
        let (t, sid) = if second { ("T2", "Sid2") } else { ("T1", "Sid1") };
        if self.schema.supports(versions::PARTITIONED_TABLES) {
            self.sb
                .append(predecessor)
                .append(".")
                .append(t)
                .append(" = ")
                .append_column(&search_param::RESOURCE_TYPE_ID, alias)
                .append(" AND ");
        }
        self.sb
            .append(predecessor)
            .append(".")
            .append(sid)
            .append(" = ")
            .append_column(&search_param::RESOURCE_SURROGATE_ID, alias);
    }

    pub(super) fn append_join(&mut self, predecessor: &str, second: bool, alias: Option<&str>) {
        self.sb.append("INNER JOIN ").append(predecessor).append(" ON ");
        self.append_key_match(predecessor, second, alias);
        self.sb.end_line();
    }

    pub(super) fn append_exists(&mut self, delimited: &mut Delimiter, predecessor: &str, alias: Option<&str>) {
        delimited.begin_element(&mut self.sb);
        self.sb.append("EXISTS (SELECT * FROM ").append(predecessor).append(" WHERE ");
        self.append_key_match(predecessor, false, alias);
        self.sb.append(")");
    }

    /// Version filters on a `dbo.Resource` reference.
    pub(super) fn append_version_clauses(&mut self, delimited: &mut Delimiter, alias: Option<&str>) {
        let versions = self.options.resource_version_types;
        let latest = versions.contains(ResourceVersionType::LATEST);
        let history = versions.contains(ResourceVersionType::HISTORY);
        let deleted = versions.contains(ResourceVersionType::SOFT_DELETED);

        let is_history = match (latest, history) {
            (true, false) => Some("0"),
            (false, true) => Some("1"),
            (false, false) if deleted => Some("0"),
            _ => None,
        };
        if let Some(flag) = is_history {
            delimited.begin_element(&mut self.sb);
            self.sb
                .append_column(&resource::IS_HISTORY, alias)
                .append(" = ")
                .append(flag);
        }

        let is_deleted = match (latest || history, deleted) {
            (_, false) => Some("0"),
            (false, true) => Some("1"),
            (true, true) => None,
        };
        if let Some(flag) = is_deleted {
            delimited.begin_element(&mut self.sb);
            self.sb
                .append_column(&resource::IS_DELETED, alias)
                .append(" = ")
                .append(flag);
        }
    }

    fn render_predicate(
        &mut self,
        delimited: &mut Delimiter,
        generator: QueryGenerator,
        predicate: &Expression,
        alias: Option<&'static str>,
    ) -> SqlSearchResult<()> {
        delimited.begin_element(&mut self.sb);
        render(generator, predicate, &mut self.context(alias))
    }

    /// A level-0 CTE over the generator's table:
    ///
    /// ```sql
    /// SELECT ResourceTypeId AS T1, ResourceSurrogateId AS Sid1[, col AS SortValue]
    /// FROM table
    /// WHERE predicate
    /// AND EXISTS (SELECT * FROM pred WHERE ...)
    /// ```
    fn filtered(
        &mut self,
        restriction: Option<usize>,
        table: &SearchParamTableExpression,
        sorted: bool,
    ) -> SqlSearchResult<()> {
        let plan = self.plan;
        let predecessor = restriction.map(|i| self.name_of(i)).transpose()?;
        let sort = match (sorted, &plan.sort) {
            (true, Some(sort)) => Some(sort),
            (true, None) => {
                return Err(SqlSearchError::invalid_operation("sort table expression without a sort"));
            }
            (false, _) => None,
        };

        self.sb
            .append("SELECT ")
            .append_column(&search_param::RESOURCE_TYPE_ID, None)
            .append(" AS T1, ")
            .append_column(&search_param::RESOURCE_SURROGATE_ID, None)
            .append(" AS Sid1");
        if let Some(sort) = sort {
            self.sb.append(", ").append_column(&sort.column, None).append(" AS SortValue");
        }
        self.sb.end_line();
        self.sb.append("FROM ").append_table(&table.generator.table()).end_line();

        if let (Some(predecessor), true) = (&predecessor, self.use_join) {
            self.append_join(predecessor, false, None);
        }

        let mut delimited = Delimiter::where_clause();
        if table.generator.is_resource_table() {
            self.append_version_clauses(&mut delimited, None);
        }
        if let Some(predicate) = &table.predicate {
            self.render_predicate(&mut delimited, table.generator, predicate, None)?;
        }
        if let (Some(sort), Some(continuation)) = (sort, &plan.sort_continuation) {
            delimited.begin_element(&mut self.sb);
            let operator = match sort.direction {
                SortDirection::Ascending => BinaryOperator::GreaterThan,
                SortDirection::Descending => BinaryOperator::LessThan,
            };
            self.sort_continuation(&sort.column, operator, continuation.value.clone(), continuation.resource_surrogate_id)?;
        }
        if let (Some(predecessor), false) = (&predecessor, self.use_join) {
            self.append_exists(&mut delimited, predecessor, None);
        }
        delimited.end(&mut self.sb);
        Ok(())
    }

    /// `((col = @v AND ResourceSurrogateId > @sid) OR col <op> @v)`
    fn sort_continuation(
        &mut self,
        column: &Column,
        operator: BinaryOperator,
        value: Value,
        surrogate_id: i64,
    ) -> SqlSearchResult<()> {
        // resume positions change on every page and stay out of the hash
        let value = self.params.add_parameter(column, value, false)?;
        let surrogate_id =
            self.params
                .add_parameter(&search_param::RESOURCE_SURROGATE_ID, surrogate_id, false)?;
        self.sb
            .append("((")
            .append_column(column, None)
            .append(" = ")
            .append(&value)
            .append(" AND ")
            .append_column(&search_param::RESOURCE_SURROGATE_ID, None)
            .append(" > ")
            .append(&surrogate_id)
            .append(") OR ")
            .append_column(column, None)
            .append(" ")
            .append(operator.as_sql())
            .append(" ")
            .append(&value)
            .append(")");
        Ok(())
    }

    /// A filter on a chain target: carries the searched resource through
    /// `T1, Sid1` and restricts the target in `T2, Sid2`.
    fn chained_normal(&mut self, index: usize, table: &SearchParamTableExpression) -> SqlSearchResult<()> {
        let predecessor = self
            .restricting_predecessor(index)
            .map(|i| self.name_of(i))
            .transpose()?
            .ok_or_else(|| SqlSearchError::invalid_operation("chain filter without a chain link"))?;

        self.sb
            .append("SELECT ")
            .append(&predecessor)
            .append(".T1, ")
            .append(&predecessor)
            .append(".Sid1, ")
            .append_column(&search_param::RESOURCE_TYPE_ID, None)
            .append(" AS T2, ")
            .append_column(&search_param::RESOURCE_SURROGATE_ID, None)
            .append_line(" AS Sid2");
        self.sb.append("FROM ").append_table(&table.generator.table()).end_line();
        self.append_join(&predecessor, true, None);

        let mut delimited = Delimiter::where_clause();
        if let Some(predicate) = &table.predicate {
            self.render_predicate(&mut delimited, table.generator, predicate, None)?;
        }
        delimited.end(&mut self.sb);
        Ok(())
    }

    /// `SELECT * FROM prev UNION ALL <filtered>`
    fn concatenation(&mut self, index: usize, table: &SearchParamTableExpression) -> SqlSearchResult<()> {
        let previous = index
            .checked_sub(1)
            .ok_or_else(|| SqlSearchError::invalid_operation("concatenation without a preceding branch"))?;
        let previous = self.name_of(previous)?;
        self.sb.append("SELECT * FROM ").append_line(&previous);
        self.sb.append_line("UNION ALL");
        self.filtered(self.restricting_predecessor(index), table, false)
    }

    /// Predecessor rows without a matching index row.
    fn not_exists(&mut self, index: usize, table: &SearchParamTableExpression) -> SqlSearchResult<()> {
        let predecessor = self
            .restricting_predecessor(index)
            .map(|i| self.name_of(i))
            .transpose()?
            .ok_or_else(|| SqlSearchError::invalid_operation("negated filter without a predecessor"))?;

        self.sb.append_line("SELECT T1, Sid1");
        self.sb.append("FROM ").append_line(&predecessor);
        self.sb.append_line("WHERE NOT EXISTS");
        self.sb.append_line("(");
        self.sb.indent();
        self.sb.append_line("SELECT *");
        self.sb.append("FROM ").append_table(&table.generator.table()).end_line();
        self.sb.append("WHERE ");
        self.append_key_match(&predecessor, false, None);
        if let Some(predicate) = &table.predicate {
            self.sb.end_line().append("AND ");
            render(table.generator, predicate, &mut self.context(None))?;
        }
        self.sb.end_line().outdent();
        self.sb.append(")");
        Ok(())
    }

    /// The page of matches.
    fn top(&mut self, index: usize) -> SqlSearchResult<()> {
        let predecessor = self
            .restricting_predecessor(index)
            .map(|i| self.name_of(i))
            .transpose()?
            .ok_or_else(|| SqlSearchError::invalid_operation("top without a predecessor"))?;
        let plan = self.plan;
        let sorted = plan.sort.is_some();

        self.sb.append("SELECT DISTINCT ");
        match &plan.includes_continuation {
            // the $includes operation re-reads a known page of matches
            Some(_) => {}
            None => {
                let top = self.params.add_value(page_size(self.options.max_item_count, 1), false);
                self.sb.append("TOP (").append(&top).append(") ");
            }
        }
        self.sb.append("T1, Sid1, 1 AS IsMatch, 0 AS IsPartial");
        if sorted {
            self.sb.append(", SortValue");
        }
        self.sb.end_line();
        self.sb.append("FROM ").append_line(&predecessor);

        if let Some(token) = &plan.includes_continuation {
            let min = self.params.add_value(SqlValue::BigInt(token.match_min_surrogate_id), false);
            let max = self.params.add_value(SqlValue::BigInt(token.match_max_surrogate_id), false);
            self.sb
                .append("WHERE Sid1 >= ")
                .append(&min)
                .append(" AND Sid1 <= ")
                .append_line(&max);
        }

        let ordering = self.ordering("T1", "Sid1");
        self.sb.append("ORDER BY ").append(&ordering);
        Ok(())
    }

    /// Bounds the preceding Include and flags truncation.
    fn include_limit(&mut self, index: usize) -> SqlSearchResult<()> {
        let include = index
            .checked_sub(1)
            .ok_or_else(|| SqlSearchError::invalid_operation("include limit without an include"))?;
        let include = self.name_of(include)?;

        let top = self.params.add_value(page_size(self.options.include_count, 1), false);
        let limit = self.params.add_value(page_size(self.options.include_count, 0), false);
        self.sb
            .append("SELECT DISTINCT TOP (")
            .append(&top)
            .append(") T1, Sid1, IsMatch, CASE WHEN count_big(*) over() > ")
            .append(&limit)
            .append_line(" THEN 1 ELSE 0 END AS IsPartial");
        self.sb.append("FROM ").append_line(&include);

        let position = self
            .plan
            .includes_continuation
            .as_ref()
            .and_then(|t| t.include_resource_type_id.zip(t.include_resource_surrogate_id));
        if let Some((resource_type_id, surrogate_id)) = position {
            let t = self.params.add_value(SqlValue::SmallInt(resource_type_id), false);
            let sid = self.params.add_value(SqlValue::BigInt(surrogate_id), false);
            self.sb
                .append("WHERE ((T1 = ")
                .append(&t)
                .append(" AND Sid1 > ")
                .append(&sid)
                .append(") OR T1 > ")
                .append(&t)
                .append_line(")");
        }
        self.sb.append("ORDER BY T1, Sid1");
        Ok(())
    }

    /// Matches plus every bounded include.
    fn include_union_all(&mut self) -> SqlSearchResult<()> {
        let top = self
            .top
            .clone()
            .ok_or_else(|| SqlSearchError::invalid_operation("include union without a top expression"))?;
        let sorted = self.plan.sort.is_some();

        self.sb.append("SELECT T1, Sid1, IsMatch, IsPartial");
        if sorted {
            self.sb.append(", SortValue");
        }
        self.sb.end_line();
        self.sb.append("FROM ").append(&top);

        let limits: Vec<String> = self.include_limits.iter().map(|(name, _)| name.clone()).collect();
        for limit in limits {
            self.sb.end_line().append_line("UNION ALL");
            self.sb.append("SELECT T1, Sid1, IsMatch, IsPartial");
            if sorted {
                self.sb.append(", NULL AS SortValue");
            }
            self.sb.end_line();
            self.sb.append("FROM ").append(&limit);
        }
        Ok(())
    }

    /// Branch CTEs followed by their `UNION` aggregate. The aggregate of a
    /// later union is joined with the previous one, intersecting the scopes.
    fn union(&mut self, index: usize, table: &SearchParamTableExpression) -> SqlSearchResult<String> {
        let Some(Expression::Union(union)) = &table.predicate else {
            return Err(SqlSearchError::invalid_operation("union table expression without a union"));
        };
        if union.expressions.is_empty() {
            return Err(SqlSearchError::invalid_operation("empty union"));
        }
        let predecessor = self.restricting_predecessor(index).map(|i| self.name_of(i)).transpose()?;

        let mut branches = Vec::with_capacity(union.expressions.len());
        for branch in &union.expressions {
            let generator = union_branch_generator(branch)?;
            let name = self.begin_cte();
            let branch_table = SearchParamTableExpression::new(
                generator,
                Some(branch.clone()),
                TableExpressionKind::Normal,
                0,
            );
            self.filtered(None, &branch_table, false)?;
            self.end_cte();
            branches.push(name);
        }

        let name = self.begin_cte();
        match &predecessor {
            Some(predecessor) => {
                self.sb.append_line("SELECT u.T1, u.Sid1");
                self.sb.append_line("FROM");
                self.sb.append_line("(");
                self.sb.indent();
                self.union_of(&branches);
                self.sb.end_line().outdent();
                self.sb.append_line(") u");
                self.sb.append("INNER JOIN ").append(predecessor).append(" ON ");
                if self.schema.supports(versions::PARTITIONED_TABLES) {
                    self.sb.append(predecessor).append(".T1 = u.T1 AND ");
                }
                self.sb.append(predecessor).append(".Sid1 = u.Sid1");
            }
            None => self.union_of(&branches),
        }
        self.end_cte();
        Ok(name)
    }

    fn union_of(&mut self, branches: &[String]) {
        for (i, branch) in branches.iter().enumerate() {
            if i > 0 {
                self.sb.end_line().append_line("UNION");
            }
            self.sb.append("SELECT T1, Sid1 FROM ").append(branch);
        }
    }

    /// `ORDER BY` terms for the requested sort.
    pub(super) fn ordering(&self, type_column: &str, surrogate_column: &str) -> String {
        if let Some(sort) = &self.plan.sort {
            return format!("SortValue {}, {surrogate_column} ASC", sort.direction.as_sql());
        }
        match self.options.sort.first() {
            Some(spec) if spec.parameter.code == names::RESOURCE_TYPE => {
                format!("{type_column} {}, {surrogate_column} ASC", spec.direction.as_sql())
            }
            Some(spec) if spec.parameter.code == names::LAST_UPDATED => {
                format!("{surrogate_column} {}", spec.direction.as_sql())
            }
            _ => format!("{surrogate_column} ASC"),
        }
    }

    /// The final projection.
    fn select(&mut self) -> SqlSearchResult<()> {
        let plan = self.plan;
        let last = self.names.last().cloned();
        let has_includes = plan.has_includes();
        let match_columns = plan
            .root
            .search_param_table_expressions
            .last()
            .is_some_and(|t| matches!(t.kind, TableExpressionKind::Top | TableExpressionKind::IncludeUnionAll));

        self.sb.append("SELECT DISTINCT ");
        if !has_includes {
            let top = self.params.add_value(page_size(self.options.max_item_count, 1), false);
            self.sb.append("TOP (").append(&top).append(") ");
        }

        let r = Some(RESOURCE_ALIAS);
        for column in [
            &resource::RESOURCE_TYPE_ID,
            &resource::RESOURCE_ID,
            &resource::VERSION,
            &resource::IS_DELETED,
            &resource::RESOURCE_SURROGATE_ID,
            &resource::REQUEST_METHOD,
        ] {
            self.sb.append_column(column, r).append(", ");
        }
        if match_columns {
            self.sb.append("IsMatch, IsPartial, ");
        } else {
            self.sb.append("CAST(1 AS bit) AS IsMatch, CAST(0 AS bit) AS IsPartial, ");
        }
        self.sb.append_column(&resource::IS_RAW_RESOURCE_META_SET, r).append(", ");
        if self.schema.supports(versions::SEARCH_PARAM_HASH) {
            self.sb.append_column(&resource::SEARCH_PARAM_HASH, r).append(", ");
        }
        self.sb.append_column(&resource::RAW_RESOURCE, r);
        if plan.sort.is_some() {
            self.sb.append(", SortValue");
        }
        self.sb.end_line();

        self.sb.append("FROM ").append_table(&resource::TABLE).append(" ").append(RESOURCE_ALIAS);
        if last.is_none() && !self.references_id() {
            if let Some(index) = resource::TABLE.type_scan_index {
                self.sb.append(" WITH (INDEX(").append(index).append("))");
            }
        }
        self.sb.end_line();

        if let Some(last) = &last {
            self.append_final_join(last);
        }

        let mut delimited = Delimiter::where_clause();
        self.append_version_clauses(&mut delimited, r);
        if last.is_none() {
            // with CTEs these predicates are already applied inside them
            for expression in &plan.root.resource_table_expressions {
                self.render_predicate(&mut delimited, QueryGenerator::ResourceTable, expression, r)?;
            }
        }
        if plan.includes_continuation.is_some() {
            delimited.begin_element(&mut self.sb);
            self.sb.append("IsMatch = 0");
        }
        delimited.end(&mut self.sb);

        let ordering = self.ordering("r.ResourceTypeId", "r.ResourceSurrogateId");
        self.sb.append("ORDER BY ");
        if has_includes {
            self.sb.append("IsMatch DESC, ");
        }
        self.sb.append_line(&ordering);

        let searched: Vec<&str> = plan.searched_parameters.iter().map(String::as_str).collect();
        if self.config.optimize_for_unknown.applies(has_includes, &searched) {
            self.sb.append_line("OPTION (OPTIMIZE FOR UNKNOWN)");
        }
        Ok(())
    }

    fn append_final_join(&mut self, last: &str) {
        self.sb.append("INNER JOIN ").append(last).append(" ON ");
        if self.schema.supports(versions::PARTITIONED_TABLES) {
            self.sb
                .append_column(&resource::RESOURCE_TYPE_ID, Some(RESOURCE_ALIAS))
                .append(" = ")
                .append(last)
                .append(".T1 AND ");
        }
        self.sb
            .append_column(&resource::RESOURCE_SURROGATE_ID, Some(RESOURCE_ALIAS))
            .append(" = ")
            .append(last)
            .append_line(".Sid1");
    }

    /// Count of distinct matches.
    fn count(&mut self) -> SqlSearchResult<()> {
        let plan = self.plan;
        match self.names.last().cloned() {
            Some(last) => {
                self.sb.append_line("SELECT count_big(DISTINCT Sid1)");
                self.sb.append("FROM ").append_line(&last);
            }
            None => {
                self.sb.append_line("SELECT count_big(*)");
                self.sb
                    .append("FROM ")
                    .append_table(&resource::TABLE)
                    .append(" ")
                    .append_line(RESOURCE_ALIAS);
                let mut delimited = Delimiter::where_clause();
                self.append_version_clauses(&mut delimited, Some(RESOURCE_ALIAS));
                for expression in &plan.root.resource_table_expressions {
                    self.render_predicate(
                        &mut delimited,
                        QueryGenerator::ResourceTable,
                        expression,
                        Some(RESOURCE_ALIAS),
                    )?;
                }
                delimited.end(&mut self.sb);
            }
        }
        Ok(())
    }

    fn references_id(&self) -> bool {
        self.plan
            .root
            .resource_table_expressions
            .iter()
            .any(|e| e.references_parameter(names::ID))
    }
}

/// `count + extra` as a TOP value.
fn page_size(count: u32, extra: u32) -> SqlValue {
    SqlValue::Int(i32::try_from(count.saturating_add(extra)).unwrap_or(i32::MAX))
}

/// The table a union branch runs on: `dbo.Resource` when the branch only
/// constrains resource columns, otherwise the table of its single index
/// search parameter.
fn union_branch_generator(branch: &Expression) -> SqlSearchResult<QueryGenerator> {
    let mut conjuncts = Vec::new();
    flatten_and(branch, &mut conjuncts);

    let mut generator = None;
    for conjunct in conjuncts {
        match conjunct {
            Expression::SearchParameter(e) if e.parameter.is_resource_table_parameter() => {}
            Expression::Binary(e)
                if matches!(
                    e.field,
                    FieldName::ResourceSurrogateId | FieldName::SurrogateIdKeyset | FieldName::PrimaryKey
                ) => {}
            Expression::SearchParameter(e) => {
                if generator.is_some() {
                    return Err(SqlSearchError::invalid_operation(
                        "a union branch can search at most one index parameter",
                    ));
                }
                generator = Some(QueryGenerator::for_parameter(&e.parameter, &e.expression)?);
            }
            other => {
                return Err(SqlSearchError::invalid_operation(format!(
                    "unsupported {} expression in a union branch",
                    other.kind_name()
                )));
            }
        }
    }

    match generator {
        None => Ok(QueryGenerator::ResourceTable),
        Some(_) if branch.references_parameter(names::ID) => Err(SqlSearchError::invalid_operation(
            "_id cannot be combined with an index parameter in a union branch",
        )),
        Some(generator) => Ok(generator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::SearchPlanner;
    use crate::model::InMemorySqlServerModel;
    use crate::types::{SearchParamType, SearchParameterInfo};

    fn model() -> InMemorySqlServerModel {
        InMemorySqlServerModel::new()
            .with_resource_type("Observation", 96)
            .with_resource_type("Patient", 103)
            .with_search_param("http://hl7.org/fhir/SearchParameter/clinical-code", 20)
            .with_search_param("http://hl7.org/fhir/SearchParameter/individual-family", 12)
    }

    fn resource_type_is(name: &str) -> Expression {
        Expression::search_parameter(
            SearchParameterInfo::new(names::RESOURCE_TYPE, "http://hl7.org/fhir/SearchParameter/Resource-type", SearchParamType::Token),
            Expression::string_equals(FieldName::TokenCode, name),
        )
    }

    fn code_is(code: &str) -> Expression {
        Expression::search_parameter(
            SearchParameterInfo::new("code", "http://hl7.org/fhir/SearchParameter/clinical-code", SearchParamType::Token),
            Expression::string_equals(FieldName::TokenCode, code),
        )
    }

    fn assemble(expression: &Expression, options: &SearchOptions, use_join: bool) -> SqlSearchResult<CompiledSearch> {
        let model = model();
        let config = SqlSearchConfig::default();
        let plan = SearchPlanner::new(&model, SchemaInformation::default(), options).plan(expression)?;
        StatementAssembler::new(&model, SchemaInformation::default(), &config, options, &plan, use_join).assemble()
    }

    #[test]
    fn test_page_size() {
        assert_eq!(page_size(10, 1), SqlValue::Int(11));
        assert_eq!(page_size(u32::MAX, 1), SqlValue::Int(i32::MAX));
    }

    #[test]
    fn test_cte_names_and_layout() {
        let family = Expression::search_parameter(
            SearchParameterInfo::new("family", "http://hl7.org/fhir/SearchParameter/individual-family", SearchParamType::String),
            Expression::string_equals(FieldName::String, "Smith"),
        );
        let expr = Expression::and(vec![family, code_is("x")]);
        let compiled = assemble(&expr, &SearchOptions::default(), false).unwrap();
        let sql = compiled.sql.split_once('\n').map(|(_, rest)| rest).unwrap();

        assert!(sql.starts_with("WITH cte0 AS\n(\n    SELECT ResourceTypeId AS T1, ResourceSurrogateId AS Sid1\n"));
        assert!(sql.contains("\n)\n,cte1 AS\n(\n"));
    }

    #[test]
    fn test_union_of_scopes() {
        let scopes = Expression::union(vec![
            resource_type_is("Patient"),
            Expression::and(vec![resource_type_is("Observation"), code_is("1234-5")]),
        ]);
        let compiled = assemble(&scopes, &SearchOptions::default(), false).unwrap();

        assert!(compiled.sql.contains("WITH cte0 AS"));
        assert!(compiled.sql.contains("FROM dbo.Resource\n"));
        assert!(compiled.sql.contains("FROM dbo.TokenSearchParam"));
        assert!(compiled.sql.contains("SELECT T1, Sid1 FROM cte0\n    UNION\n    SELECT T1, Sid1 FROM cte1"));
        assert!(compiled.sql.contains("INNER JOIN cte2 ON"));
    }

    #[test]
    fn test_nested_unions_intersect() {
        let first = Expression::union(vec![resource_type_is("Patient"), resource_type_is("Observation")]);
        let second = Expression::union(vec![code_is("a"), code_is("b")]);
        let compiled = assemble(&Expression::and(vec![first, second]), &SearchOptions::default(), false).unwrap();

        // branches cte0, cte1, aggregate cte2, branches cte3, cte4, aggregate cte5
        assert!(compiled.sql.contains(") u\n    INNER JOIN cte2 ON cte2.T1 = u.T1 AND cte2.Sid1 = u.Sid1"));
        assert!(compiled.sql.contains("INNER JOIN cte5 ON"));
    }

    #[test]
    fn test_union_branch_with_two_index_parameters_is_rejected() {
        let scopes = Expression::union(vec![Expression::and(vec![code_is("a"), code_is("b")])]);
        let err = assemble(&scopes, &SearchOptions::default(), false).unwrap_err();
        assert!(matches!(err, SqlSearchError::InvalidOperation { .. }));
    }

    #[test]
    fn test_concatenation_for_or_across_parameters() {
        let family = Expression::search_parameter(
            SearchParameterInfo::new("family", "http://hl7.org/fhir/SearchParameter/individual-family", SearchParamType::String),
            Expression::string_equals(FieldName::String, "Smith"),
        );
        let expr = Expression::and(vec![resource_type_is("Patient"), Expression::or(vec![family, code_is("x")])]);
        let compiled = assemble(&expr, &SearchOptions::default(), false).unwrap();

        assert!(compiled.sql.contains("SELECT * FROM cte0\n    UNION ALL\n"));
        // the second branch has no predecessor to intersect with
        assert!(!compiled.sql.contains("EXISTS (SELECT * FROM cte0"));
    }

    #[test]
    fn test_join_mode_restricts_with_inner_join() {
        let expr = Expression::and(vec![code_is("a"), code_is("b")]);
        let compiled = assemble(&expr, &SearchOptions::default(), true).unwrap();
        assert!(compiled.sql.contains("FROM dbo.TokenSearchParam\n    INNER JOIN cte0 ON cte0.T1 = ResourceTypeId AND cte0.Sid1 = ResourceSurrogateId\n"));
    }
}

//! The search compiler.
//!
//! [`SqlSearchCompiler`] is the entry point: it guards against pathological
//! expression trees, plans the search and assembles one parameterized
//! statement. The compiler itself holds only shared, read-only state, so one
//! instance can serve concurrent requests; every [`compile`] call builds its
//! own planner and assembler.
//!
//! [`compile`]: SqlSearchCompiler::compile

mod assembler;
mod chain;
mod include;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::config::SqlSearchConfig;
use crate::error::{SqlSearchError, SqlSearchResult};
use crate::expression::Expression;
use crate::model::SqlServerModel;
use crate::planner::SearchPlanner;
use crate::schema::SchemaInformation;
use crate::sql::SqlParameter;
use crate::types::SearchOptions;

use assembler::StatementAssembler;

/// SQL Server error number for "query processor could not produce a query plan".
pub const NO_QUERY_PLAN_ERROR: i32 = 8622;

/// The output of one compile call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSearch {
    /// The statement text.
    pub sql: String,
    /// Bound parameters in placeholder order.
    pub parameters: Vec<SqlParameter>,
    /// Ids of every index search parameter the statement references.
    pub search_param_ids: BTreeSet<i16>,
    /// Hash over the plan-relevant parameter values.
    pub hash: Option<String>,
}

/// Summary of a compiled statement for logs.
#[derive(Debug, Serialize)]
pub struct CompiledSearchSummary {
    /// Statement length in bytes.
    pub sql_length: usize,
    /// Number of bound parameters.
    pub parameter_count: usize,
    /// Referenced search parameter ids.
    pub search_param_ids: Vec<i16>,
    /// The plan hash.
    pub hash: Option<String>,
}

impl CompiledSearch {
    /// A serializable summary without values, safe to log.
    pub fn summary(&self) -> CompiledSearchSummary {
        CompiledSearchSummary {
            sql_length: self.sql.len(),
            parameter_count: self.parameters.len(),
            search_param_ids: self.search_param_ids.iter().copied().collect(),
            hash: self.hash.clone(),
        }
    }
}

/// Compiles search expressions to SQL Server statements.
pub struct SqlSearchCompiler {
    model: Arc<dyn SqlServerModel>,
    schema: SchemaInformation,
    config: SqlSearchConfig,
}

impl SqlSearchCompiler {
    /// Creates a compiler.
    pub fn new(model: Arc<dyn SqlServerModel>, schema: SchemaInformation, config: SqlSearchConfig) -> Self {
        Self { model, schema, config }
    }

    /// The active schema.
    pub fn schema(&self) -> SchemaInformation {
        self.schema
    }

    /// The compiler configuration.
    pub fn config(&self) -> &SqlSearchConfig {
        &self.config
    }

    /// Compiles `expression` under `options`.
    ///
    /// `previous_sql_error` is the SQL Server error number of a failed
    /// execution of the same search; [`NO_QUERY_PLAN_ERROR`] switches the
    /// statement to join-based intersection.
    ///
    /// # Errors
    ///
    /// Returns [`SqlSearchError::SearchTooComplex`] when the expression is
    /// nested deeper than the configured limit, and a contract error when a
    /// node cannot be rendered.
    #[instrument(skip_all, fields(is_async = options.is_async_operation, count_only = options.count_only))]
    pub fn compile(
        &self,
        expression: &Expression,
        options: &SearchOptions,
        previous_sql_error: Option<i32>,
    ) -> SqlSearchResult<CompiledSearch> {
        debug!(
            version_types = options.resource_version_types.bits(),
            sort = options.sort.len(),
            schema_version = self.schema.current,
            "Compiling search"
        );
        let depth = expression.depth();
        if depth > self.config.max_stack_depth {
            warn!(depth, limit = self.config.max_stack_depth, "Rejecting search: expression too deep");
            return Err(SqlSearchError::SearchTooComplex {
                depth,
                limit: self.config.max_stack_depth,
            });
        }

        let plan = SearchPlanner::new(self.model.as_ref(), self.schema, options).plan(expression)?;

        let table_expressions = plan.root.search_param_table_expressions.len();
        let use_join = table_expressions > self.config.max_table_expressions_for_exists
            || previous_sql_error == Some(NO_QUERY_PLAN_ERROR);
        if previous_sql_error == Some(NO_QUERY_PLAN_ERROR) {
            debug!("Previous attempt produced no query plan; intersecting with joins");
        }

        let compiled = StatementAssembler::new(
            self.model.as_ref(),
            self.schema,
            &self.config,
            options,
            &plan,
            use_join,
        )
        .assemble()?;

        debug!(summary = ?compiled.summary(), table_expressions, use_join, "Compiled search");
        Ok(compiled)
    }
}

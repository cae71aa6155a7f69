//! `_include` / `_revinclude` CTEs.

use super::assembler::StatementAssembler;
use super::chain::{REF_SOURCE, REF_TARGET, append_reference_from};
use crate::error::{SqlSearchError, SqlSearchResult};
use crate::expression::{Expression, IncludeExpression};
use crate::generators::dispatch::{append_search_param_id, resource_type_predicate, resource_types_in};
use crate::planner::SearchParamTableExpression;
use crate::schema::tables::{reference_search_param, resource, search_param};
use crate::sql::{Delimiter, SqlValue};

impl StatementAssembler<'_> {
    /// Resources referenced by (or referencing) the page of matches.
    ///
    /// An `:iterate` include also starts from the resources earlier includes
    /// produced, as long as they have the include's source type.
    pub(super) fn include(&mut self, table: &SearchParamTableExpression) -> SqlSearchResult<()> {
        let Some(Expression::Include(include)) = &table.predicate else {
            return Err(SqlSearchError::invalid_operation("include table expression without an include"));
        };
        let top = self
            .top
            .clone()
            .ok_or_else(|| SqlSearchError::invalid_operation("include without a top expression"))?;

        // forward includes add the referenced resources, reverse ones the referencing
        let (produced, matched) = if include.reversed {
            (REF_SOURCE, REF_TARGET)
        } else {
            (REF_TARGET, REF_SOURCE)
        };

        self.sb
            .append("SELECT DISTINCT ")
            .append_column(&search_param::RESOURCE_TYPE_ID, Some(produced))
            .append(" AS T1, ")
            .append_column(&search_param::RESOURCE_SURROGATE_ID, Some(produced))
            .append_line(" AS Sid1, 0 AS IsMatch");
        append_reference_from(&mut self.sb);

        let mut delimited = Delimiter::where_clause();
        if let (false, Some(parameter)) = (include.wildcard, &include.reference_search_parameter) {
            delimited.begin_element(&mut self.sb);
            append_search_param_id(&parameter.url, &mut self.context(Some(REF_SOURCE)))?;
        }

        delimited.begin_element(&mut self.sb);
        self.sb.append_column(&resource::IS_HISTORY, Some(REF_TARGET)).append(" = 0");
        delimited.begin_element(&mut self.sb);
        self.sb.append_column(&resource::IS_DELETED, Some(REF_TARGET)).append(" = 0");

        delimited.begin_element(&mut self.sb);
        resource_type_predicate(
            &mut self.context(Some(REF_SOURCE)),
            &search_param::RESOURCE_TYPE_ID,
            None,
            &include.source_resource_type,
        )?;
        if let Some(target) = &include.target_resource_type {
            delimited.begin_element(&mut self.sb);
            resource_type_predicate(
                &mut self.context(Some(REF_SOURCE)),
                &reference_search_param::REFERENCE_RESOURCE_TYPE_ID,
                None,
                target,
            )?;
        }
        if let Some(allowed) = include.scope_restriction() {
            delimited.begin_element(&mut self.sb);
            resource_types_in(
                &mut self.context(Some(produced)),
                &search_param::RESOURCE_TYPE_ID,
                None,
                allowed,
            )?;
        }

        delimited.begin_element(&mut self.sb);
        let sources = self.iterate_sources(include);
        if !sources.is_empty() {
            self.sb.append("(");
        }
        self.append_matched_in_top(&top, matched)?;
        for source in &sources {
            self.sb.append(" OR EXISTS (SELECT * FROM ").append(source).append(" WHERE ");
            self.append_key_match(source, false, Some(matched));
            self.sb.append(")");
        }
        if !sources.is_empty() {
            self.sb.append(")");
        }
        delimited.end(&mut self.sb);

        self.pending_include_types = include.produced_resource_types();
        Ok(())
    }

    /// `EXISTS` over the rows of the page. Top holds one look-ahead row, which
    /// is not part of the page and must not pull in includes.
    fn append_matched_in_top(&mut self, top: &str, matched: &str) -> SqlSearchResult<()> {
        if self.plan.includes_continuation.is_some() {
            self.sb.append("EXISTS (SELECT * FROM ").append(top).append(" WHERE ");
            self.append_key_match(top, false, Some(matched));
            self.sb.append(")");
            return Ok(());
        }

        let page = i32::try_from(self.options.max_item_count).unwrap_or(i32::MAX);
        let page = self.params.add_value(SqlValue::Int(page), false);
        let ordering = self.ordering("T1", "Sid1");
        self.sb
            .append("EXISTS (SELECT * FROM (SELECT TOP (")
            .append(&page)
            .append(") T1, Sid1 FROM ")
            .append(top)
            .append(" ORDER BY ")
            .append(&ordering)
            .append(") m WHERE ");
        self.append_key_match("m", false, Some(matched));
        self.sb.append(")");
        Ok(())
    }

    /// IncludeLimit CTEs whose resources an `:iterate` include starts from.
    fn iterate_sources(&self, include: &IncludeExpression) -> Vec<String> {
        if !include.iterate {
            return Vec::new();
        }
        let matched_types: Vec<String> = if include.reversed {
            match &include.target_resource_type {
                Some(target) => vec![target.clone()],
                None => include.referenced_types.clone(),
            }
        } else {
            vec![include.source_resource_type.clone()]
        };
        self.include_limits
            .iter()
            .filter(|(_, produced)| produced.iter().any(|t| matched_types.contains(t)))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

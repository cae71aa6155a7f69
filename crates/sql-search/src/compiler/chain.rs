//! Chain link CTEs.
//!
//! A link pairs each resource on the near side of a reference with the
//! resource on its far side. `T1, Sid1` always carry the searched resource;
//! `T2, Sid2` carry the far side, which the link's filter CTEs then restrict.
//!
//! ```sql
//! SELECT refSource.ResourceTypeId AS T1, refSource.ResourceSurrogateId AS Sid1,
//!        refTarget.ResourceTypeId AS T2, refTarget.ResourceSurrogateId AS Sid2
//! FROM dbo.ReferenceSearchParam refSource
//! INNER JOIN dbo.Resource refTarget ON refSource.ReferenceResourceTypeId = refTarget.ResourceTypeId
//!     AND refSource.ReferenceResourceId = refTarget.ResourceId
//! WHERE refSource.SearchParamId = @p0
//! AND refTarget.IsHistory = 0
//! AND refTarget.IsDeleted = 0
//! AND refSource.ResourceTypeId IN (@p1)
//! AND refSource.ReferenceResourceTypeId IN (@p2)
//! ```

use super::assembler::StatementAssembler;
use crate::error::{SqlSearchError, SqlSearchResult};
use crate::expression::{Expression, SqlChainLinkExpression};
use crate::generators::dispatch::{append_search_param_id, resource_types_in};
use crate::generators::{QueryGenerator, render};
use crate::planner::SearchParamTableExpression;
use crate::schema::Column;
use crate::schema::tables::{reference_search_param, resource, search_param};
use crate::sql::{Delimiter, SqlBuilder};
use crate::types::names;

pub(super) const REF_SOURCE: &str = "refSource";
pub(super) const REF_TARGET: &str = "refTarget";
const REF_SOURCE_RESOURCE: &str = "refSourceResource";

/// `FROM dbo.ReferenceSearchParam refSource INNER JOIN dbo.Resource refTarget ...`
pub(super) fn append_reference_from(sb: &mut SqlBuilder) {
    sb.append("FROM ")
        .append_table(&reference_search_param::TABLE)
        .append(" ")
        .append_line(REF_SOURCE);
    sb.append("INNER JOIN ")
        .append_table(&resource::TABLE)
        .append(" ")
        .append(REF_TARGET)
        .append(" ON ")
        .append_column(&reference_search_param::REFERENCE_RESOURCE_TYPE_ID, Some(REF_SOURCE))
        .append(" = ")
        .append_column(&resource::RESOURCE_TYPE_ID, Some(REF_TARGET))
        .append(" AND ")
        .append_column(&reference_search_param::REFERENCE_RESOURCE_ID, Some(REF_SOURCE))
        .append(" = ")
        .append_column(&resource::RESOURCE_ID, Some(REF_TARGET))
        .end_line();
}

impl StatementAssembler<'_> {
    pub(super) fn chain_link(&mut self, index: usize, table: &SearchParamTableExpression) -> SqlSearchResult<()> {
        let Some(Expression::SqlChainLink(link)) = &table.predicate else {
            return Err(SqlSearchError::invalid_operation("chain table expression without a chain link"));
        };
        let level = table.chain_level;
        let predecessor = self.restricting_predecessor(index).map(|i| self.name_of(i)).transpose()?;
        if level > 1 && predecessor.is_none() {
            return Err(SqlSearchError::invalid_operation("nested chain link without a preceding link"));
        }

        // a reversed link searches the referenced side
        let (near, far) = if link.reversed {
            (REF_TARGET, REF_SOURCE)
        } else {
            (REF_SOURCE, REF_TARGET)
        };
        let target_by_id = link.reversed
            && link
                .expression_on_target
                .as_deref()
                .is_some_and(|e| e.references_parameter(names::ID));
        let target_alias = if target_by_id { REF_SOURCE_RESOURCE } else { far };

        self.sb.append("SELECT ");
        match (&predecessor, level > 1) {
            (Some(predecessor), true) => {
                self.sb.append(predecessor).append(".T1, ").append(predecessor).append(".Sid1, ");
            }
            _ => {
                self.sb
                    .append_column(&search_param::RESOURCE_TYPE_ID, Some(near))
                    .append(" AS T1, ")
                    .append_column(&search_param::RESOURCE_SURROGATE_ID, Some(near))
                    .append(" AS Sid1, ");
            }
        }
        self.sb
            .append_column(&search_param::RESOURCE_TYPE_ID, Some(far))
            .append(" AS T2, ")
            .append_column(&search_param::RESOURCE_SURROGATE_ID, Some(far))
            .append_line(" AS Sid2");

        append_reference_from(&mut self.sb);
        if target_by_id {
            self.sb
                .append("INNER JOIN ")
                .append_table(&resource::TABLE)
                .append(" ")
                .append(REF_SOURCE_RESOURCE)
                .append(" ON ")
                .append_column(&resource::RESOURCE_TYPE_ID, Some(REF_SOURCE_RESOURCE))
                .append(" = ")
                .append_column(&search_param::RESOURCE_TYPE_ID, Some(REF_SOURCE))
                .append(" AND ")
                .append_column(&resource::RESOURCE_SURROGATE_ID, Some(REF_SOURCE_RESOURCE))
                .append(" = ")
                .append_column(&search_param::RESOURCE_SURROGATE_ID, Some(REF_SOURCE))
                .end_line();
        }
        match (&predecessor, level > 1) {
            (Some(predecessor), true) => self.append_join(predecessor, true, Some(near)),
            (Some(predecessor), false) if self.use_join => self.append_join(predecessor, false, Some(near)),
            _ => {}
        }

        let mut delimited = Delimiter::where_clause();
        delimited.begin_element(&mut self.sb);
        append_search_param_id(&link.reference_search_parameter.url, &mut self.context(Some(REF_SOURCE)))?;

        delimited.begin_element(&mut self.sb);
        self.sb.append_column(&resource::IS_HISTORY, Some(REF_TARGET)).append(" = 0");
        delimited.begin_element(&mut self.sb);
        self.sb.append_column(&resource::IS_DELETED, Some(REF_TARGET)).append(" = 0");

        let (referencing_types, referenced_types) = link_types(link);
        self.append_types_in(&mut delimited, &search_param::RESOURCE_TYPE_ID, referencing_types)?;
        self.append_types_in(
            &mut delimited,
            &reference_search_param::REFERENCE_RESOURCE_TYPE_ID,
            referenced_types,
        )?;

        if let Some(on_source) = &link.expression_on_source {
            delimited.begin_element(&mut self.sb);
            render(QueryGenerator::ResourceTable, on_source, &mut self.context(Some(near)))?;
        }
        if let Some(on_target) = &link.expression_on_target {
            delimited.begin_element(&mut self.sb);
            render(QueryGenerator::ResourceTable, on_target, &mut self.context(Some(target_alias)))?;
        }

        if let (Some(predecessor), false, false) = (&predecessor, level > 1, self.use_join) {
            self.append_exists(&mut delimited, predecessor, Some(near));
        }
        delimited.end(&mut self.sb);
        Ok(())
    }

    /// `refSource.column IN (...)`; an empty list leaves the column open.
    fn append_types_in(
        &mut self,
        delimited: &mut Delimiter,
        column: &Column,
        resource_types: &[String],
    ) -> SqlSearchResult<()> {
        if resource_types.is_empty() {
            return Ok(());
        }
        delimited.begin_element(&mut self.sb);
        resource_types_in(&mut self.context(Some(REF_SOURCE)), column, None, resource_types)
    }
}

/// `(referencing types, referenced types)` of a link.
fn link_types(link: &SqlChainLinkExpression) -> (&[String], &[String]) {
    if link.reversed {
        (&link.target_resource_types, &link.resource_types)
    } else {
        (&link.resource_types, &link.target_resource_types)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::compiler::SqlSearchCompiler;
    use crate::config::SqlSearchConfig;
    use crate::expression::{Expression, FieldName, StringOperator};
    use crate::model::InMemorySqlServerModel;
    use crate::schema::SchemaInformation;
    use crate::types::{SearchOptions, SearchParamType, SearchParameterInfo, names};

    fn compiler() -> SqlSearchCompiler {
        let model = InMemorySqlServerModel::new()
            .with_resource_type("Observation", 96)
            .with_resource_type("Organization", 99)
            .with_resource_type("Patient", 103)
            .with_search_param("http://hl7.org/fhir/SearchParameter/individual-family", 12)
            .with_search_param("http://hl7.org/fhir/SearchParameter/Patient-organization", 15)
            .with_search_param("http://hl7.org/fhir/SearchParameter/clinical-code", 20)
            .with_search_param("http://hl7.org/fhir/SearchParameter/Observation-subject", 22)
            .with_search_param("http://hl7.org/fhir/SearchParameter/Organization-name", 30);
        SqlSearchCompiler::new(Arc::new(model), SchemaInformation::default(), SqlSearchConfig::default())
    }

    fn reference(code: &str, url: &str) -> SearchParameterInfo {
        SearchParameterInfo::new(code, url, SearchParamType::Reference)
    }

    fn types(list: &[&str]) -> Vec<String> {
        list.iter().map(|n| n.to_string()).collect()
    }

    fn name_is(value: &str) -> Expression {
        Expression::search_parameter(
            SearchParameterInfo::new("name", "http://hl7.org/fhir/SearchParameter/Organization-name", SearchParamType::String),
            Expression::string(StringOperator::StartsWith, FieldName::String, value, true),
        )
    }

    fn id_is(value: &str) -> Expression {
        Expression::search_parameter(
            SearchParameterInfo::new(names::ID, "http://hl7.org/fhir/SearchParameter/Resource-id", SearchParamType::Token),
            Expression::string_equals(FieldName::TokenCode, value),
        )
    }

    #[test]
    fn test_forward_chain() {
        // Patient?organization.name=Acme
        let chained = Expression::chained(
            types(&["Patient"]),
            reference("organization", "http://hl7.org/fhir/SearchParameter/Patient-organization"),
            types(&["Organization"]),
            false,
            name_is("Acme"),
        );
        let compiled = compiler().compile(&chained, &SearchOptions::default(), None).unwrap();
        let sql = &compiled.sql;

        assert!(sql.contains("SELECT refSource.ResourceTypeId AS T1, refSource.ResourceSurrogateId AS Sid1, refTarget.ResourceTypeId AS T2, refTarget.ResourceSurrogateId AS Sid2"));
        assert!(sql.contains("INNER JOIN dbo.Resource refTarget ON refSource.ReferenceResourceTypeId = refTarget.ResourceTypeId AND refSource.ReferenceResourceId = refTarget.ResourceId"));
        assert!(sql.contains("WHERE refSource.SearchParamId = @p0"));
        assert!(sql.contains("AND refTarget.IsHistory = 0"));
        assert!(sql.contains("AND refSource.ResourceTypeId IN (@p1)"));
        assert!(sql.contains("AND refSource.ReferenceResourceTypeId IN (@p2)"));
        // the filter CTE restricts the far side
        assert!(sql.contains("SELECT cte0.T1, cte0.Sid1, ResourceTypeId AS T2, ResourceSurrogateId AS Sid2"));
        assert!(sql.contains("INNER JOIN cte0 ON cte0.T2 = ResourceTypeId AND cte0.Sid2 = ResourceSurrogateId"));
        assert!(sql.contains("INNER JOIN cte1 ON r.ResourceTypeId = cte1.T1"));
        assert!(compiled.search_param_ids.contains(&15));
        assert!(compiled.search_param_ids.contains(&30));
    }

    #[test]
    fn test_reversed_chain() {
        // Patient?_has:Observation:subject:code=1234-5
        let code = Expression::search_parameter(
            SearchParameterInfo::new("code", "http://hl7.org/fhir/SearchParameter/clinical-code", SearchParamType::Token),
            Expression::string_equals(FieldName::TokenCode, "1234-5"),
        );
        let chained = Expression::chained(
            types(&["Patient"]),
            reference("subject", "http://hl7.org/fhir/SearchParameter/Observation-subject"),
            types(&["Observation"]),
            true,
            code,
        );
        let compiled = compiler().compile(&chained, &SearchOptions::default(), None).unwrap();
        let sql = &compiled.sql;

        assert!(sql.contains("SELECT refTarget.ResourceTypeId AS T1, refTarget.ResourceSurrogateId AS Sid1, refSource.ResourceTypeId AS T2, refSource.ResourceSurrogateId AS Sid2"));
        // Observation references Patient
        assert!(sql.contains("AND refSource.ResourceTypeId IN (@p1)"));
        assert!(sql.contains("AND refSource.ReferenceResourceTypeId IN (@p2)"));
        let observation = compiled.parameters.iter().find(|p| p.name == "@p1").unwrap();
        assert_eq!(observation.value, crate::sql::SqlValue::SmallInt(96));
    }

    #[test]
    fn test_reversed_chain_by_id_joins_referencing_resource() {
        let chained = Expression::chained(
            types(&["Patient"]),
            reference("subject", "http://hl7.org/fhir/SearchParameter/Observation-subject"),
            types(&["Observation"]),
            true,
            id_is("obs-1"),
        );
        let compiled = compiler().compile(&chained, &SearchOptions::default(), None).unwrap();

        assert!(compiled.sql.contains("INNER JOIN dbo.Resource refSourceResource ON refSourceResource.ResourceTypeId = refSource.ResourceTypeId"));
        assert!(compiled.sql.contains("AND refSourceResource.ResourceId = @p"));
    }

    #[test]
    fn test_nested_chain_joins_previous_link() {
        // Observation?subject:Patient.organization.name=Acme
        let inner = Expression::chained(
            types(&["Patient"]),
            reference("organization", "http://hl7.org/fhir/SearchParameter/Patient-organization"),
            types(&["Organization"]),
            false,
            name_is("Acme"),
        );
        let outer = Expression::chained(
            types(&["Observation"]),
            reference("subject", "http://hl7.org/fhir/SearchParameter/Observation-subject"),
            types(&["Patient"]),
            false,
            inner,
        );
        let compiled = compiler().compile(&outer, &SearchOptions::default(), None).unwrap();
        let sql = &compiled.sql;

        assert!(sql.contains("SELECT cte0.T1, cte0.Sid1, refTarget.ResourceTypeId AS T2"));
        assert!(sql.contains("INNER JOIN cte0 ON cte0.T2 = refSource.ResourceTypeId AND cte0.Sid2 = refSource.ResourceSurrogateId"));
        assert!(sql.contains("INNER JOIN cte2 ON r.ResourceTypeId = cte2.T1"));
    }

    #[test]
    fn test_chain_after_filter_is_restricted() {
        let family = Expression::search_parameter(
            SearchParameterInfo::new("family", "http://hl7.org/fhir/SearchParameter/individual-family", SearchParamType::String),
            Expression::string(StringOperator::StartsWith, FieldName::String, "Smi", true),
        );
        let chained = Expression::chained(
            types(&["Patient"]),
            reference("organization", "http://hl7.org/fhir/SearchParameter/Patient-organization"),
            types(&["Organization"]),
            false,
            name_is("Acme"),
        );
        let compiled = compiler()
            .compile(&Expression::and(vec![family, chained]), &SearchOptions::default(), None)
            .unwrap();

        assert!(compiled.sql.contains("EXISTS (SELECT * FROM cte0 WHERE cte0.T1 = refSource.ResourceTypeId AND cte0.Sid1 = refSource.ResourceSurrogateId)"));
    }

    #[test]
    fn test_two_nested_chains_in_one_link_are_rejected() {
        let nested = || {
            Expression::chained(
                types(&["Patient"]),
                reference("organization", "http://hl7.org/fhir/SearchParameter/Patient-organization"),
                types(&["Organization"]),
                false,
                name_is("Acme"),
            )
        };
        let outer = Expression::chained(
            types(&["Observation"]),
            reference("subject", "http://hl7.org/fhir/SearchParameter/Observation-subject"),
            types(&["Patient"]),
            false,
            Expression::and(vec![nested(), nested()]),
        );
        assert!(compiler().compile(&outer, &SearchOptions::default(), None).is_err());
    }
}

//! Per-type query generators.
//!
//! A generator renders the WHERE-clause fragment of one predicate against one
//! index table. Generators are stateless; everything they need is threaded
//! through a [`RenderContext`]. [`QueryGenerator`] is the closed set of
//! generators, and [`dispatch::render`] routes each expression node to the
//! generator function that handles its (node kind, generator) pair.
//!
//! | Generator | Table |
//! |-----------|-------|
//! | String | `dbo.StringSearchParam` |
//! | Token | `dbo.TokenSearchParam` |
//! | TokenText | `dbo.TokenText` |
//! | Number | `dbo.NumberSearchParam` |
//! | Quantity | `dbo.QuantitySearchParam` |
//! | DateTime | `dbo.DateTimeSearchParam` |
//! | Uri | `dbo.UriSearchParam` |
//! | Reference | `dbo.ReferenceSearchParam` |
//! | Composite | `dbo.*CompositeSearchParam` |
//! | IdentifierOfType | `dbo.IdentifierOfTypeSearchParam` |
//! | resource table family | `dbo.Resource` |
//! | Compartment / ReferenceCompartment | `dbo.CompartmentAssignment` / `dbo.ReferenceSearchParam` |

pub mod composite;
pub mod compartment;
pub mod date;
pub mod dispatch;
pub mod identifier_of_type;
pub mod number;
pub mod quantity;
pub mod reference;
pub mod resource_table;
pub mod string;
pub mod token;
pub mod token_text;
pub mod uri;

use std::collections::BTreeSet;

pub use composite::CompositeKind;
pub use dispatch::render;

use crate::config::SqlSearchConfig;
use crate::error::{SqlSearchError, SqlSearchResult};
use crate::expression::{Expression, FieldName, Value};
use crate::model::SqlServerModel;
use crate::schema::tables::{
    compartment_assignment, date_time_search_param, identifier_of_type_search_param,
    number_search_param, quantity_search_param, reference_search_param, resource,
    string_search_param, token_search_param, token_text as token_text_table, uri_search_param,
};
use crate::schema::{Column, SchemaInformation, Table, versions};
use crate::sql::{SqlBuilder, SqlQueryParameterManager};
use crate::types::{SearchParamType, SearchParameterInfo};

/// The closed set of query generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryGenerator {
    String,
    Token,
    TokenText,
    Number,
    Quantity,
    DateTime,
    Uri,
    Reference,
    Composite(CompositeKind),
    IdentifierOfType,
    /// Entry point for `_id`, `_type`, `_lastUpdated` and surrogate id
    /// predicates on the resource table.
    ResourceTable,
    ResourceId,
    ResourceTypeId,
    LastUpdated,
    ResourceSurrogateId,
    PrimaryKeyRange,
    /// Compartments through `dbo.CompartmentAssignment`.
    Compartment,
    /// Compartments through `dbo.ReferenceSearchParam`.
    ReferenceCompartment,
    /// Chain links; rendered by the statement assembler.
    Chain,
    /// Includes; rendered by the statement assembler.
    Include,
}

impl QueryGenerator {
    /// The generator name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            QueryGenerator::String => "StringQueryGenerator",
            QueryGenerator::Token => "TokenQueryGenerator",
            QueryGenerator::TokenText => "TokenTextQueryGenerator",
            QueryGenerator::Number => "NumberQueryGenerator",
            QueryGenerator::Quantity => "QuantityQueryGenerator",
            QueryGenerator::DateTime => "DateTimeQueryGenerator",
            QueryGenerator::Uri => "UriQueryGenerator",
            QueryGenerator::Reference => "ReferenceQueryGenerator",
            QueryGenerator::Composite(kind) => kind.name(),
            QueryGenerator::IdentifierOfType => "IdentifierOfTypeQueryGenerator",
            QueryGenerator::ResourceTable => "ResourceTableQueryGenerator",
            QueryGenerator::ResourceId => "ResourceIdQueryGenerator",
            QueryGenerator::ResourceTypeId => "ResourceTypeIdQueryGenerator",
            QueryGenerator::LastUpdated => "LastUpdatedQueryGenerator",
            QueryGenerator::ResourceSurrogateId => "ResourceSurrogateIdQueryGenerator",
            QueryGenerator::PrimaryKeyRange => "PrimaryKeyRangeQueryGenerator",
            QueryGenerator::Compartment => "CompartmentQueryGenerator",
            QueryGenerator::ReferenceCompartment => "ReferenceCompartmentQueryGenerator",
            QueryGenerator::Chain => "ChainQueryGenerator",
            QueryGenerator::Include => "IncludeQueryGenerator",
        }
    }

    /// The table this generator's predicates apply to.
    pub fn table(&self) -> Table {
        match self {
            QueryGenerator::String => string_search_param::TABLE,
            QueryGenerator::Token => token_search_param::TABLE,
            QueryGenerator::TokenText => token_text_table::TABLE,
            QueryGenerator::Number => number_search_param::TABLE,
            QueryGenerator::Quantity => quantity_search_param::TABLE,
            QueryGenerator::DateTime => date_time_search_param::TABLE,
            QueryGenerator::Uri => uri_search_param::TABLE,
            QueryGenerator::Reference
            | QueryGenerator::ReferenceCompartment
            | QueryGenerator::Chain
            | QueryGenerator::Include => reference_search_param::TABLE,
            QueryGenerator::Composite(kind) => kind.table(),
            QueryGenerator::IdentifierOfType => identifier_of_type_search_param::TABLE,
            QueryGenerator::ResourceTable
            | QueryGenerator::ResourceId
            | QueryGenerator::ResourceTypeId
            | QueryGenerator::LastUpdated
            | QueryGenerator::ResourceSurrogateId
            | QueryGenerator::PrimaryKeyRange => resource::TABLE,
            QueryGenerator::Compartment => compartment_assignment::TABLE,
        }
    }

    /// Returns true for generators over `dbo.Resource`.
    pub fn is_resource_table(&self) -> bool {
        self.table() == resource::TABLE
    }

    /// Picks the generator for a search parameter expression.
    pub fn for_parameter(
        parameter: &SearchParameterInfo,
        expression: &Expression,
    ) -> SqlSearchResult<Self> {
        if parameter.is_resource_table_parameter() {
            return Ok(QueryGenerator::ResourceTable);
        }

        let generator = match parameter.param_type {
            SearchParamType::String => QueryGenerator::String,
            SearchParamType::Token if expression.contains_field(FieldName::TokenText) => {
                QueryGenerator::TokenText
            }
            // identifier:of-type pairs a type coding with the identifier value
            SearchParamType::Token if expression.contains_field(FieldName::String) => {
                QueryGenerator::IdentifierOfType
            }
            SearchParamType::Token => QueryGenerator::Token,
            SearchParamType::Number => QueryGenerator::Number,
            SearchParamType::Quantity => QueryGenerator::Quantity,
            SearchParamType::Date => QueryGenerator::DateTime,
            SearchParamType::Uri => QueryGenerator::Uri,
            SearchParamType::Reference => QueryGenerator::Reference,
            SearchParamType::Composite => {
                QueryGenerator::Composite(CompositeKind::for_components(parameter)?)
            }
            SearchParamType::Special => {
                return Err(SqlSearchError::invalid_operation(format!(
                    "special search parameter '{}' has no index table",
                    parameter.code
                )));
            }
        };
        Ok(generator)
    }

    /// Picks the compartment generator for the active schema.
    pub fn for_compartment(schema: SchemaInformation) -> Self {
        if schema.supports(versions::REFERENCE_BASED_COMPARTMENTS) {
            QueryGenerator::ReferenceCompartment
        } else {
            QueryGenerator::Compartment
        }
    }
}

/// Mutable state threaded through every generator call.
pub struct RenderContext<'a> {
    /// SQL text being built.
    pub sb: &'a mut SqlBuilder,
    /// Parameters of the statement.
    pub params: &'a mut SqlQueryParameterManager,
    /// Model lookups.
    pub model: &'a dyn SqlServerModel,
    /// The active schema.
    pub schema: SchemaInformation,
    /// Compiler configuration.
    pub config: &'a SqlSearchConfig,
    /// Alias to qualify column names with.
    pub table_alias: Option<&'static str>,
    /// Search parameter ids referenced by the statement.
    pub search_param_ids: &'a mut BTreeSet<i16>,
}

impl<'a> RenderContext<'a> {
    /// Reborrows the context with a different table alias.
    pub fn with_alias(&mut self, table_alias: Option<&'static str>) -> RenderContext<'_> {
        RenderContext {
            sb: &mut *self.sb,
            params: &mut *self.params,
            model: self.model,
            schema: self.schema,
            config: self.config,
            table_alias,
            search_param_ids: &mut *self.search_param_ids,
        }
    }

    /// Appends a column qualified by the current alias.
    pub fn append_column(&mut self, column: &Column, component_index: Option<usize>) -> &mut Self {
        self.sb
            .append_column_component(column, self.table_alias, component_index);
        self
    }

    /// Appends raw SQL text.
    pub fn append(&mut self, text: &str) -> &mut Self {
        self.sb.append(text);
        self
    }

    /// Binds a value and appends its placeholder.
    pub fn append_parameter(
        &mut self,
        column: &Column,
        value: impl Into<Value>,
        include_in_hash: bool,
    ) -> SqlSearchResult<&mut Self> {
        let name = self.params.add_parameter(column, value, include_in_hash)?;
        self.sb.append(&name);
        Ok(self)
    }

    /// Resolves a search parameter id and records it as referenced.
    pub fn search_param_id(&mut self, url: &str) -> SqlSearchResult<i16> {
        let id = self.model.get_search_param_id(url)?;
        self.search_param_ids.insert(id);
        Ok(id)
    }
}

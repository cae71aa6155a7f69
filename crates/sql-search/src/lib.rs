//! Helios FHIR Server SQL Search Compiler
//!
//! This crate turns a FHIR search, already parsed into an [`Expression`] tree,
//! into one parameterized SQL Server statement over the Helios search index
//! schema: a resource table plus one index table per search parameter type.
//!
//! # Features
//!
//! - **All parameter types**: string, token, number, quantity, date, uri,
//!   reference, composite and `identifier:of-type`
//! - **Chaining**: forward chains and `_has` reverse chains, nested
//! - **Includes**: `_include`, `_revinclude`, `:iterate`, and the `$includes`
//!   paging operation
//! - **Paging**: keyset continuation tokens, value sorts, count-only searches
//! - **Plan cache friendly**: every literal is bound; plan-relevant values are
//!   hashed into a comment so each distinct plan gets its own cache entry
//!
//! # Architecture
//!
//! - [`expression`] - the search expression tree
//! - [`types`] - search parameters, options and continuation tokens
//! - [`model`] - resource type and search parameter id lookups
//! - [`schema`] - tables, columns and schema versions
//! - [`sql`] - the SQL text builder and bound parameters
//! - [`generators`] - per-type predicate rendering
//! - [`planner`] - expression tree to ordered table expressions
//! - [`compiler`] - table expressions to the final statement
//! - [`config`] - tuning knobs
//! - [`error`] - error types
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use helios_sql_search::expression::{Expression, FieldName, IncludeExpression, StringOperator};
//! use helios_sql_search::model::InMemorySqlServerModel;
//! use helios_sql_search::types::{SearchOptions, SearchParamType, SearchParameterInfo, SortSpec};
//! use helios_sql_search::{SchemaInformation, SqlSearchCompiler, SqlSearchConfig};
//!
//! let model = InMemorySqlServerModel::new()
//!     .with_resource_type("Organization", 99)
//!     .with_resource_type("Patient", 103)
//!     .with_search_param("http://hl7.org/fhir/SearchParameter/individual-family", 12)
//!     .with_search_param("http://hl7.org/fhir/SearchParameter/individual-birthdate", 13)
//!     .with_search_param("http://hl7.org/fhir/SearchParameter/Patient-organization", 15);
//! let compiler = SqlSearchCompiler::new(
//!     Arc::new(model),
//!     SchemaInformation::default(),
//!     SqlSearchConfig::default(),
//! );
//!
//! // Patient?family=Smi&_sort=birthdate&_include=Patient:organization
//! let family = SearchParameterInfo::new(
//!     "family",
//!     "http://hl7.org/fhir/SearchParameter/individual-family",
//!     SearchParamType::String,
//! );
//! let birthdate = SearchParameterInfo::new(
//!     "birthdate",
//!     "http://hl7.org/fhir/SearchParameter/individual-birthdate",
//!     SearchParamType::Date,
//! );
//! let organization = SearchParameterInfo::new(
//!     "organization",
//!     "http://hl7.org/fhir/SearchParameter/Patient-organization",
//!     SearchParamType::Reference,
//! )
//! .with_target(vec!["Organization".to_string()]);
//!
//! let search = Expression::and(vec![
//!     Expression::search_parameter(
//!         family,
//!         Expression::string(StringOperator::StartsWith, FieldName::String, "Smi", true),
//!     ),
//!     Expression::include(IncludeExpression::forward("Patient", organization, None)),
//! ]);
//! let options = SearchOptions::new(20).with_sort(SortSpec::ascending(birthdate));
//!
//! let compiled = compiler.compile(&search, &options, None).unwrap();
//! assert!(compiled.sql.starts_with("/* HASH "));
//! assert!(compiled.sql.contains("WITH cte0 AS"));
//! assert!(compiled.search_param_ids.contains(&15));
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod compiler;
pub mod config;
pub mod error;
pub mod expression;
pub mod generators;
pub mod model;
pub mod planner;
pub mod schema;
pub mod sql;
pub mod types;

// Re-export commonly used types at crate root
pub use compiler::{CompiledSearch, CompiledSearchSummary, NO_QUERY_PLAN_ERROR, SqlSearchCompiler};
pub use config::{OptimizeForUnknownPolicy, SqlSearchConfig, UnresolvedTypePolicy};
pub use error::{SqlSearchError, SqlSearchResult};
pub use expression::Expression;
pub use model::{InMemorySqlServerModel, SqlServerModel};
pub use schema::SchemaInformation;
pub use types::{SearchOptions, SearchParameterInfo};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

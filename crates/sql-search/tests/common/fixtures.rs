//! Model, compiler and expression fixtures.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use helios_sql_search::expression::{BinaryOperator, Expression, FieldName, StringOperator};
use helios_sql_search::model::InMemorySqlServerModel;
use helios_sql_search::types::{SearchParamType, SearchParameterInfo, names};
use helios_sql_search::{SchemaInformation, SqlSearchCompiler, SqlSearchConfig};
use rust_decimal::Decimal;

pub const OBSERVATION: i16 = 96;
pub const ORGANIZATION: i16 = 99;
pub const PATIENT: i16 = 103;

pub const FAMILY_URL: &str = "http://hl7.org/fhir/SearchParameter/individual-family";
pub const BIRTHDATE_URL: &str = "http://hl7.org/fhir/SearchParameter/individual-birthdate";
pub const GENDER_URL: &str = "http://hl7.org/fhir/SearchParameter/individual-gender";
pub const ORGANIZATION_URL: &str = "http://hl7.org/fhir/SearchParameter/Patient-organization";
pub const CODE_URL: &str = "http://hl7.org/fhir/SearchParameter/clinical-code";
pub const SUBJECT_URL: &str = "http://hl7.org/fhir/SearchParameter/Observation-subject";
pub const ORGANIZATION_NAME_URL: &str = "http://hl7.org/fhir/SearchParameter/Organization-name";
pub const CODE_VALUE_QUANTITY_URL: &str =
    "http://hl7.org/fhir/SearchParameter/Observation-code-value-quantity";

/// The model every test compiles against.
pub fn model() -> InMemorySqlServerModel {
    InMemorySqlServerModel::new()
        .with_resource_type("Observation", OBSERVATION)
        .with_resource_type("Organization", ORGANIZATION)
        .with_resource_type("Patient", PATIENT)
        .with_search_param(FAMILY_URL, 12)
        .with_search_param(BIRTHDATE_URL, 13)
        .with_search_param(GENDER_URL, 14)
        .with_search_param(ORGANIZATION_URL, 15)
        .with_search_param(CODE_URL, 20)
        .with_search_param(SUBJECT_URL, 22)
        .with_search_param(ORGANIZATION_NAME_URL, 30)
        .with_search_param(CODE_VALUE_QUANTITY_URL, 40)
        .with_compartment_type("Patient", 1)
        .with_compartment_params("Patient", vec![22])
}

/// Builder for a compiler under test.
pub struct CompilerFixture {
    schema: SchemaInformation,
    config: SqlSearchConfig,
}

impl CompilerFixture {
    pub fn new() -> Self {
        Self {
            schema: SchemaInformation::default(),
            config: SqlSearchConfig::default(),
        }
    }

    pub fn with_schema_version(mut self, version: i32) -> Self {
        self.schema = SchemaInformation::new(version);
        self
    }

    pub fn with_config(mut self, config: SqlSearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> SqlSearchCompiler {
        SqlSearchCompiler::new(Arc::new(model()), self.schema, self.config)
    }
}

impl Default for CompilerFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A compiler with the latest schema and default configuration.
pub fn compiler() -> SqlSearchCompiler {
    CompilerFixture::new().build()
}

pub fn types(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

// ============================================================================
// Search parameters
// ============================================================================

pub fn resource_type_param() -> SearchParameterInfo {
    SearchParameterInfo::new(
        names::RESOURCE_TYPE,
        "http://hl7.org/fhir/SearchParameter/Resource-type",
        SearchParamType::Token,
    )
}

pub fn family_param() -> SearchParameterInfo {
    SearchParameterInfo::new("family", FAMILY_URL, SearchParamType::String)
}

pub fn birthdate_param() -> SearchParameterInfo {
    SearchParameterInfo::new("birthdate", BIRTHDATE_URL, SearchParamType::Date)
}

pub fn gender_param() -> SearchParameterInfo {
    SearchParameterInfo::new("gender", GENDER_URL, SearchParamType::Token)
}

pub fn organization_param() -> SearchParameterInfo {
    SearchParameterInfo::new("organization", ORGANIZATION_URL, SearchParamType::Reference)
        .with_target(types(&["Organization"]))
}

pub fn subject_param() -> SearchParameterInfo {
    SearchParameterInfo::new("subject", SUBJECT_URL, SearchParamType::Reference)
        .with_target(types(&["Patient"]))
}

pub fn code_param() -> SearchParameterInfo {
    SearchParameterInfo::new("code", CODE_URL, SearchParamType::Token)
}

pub fn code_value_quantity_param() -> SearchParameterInfo {
    SearchParameterInfo::new("code-value-quantity", CODE_VALUE_QUANTITY_URL, SearchParamType::Composite)
        .with_components(vec![SearchParamType::Token, SearchParamType::Quantity])
}

pub fn last_updated_param() -> SearchParameterInfo {
    SearchParameterInfo::new(
        names::LAST_UPDATED,
        "http://hl7.org/fhir/SearchParameter/Resource-lastUpdated",
        SearchParamType::Date,
    )
}

pub fn organization_name_param() -> SearchParameterInfo {
    SearchParameterInfo::new("name", ORGANIZATION_NAME_URL, SearchParamType::String)
}

// ============================================================================
// Expressions
// ============================================================================

/// `_type=<name>`
pub fn of_type(name: &str) -> Expression {
    Expression::search_parameter(
        resource_type_param(),
        Expression::string_equals(FieldName::TokenCode, name),
    )
}

/// `family=<value>` (starts-with, case-insensitive)
pub fn family_is(value: &str) -> Expression {
    Expression::search_parameter(
        family_param(),
        Expression::string(StringOperator::StartsWith, FieldName::String, value, true),
    )
}

/// `gender=<value>`
pub fn gender_is(value: &str) -> Expression {
    Expression::search_parameter(gender_param(), Expression::string_equals(FieldName::TokenCode, value))
}

/// `code=<value>`
pub fn code_is(value: &str) -> Expression {
    Expression::search_parameter(code_param(), Expression::string_equals(FieldName::TokenCode, value))
}

/// `name=<value>` on Organization
pub fn organization_name_is(value: &str) -> Expression {
    Expression::search_parameter(
        organization_name_param(),
        Expression::string(StringOperator::StartsWith, FieldName::String, value, true),
    )
}

/// A `gender` search whose value sits under `levels` single-child ANDs.
pub fn nested_gender(levels: usize) -> Expression {
    let mut expr = Expression::string_equals(FieldName::TokenCode, "female");
    for _ in 0..levels {
        expr = Expression::and(vec![expr]);
    }
    Expression::search_parameter(gender_param(), expr)
}

/// `code-value-quantity=<code>$gt<value>`
pub fn code_value_above(code: &str, value: i64) -> Expression {
    Expression::search_parameter(
        code_value_quantity_param(),
        Expression::and(vec![
            Expression::string_component(StringOperator::Equals, FieldName::TokenCode, 0, code, false),
            Expression::binary_component(BinaryOperator::GreaterThan, FieldName::Quantity, 1, Decimal::new(value, 0)),
        ]),
    )
}

/// `birthdate=gt<instant>`
pub fn born_after(instant: DateTime<Utc>) -> Expression {
    Expression::search_parameter(
        birthdate_param(),
        Expression::binary(BinaryOperator::GreaterThan, FieldName::DateTimeStart, instant),
    )
}

/// `_lastUpdated=eq<instant>`
pub fn last_updated_at(instant: DateTime<Utc>) -> Expression {
    Expression::search_parameter(
        last_updated_param(),
        Expression::binary(BinaryOperator::Equal, FieldName::DateTimeStart, instant),
    )
}

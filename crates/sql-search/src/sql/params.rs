//! Bound query parameters and the query plan hash.
//!
//! Every literal in the generated SQL is bound as a typed parameter. Values
//! that shape the query plan are folded into a hash which is embedded in the
//! SQL text as a comment, so the database keeps one cached plan per distinct
//! set of plan-relevant values. Paging literals (TOP counts, continuation
//! positions) are bound with `include_in_hash = false` so they never split
//! the plan cache.

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::error::{SqlSearchError, SqlSearchResult};
use crate::expression::Value;
use crate::schema::{Column, SqlType};

/// A parameter value typed by its target column.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// `tinyint`
    TinyInt(u8),
    /// `smallint`
    SmallInt(i16),
    /// `int`
    Int(i32),
    /// `bigint`
    BigInt(i64),
    /// `bit`
    Bit(bool),
    /// `decimal`
    Decimal(Decimal),
    /// `datetime2`
    DateTime2(DateTime<Utc>),
    /// `varchar`
    VarChar(String),
    /// `nvarchar`
    NVarChar(String),
}

impl SqlValue {
    /// The SQL type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::TinyInt(_) => "tinyint",
            SqlValue::SmallInt(_) => "smallint",
            SqlValue::Int(_) => "int",
            SqlValue::BigInt(_) => "bigint",
            SqlValue::Bit(_) => "bit",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::DateTime2(_) => "datetime2",
            SqlValue::VarChar(_) => "varchar",
            SqlValue::NVarChar(_) => "nvarchar",
        }
    }

    /// Converts a literal to the type of `column`.
    pub fn for_column(column: &Column, value: &Value) -> SqlSearchResult<Self> {
        let mismatch = || SqlSearchError::InvalidValue {
            column: column.name.to_string(),
            expected: column.sql_type.to_string(),
            actual: value.type_name().to_string(),
        };

        let converted = match (column.sql_type, value) {
            (SqlType::TinyInt, Value::Integer(n)) => {
                SqlValue::TinyInt(u8::try_from(*n).map_err(|_| mismatch())?)
            }
            (SqlType::SmallInt, Value::Integer(n)) => {
                SqlValue::SmallInt(i16::try_from(*n).map_err(|_| mismatch())?)
            }
            (SqlType::Int, Value::Integer(n)) => {
                SqlValue::Int(i32::try_from(*n).map_err(|_| mismatch())?)
            }
            (SqlType::BigInt, Value::Integer(n)) => SqlValue::BigInt(*n),
            (SqlType::Bit, Value::Boolean(b)) => SqlValue::Bit(*b),
            (SqlType::Bit, Value::Integer(n @ (0 | 1))) => SqlValue::Bit(*n == 1),
            (SqlType::Decimal { .. }, Value::Decimal(d)) => SqlValue::Decimal(*d),
            (SqlType::Decimal { .. }, Value::Integer(n)) => SqlValue::Decimal(Decimal::from(*n)),
            (SqlType::DateTime2, Value::DateTime(dt)) => SqlValue::DateTime2(*dt),
            (SqlType::VarChar, Value::String(s)) => SqlValue::VarChar(s.clone()),
            (SqlType::NVarChar, Value::String(s)) => SqlValue::NVarChar(s.clone()),
            _ => return Err(mismatch()),
        };
        Ok(converted)
    }

    fn hash_text(&self) -> String {
        match self {
            SqlValue::TinyInt(n) => n.to_string(),
            SqlValue::SmallInt(n) => n.to_string(),
            SqlValue::Int(n) => n.to_string(),
            SqlValue::BigInt(n) => n.to_string(),
            SqlValue::Bit(b) => u8::from(*b).to_string(),
            SqlValue::Decimal(d) => d.to_string(),
            SqlValue::DateTime2(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            SqlValue::VarChar(s) | SqlValue::NVarChar(s) => s.clone(),
        }
    }
}

/// A bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlParameter {
    /// Placeholder name, e.g. `@p0`.
    pub name: String,
    /// The column the value is compared against, if any.
    pub column: Option<&'static str>,
    /// The typed value.
    pub value: SqlValue,
    /// Whether the value contributes to the plan hash.
    pub include_in_hash: bool,
}

/// Accumulates the parameters of one statement.
#[derive(Debug, Default)]
pub struct SqlQueryParameterManager {
    parameters: Vec<SqlParameter>,
}

impl SqlQueryParameterManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `value` typed as `column` and returns its placeholder.
    pub fn add_parameter(
        &mut self,
        column: &Column,
        value: impl Into<Value>,
        include_in_hash: bool,
    ) -> SqlSearchResult<String> {
        let typed = SqlValue::for_column(column, &value.into())?;
        Ok(self.push(Some(column.name), typed, include_in_hash))
    }

    /// Binds an already typed value that is not tied to a column, such as a
    /// TOP count.
    pub fn add_value(&mut self, value: SqlValue, include_in_hash: bool) -> String {
        self.push(None, value, include_in_hash)
    }

    fn push(&mut self, column: Option<&'static str>, value: SqlValue, include_in_hash: bool) -> String {
        let name = format!("@p{}", self.parameters.len());
        self.parameters.push(SqlParameter {
            name: name.clone(),
            column,
            value,
            include_in_hash,
        });
        name
    }

    /// The parameters bound so far, in placeholder order.
    pub fn parameters(&self) -> &[SqlParameter] {
        &self.parameters
    }

    /// Consumes the manager.
    pub fn into_parameters(self) -> Vec<SqlParameter> {
        self.parameters
    }

    /// Number of bound parameters.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Returns true if nothing was bound.
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    fn hashed(&self) -> impl Iterator<Item = &SqlParameter> {
        self.parameters.iter().filter(|p| p.include_in_hash)
    }

    /// Hash over the hash-eligible values and their columns, in bind order.
    ///
    /// `None` when no value is hash-eligible.
    pub fn hash(&self) -> Option<String> {
        let mut hasher = Sha256::new();
        let mut any = false;
        for parameter in self.hashed() {
            any = true;
            hasher.update(parameter.column.unwrap_or("").as_bytes());
            hasher.update(b"=");
            hasher.update(parameter.value.type_name().as_bytes());
            hasher.update(b":");
            hasher.update(parameter.value.hash_text().as_bytes());
            hasher.update(b";");
        }
        any.then(|| STANDARD.encode(hasher.finalize()))
    }

    /// Appends the `/* HASH ... */` comment line.
    pub fn append_hash(&self, sql: &mut String) {
        if let Some(hash) = self.hash() {
            sql.push_str("/* HASH ");
            sql.push_str(&hash);
            sql.push_str(" */\n");
        }
    }

    /// Appends the placeholders that contributed to the hash.
    pub fn append_hashed_parameter_names(&self, out: &mut String) {
        let names: Vec<&str> = self.hashed().map(|p| p.name.as_str()).collect();
        out.push_str(&names.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tables::{date_time_search_param, resource, search_param, string_search_param};
    use chrono::TimeZone;

    #[test]
    fn test_placeholders_are_unique_and_typed() {
        let mut params = SqlQueryParameterManager::new();
        let a = params
            .add_parameter(&search_param::SEARCH_PARAM_ID, 12i64, true)
            .unwrap();
        let b = params
            .add_parameter(&string_search_param::TEXT, "Smith", true)
            .unwrap();
        assert_eq!(a, "@p0");
        assert_eq!(b, "@p1");
        assert_eq!(params.parameters()[0].value, SqlValue::SmallInt(12));
        assert_eq!(
            params.parameters()[1].value,
            SqlValue::NVarChar("Smith".to_string())
        );
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let mut params = SqlQueryParameterManager::new();
        let err = params
            .add_parameter(&date_time_search_param::START_DATE_TIME, "yesterday", true)
            .unwrap_err();
        assert!(matches!(err, SqlSearchError::InvalidValue { .. }));

        let err = params
            .add_parameter(&search_param::SEARCH_PARAM_ID, 70_000i64, true)
            .unwrap_err();
        assert!(matches!(err, SqlSearchError::InvalidValue { .. }));
        assert!(params.is_empty());
    }

    #[test]
    fn test_hash_ignores_excluded_values() {
        let build = |top: i32, sid: i64| {
            let mut params = SqlQueryParameterManager::new();
            params
                .add_parameter(&string_search_param::TEXT, "Smith", true)
                .unwrap();
            params
                .add_parameter(&resource::RESOURCE_SURROGATE_ID, sid, false)
                .unwrap();
            params.add_value(SqlValue::Int(top), false);
            params.hash()
        };

        assert!(build(11, 1).is_some());
        assert_eq!(build(11, 1), build(51, 999));
    }

    #[test]
    fn test_hash_depends_on_hashed_values() {
        let hash_of = |text: &str| {
            let mut params = SqlQueryParameterManager::new();
            params
                .add_parameter(&string_search_param::TEXT, text, true)
                .unwrap();
            params.hash()
        };
        assert_ne!(hash_of("Smith"), hash_of("Jones"));
        assert_eq!(hash_of("Smith"), hash_of("Smith"));
    }

    #[test]
    fn test_append_hash() {
        let mut params = SqlQueryParameterManager::new();
        let mut sql = String::new();
        params.append_hash(&mut sql);
        assert!(sql.is_empty());

        params
            .add_parameter(
                &date_time_search_param::START_DATE_TIME,
                Utc.with_ymd_and_hms(1980, 1, 1, 0, 0, 0).unwrap(),
                true,
            )
            .unwrap();
        params.add_value(SqlValue::Int(11), false);
        params.append_hash(&mut sql);
        assert!(sql.starts_with("/* HASH "));
        assert!(sql.ends_with(" */\n"));

        let mut names = String::new();
        params.append_hashed_parameter_names(&mut names);
        assert_eq!(names, "@p0");
    }
}

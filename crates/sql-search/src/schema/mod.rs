//! Static description of the search index schema.
//!
//! Column metadata (max length, nullability, collation) drives generator
//! behavior such as overflow routing and collation overrides, so it must match
//! the physical schema exactly.

pub mod tables;

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// SQL Server column types used by the index schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    /// `tinyint`
    TinyInt,
    /// `smallint`
    SmallInt,
    /// `int`
    Int,
    /// `bigint`
    BigInt,
    /// `bit`
    Bit,
    /// `decimal(precision, scale)`
    Decimal {
        /// Total digits.
        precision: u8,
        /// Digits after the decimal point.
        scale: u8,
    },
    /// `datetime2(7)`
    DateTime2,
    /// `varchar`
    VarChar,
    /// `nvarchar`
    NVarChar,
    /// `varbinary`
    VarBinary,
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::TinyInt => write!(f, "tinyint"),
            SqlType::SmallInt => write!(f, "smallint"),
            SqlType::Int => write!(f, "int"),
            SqlType::BigInt => write!(f, "bigint"),
            SqlType::Bit => write!(f, "bit"),
            SqlType::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            SqlType::DateTime2 => write!(f, "datetime2(7)"),
            SqlType::VarChar => write!(f, "varchar"),
            SqlType::NVarChar => write!(f, "nvarchar"),
            SqlType::VarBinary => write!(f, "varbinary"),
        }
    }
}

/// Column collations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collation {
    /// Case and accent insensitive.
    CaseInsensitive,
    /// Case and accent sensitive.
    CaseSensitive,
}

impl Collation {
    /// Case and accent insensitive, supplementary character aware.
    pub const CASE_INSENSITIVE_NAME: &'static str = "Latin1_General_100_CI_AI_SC";
    /// Case and accent sensitive.
    pub const CASE_SENSITIVE_NAME: &'static str = "Latin1_General_100_CS_AS";

    /// The SQL Server collation name.
    pub fn name(&self) -> &'static str {
        match self {
            Collation::CaseInsensitive => Self::CASE_INSENSITIVE_NAME,
            Collation::CaseSensitive => Self::CASE_SENSITIVE_NAME,
        }
    }
}

/// A physical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Table {
    /// Schema-qualified name.
    pub name: &'static str,
    /// Covering index used for "all resources of type X" scans.
    pub type_scan_index: Option<&'static str>,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A physical column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Column {
    /// Column name.
    pub name: &'static str,
    /// Declared type.
    pub sql_type: SqlType,
    /// Whether the column allows NULL.
    pub nullable: bool,
    /// Maximum length in characters; `None` for `max` and non-text columns.
    pub max_length: Option<usize>,
    /// Default collation of text columns.
    pub collation: Option<Collation>,
}

impl Column {
    pub(crate) const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            nullable: false,
            max_length: None,
            collation: None,
        }
    }

    pub(crate) const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub(crate) const fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub(crate) const fn collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Returns true if comparisons on this column are case sensitive by default.
    pub fn is_case_sensitive(&self) -> bool {
        self.collation == Some(Collation::CaseSensitive)
    }

    /// Returns true if `value` fits in the column without truncation.
    pub fn fits(&self, value: &str) -> bool {
        match self.max_length {
            Some(max) => value.chars().count() <= max,
            None => true,
        }
    }

    /// The column name, suffixed with the 1-based component number on
    /// composite tables.
    pub fn name_for_component(&self, component_index: Option<usize>) -> Cow<'static, str> {
        match component_index {
            Some(index) => Cow::Owned(format!("{}{}", self.name, index + 1)),
            None => Cow::Borrowed(self.name),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Schema versions that switch compiler behavior.
pub mod versions {
    /// Oldest supported schema.
    pub const MIN: i32 = 1;
    /// `Resource.SearchParamHash` exists.
    pub const SEARCH_PARAM_HASH: i32 = 8;
    /// `IsMin` / `IsMax` flags exist on sortable index tables.
    pub const MIN_MAX_SORT: i32 = 22;
    /// Index tables are partitioned by resource type.
    pub const PARTITIONED_TABLES: i32 = 40;
    /// Compartments are resolved through `ReferenceSearchParam`.
    pub const REFERENCE_BASED_COMPARTMENTS: i32 = 65;
    /// Newest known schema.
    pub const LATEST: i32 = 70;
}

/// The active schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInformation {
    /// Current schema version.
    pub current: i32,
}

impl SchemaInformation {
    /// Creates schema information for a version.
    pub fn new(current: i32) -> Self {
        Self { current }
    }

    /// Returns true if the active schema is at least `version`.
    pub fn supports(&self, version: i32) -> bool {
        self.current >= version
    }
}

impl Default for SchemaInformation {
    fn default() -> Self {
        Self::new(versions::LATEST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_fits() {
        let text = tables::string_search_param::TEXT;
        assert!(text.fits(&"a".repeat(256)));
        assert!(!text.fits(&"a".repeat(257)));
        assert!(tables::string_search_param::TEXT_OVERFLOW.fits(&"a".repeat(10_000)));
    }

    #[test]
    fn test_component_name() {
        let code = tables::token_search_param::CODE;
        assert_eq!(code.name_for_component(None), "Code");
        assert_eq!(code.name_for_component(Some(1)), "Code2");
    }

    #[test]
    fn test_schema_supports() {
        let schema = SchemaInformation::new(versions::MIN_MAX_SORT);
        assert!(schema.supports(versions::SEARCH_PARAM_HASH));
        assert!(!schema.supports(versions::PARTITIONED_TABLES));
        assert!(SchemaInformation::default().supports(versions::REFERENCE_BASED_COMPARTMENTS));
    }

    #[test]
    fn test_sql_type_display() {
        assert_eq!(
            SqlType::Decimal {
                precision: 36,
                scale: 18
            }
            .to_string(),
            "decimal(36,18)"
        );
    }
}

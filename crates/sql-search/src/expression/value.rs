//! Field names, operators and literal values carried by expression leaves.

// Variant names mirror the index columns and SQL operators they map to
#![allow(missing_docs)]

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// The logical field a leaf expression compares against.
///
/// Each generator maps the fields it understands onto its table's columns and
/// rejects the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldName {
    DateTimeStart,
    DateTimeEnd,
    DateTimeIsLongerThanADay,
    DateTimeIsMin,
    DateTimeIsMax,
    Number,
    NumberLow,
    NumberHigh,
    Quantity,
    QuantityLow,
    QuantityHigh,
    QuantityCode,
    QuantitySystem,
    ReferenceBaseUri,
    ReferenceResourceType,
    ReferenceResourceId,
    String,
    StringIsMin,
    StringIsMax,
    TokenCode,
    TokenSystem,
    TokenText,
    Uri,
    /// Surrogate id range, e.g. derived from `_lastUpdated`.
    ResourceSurrogateId,
    /// Surrogate id bound resuming a page; never part of the plan hash.
    SurrogateIdKeyset,
    /// `(ResourceTypeId, ResourceSurrogateId)` resume position.
    PrimaryKey,
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl BinaryOperator {
    /// The SQL comparison token.
    pub fn as_sql(&self) -> &'static str {
        match self {
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// String matching operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringOperator {
    Equals,
    StartsWith,
    EndsWith,
    Contains,
    NotStartsWith,
    NotEndsWith,
    NotContains,
    /// The stored value is a prefix of the literal (`uri:above`).
    LeftSideStartsWith,
}

impl StringOperator {
    /// Returns the positive form of a negated operator.
    pub fn positive(&self) -> Option<StringOperator> {
        match self {
            StringOperator::NotStartsWith => Some(StringOperator::StartsWith),
            StringOperator::NotEndsWith => Some(StringOperator::EndsWith),
            StringOperator::NotContains => Some(StringOperator::Contains),
            _ => None,
        }
    }
}

impl fmt::Display for StringOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Boolean combinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MultiaryOperator {
    And,
    Or,
}

impl MultiaryOperator {
    /// The SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            MultiaryOperator::And => "AND",
            MultiaryOperator::Or => "OR",
        }
    }
}

/// A `(ResourceTypeId, ResourceSurrogateId)` position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrimaryKeyValue {
    pub resource_type_id: i16,
    pub resource_surrogate_id: i64,
}

/// Resume position for searches ordered by resource type then surrogate id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimaryKeyRange {
    /// The last row returned.
    pub current: PrimaryKeyValue,
    /// Resource types that sort after the current one and are still to be read.
    pub next_resource_type_ids: Vec<i16>,
}

/// A literal operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Decimal(Decimal),
    DateTime(DateTime<Utc>),
    Boolean(bool),
    PrimaryKeyRange(PrimaryKeyRange),
}

impl Value {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::DateTime(_) => "datetime",
            Value::Boolean(_) => "boolean",
            Value::PrimaryKeyRange(_) => "primary key range",
        }
    }

    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n.into())
    }
}

impl From<i16> for Value {
    fn from(n: i16) -> Self {
        Value::Integer(n.into())
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<PrimaryKeyRange> for Value {
    fn from(range: PrimaryKeyRange) -> Self {
        Value::PrimaryKeyRange(range)
    }
}

//! Search parameter descriptions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Well-known search parameter codes with special handling.
pub mod names {
    /// Logical id, stored on the resource table.
    pub const ID: &str = "_id";
    /// Resource type, stored on the resource table.
    pub const RESOURCE_TYPE: &str = "_type";
    /// Last updated instant, derived from the surrogate id.
    pub const LAST_UPDATED: &str = "_lastUpdated";
    /// Business identifier.
    pub const IDENTIFIER: &str = "identifier";
}

/// FHIR search parameter types.
///
/// See: https://build.fhir.org/search.html#ptypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParamType {
    /// A simple string, like a name or description.
    String,
    /// A search against a URI.
    Uri,
    /// A search for a number.
    Number,
    /// A search for a date, dateTime, or period.
    Date,
    /// A quantity, with a number and units.
    Quantity,
    /// A code from a code system or value set.
    Token,
    /// A reference to another resource.
    Reference,
    /// A composite search parameter that combines others.
    Composite,
    /// Special search parameters.
    Special,
}

impl fmt::Display for SearchParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchParamType::String => write!(f, "string"),
            SearchParamType::Uri => write!(f, "uri"),
            SearchParamType::Number => write!(f, "number"),
            SearchParamType::Date => write!(f, "date"),
            SearchParamType::Quantity => write!(f, "quantity"),
            SearchParamType::Token => write!(f, "token"),
            SearchParamType::Reference => write!(f, "reference"),
            SearchParamType::Composite => write!(f, "composite"),
            SearchParamType::Special => write!(f, "special"),
        }
    }
}

impl FromStr for SearchParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(SearchParamType::String),
            "uri" => Ok(SearchParamType::Uri),
            "number" => Ok(SearchParamType::Number),
            "date" => Ok(SearchParamType::Date),
            "quantity" => Ok(SearchParamType::Quantity),
            "token" => Ok(SearchParamType::Token),
            "reference" => Ok(SearchParamType::Reference),
            "composite" => Ok(SearchParamType::Composite),
            "special" => Ok(SearchParamType::Special),
            _ => Err(format!("unknown search parameter type: {}", s)),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Ascending,
    /// Descending order.
    Descending,
}

impl SortDirection {
    /// The SQL keyword for this direction.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// The static description of a search parameter as seen by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParameterInfo {
    /// Canonical URL, used to look up the numeric search parameter id.
    pub url: String,

    /// The parameter code (e.g. "family", "_id").
    pub code: String,

    /// The parameter type.
    #[serde(rename = "type")]
    pub param_type: SearchParamType,

    /// Component types of a composite parameter, in component order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<SearchParamType>,

    /// Target resource types of a reference parameter.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target: Vec<String>,
}

impl SearchParameterInfo {
    /// Creates a parameter description.
    pub fn new(
        code: impl Into<String>,
        url: impl Into<String>,
        param_type: SearchParamType,
    ) -> Self {
        Self {
            url: url.into(),
            code: code.into(),
            param_type,
            components: Vec::new(),
            target: Vec::new(),
        }
    }

    /// Sets the composite component types.
    pub fn with_components(mut self, components: Vec<SearchParamType>) -> Self {
        self.components = components;
        self
    }

    /// Sets the reference target types.
    pub fn with_target(mut self, target: Vec<String>) -> Self {
        self.target = target;
        self
    }

    /// Returns true for parameters stored on the resource table itself.
    pub fn is_resource_table_parameter(&self) -> bool {
        matches!(
            self.code.as_str(),
            names::ID | names::RESOURCE_TYPE | names::LAST_UPDATED
        )
    }

    /// Returns true for sorts that map onto the resource primary key.
    pub fn is_primary_key_sort(&self) -> bool {
        matches!(self.code.as_str(), names::RESOURCE_TYPE | names::LAST_UPDATED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_type_round_trip() {
        assert_eq!(
            "Token".parse::<SearchParamType>().unwrap(),
            SearchParamType::Token
        );
        assert_eq!(SearchParamType::Quantity.to_string(), "quantity");
        assert!("bogus".parse::<SearchParamType>().is_err());
    }

    #[test]
    fn test_resource_table_parameters() {
        let id = SearchParameterInfo::new(
            "_id",
            "http://hl7.org/fhir/SearchParameter/Resource-id",
            SearchParamType::Token,
        );
        let last_updated = SearchParameterInfo::new(
            "_lastUpdated",
            "http://hl7.org/fhir/SearchParameter/Resource-lastUpdated",
            SearchParamType::Date,
        );
        let family = SearchParameterInfo::new(
            "family",
            "http://hl7.org/fhir/SearchParameter/individual-family",
            SearchParamType::String,
        );

        assert!(id.is_resource_table_parameter());
        assert!(!id.is_primary_key_sort());
        assert!(last_updated.is_primary_key_sort());
        assert!(!family.is_resource_table_parameter());
    }

    #[test]
    fn test_sort_direction_sql() {
        assert_eq!(SortDirection::default().as_sql(), "ASC");
        assert_eq!(SortDirection::Descending.as_sql(), "DESC");
    }
}

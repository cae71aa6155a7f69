//! Compiler configuration.
//!
//! Tuning knobs for the generated SQL. All of them have defaults matching the
//! behavior SQL Server deployments of Helios are tuned for, and the whole
//! structure can be embedded in a host's JSON configuration:
//!
//! ```
//! use helios_sql_search::config::SqlSearchConfig;
//!
//! let config: SqlSearchConfig =
//!     serde_json::from_str(r#"{"max_table_expressions_for_exists": 8}"#).unwrap();
//! assert_eq!(config.max_stack_depth, 100);
//! ```

use serde::{Deserialize, Serialize};

use crate::types::names;

/// Configuration of the SQL search compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SqlSearchConfig {
    /// Deepest expression tree accepted before the search is rejected as too
    /// complex.
    pub max_stack_depth: usize,

    /// Above this many table expressions, CTEs intersect with their
    /// predecessor through `INNER JOIN` instead of `EXISTS`.
    pub max_table_expressions_for_exists: usize,

    /// When to append `OPTION (OPTIMIZE FOR UNKNOWN)`.
    pub optimize_for_unknown: OptimizeForUnknownPolicy,

    /// How references to resource types the model does not know are rendered.
    pub unresolved_reference_type: UnresolvedTypePolicy,
}

impl Default for SqlSearchConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: 100,
            max_table_expressions_for_exists: 5,
            optimize_for_unknown: OptimizeForUnknownPolicy::default(),
            unresolved_reference_type: UnresolvedTypePolicy::default(),
        }
    }
}

impl SqlSearchConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expression depth limit.
    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }

    /// Sets the EXISTS / INNER JOIN threshold.
    pub fn with_max_table_expressions_for_exists(mut self, count: usize) -> Self {
        self.max_table_expressions_for_exists = count;
        self
    }

    /// Sets the `OPTIMIZE FOR UNKNOWN` policy.
    pub fn with_optimize_for_unknown(mut self, policy: OptimizeForUnknownPolicy) -> Self {
        self.optimize_for_unknown = policy;
        self
    }

    /// Sets the unresolved reference type policy.
    pub fn with_unresolved_reference_type(mut self, policy: UnresolvedTypePolicy) -> Self {
        self.unresolved_reference_type = policy;
        self
    }
}

/// Trigger for the `OPTIMIZE FOR UNKNOWN` query hint.
///
/// The default reproduces the heuristic SQL Server needs: searches combining an
/// include with an identifier search and at least two search parameters get
/// plans built from statistics instead of sniffed values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct OptimizeForUnknownPolicy {
    /// Whether the hint is ever emitted.
    pub enabled: bool,

    /// Only emit the hint when the search has includes.
    pub require_include: bool,

    /// Only emit the hint when this parameter is searched; `None` for any.
    pub trigger_parameter: Option<String>,

    /// Minimum number of search parameters in the search.
    pub min_search_parameters: usize,
}

impl Default for OptimizeForUnknownPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            require_include: true,
            trigger_parameter: Some(names::IDENTIFIER.to_string()),
            min_search_parameters: 2,
        }
    }
}

impl OptimizeForUnknownPolicy {
    /// A policy that never emits the hint.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Decides whether the hint applies.
    pub fn applies(&self, has_include: bool, searched_parameters: &[&str]) -> bool {
        if !self.enabled {
            return false;
        }
        if self.require_include && !has_include {
            return false;
        }
        if let Some(trigger) = &self.trigger_parameter {
            if !searched_parameters.iter().any(|p| p == trigger) {
                return false;
            }
        }
        searched_parameters.len() >= self.min_search_parameters
    }
}

/// Rendering of a resource type name the model cannot resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedTypePolicy {
    /// Emit `0 = 1` so that branch matches nothing.
    #[default]
    Unsatisfiable,
    /// Fail the compile with an unknown resource type error.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SqlSearchConfig::default();
        assert_eq!(config.max_stack_depth, 100);
        assert_eq!(config.max_table_expressions_for_exists, 5);
        assert_eq!(
            config.unresolved_reference_type,
            UnresolvedTypePolicy::Unsatisfiable
        );
    }

    #[test]
    fn test_partial_json() {
        let config: SqlSearchConfig = serde_json::from_str(
            r#"{"unresolved_reference_type": "error", "optimize_for_unknown": {"enabled": false}}"#,
        )
        .unwrap();
        assert_eq!(config.unresolved_reference_type, UnresolvedTypePolicy::Error);
        assert!(!config.optimize_for_unknown.enabled);
        assert_eq!(config.optimize_for_unknown.min_search_parameters, 2);
    }

    #[test]
    fn test_optimize_for_unknown_default_policy() {
        let policy = OptimizeForUnknownPolicy::default();
        assert!(policy.applies(true, &["identifier", "name"]));
        assert!(!policy.applies(false, &["identifier", "name"]));
        assert!(!policy.applies(true, &["identifier"]));
        assert!(!policy.applies(true, &["family", "name"]));
        assert!(!OptimizeForUnknownPolicy::disabled().applies(true, &["identifier", "name"]));
    }

    #[test]
    fn test_optimize_for_unknown_custom_trigger() {
        let policy = OptimizeForUnknownPolicy {
            require_include: false,
            trigger_parameter: None,
            min_search_parameters: 3,
            ..Default::default()
        };
        assert!(policy.applies(false, &["a", "b", "c"]));
        assert!(!policy.applies(false, &["a", "b"]));
    }
}

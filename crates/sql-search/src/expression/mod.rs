//! The search expression tree.
//!
//! A closed sum type over every node kind the compiler understands. Trees are
//! built upstream from the query string and are immutable once handed to the
//! compiler.

mod value;

pub use value::{
    BinaryOperator, FieldName, MultiaryOperator, PrimaryKeyRange, PrimaryKeyValue,
    StringOperator, Value,
};

use crate::types::SearchParameterInfo;

/// A node of the search expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `field <op> value`.
    Binary(BinaryExpression),
    /// String matching against a field.
    String(StringExpression),
    /// The field has no value.
    MissingField(MissingFieldExpression),
    /// `param:missing=true|false`.
    MissingSearchParameter(MissingSearchParameterExpression),
    /// Scopes the inner expression to one search parameter.
    SearchParameter(SearchParameterExpression),
    /// AND / OR over child expressions.
    Multiary(MultiaryExpression),
    /// Negation.
    Not(Box<Expression>),
    /// `field IN (values)`.
    In(InExpression),
    /// Any of several disjoint scopes.
    Union(UnionExpression),
    /// Membership in a compartment.
    Compartment(CompartmentSearchExpression),
    /// A chained (or reverse chained) reference traversal.
    Chained(ChainedExpression),
    /// One normalized link of a chain.
    SqlChainLink(SqlChainLinkExpression),
    /// `_include` / `_revinclude`.
    Include(IncludeExpression),
}

/// `field <op> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpression {
    pub operator: BinaryOperator,
    pub field: FieldName,
    pub component_index: Option<usize>,
    pub value: Value,
}

/// String matching against a field.
#[derive(Debug, Clone, PartialEq)]
pub struct StringExpression {
    pub operator: StringOperator,
    pub field: FieldName,
    pub component_index: Option<usize>,
    pub value: String,
    pub ignore_case: bool,
}

/// The field has no value.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingFieldExpression {
    pub field: FieldName,
    pub component_index: Option<usize>,
}

/// `param:missing`.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingSearchParameterExpression {
    pub parameter: SearchParameterInfo,
    pub is_missing: bool,
}

/// Scopes the inner expression to one search parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParameterExpression {
    pub parameter: SearchParameterInfo,
    pub expression: Box<Expression>,
}

/// AND / OR over child expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiaryExpression {
    pub operator: MultiaryOperator,
    pub expressions: Vec<Expression>,
}

/// `field IN (values)`; every value must have the field's type.
#[derive(Debug, Clone, PartialEq)]
pub struct InExpression {
    pub field: FieldName,
    pub component_index: Option<usize>,
    pub values: Vec<Value>,
}

/// Any of several disjoint scopes (SMART on FHIR).
#[derive(Debug, Clone, PartialEq)]
pub struct UnionExpression {
    pub expressions: Vec<Expression>,
}

/// Membership in a compartment, e.g. `Patient/123/*`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompartmentSearchExpression {
    pub compartment_type: String,
    pub compartment_id: String,
    /// Restricts the result to these resource types when not empty.
    pub filtered_resource_types: Vec<String>,
}

/// A chained reference traversal before normalization.
///
/// Forward: resources of `resource_types` whose `reference_search_parameter`
/// points at a `target_resource_types` resource matching `expression`.
/// Reversed (`_has`): resources of `resource_types` that are referenced by a
/// `target_resource_types` resource matching `expression`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainedExpression {
    pub resource_types: Vec<String>,
    pub reference_search_parameter: SearchParameterInfo,
    pub target_resource_types: Vec<String>,
    pub reversed: bool,
    pub expression: Box<Expression>,
}

/// One normalized chain link.
///
/// Resource table predicates that apply to either end of the link are kept
/// here because the link already joins the resource table.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlChainLinkExpression {
    pub resource_types: Vec<String>,
    pub reference_search_parameter: SearchParameterInfo,
    pub target_resource_types: Vec<String>,
    pub reversed: bool,
    pub expression_on_source: Option<Box<Expression>>,
    pub expression_on_target: Option<Box<Expression>>,
}

/// `_include` / `_revinclude`.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeExpression {
    /// The reference parameter; `None` for `*` includes.
    pub reference_search_parameter: Option<SearchParameterInfo>,
    /// The resource type that owns the reference parameter.
    pub source_resource_type: String,
    /// The referenced type the include is restricted to.
    pub target_resource_type: Option<String>,
    /// Types a forward include can produce when no target type is given.
    pub referenced_types: Vec<String>,
    pub wildcard: bool,
    pub reversed: bool,
    pub iterate: bool,
    /// Resource types the caller's scopes allow; `None` means unrestricted.
    pub allowed_resource_types_by_scope: Option<Vec<String>>,
}

/// Scope value granting every resource type.
pub const ALL_RESOURCE_TYPES: &str = "all";

impl IncludeExpression {
    /// Creates a forward include (`_include=Source:param[:Target]`).
    pub fn forward(
        source_resource_type: impl Into<String>,
        reference_search_parameter: SearchParameterInfo,
        target_resource_type: Option<String>,
    ) -> Self {
        Self {
            referenced_types: reference_search_parameter.target.clone(),
            reference_search_parameter: Some(reference_search_parameter),
            source_resource_type: source_resource_type.into(),
            target_resource_type,
            wildcard: false,
            reversed: false,
            iterate: false,
            allowed_resource_types_by_scope: None,
        }
    }

    /// Creates a reverse include (`_revinclude=Source:param[:Target]`).
    pub fn reverse(
        source_resource_type: impl Into<String>,
        reference_search_parameter: SearchParameterInfo,
        target_resource_type: Option<String>,
    ) -> Self {
        Self {
            reversed: true,
            ..Self::forward(
                source_resource_type,
                reference_search_parameter,
                target_resource_type,
            )
        }
    }

    /// Creates a wildcard include (`_include=Source:*`).
    pub fn wildcard(source_resource_type: impl Into<String>, referenced_types: Vec<String>) -> Self {
        Self {
            reference_search_parameter: None,
            source_resource_type: source_resource_type.into(),
            target_resource_type: None,
            referenced_types,
            wildcard: true,
            reversed: false,
            iterate: false,
            allowed_resource_types_by_scope: None,
        }
    }

    /// Marks the include as `:iterate`.
    pub fn iterate(mut self) -> Self {
        self.iterate = true;
        self
    }

    /// Restricts the include to the types allowed by the caller's scopes.
    pub fn with_allowed_resource_types(mut self, types: Vec<String>) -> Self {
        self.allowed_resource_types_by_scope = Some(types);
        self
    }

    /// Resource types this include can add to the result.
    pub fn produced_resource_types(&self) -> Vec<String> {
        if self.reversed {
            return vec![self.source_resource_type.clone()];
        }
        match &self.target_resource_type {
            Some(target) => vec![target.clone()],
            None => self.referenced_types.clone(),
        }
    }

    /// Returns the allowed scope types when they actually restrict anything.
    pub fn scope_restriction(&self) -> Option<&[String]> {
        self.allowed_resource_types_by_scope
            .as_deref()
            .filter(|types| !types.iter().any(|t| t == ALL_RESOURCE_TYPES))
    }
}

impl Expression {
    /// `field <op> value`.
    pub fn binary(operator: BinaryOperator, field: FieldName, value: impl Into<Value>) -> Self {
        Expression::Binary(BinaryExpression {
            operator,
            field,
            component_index: None,
            value: value.into(),
        })
    }

    /// `field = value` on a composite component.
    pub fn binary_component(
        operator: BinaryOperator,
        field: FieldName,
        component_index: usize,
        value: impl Into<Value>,
    ) -> Self {
        Expression::Binary(BinaryExpression {
            operator,
            field,
            component_index: Some(component_index),
            value: value.into(),
        })
    }

    /// String matching.
    pub fn string(
        operator: StringOperator,
        field: FieldName,
        value: impl Into<String>,
        ignore_case: bool,
    ) -> Self {
        Expression::String(StringExpression {
            operator,
            field,
            component_index: None,
            value: value.into(),
            ignore_case,
        })
    }

    /// String matching on a composite component.
    pub fn string_component(
        operator: StringOperator,
        field: FieldName,
        component_index: usize,
        value: impl Into<String>,
        ignore_case: bool,
    ) -> Self {
        Expression::String(StringExpression {
            operator,
            field,
            component_index: Some(component_index),
            value: value.into(),
            ignore_case,
        })
    }

    /// Case-sensitive string equality.
    pub fn string_equals(field: FieldName, value: impl Into<String>) -> Self {
        Self::string(StringOperator::Equals, field, value, false)
    }

    /// The field has no value.
    pub fn missing_field(field: FieldName) -> Self {
        Expression::MissingField(MissingFieldExpression {
            field,
            component_index: None,
        })
    }

    /// `param:missing`.
    pub fn missing_search_parameter(parameter: SearchParameterInfo, is_missing: bool) -> Self {
        Expression::MissingSearchParameter(MissingSearchParameterExpression {
            parameter,
            is_missing,
        })
    }

    /// Scopes `expression` to `parameter`.
    pub fn search_parameter(parameter: SearchParameterInfo, expression: Expression) -> Self {
        Expression::SearchParameter(SearchParameterExpression {
            parameter,
            expression: Box::new(expression),
        })
    }

    /// Conjunction.
    pub fn and(expressions: Vec<Expression>) -> Self {
        Expression::Multiary(MultiaryExpression {
            operator: MultiaryOperator::And,
            expressions,
        })
    }

    /// Disjunction.
    pub fn or(expressions: Vec<Expression>) -> Self {
        Expression::Multiary(MultiaryExpression {
            operator: MultiaryOperator::Or,
            expressions,
        })
    }

    /// Negation.
    pub fn not(expression: Expression) -> Self {
        Expression::Not(Box::new(expression))
    }

    /// `field IN (values)`.
    pub fn in_list(field: FieldName, values: Vec<Value>) -> Self {
        Expression::In(InExpression {
            field,
            component_index: None,
            values,
        })
    }

    /// Union of disjoint scopes.
    pub fn union(expressions: Vec<Expression>) -> Self {
        Expression::Union(UnionExpression { expressions })
    }

    /// Compartment membership.
    pub fn compartment(
        compartment_type: impl Into<String>,
        compartment_id: impl Into<String>,
        filtered_resource_types: Vec<String>,
    ) -> Self {
        Expression::Compartment(CompartmentSearchExpression {
            compartment_type: compartment_type.into(),
            compartment_id: compartment_id.into(),
            filtered_resource_types,
        })
    }

    /// A chain link.
    pub fn chained(
        resource_types: Vec<String>,
        reference_search_parameter: SearchParameterInfo,
        target_resource_types: Vec<String>,
        reversed: bool,
        expression: Expression,
    ) -> Self {
        Expression::Chained(ChainedExpression {
            resource_types,
            reference_search_parameter,
            target_resource_types,
            reversed,
            expression: Box::new(expression),
        })
    }

    /// An include.
    pub fn include(include: IncludeExpression) -> Self {
        Expression::Include(include)
    }

    /// The node kind name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expression::Binary(_) => "binary",
            Expression::String(_) => "string",
            Expression::MissingField(_) => "missing field",
            Expression::MissingSearchParameter(_) => "missing search parameter",
            Expression::SearchParameter(_) => "search parameter",
            Expression::Multiary(_) => "multiary",
            Expression::Not(_) => "not",
            Expression::In(_) => "in",
            Expression::Union(_) => "union",
            Expression::Compartment(_) => "compartment",
            Expression::Chained(_) => "chained",
            Expression::SqlChainLink(_) => "chain link",
            Expression::Include(_) => "include",
        }
    }

    /// Direct children of this node.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::SearchParameter(e) => vec![e.expression.as_ref()],
            Expression::Multiary(e) => e.expressions.iter().collect(),
            Expression::Not(e) => vec![e.as_ref()],
            Expression::Union(e) => e.expressions.iter().collect(),
            Expression::Chained(e) => vec![e.expression.as_ref()],
            Expression::SqlChainLink(e) => e
                .expression_on_source
                .iter()
                .chain(e.expression_on_target.iter())
                .map(|b| b.as_ref())
                .collect(),
            Expression::Binary(_)
            | Expression::String(_)
            | Expression::MissingField(_)
            | Expression::MissingSearchParameter(_)
            | Expression::In(_)
            | Expression::Compartment(_)
            | Expression::Include(_) => Vec::new(),
        }
    }

    /// Nesting depth of the tree; a single leaf has depth 1.
    ///
    /// Walks the tree with an explicit stack so arbitrarily deep input cannot
    /// overflow the native stack.
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((node, depth)) = stack.pop() {
            max = max.max(depth);
            stack.extend(node.children().into_iter().map(|c| (c, depth + 1)));
        }
        max
    }

    /// Returns true if any node satisfies `predicate`.
    pub fn any(&self, predicate: impl Fn(&Expression) -> bool) -> bool {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if predicate(node) {
                return true;
            }
            stack.extend(node.children());
        }
        false
    }

    /// Returns true if a leaf anywhere in the tree targets `field`.
    pub fn contains_field(&self, field: FieldName) -> bool {
        self.any(|node| match node {
            Expression::Binary(e) => e.field == field,
            Expression::String(e) => e.field == field,
            Expression::MissingField(e) => e.field == field,
            Expression::In(e) => e.field == field,
            _ => false,
        })
    }

    /// Returns true if the tree references the search parameter with `code`.
    pub fn references_parameter(&self, code: &str) -> bool {
        self.any(|node| match node {
            Expression::SearchParameter(e) => e.parameter.code == code,
            Expression::MissingSearchParameter(e) => e.parameter.code == code,
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SearchParamType;

    fn family() -> SearchParameterInfo {
        SearchParameterInfo::new(
            "family",
            "http://hl7.org/fhir/SearchParameter/individual-family",
            SearchParamType::String,
        )
    }

    #[test]
    fn test_depth_of_leaf_and_nesting() {
        let leaf = Expression::string_equals(FieldName::String, "Smith");
        assert_eq!(leaf.depth(), 1);

        let wrapped = Expression::search_parameter(
            family(),
            Expression::and(vec![leaf.clone(), Expression::or(vec![leaf.clone()])]),
        );
        assert_eq!(wrapped.depth(), 4);
    }

    #[test]
    fn test_depth_of_very_deep_tree_does_not_recurse() {
        let mut expr = Expression::string_equals(FieldName::String, "x");
        for _ in 0..100_000 {
            expr = Expression::not(expr);
        }
        assert_eq!(expr.depth(), 100_001);
        // Dropping a deeply nested Box chain is recursive; leak it instead.
        std::mem::forget(expr);
    }

    #[test]
    fn test_contains_field_and_parameter() {
        let expr = Expression::search_parameter(
            family(),
            Expression::string(StringOperator::StartsWith, FieldName::String, "Sm", true),
        );
        assert!(expr.contains_field(FieldName::String));
        assert!(!expr.contains_field(FieldName::TokenCode));
        assert!(expr.references_parameter("family"));
        assert!(!expr.references_parameter("_id"));
    }

    #[test]
    fn test_include_produced_types() {
        let organization = SearchParameterInfo::new(
            "organization",
            "http://hl7.org/fhir/SearchParameter/Patient-organization",
            SearchParamType::Reference,
        )
        .with_target(vec!["Organization".to_string()]);

        let include = IncludeExpression::forward("Patient", organization.clone(), None);
        assert_eq!(include.produced_resource_types(), vec!["Organization"]);

        let rev = IncludeExpression::reverse("Patient", organization, None);
        assert_eq!(rev.produced_resource_types(), vec!["Patient"]);

        let scoped = include.with_allowed_resource_types(vec!["all".to_string()]);
        assert!(scoped.scope_restriction().is_none());
    }
}

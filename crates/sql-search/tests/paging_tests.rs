//! Paging, counting and include paging tests.

mod common;

use common::*;
use helios_sql_search::expression::{Expression, IncludeExpression};
use helios_sql_search::sql::SqlValue;
use helios_sql_search::types::{
    ContinuationToken, IncludesContinuationToken, ResourceVersionType, SearchOptions, SortSpec,
};
use helios_sql_search::SqlSearchError;

fn has_value(compiled: &helios_sql_search::CompiledSearch, value: SqlValue) -> bool {
    compiled.parameters.iter().any(|p| p.value == value)
}

fn with_include() -> Expression {
    Expression::and(vec![
        of_type("Patient"),
        family_is("Smi"),
        Expression::include(IncludeExpression::forward("Patient", organization_param(), None)),
    ])
}

// ============================================================================
// Continuation tokens
// ============================================================================

#[test]
fn test_tokens_round_trip() {
    let token = ContinuationToken::new(42)
        .with_resource_type_id(PATIENT)
        .with_sort_value("Smith");
    assert_eq!(ContinuationToken::decode(&token.encode()).unwrap(), token);

    let includes = IncludesContinuationToken::new(10, 20).with_include_position(ORGANIZATION, 15);
    assert_eq!(IncludesContinuationToken::decode(&includes.encode()).unwrap(), includes);
}

#[test]
fn test_tampered_token_is_rejected() {
    let err = ContinuationToken::decode("not a token").unwrap_err();
    assert!(matches!(err, SqlSearchError::InvalidContinuationToken { .. }));

    let options = SearchOptions::default().with_includes_continuation_token("e30");
    let err = compiler().compile(&with_include(), &options, None).unwrap_err();
    assert!(matches!(err, SqlSearchError::InvalidContinuationToken { .. }));
}

#[test]
fn test_page_size_is_fetched_with_one_look_ahead_row() {
    let compiled = compiler()
        .compile(&of_type("Patient"), &SearchOptions::new(20), None)
        .unwrap();

    assert_sql_contains(&compiled, "SELECT DISTINCT TOP (@p");
    assert!(has_value(&compiled, SqlValue::Int(21)));
    assert!(compiled.parameters.iter().filter(|p| p.value == SqlValue::Int(21)).all(|p| !p.include_in_hash));
}

#[test]
fn test_next_page_resumes_after_last_row() {
    let search = Expression::and(vec![of_type("Patient"), family_is("Smi")]);
    let first = compiler().compile(&search, &SearchOptions::default(), None).unwrap();

    let token = ContinuationToken::new(1_000).encode();
    let options = SearchOptions::default().with_continuation_token(token);
    let next = compiler().compile(&search, &options, None).unwrap();

    assert_well_formed(&next);
    assert_sql_contains(&next, "ResourceSurrogateId > @p");
    assert!(has_value(&next, SqlValue::BigInt(1_000)));
    assert_eq!(first.hash, next.hash);
}

#[test]
fn test_next_page_of_composite_search() {
    // Observation?code-value-quantity=8480-6$gt140
    let search = Expression::and(vec![of_type("Observation"), code_value_above("8480-6", 140)]);
    let first = compiler().compile(&search, &SearchOptions::default(), None).unwrap();

    let token = ContinuationToken::new(1_000).encode();
    let options = SearchOptions::default().with_continuation_token(token);
    let next = compiler().compile(&search, &options, None).unwrap();

    assert_well_formed(&next);
    assert_sql_contains(&next, "FROM dbo.TokenQuantityCompositeSearchParam");
    assert_sql_contains(&next, "Code1 = @p");
    assert_sql_contains(&next, "ResourceSurrogateId > @p");
    assert!(has_value(&next, SqlValue::BigInt(1_000)));
    assert_eq!(first.hash, next.hash);
}

#[test]
fn test_type_sorted_page_resumes_across_types() {
    let token = ContinuationToken::new(77).with_resource_type_id(ORGANIZATION).encode();
    let options = SearchOptions::default()
        .with_sort(SortSpec::ascending(resource_type_param()))
        .with_continuation_token(token);

    let compiled = compiler().compile(&of_type("Patient"), &options, None).unwrap();

    assert_well_formed(&compiled);
    assert_sql_contains(&compiled, "((r.ResourceTypeId = @p");
    assert_sql_contains(&compiled, "AND r.ResourceSurrogateId > @p");
    assert_sql_contains(&compiled, "OR r.ResourceTypeId IN (@p");
    assert_sql_contains(&compiled, "ORDER BY r.ResourceTypeId ASC, r.ResourceSurrogateId ASC");
    assert!(has_value(&compiled, SqlValue::SmallInt(ORGANIZATION)));
}

#[test]
fn test_value_sorted_page_resumes_after_sort_value() {
    let token = ContinuationToken::new(5)
        .with_sort_value("1980-01-01T00:00:00Z")
        .encode();
    let options = SearchOptions::default()
        .with_sort(SortSpec::descending(birthdate_param()))
        .with_continuation_token(token);
    let search = Expression::and(vec![of_type("Patient"), family_is("Smi")]);

    let compiled = compiler().compile(&search, &options, None).unwrap();

    assert_well_formed(&compiled);
    assert_sql_contains(&compiled, "EndDateTime AS SortValue");
    assert_sql_contains(&compiled, "OR EndDateTime < @p");
    assert_sql_contains(&compiled, "ORDER BY SortValue DESC, r.ResourceSurrogateId ASC");
}

// ============================================================================
// Counting
// ============================================================================

#[test]
fn test_count_only_returns_one_number() {
    let options = SearchOptions::default()
        .with_count_only(true)
        .with_sort(SortSpec::ascending(birthdate_param()));

    let compiled = compiler().compile(&with_include(), &options, None).unwrap();

    assert_well_formed(&compiled);
    assert_cte_count(&compiled, 1);
    assert_sql_contains(&compiled, "SELECT count_big(DISTINCT Sid1)");
    assert_sql_not_contains(&compiled, "TOP (");
    assert_sql_not_contains(&compiled, "ORDER BY");
}

// ============================================================================
// Resource versions
// ============================================================================

#[test]
fn test_history_search_reads_history_rows() {
    let options = SearchOptions::default().with_resource_version_types(ResourceVersionType::HISTORY);

    let compiled = compiler().compile(&of_type("Patient"), &options, None).unwrap();

    assert_sql_contains(&compiled, "r.IsHistory = 1");
    assert_sql_contains(&compiled, "r.IsDeleted = 0");
}

// ============================================================================
// Includes
// ============================================================================

#[test]
fn test_include_count_bounds_each_include() {
    let options = SearchOptions::default().with_include_count(50);

    let compiled = compiler().compile(&with_include(), &options, None).unwrap();

    assert_well_formed(&compiled);
    assert_sql_contains(&compiled, "CASE WHEN count_big(*) over() > @p");
    assert!(has_value(&compiled, SqlValue::Int(51)));
    assert!(has_value(&compiled, SqlValue::Int(50)));
}

#[test]
fn test_includes_operation_pages_through_includes() {
    let token = IncludesContinuationToken::new(100, 200)
        .with_include_position(ORGANIZATION, 150)
        .encode();
    let options = SearchOptions::default().with_includes_continuation_token(token);

    let compiled = compiler().compile(&with_include(), &options, None).unwrap();

    assert_well_formed(&compiled);
    assert_sql_contains(&compiled, "SELECT DISTINCT T1, Sid1, 1 AS IsMatch");
    assert_sql_contains(&compiled, "WHERE Sid1 >= @p");
    assert_sql_contains(&compiled, "AND Sid1 <= @p");
    assert_sql_contains(&compiled, "WHERE ((T1 = @p");
    assert_sql_contains(&compiled, "IsMatch = 0");
    assert!(has_value(&compiled, SqlValue::BigInt(150)));
}

#[test]
fn test_reverse_include() {
    // Patient?family=Smi&_revinclude=Observation:subject
    let search = Expression::and(vec![
        of_type("Patient"),
        family_is("Smi"),
        Expression::include(IncludeExpression::reverse("Observation", subject_param(), Some("Patient".to_string()))),
    ]);

    let compiled = compiler().compile(&search, &SearchOptions::default(), None).unwrap();

    assert_well_formed(&compiled);
    assert_sql_contains(&compiled, "SELECT DISTINCT refSource.ResourceTypeId AS T1");
    assert!(compiled.search_param_ids.contains(&22));
}

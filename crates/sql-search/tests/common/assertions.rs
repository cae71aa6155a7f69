//! SQL assertions.

use helios_sql_search::CompiledSearch;

/// Asserts that the statement contains `fragment`.
pub fn assert_sql_contains(compiled: &CompiledSearch, fragment: &str) {
    assert!(
        compiled.sql.contains(fragment),
        "Expected SQL to contain {:?}\n--- SQL ---\n{}",
        fragment,
        compiled.sql
    );
}

/// Asserts that the statement does not contain `fragment`.
pub fn assert_sql_not_contains(compiled: &CompiledSearch, fragment: &str) {
    assert!(
        !compiled.sql.contains(fragment),
        "Expected SQL not to contain {:?}\n--- SQL ---\n{}",
        fragment,
        compiled.sql
    );
}

/// Asserts the number of CTEs the statement defines.
pub fn assert_cte_count(compiled: &CompiledSearch, expected: usize) {
    let defined = (0..)
        .take_while(|i| {
            let name = format!("cte{i} AS\n");
            compiled.sql.contains(&name)
        })
        .count();
    assert_eq!(
        defined, expected,
        "Unexpected CTE count\n--- SQL ---\n{}",
        compiled.sql
    );
}

/// Asserts that every placeholder is bound once, named `@p0..@pN` in order,
/// and referenced by the statement text.
pub fn assert_parameters_bound(compiled: &CompiledSearch) {
    for (i, parameter) in compiled.parameters.iter().enumerate() {
        assert_eq!(parameter.name, format!("@p{i}"), "Parameters out of order");
        assert!(
            compiled.sql.contains(&parameter.name),
            "Parameter {} is never referenced\n--- SQL ---\n{}",
            parameter.name,
            compiled.sql
        );
    }
    let unbound = format!("@p{}", compiled.parameters.len());
    assert!(
        !compiled.sql.contains(&unbound),
        "Placeholder {unbound} has no bound value"
    );
}

/// Asserts that parentheses in the statement are balanced.
pub fn assert_balanced_parentheses(compiled: &CompiledSearch) {
    let mut depth = 0i64;
    for c in compiled.sql.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        assert!(depth >= 0, "Unbalanced ')'\n--- SQL ---\n{}", compiled.sql);
    }
    assert_eq!(depth, 0, "Unclosed '('\n--- SQL ---\n{}", compiled.sql);
}

/// Runs the structural checks every compiled statement must pass.
pub fn assert_well_formed(compiled: &CompiledSearch) {
    assert_parameters_bound(compiled);
    assert_balanced_parentheses(compiled);
}

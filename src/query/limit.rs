//! Detection of an existing row limit on a statement.

use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::{Dialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

use crate::db::SqlDialect;
use crate::safety::{tokenize, Token};

/// Returns true if the outermost query already limits its rows
/// (`LIMIT`, `FETCH FIRST/NEXT`, or `TOP`).
///
/// Limits inside subqueries do not count. Statements the parser cannot read
/// fall back to a scan for those keywords outside parentheses.
pub fn has_row_limit(sql: &str, dialect: SqlDialect) -> bool {
    let parsed = match dialect {
        SqlDialect::Postgres => parsed_limit(&PostgreSqlDialect {}, sql),
        SqlDialect::Sqlite => parsed_limit(&SQLiteDialect {}, sql),
    };
    parsed.unwrap_or_else(|| scanned_limit(sql))
}

fn parsed_limit(dialect: &dyn Dialect, sql: &str) -> Option<bool> {
    let statements = Parser::parse_sql(dialect, sql).ok()?;
    match statements.as_slice() {
        [Statement::Query(query)] => Some(query_has_limit(query)),
        _ => None,
    }
}

fn query_has_limit(query: &Query) -> bool {
    if query.limit.is_some() || query.fetch.is_some() {
        return true;
    }
    matches!(query.body.as_ref(), SetExpr::Select(select) if select.top.is_some())
}

fn scanned_limit(sql: &str) -> bool {
    let Ok(tokens) = tokenize(sql) else {
        return false;
    };

    let mut depth = 0usize;
    for token in &tokens {
        match token {
            Token::Symbol('(') => depth += 1,
            Token::Symbol(')') => depth = depth.saturating_sub(1),
            Token::Word(word) if depth == 0 => {
                let upper = word.to_uppercase();
                if matches!(upper.as_str(), "LIMIT" | "FETCH" | "TOP") {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_limit() {
        assert!(has_row_limit("SELECT * FROM t LIMIT 10", SqlDialect::Postgres));
        assert!(has_row_limit("select * from t order by a limit 5 offset 2", SqlDialect::Sqlite));
        assert!(has_row_limit(
            "SELECT * FROM t FETCH FIRST 3 ROWS ONLY",
            SqlDialect::Postgres
        ));
    }

    #[test]
    fn test_no_limit() {
        assert!(!has_row_limit("SELECT * FROM t", SqlDialect::Postgres));
        assert!(!has_row_limit("SELECT * FROM t WHERE a > 1 ORDER BY a", SqlDialect::Sqlite));
    }

    #[test]
    fn test_subquery_limit_does_not_count() {
        assert!(!has_row_limit(
            "SELECT * FROM (SELECT * FROM t LIMIT 5) AS s",
            SqlDialect::Postgres
        ));
        assert!(!has_row_limit(
            "SELECT * FROM t WHERE id IN (SELECT id FROM u LIMIT 5)",
            SqlDialect::Sqlite
        ));
    }

    #[test]
    fn test_bracket_identifiers() {
        assert!(!has_row_limit("SELECT * FROM [EDC_BRAND]", SqlDialect::Sqlite));
        assert!(has_row_limit("SELECT * FROM [EDC_BRAND] LIMIT 3", SqlDialect::Sqlite));
    }

    #[test]
    fn test_scan_fallback() {
        assert!(scanned_limit("SELECT TOP 10 * FROM [EDC_BRAND]"));
        assert!(scanned_limit("SELECT * FROM [t] LIMIT 3"));
        assert!(!scanned_limit("SELECT * FROM (SELECT * FROM [t] LIMIT 3) x"));
        assert!(!scanned_limit("SELECT 'limit' FROM [t]"));
    }
}

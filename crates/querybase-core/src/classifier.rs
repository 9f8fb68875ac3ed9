//! SQL classifier (C3). Operates purely on statement text: no parser, no
//! AST, just comment/whitespace stripping, leading-keyword matching, and a
//! quote-aware token scan for referenced table names (§4.3).

use querybase_error::RuntimeError;

use crate::entities::StatementKind;

/// Outcome of classifying a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: StatementKind,
    pub tables: Vec<String>,
}

/// Strip comments and string-literal contents, replacing them with spaces
/// so downstream scans never see keywords hiding inside a literal. Mirrors
/// the sanitize pass used for read-only SQL guarding, extended here to
/// also blank out identifiers inside quotes for the table-name extractor
/// (§9 open question (b): the naive extractor misclassifies identifiers
/// inside string literals -- this pass fixes that by construction).
fn sanitize(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;
    let mut in_line_comment = false;
    let mut in_block_comment = false;

    while let Some(ch) = chars.next() {
        if in_line_comment {
            if ch == '\n' {
                in_line_comment = false;
                out.push('\n');
            } else {
                out.push(' ');
            }
            continue;
        }
        if in_block_comment {
            if ch == '*' && matches!(chars.peek(), Some('/')) {
                chars.next();
                in_block_comment = false;
                out.push_str("  ");
            } else {
                out.push(' ');
            }
            continue;
        }
        if in_single {
            if ch == '\'' {
                if matches!(chars.peek(), Some('\'')) {
                    chars.next();
                    out.push_str("  ");
                    continue;
                }
                in_single = false;
            }
            out.push(' ');
            continue;
        }
        if in_double {
            if ch == '"' {
                in_double = false;
            }
            out.push(' ');
            continue;
        }

        if ch == '-' && matches!(chars.peek(), Some('-')) {
            chars.next();
            in_line_comment = true;
            out.push_str("  ");
            continue;
        }
        if ch == '/' && matches!(chars.peek(), Some('*')) {
            chars.next();
            in_block_comment = true;
            out.push_str("  ");
            continue;
        }
        if ch == '\'' {
            in_single = true;
            out.push(' ');
            continue;
        }
        if ch == '"' {
            in_double = true;
            out.push(' ');
            continue;
        }

        out.push(ch);
    }

    out
}

fn tokens(sanitized: &str) -> Vec<(String, usize)> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut start = 0;
    for (idx, ch) in sanitized.char_indices() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' || ch == '"' {
            if current.is_empty() {
                start = idx;
            }
            current.push(ch);
        } else if !current.is_empty() {
            out.push((std::mem::take(&mut current), start));
        }
    }
    if !current.is_empty() {
        out.push((current, start));
    }
    out
}

/// Classify a statement's leading keyword into a [`StatementKind`] (§4.3
/// pattern table). Anything unrecognized defaults conservatively to
/// `update`.
#[must_use]
pub fn classify_kind(sql: &str) -> StatementKind {
    let sanitized = sanitize(sql);
    let trimmed = sanitized.trim_start();
    let upper = trimmed.to_ascii_uppercase();

    if upper.starts_with("SELECT") {
        return StatementKind::Select;
    }
    if upper.starts_with("WITH") {
        // `WITH ... SELECT` -- scan past the CTE body for the terminal
        // SELECT keyword (§4.3: "WITH … SELECT").
        if upper.contains("SELECT") {
            return StatementKind::Select;
        }
        return StatementKind::Update;
    }
    if upper.starts_with("INSERT") {
        return StatementKind::Insert;
    }
    if upper.starts_with("UPDATE") {
        return StatementKind::Update;
    }
    if upper.starts_with("DELETE") {
        return StatementKind::Delete;
    }
    if starts_with_words(&upper, &["CREATE", "TABLE"]) {
        return StatementKind::CreateTable;
    }
    if starts_with_words(&upper, &["DROP", "TABLE"]) {
        return StatementKind::DropTable;
    }
    if starts_with_words(&upper, &["ALTER", "TABLE"]) {
        return StatementKind::AlterTable;
    }
    StatementKind::Update
}

/// True if `upper` begins with `words`, skipping an optional
/// `IF [NOT] EXISTS` clause between the first and second word (`CREATE
/// TABLE IF NOT EXISTS`, `DROP TABLE IF EXISTS`).
fn starts_with_words(upper: &str, words: &[&str]) -> bool {
    let mut rest = upper.trim_start();
    for (i, word) in words.iter().enumerate() {
        let Some(r) = rest.strip_prefix(word) else {
            return false;
        };
        rest = r.trim_start();
        if i == 0 {
            for optional in ["IF NOT EXISTS", "IF EXISTS"] {
                if let Some(r2) = rest.strip_prefix(optional) {
                    rest = r2.trim_start();
                    break;
                }
            }
        }
    }
    true
}

const TABLE_MARKERS: &[&str] = &["FROM", "JOIN", "INTO", "UPDATE", "TABLE"];

/// Extract referenced table identifiers (§4.3 "table-name extraction"):
/// scans for `FROM`/`JOIN`/`INTO`/`UPDATE`/`TABLE` followed by a qualified
/// identifier, de-duplicating while preserving first-seen order.
/// Operates on the quote-stripped text, so identifiers hidden inside
/// string literals are never captured.
#[must_use]
pub fn extract_tables(sql: &str) -> Vec<String> {
    let sanitized = sanitize(sql);
    let toks = tokens(&sanitized);
    let mut seen = Vec::new();

    let mut i = 0;
    while i < toks.len() {
        let upper = toks[i].0.to_ascii_uppercase();
        if TABLE_MARKERS.contains(&upper.as_str()) {
            if let Some((ident, _)) = toks.get(i + 1) {
                let cleaned = ident.trim_matches('"').to_string();
                let upper_ident = cleaned.to_ascii_uppercase();
                if !cleaned.is_empty()
                    && !TABLE_MARKERS.contains(&upper_ident.as_str())
                    && !seen.contains(&cleaned)
                {
                    seen.push(cleaned);
                }
            }
        }
        i += 1;
    }
    seen
}

/// Full classification: kind plus referenced tables.
#[must_use]
pub fn classify(sql: &str) -> Classification {
    Classification {
        kind: classify_kind(sql),
        tables: extract_tables(sql),
    }
}

/// Delete→select rewrite (§4.3, §4.7 dry-run path): replaces the leading
/// `DELETE` keyword with `SELECT *`, preserving the rest verbatim.
/// Idempotent: applying it to its own output is a no-op (§8).
///
/// # Errors
///
/// Returns `invalid_input` if the statement does not begin with `DELETE`.
pub fn rewrite_delete_to_select(sql: &str) -> Result<String, RuntimeError> {
    let trimmed = sql.trim_start();
    let sanitized_upper = sanitize(trimmed).to_ascii_uppercase();
    if sanitized_upper.trim_start().starts_with("SELECT") {
        return Ok(sql.to_string());
    }
    if !sanitized_upper.trim_start().starts_with("DELETE") {
        return Err(RuntimeError::invalid_input(
            "dry-run rewrite requires a DELETE statement",
        ));
    }
    let leading_ws = sql.len() - trimmed.len();
    let keyword_end = trimmed
        .char_indices()
        .find(|&(_, c)| c.is_whitespace())
        .map_or(trimmed.len(), |(i, _)| i);
    let rest = &trimmed[keyword_end..];
    Ok(format!("{}SELECT *{}", &sql[..leading_ws], rest))
}

fn find_keyword(sanitized: &str, keyword: &str) -> Option<usize> {
    tokens(sanitized)
        .into_iter()
        .find(|(tok, _)| tok.eq_ignore_ascii_case(keyword))
        .map(|(_, idx)| idx)
}

/// Update→select rewrite (§4.9 preview): keeps the target table and
/// `WHERE` clause, dropping the `SET` assignments, so the reviewer sees
/// the rows the update targets rather than the rows it would produce.
///
/// # Errors
///
/// Returns `invalid_input` if the statement does not begin with `UPDATE`
/// or its target table cannot be determined.
pub fn rewrite_update_to_select(sql: &str) -> Result<String, RuntimeError> {
    let sanitized = sanitize(sql);
    let upper = sanitized.trim_start().to_ascii_uppercase();
    if upper.starts_with("SELECT") {
        return Ok(sql.to_string());
    }
    if !upper.starts_with("UPDATE") {
        return Err(RuntimeError::invalid_input(
            "preview rewrite requires an UPDATE statement",
        ));
    }
    let table = extract_tables(sql)
        .into_iter()
        .next()
        .ok_or_else(|| RuntimeError::invalid_input("could not determine table for UPDATE"))?;

    Ok(match find_keyword(&sanitized, "WHERE") {
        Some(idx) => format!("SELECT * FROM {table} {}", sql[idx..].trim_end()),
        None => format!("SELECT * FROM {table}"),
    })
}

/// Dispatches to [`rewrite_delete_to_select`] or [`rewrite_update_to_select`]
/// depending on `kind` (§4.9 "for delete/update, also execute the
/// classifier's SELECT * rewrite").
///
/// # Errors
///
/// Returns `invalid_input` for any other kind.
pub fn rewrite_to_preview_select(sql: &str, kind: StatementKind) -> Result<String, RuntimeError> {
    match kind {
        StatementKind::Delete => rewrite_delete_to_select(sql),
        StatementKind::Update => rewrite_update_to_select(sql),
        _ => Err(RuntimeError::invalid_input(
            "preview rewrite only supports delete and update statements",
        )),
    }
}

/// Shallow syntactic validation (§4.3): reject empty statements,
/// unbalanced parentheses, unterminated string literals, and -- for kinds
/// that require it -- a missing mandatory keyword.
///
/// # Errors
///
/// Returns `invalid_input` describing the first violation found.
pub fn validate_syntax(sql: &str, kind: StatementKind) -> Result<(), RuntimeError> {
    if sql.trim().is_empty() {
        return Err(RuntimeError::invalid_input("statement is empty"));
    }

    let mut depth: i32 = 0;
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = sql.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_single {
            if ch == '\'' {
                if matches!(chars.peek(), Some('\'')) {
                    chars.next();
                } else {
                    in_single = false;
                }
            }
            continue;
        }
        if in_double {
            if ch == '"' {
                in_double = false;
            }
            continue;
        }
        match ch {
            '\'' => in_single = true,
            '"' => in_double = true,
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return Err(RuntimeError::invalid_input("unbalanced parentheses"));
        }
    }
    if in_single || in_double {
        return Err(RuntimeError::invalid_input("unterminated string literal"));
    }
    if depth != 0 {
        return Err(RuntimeError::invalid_input("unbalanced parentheses"));
    }

    let upper = sanitize(sql).to_ascii_uppercase();
    let required = match kind {
        StatementKind::Insert => Some("VALUES"),
        StatementKind::Update => Some("SET"),
        StatementKind::Delete | StatementKind::Select => Some("FROM"),
        StatementKind::CreateTable | StatementKind::DropTable | StatementKind::AlterTable => None,
    };
    if let Some(keyword) = required {
        if kind == StatementKind::Delete && !upper.contains("FROM") {
            return Err(RuntimeError::invalid_input("DELETE requires FROM"));
        }
        if kind != StatementKind::Delete && kind != StatementKind::Select && !upper.contains(keyword) {
            return Err(RuntimeError::invalid_input(format!(
                "{} requires {keyword}",
                kind.as_str()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_basic_kinds() {
        assert_eq!(classify_kind("SELECT * FROM users"), StatementKind::Select);
        assert_eq!(
            classify_kind("insert into users values (1)"),
            StatementKind::Insert
        );
        assert_eq!(
            classify_kind("UPDATE users SET x=1"),
            StatementKind::Update
        );
        assert_eq!(
            classify_kind("DELETE FROM users WHERE id=1"),
            StatementKind::Delete
        );
        assert_eq!(
            classify_kind("CREATE TABLE IF NOT EXISTS foo (id int)"),
            StatementKind::CreateTable
        );
        assert_eq!(
            classify_kind("DROP TABLE IF EXISTS foo"),
            StatementKind::DropTable
        );
        assert_eq!(
            classify_kind("ALTER TABLE foo ADD COLUMN bar int"),
            StatementKind::AlterTable
        );
        assert_eq!(classify_kind("VACUUM foo"), StatementKind::Update);
    }

    #[test]
    fn with_select_cte_classifies_as_select() {
        assert_eq!(
            classify_kind("WITH cte AS (SELECT 1) SELECT * FROM cte"),
            StatementKind::Select
        );
    }

    #[test]
    fn comments_and_whitespace_do_not_change_kind() {
        let base = classify_kind("SELECT * FROM users");
        let commented = classify_kind("-- note\nSELECT * FROM users /* trailing */");
        assert_eq!(base, commented);
    }

    #[test]
    fn table_extraction_skips_quoted_literals() {
        let tables = extract_tables("SELECT * FROM users WHERE name = 'FROM orders'");
        assert_eq!(tables, vec!["users".to_string()]);
    }

    #[test]
    fn table_extraction_dedupes_preserving_order() {
        let tables =
            extract_tables("SELECT * FROM users u JOIN orders o ON u.id = o.user_id JOIN users x ON 1=1");
        assert_eq!(tables, vec!["users".to_string(), "orders".to_string()]);
    }

    #[test]
    fn delete_rewrite_is_idempotent() {
        let once = rewrite_delete_to_select("DELETE FROM users WHERE id = 42").unwrap();
        let twice = rewrite_delete_to_select(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once, "SELECT * FROM users WHERE id = 42");
    }

    #[test]
    fn validate_rejects_unbalanced_parens() {
        assert!(validate_syntax("SELECT * FROM foo WHERE (a = 1", StatementKind::Select).is_err());
    }

    #[test]
    fn validate_rejects_unterminated_literal() {
        assert!(validate_syntax("SELECT * FROM foo WHERE a = 'oops", StatementKind::Select).is_err());
    }

    #[test]
    fn update_rewrite_keeps_where_drops_set() {
        let preview = rewrite_update_to_select("UPDATE accounts SET balance = 0 WHERE id = 7").unwrap();
        assert_eq!(preview, "SELECT * FROM accounts WHERE id = 7");
    }

    #[test]
    fn update_rewrite_without_where_selects_whole_table() {
        let preview = rewrite_update_to_select("UPDATE accounts SET balance = 0").unwrap();
        assert_eq!(preview, "SELECT * FROM accounts");
    }

    #[test]
    fn preview_select_dispatches_by_kind() {
        assert_eq!(
            rewrite_to_preview_select("DELETE FROM t WHERE id = 1", StatementKind::Delete).unwrap(),
            "SELECT * FROM t WHERE id = 1"
        );
        assert!(rewrite_to_preview_select("INSERT INTO t VALUES (1)", StatementKind::Insert).is_err());
    }

    #[test]
    fn validate_requires_mandatory_keyword() {
        assert!(validate_syntax("INSERT INTO foo (a)", StatementKind::Insert).is_err());
        assert!(validate_syntax("INSERT INTO foo (a) VALUES (1)", StatementKind::Insert).is_ok());
    }
}

//! Per-shard statement rewriting.
//!
//! The compatibility contract is plain substring replacement: every literal
//! occurrence of a sharded table's bare name becomes
//! `<shard schema>.<shard prefix><table name>`, with no awareness of
//! quoting, word boundaries, or aliasing collisions. Callers must ensure
//! table names are not ambiguous substrings of other identifiers when using
//! [`RewriteMode::Substring`]; [`RewriteMode::WordBoundary`] is the opt-in
//! hardened mode that only replaces occurrences not adjacent to identifier
//! characters.

use crate::catalog::ShardCatalog;
use crate::config::RewriteMode;
use crate::types::{ShardRoute, TableRef};

/// Rewrites one statement for one route. Tables are substituted only when
/// they appear in both the statement's table list and the shard catalog.
pub fn rewrite_statement(
    sql: &str,
    tables: &[TableRef],
    catalog: &ShardCatalog,
    route: &ShardRoute,
    mode: RewriteMode,
) -> String {
    let mut statement = sql.to_string();
    for table in tables {
        if !catalog.contains(&table.name) {
            continue;
        }
        let physical = format!("{}.{}{}", route.schema, route.prefix, table.name);
        statement = match mode {
            RewriteMode::Substring => statement.replace(&table.name, &physical),
            RewriteMode::WordBoundary => replace_word(&statement, &table.name, &physical),
        };
    }
    statement
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Replaces occurrences of `needle` whose neighbors are not identifier
/// characters.
fn replace_word(haystack: &str, needle: &str, replacement: &str) -> String {
    if needle.is_empty() {
        return haystack.to_string();
    }
    let mut output = String::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(pos) = rest.find(needle) {
        let before_ok = rest[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| !is_identifier_char(c));
        let after_ok = rest[pos + needle.len()..]
            .chars()
            .next()
            .map_or(true, |c| !is_identifier_char(c));

        output.push_str(&rest[..pos]);
        if before_ok && after_ok {
            output.push_str(replacement);
        } else {
            output.push_str(needle);
        }
        rest = &rest[pos + needle.len()..];
    }
    output.push_str(rest);
    output
}
